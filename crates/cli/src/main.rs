use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    grounding_cli::main_entry().await
}
