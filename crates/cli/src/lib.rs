use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use grounding_search::{RetrievalConfig, RetrievalEngine};
use grounding_vector_store::{MemoryCorpusStore, StubEmbedder};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod report;

const CONFIG_ENV: &str = "GROUNDING_CONFIG";

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "grounding")]
#[command(about = "Grounded passage retrieval over an embedded corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Retrieval config file, JSON or TOML (overrides GROUNDING_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve grounded passages for a query
    Query(QueryArgs),

    /// Show corpus statistics
    Stats(StatsArgs),

    /// Validate a config file and print the effective values
    #[command(name = "check-config")]
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
struct CorpusArgs {
    /// Corpus snapshot (JSON)
    #[arg(long)]
    corpus: PathBuf,

    /// Treat the corpus as an indexed store instead of scanning it
    #[arg(long)]
    indexed: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Query text
    query: String,

    #[command(flatten)]
    corpus: CorpusArgs,

    /// Query embedding as a JSON array of floats, instead of the stub embedder
    #[arg(long)]
    embedding: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatsArgs {
    #[command(flatten)]
    corpus: CorpusArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CheckConfigArgs {
    /// Config file to validate
    file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON parsing.
    let json_output = match &cli.command {
        Commands::Query(args) => args.json,
        Commands::Stats(args) => args.json,
        Commands::CheckConfig(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config_path = cli
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    match cli.command {
        Commands::Query(args) => run_query(args, config_path.as_deref()).await,
        Commands::Stats(args) => run_stats(args, config_path.as_deref()).await,
        Commands::CheckConfig(args) => run_check_config(&args),
    }
}

fn load_config(path: Option<&Path>) -> Result<RetrievalConfig> {
    match path {
        Some(path) => RetrievalConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RetrievalConfig::default()),
    }
}

async fn open_engine(
    corpus: &CorpusArgs,
    config: RetrievalConfig,
) -> Result<(RetrievalEngine, Arc<MemoryCorpusStore>)> {
    let store = MemoryCorpusStore::load(&corpus.corpus, corpus.indexed)
        .await
        .with_context(|| format!("Failed to load corpus {}", corpus.corpus.display()))?;
    let store = Arc::new(store);
    let embedder = Arc::new(StubEmbedder::new(store.dimension()));

    let engine = RetrievalEngine::new(config, store.clone(), embedder)
        .await
        .context("Failed to start retrieval engine")?;
    Ok((engine, store))
}

fn read_embedding(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read embedding {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Embedding {} is not a JSON array of numbers", path.display()))
}

async fn run_query(args: QueryArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (engine, _) = open_engine(&args.corpus, config).await?;

    let result = match &args.embedding {
        Some(path) => {
            let embedding = read_embedding(path)?;
            engine.retrieve_with_embedding(&args.query, &embedding).await?
        }
        None => engine.retrieve(&args.query).await?,
    };

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&result)?)?;
    } else {
        print_stdout(&report::render_result(&result))?;
    }
    Ok(())
}

async fn run_stats(args: StatsArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let (engine, store) = open_engine(&args.corpus, config).await?;

    let stats = report::CorpusStats {
        dimension: store.dimension(),
        estimated_corpus_size: engine.estimated_corpus_size().await?,
        unembedded_passages: store.unembedded_count()?,
        load: engine.store_load(),
    };

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&stats)?)?;
    } else {
        print_stdout(&report::render_stats(&stats))?;
    }
    Ok(())
}

fn run_check_config(args: &CheckConfigArgs) -> Result<()> {
    let config = load_config(Some(&args.file))?;
    if args.json {
        print_stdout(&serde_json::to_string_pretty(&report::config_json(&config))?)?;
    } else {
        print_stdout(&report::render_config(&config))?;
    }
    Ok(())
}
