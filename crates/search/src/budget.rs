use crate::config::{BudgetUnit, ContextBudget};
use crate::types::{Candidate, ContextPassage};

const CHARS_PER_TOKEN: usize = 4;

/// Fits ranked passages into a fixed context budget.
///
/// Takes a prefix of the ranked list. The first passage that does not fit is
/// cut down to the remaining budget instead of being dropped, and everything
/// after it is left out. Order is never changed.
///
/// A cut backs off to the last whitespace only when that gives up at most the
/// final fifth of the kept characters, so a partial passage may use somewhat
/// less than the remaining budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudgeter {
    budget: ContextBudget,
}

impl ContextBudgeter {
    #[must_use]
    pub const fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    #[must_use]
    pub fn fit(&self, candidates: &[Candidate]) -> Vec<ContextPassage> {
        let mut remaining = self.budget.limit;
        let mut passages = Vec::new();

        for candidate in candidates {
            let text = &candidate.passage().text;
            let size = self.measure(text);
            if size <= remaining {
                remaining -= size;
                passages.push(context_passage(candidate, text.clone(), false));
                continue;
            }

            if remaining > 0 {
                let cut = truncate_chars(text, self.chars_for(remaining));
                if !cut.is_empty() {
                    passages.push(context_passage(candidate, cut.to_string(), true));
                }
            }
            break;
        }

        log::debug!(
            "Context budget {:?}/{}: kept {} of {} passages, {} left",
            self.budget.unit,
            self.budget.limit,
            passages.len(),
            candidates.len(),
            remaining
        );
        passages
    }

    fn measure(&self, text: &str) -> usize {
        let chars = text.chars().count();
        match self.budget.unit {
            BudgetUnit::Chars => chars,
            BudgetUnit::Tokens => chars.div_ceil(CHARS_PER_TOKEN),
        }
    }

    const fn chars_for(&self, units: usize) -> usize {
        match self.budget.unit {
            BudgetUnit::Chars => units,
            BudgetUnit::Tokens => units.saturating_mul(CHARS_PER_TOKEN),
        }
    }
}

fn context_passage(candidate: &Candidate, text: String, truncated: bool) -> ContextPassage {
    ContextPassage {
        passage_id: candidate.passage_id().to_string(),
        source_id: candidate.source_id().to_string(),
        text,
        truncated,
    }
}

/// At most `max_chars` characters, cut back to a word boundary when one sits
/// in the last fifth of the kept prefix. Positions are counted in characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    let mut kept = 0;
    let mut end = text.len();
    // (character position, byte offset) of the last whitespace kept
    let mut last_space = None;

    for (idx, ch) in text.char_indices() {
        if kept == max_chars {
            end = idx;
            break;
        }
        if ch.is_whitespace() {
            last_space = Some((kept, idx));
        }
        kept += 1;
    }
    let prefix = &text[..end];

    match last_space {
        Some((pos, idx)) if end < text.len() && pos * 5 >= kept * 4 => prefix[..idx].trim_end(),
        _ => prefix,
    }
}
