use crate::config::{ProfileThresholds, Vocabulary};
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Quoted query: exact-phrase intent, tightest threshold
    Strict,
    /// Platform/technology jargon: sparse lexical overlap, widest threshold
    Domain,
    /// General technical or code vocabulary
    Technical,
    /// Configuration and procedural wording
    Procedural,
    /// Nothing matched
    Default,
}

impl ProfileKind {
    pub const ALL: [Self; 5] = [
        Self::Strict,
        Self::Domain,
        Self::Technical,
        Self::Procedural,
        Self::Default,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Domain => "domain",
            Self::Technical => "technical",
            Self::Procedural => "procedural",
            Self::Default => "default",
        }
    }
}

/// Per-query relevance policy. Distances above the threshold are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelevanceProfile {
    pub kind: ProfileKind,
    pub distance_threshold: f32,
}

impl RelevanceProfile {
    #[must_use]
    pub const fn new(kind: ProfileKind, distance_threshold: f32) -> Self {
        Self {
            kind,
            distance_threshold,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.kind.label()
    }
}

#[derive(Debug, Clone)]
enum QueryPredicate {
    /// Whole query wrapped in double quotes
    Quoted,
    /// Query contains any of the phrases (each pre-split into lowercase words)
    ContainsAny(Vec<Vec<String>>),
}

impl QueryPredicate {
    fn contains_any(words: &[String]) -> Self {
        Self::ContainsAny(
            words
                .iter()
                .map(|w| tokenize(w))
                .filter(|phrase| !phrase.is_empty())
                .collect(),
        )
    }

    fn matches(&self, raw: &str, tokens: &[String]) -> bool {
        match self {
            Self::Quoted => is_quoted(raw),
            Self::ContainsAny(phrases) => phrases
                .iter()
                .any(|phrase| contains_phrase(tokens, phrase)),
        }
    }
}

#[derive(Debug, Clone)]
struct ClassifierRule {
    predicate: QueryPredicate,
    profile: RelevanceProfile,
}

/// Maps query text to a [`RelevanceProfile`].
///
/// Rules are evaluated top to bottom and the first match wins; the default
/// profile applies when none match. Classification looks only at the text,
/// never at its embedding.
#[derive(Debug, Clone)]
pub struct QueryClassifier {
    rules: Vec<ClassifierRule>,
    fallback: RelevanceProfile,
}

impl QueryClassifier {
    #[must_use]
    pub fn new(thresholds: &ProfileThresholds, vocabulary: &Vocabulary) -> Self {
        let rule = |predicate, kind| ClassifierRule {
            predicate,
            profile: RelevanceProfile::new(kind, thresholds.for_kind(kind)),
        };

        let rules = vec![
            rule(QueryPredicate::Quoted, ProfileKind::Strict),
            rule(
                QueryPredicate::contains_any(&vocabulary.domain),
                ProfileKind::Domain,
            ),
            rule(
                QueryPredicate::contains_any(&vocabulary.technical),
                ProfileKind::Technical,
            ),
            rule(
                QueryPredicate::contains_any(&vocabulary.procedural),
                ProfileKind::Procedural,
            ),
        ];

        Self {
            rules,
            fallback: RelevanceProfile::new(ProfileKind::Default, thresholds.default),
        }
    }

    #[must_use]
    pub fn classify(&self, query: &str) -> RelevanceProfile {
        let tokens = tokenize(query);
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(query, &tokens))
            .map_or(self.fallback, |rule| rule.profile)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    tokens.windows(phrase.len()).any(|window| window == phrase)
}

fn is_quoted(query: &str) -> bool {
    let trimmed = query.trim();
    [('"', '"'), ('\u{201C}', '\u{201D}')]
        .iter()
        .any(|&(open, close)| {
            trimmed
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
                .is_some_and(|inner| !inner.trim().is_empty())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> QueryClassifier {
        QueryClassifier::new(&ProfileThresholds::default(), &Vocabulary::default())
    }

    fn kind(query: &str) -> ProfileKind {
        classifier().classify(query).kind
    }

    #[test]
    fn quoted_queries_are_strict() {
        assert_eq!(kind("\"rolling update strategy\""), ProfileKind::Strict);
        assert_eq!(kind("  \u{201C}exact words\u{201D} "), ProfileKind::Strict);
        // Quoting wins even over domain vocabulary.
        assert_eq!(kind("\"kubernetes pod eviction\""), ProfileKind::Strict);
    }

    #[test]
    fn partial_or_empty_quotes_are_not_strict() {
        assert_eq!(kind("\"\""), ProfileKind::Default);
        assert_eq!(kind("the \"best\" approach"), ProfileKind::Default);
        assert_eq!(kind("\"unterminated"), ProfileKind::Default);
    }

    #[test]
    fn domain_vocabulary_is_most_permissive() {
        let profile = classifier().classify("Why does my Kubernetes pod restart?");
        assert_eq!(profile.kind, ProfileKind::Domain);
        assert!(profile.distance_threshold >= ProfileThresholds::default().technical);
    }

    #[test]
    fn first_matching_rule_wins() {
        // "terraform" (domain) and "error" (technical) both match.
        assert_eq!(kind("terraform error on apply"), ProfileKind::Domain);
        // "api" (technical) and "configure" (procedural) both match.
        assert_eq!(kind("configure the api gateway"), ProfileKind::Technical);
    }

    #[test]
    fn procedural_and_default() {
        assert_eq!(kind("how to set up backups"), ProfileKind::Procedural);
        assert_eq!(kind("what is the refund policy"), ProfileKind::Default);
        assert_eq!(kind(""), ProfileKind::Default);
    }

    #[test]
    fn matching_is_on_whole_words() {
        // "apiary" must not match "api"; "steps" is listed, "stepson" is not.
        assert_eq!(kind("apiary maintenance"), ProfileKind::Default);
        assert_eq!(kind("stepson custody"), ProfileKind::Default);
    }

    #[test]
    fn phrases_need_contiguous_words() {
        assert_eq!(kind("read the stack trace"), ProfileKind::Technical);
        let vocab = Vocabulary {
            domain: vec!["active directory".to_string()],
            technical: Vec::new(),
            procedural: Vec::new(),
        };
        let classifier = QueryClassifier::new(&ProfileThresholds::default(), &vocab);
        assert_eq!(
            classifier.classify("Active Directory sync").kind,
            ProfileKind::Domain
        );
        assert_eq!(
            classifier.classify("directory is active").kind,
            ProfileKind::Default
        );
    }

    #[test]
    fn classification_is_deterministic_and_uses_configured_thresholds() {
        let thresholds = ProfileThresholds {
            strict: 0.1,
            domain: 1.2,
            technical: 0.9,
            procedural: 0.8,
            default: 0.5,
        };
        let classifier = QueryClassifier::new(&thresholds, &Vocabulary::default());
        let a = classifier.classify("docker compose networking");
        let b = classifier.classify("docker compose networking");
        assert_eq!(a, b);
        assert!((a.distance_threshold - 1.2).abs() < f32::EPSILON);
        assert_eq!(a.label(), "domain");
    }
}
