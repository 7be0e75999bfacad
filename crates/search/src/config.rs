use crate::error::{Result, RetrievalError};
use crate::query_classifier::ProfileKind;
use grounding_vector_store::metric::MAX_DISTANCE;
use grounding_vector_store::StoreLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Every tunable of the engine in one immutable value.
///
/// Built once, validated once, and shared by reference with the components
/// that need it.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalConfig {
    /// K2: the most candidates a result may hold.
    pub final_limit: usize,
    /// K1: how many raw candidates are requested from the index.
    pub candidate_limit: usize,
    pub thresholds: ProfileThresholds,
    pub vocabulary: Vocabulary,
    pub context_budget: ContextBudget,
    pub store: StoreLimits,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProfileThresholds {
    pub strict: f32,
    pub domain: f32,
    pub technical: f32,
    pub procedural: f32,
    pub default: f32,
}

impl Default for ProfileThresholds {
    fn default() -> Self {
        Self {
            strict: 0.35,
            domain: 0.85,
            technical: 0.75,
            procedural: 0.70,
            default: 0.60,
        }
    }
}

impl ProfileThresholds {
    #[must_use]
    pub const fn for_kind(&self, kind: ProfileKind) -> f32 {
        match kind {
            ProfileKind::Strict => self.strict,
            ProfileKind::Domain => self.domain,
            ProfileKind::Technical => self.technical,
            ProfileKind::Procedural => self.procedural,
            ProfileKind::Default => self.default,
        }
    }
}

/// Word lists consulted by the query classifier. Entries may be phrases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Vocabulary {
    pub domain: Vec<String>,
    pub technical: Vec<String>,
    pub procedural: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        fn owned(words: &[&str]) -> Vec<String> {
            words.iter().map(|w| (*w).to_string()).collect()
        }

        Self {
            domain: owned(&[
                "kubernetes", "k8s", "kubectl", "helm", "openshift", "terraform", "ansible",
                "docker", "aws", "azure", "gcp", "lambda", "s3", "ec2", "iam", "vpc",
                "active directory", "sharepoint", "salesforce", "sap",
            ]),
            technical: owned(&[
                "api", "function", "method", "class", "code", "error", "exception",
                "stack trace", "compile", "debug", "library", "sdk", "database", "query",
                "script", "regex", "json", "yaml", "http", "endpoint",
            ]),
            procedural: owned(&[
                "configure", "configuration", "config", "setup", "set up", "install",
                "enable", "disable", "settings", "step", "steps", "how to", "deploy",
                "upgrade", "migrate", "troubleshoot",
            ]),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    Chars,
    Tokens,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ContextBudget {
    pub unit: BudgetUnit,
    pub limit: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            unit: BudgetUnit::Chars,
            limit: 6_000,
        }
    }
}

const DEFAULT_FINAL_LIMIT: usize = 12;
const DEFAULT_CANDIDATE_MULTIPLIER: f32 = 2.5;

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: DEFAULT_FINAL_LIMIT,
            candidate_limit: candidate_limit_for(DEFAULT_FINAL_LIMIT, DEFAULT_CANDIDATE_MULTIPLIER),
            thresholds: ProfileThresholds::default(),
            vocabulary: Vocabulary::default(),
            context_budget: ContextBudget::default(),
            store: StoreLimits::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    #[serde(default)]
    retrieval: RawRetrieval,
    #[serde(default)]
    profiles: RawProfiles,
    #[serde(default)]
    vocabulary: RawVocabulary,
    #[serde(default)]
    context_budget: RawContextBudget,
    #[serde(default)]
    store: RawStore,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawRetrieval {
    final_limit: Option<usize>,
    candidate_multiplier: Option<f32>,
    candidate_limit: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawProfiles {
    strict: Option<RawProfile>,
    domain: Option<RawProfile>,
    technical: Option<RawProfile>,
    procedural: Option<RawProfile>,
    default: Option<RawProfile>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
struct RawProfile {
    distance_threshold: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RawVocabulary {
    domain: Option<Vec<String>>,
    technical: Option<Vec<String>>,
    procedural: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
struct RawContextBudget {
    unit: Option<BudgetUnit>,
    limit: Option<usize>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
struct RawStore {
    pool_size: Option<usize>,
    acquire_timeout_ms: Option<u64>,
    max_concurrent_scans: Option<usize>,
}

impl RetrievalConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            RetrievalError::configuration(format!(
                "Failed to read config file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Parses JSON, falling back to TOML, then validates.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw = parse_raw(bytes)?;
        Self::from_raw(raw)
    }

    /// Checks cross-field constraints. Called by every constructor path and
    /// again by the engine, so hand-built configs are held to the same rules.
    pub fn validate(&self) -> Result<()> {
        if self.final_limit == 0 {
            return Err(RetrievalError::configuration(
                "retrieval.final_limit must be >= 1",
            ));
        }
        if self.candidate_limit < self.final_limit {
            return Err(RetrievalError::configuration(format!(
                "retrieval.candidate_limit ({}) must be >= retrieval.final_limit ({})",
                self.candidate_limit, self.final_limit
            )));
        }

        for kind in ProfileKind::ALL {
            let value = self.thresholds.for_kind(kind);
            if !value.is_finite() || !(0.0..=MAX_DISTANCE).contains(&value) {
                return Err(RetrievalError::configuration(format!(
                    "profiles.{}.distance_threshold must be within [0, {MAX_DISTANCE}] (got {value})",
                    kind.label()
                )));
            }
        }
        let t = &self.thresholds;
        if t.strict > t.default || t.default > t.domain {
            return Err(RetrievalError::configuration(format!(
                "profile thresholds must satisfy strict <= default <= domain (got {} / {} / {})",
                t.strict, t.default, t.domain
            )));
        }

        for (name, words) in [
            ("domain", &self.vocabulary.domain),
            ("technical", &self.vocabulary.technical),
            ("procedural", &self.vocabulary.procedural),
        ] {
            if let Some(idx) = words.iter().position(|w| w.trim().is_empty()) {
                return Err(RetrievalError::configuration(format!(
                    "vocabulary.{name}[{idx}] must not be empty"
                )));
            }
        }

        if self.context_budget.limit == 0 {
            return Err(RetrievalError::configuration(
                "context_budget.limit must be >= 1",
            ));
        }
        if self.store.pool_size == 0 {
            return Err(RetrievalError::configuration("store.pool_size must be >= 1"));
        }
        if self.store.max_concurrent_scans == 0 {
            return Err(RetrievalError::configuration(
                "store.max_concurrent_scans must be >= 1",
            ));
        }
        if self.store.acquire_timeout.is_zero() {
            return Err(RetrievalError::configuration(
                "store.acquire_timeout_ms must be >= 1",
            ));
        }
        Ok(())
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        if let Some(schema_version) = raw.schema_version {
            if schema_version != CONFIG_SCHEMA_VERSION {
                return Err(RetrievalError::configuration(format!(
                    "schema_version {schema_version} is not supported (expected {CONFIG_SCHEMA_VERSION})"
                )));
            }
        }

        let defaults = Self::default();

        let final_limit = raw.retrieval.final_limit.unwrap_or(defaults.final_limit);
        let candidate_limit = match raw.retrieval.candidate_limit {
            Some(explicit) => explicit,
            None => {
                let multiplier = raw
                    .retrieval
                    .candidate_multiplier
                    .unwrap_or(DEFAULT_CANDIDATE_MULTIPLIER);
                if !multiplier.is_finite() || multiplier < 1.0 {
                    return Err(RetrievalError::configuration(format!(
                        "retrieval.candidate_multiplier must be >= 1.0 (got {multiplier})"
                    )));
                }
                candidate_limit_for(final_limit, multiplier)
            }
        };

        let threshold = |raw: Option<RawProfile>, fallback: f32| {
            raw.and_then(|p| p.distance_threshold).unwrap_or(fallback)
        };
        let thresholds = ProfileThresholds {
            strict: threshold(raw.profiles.strict, defaults.thresholds.strict),
            domain: threshold(raw.profiles.domain, defaults.thresholds.domain),
            technical: threshold(raw.profiles.technical, defaults.thresholds.technical),
            procedural: threshold(raw.profiles.procedural, defaults.thresholds.procedural),
            default: threshold(raw.profiles.default, defaults.thresholds.default),
        };

        let vocabulary = Vocabulary {
            domain: raw.vocabulary.domain.unwrap_or(defaults.vocabulary.domain),
            technical: raw.vocabulary.technical.unwrap_or(defaults.vocabulary.technical),
            procedural: raw.vocabulary.procedural.unwrap_or(defaults.vocabulary.procedural),
        };

        let context_budget = ContextBudget {
            unit: raw.context_budget.unit.unwrap_or(defaults.context_budget.unit),
            limit: raw.context_budget.limit.unwrap_or(defaults.context_budget.limit),
        };

        let store = StoreLimits {
            pool_size: raw.store.pool_size.unwrap_or(defaults.store.pool_size),
            acquire_timeout: raw
                .store
                .acquire_timeout_ms
                .map_or(defaults.store.acquire_timeout, Duration::from_millis),
            max_concurrent_scans: raw
                .store
                .max_concurrent_scans
                .unwrap_or(defaults.store.max_concurrent_scans),
        };

        let config = Self {
            final_limit,
            candidate_limit,
            thresholds,
            vocabulary,
            context_budget,
            store,
        };
        config.validate()?;
        Ok(config)
    }
}

fn candidate_limit_for(final_limit: usize, multiplier: f32) -> usize {
    let scaled = (final_limit as f64 * f64::from(multiplier)).ceil();
    if scaled >= usize::MAX as f64 {
        usize::MAX
    } else {
        (scaled as usize).max(final_limit)
    }
}

fn parse_raw(bytes: &[u8]) -> Result<RawConfig> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes).map_err(|err| {
                RetrievalError::configuration(format!("{json_err}; {err}"))
            })?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                RetrievalError::configuration(format!(
                    "Config is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}"
                ))
            })?;
            serde_json::to_value(toml_value).map_err(|err| {
                RetrievalError::configuration(format!("Failed to convert TOML config to JSON: {err}"))
            })?
        }
    };

    validate_config_value(&value)?;
    serde_json::from_value(value)
        .map_err(|err| RetrievalError::configuration(format!("Config parse error: {err}")))
}

/// Rejects unknown keys, reporting each by its dotted path.
fn validate_config_value(value: &serde_json::Value) -> Result<()> {
    fn validate_object_keys(
        unknown: &mut Vec<String>,
        obj: &serde_json::Map<String, serde_json::Value>,
        base: &str,
        allowed: &[&str],
    ) {
        for key in obj.keys() {
            if !allowed.iter().any(|a| a == &key.as_str()) {
                if base.is_empty() {
                    unknown.push(key.clone());
                } else {
                    unknown.push(format!("{base}.{key}"));
                }
            }
        }
    }

    let serde_json::Value::Object(root) = value else {
        return Err(RetrievalError::configuration("Config must be an object"));
    };

    let mut unknown = Vec::new();
    validate_object_keys(
        &mut unknown,
        root,
        "",
        &[
            "schema_version",
            "retrieval",
            "profiles",
            "vocabulary",
            "context_budget",
            "store",
        ],
    );

    let sections: [(&str, &[&str]); 5] = [
        (
            "retrieval",
            &["final_limit", "candidate_multiplier", "candidate_limit"],
        ),
        ("profiles", &["strict", "domain", "technical", "procedural", "default"]),
        ("vocabulary", &["domain", "technical", "procedural"]),
        ("context_budget", &["unit", "limit"]),
        (
            "store",
            &["pool_size", "acquire_timeout_ms", "max_concurrent_scans"],
        ),
    ];
    for (section, allowed) in sections {
        if let Some(serde_json::Value::Object(obj)) = root.get(section) {
            validate_object_keys(&mut unknown, obj, section, allowed);
        }
    }

    if let Some(serde_json::Value::Object(profiles)) = root.get("profiles") {
        for (name, profile) in profiles {
            if let serde_json::Value::Object(obj) = profile {
                validate_object_keys(
                    &mut unknown,
                    obj,
                    &format!("profiles.{name}"),
                    &["distance_threshold"],
                );
            }
        }
    }

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(RetrievalError::configuration(format!(
            "Unknown config keys: {}",
            unknown.join(", ")
        )))
    }
}
