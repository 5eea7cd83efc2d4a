use std::str::FromStr;
use std::time::Duration;

use tailor_query::{Fuzziness, WeightConfig, WeightError};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: {value:?} is not one of {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error(transparent)]
    Weights(#[from] WeightError),
}

/// When a search is written to history relative to the index call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordPolicy {
    /// Only searches that reached the index and came back are recorded.
    #[default]
    OnSuccess,
    /// Record first, before signals are computed. The fresh entry is left out
    /// of its own term signals, and a failed search still leaves a trace.
    Eager,
}

impl FromStr for RecordPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_success" | "after" => Ok(RecordPolicy::OnSuccess),
            "eager" | "before" => Ok(RecordPolicy::Eager),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBackend {
    Postgres,
    Memory,
}

impl FromStr for HistoryBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(HistoryBackend::Postgres),
            "memory" | "mem" => Ok(HistoryBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Knobs of the personalization pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalizationConfig {
    pub page_size: u32,
    pub history_page_size: u32,
    /// How many top clicked categories become boosts.
    pub category_limit: usize,
    /// Most recent history entries considered for term signals.
    pub term_lookback: usize,
    pub term_limit: usize,
    pub recommend_categories: usize,
    pub weights: WeightConfig,
    pub fuzziness: Fuzziness,
    pub record_policy: RecordPolicy,
    pub store_timeout: Duration,
    pub index_timeout: Duration,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            history_page_size: 10,
            category_limit: 3,
            term_lookback: 20,
            term_limit: 5,
            recommend_categories: 3,
            weights: WeightConfig::default(),
            fuzziness: Fuzziness::Auto,
            record_policy: RecordPolicy::OnSuccess,
            store_timeout: Duration::from_millis(2000),
            index_timeout: Duration::from_millis(5000),
        }
    }
}

impl PersonalizationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let w = d.weights;
        let cfg = Self {
            page_size: parse_or(&lookup, "TAILOR_PAGE_SIZE", d.page_size),
            history_page_size: parse_or(&lookup, "TAILOR_HISTORY_PAGE_SIZE", d.history_page_size),
            category_limit: parse_or(&lookup, "TAILOR_CATEGORY_LIMIT", d.category_limit),
            term_lookback: parse_or(&lookup, "TAILOR_TERM_LOOKBACK", d.term_lookback),
            term_limit: parse_or(&lookup, "TAILOR_TERM_LIMIT", d.term_limit),
            recommend_categories: parse_or(
                &lookup,
                "TAILOR_RECOMMEND_CATEGORIES",
                d.recommend_categories,
            ),
            weights: WeightConfig {
                base_click: parse_or(&lookup, "TAILOR_WEIGHT_BASE_CLICK", w.base_click),
                increment_click: parse_or(&lookup, "TAILOR_WEIGHT_INCREMENT_CLICK", w.increment_click),
                base_term: parse_or(&lookup, "TAILOR_WEIGHT_BASE_TERM", w.base_term),
                increment_term: parse_or(&lookup, "TAILOR_WEIGHT_INCREMENT_TERM", w.increment_term),
                cap: lookup("TAILOR_WEIGHT_CAP").and_then(|s| s.trim().parse().ok()),
            },
            fuzziness: parse_named(&lookup, "TAILOR_FUZZINESS", "auto, 0, 1, 2", d.fuzziness)?,
            record_policy: parse_named(
                &lookup,
                "TAILOR_RECORD_HISTORY",
                "on_success, eager",
                d.record_policy,
            )?,
            store_timeout: Duration::from_millis(parse_or(
                &lookup,
                "TAILOR_STORE_TIMEOUT_MS",
                2000u64,
            )),
            index_timeout: Duration::from_millis(parse_or(
                &lookup,
                "TAILOR_INDEX_TIMEOUT_MS",
                5000u64,
            )),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Zero("TAILOR_PAGE_SIZE"));
        }
        if self.history_page_size == 0 {
            return Err(ConfigError::Zero("TAILOR_HISTORY_PAGE_SIZE"));
        }
        self.weights.validate()?;
        Ok(())
    }
}

/// Process-level settings for the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: String,
    /// On-disk tantivy index; `None` keeps the index in memory.
    pub index_dir: Option<String>,
    pub index_engine: String,
    pub history_backend: HistoryBackend,
    /// Handles created at startup when missing. The credential layer that
    /// normally registers users lives outside this service.
    pub seed_users: Vec<String>,
}

impl ServerConfig {
    /// - TAILOR_ADDR (default 127.0.0.1:5001)
    /// - TAILOR_INDEX_DIR (optional)
    /// - TAILOR_INDEX_ENGINE (tantivy | noop, default tantivy)
    /// - TAILOR_HISTORY_BACKEND (postgres | memory; default postgres when
    ///   DATABASE_URL is set, memory otherwise)
    /// - TAILOR_SEED_USERS (comma separated handles)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let default_backend = if non_empty("DATABASE_URL").is_some() {
            HistoryBackend::Postgres
        } else {
            HistoryBackend::Memory
        };
        let index_engine = non_empty("TAILOR_INDEX_ENGINE")
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "tantivy".to_string());
        if !matches!(index_engine.as_str(), "tantivy" | "noop") {
            return Err(ConfigError::Invalid {
                key: "TAILOR_INDEX_ENGINE",
                value: index_engine,
                expected: "tantivy, noop",
            });
        }
        Ok(Self {
            addr: non_empty("TAILOR_ADDR").unwrap_or_else(|| "127.0.0.1:5001".to_string()),
            index_dir: non_empty("TAILOR_INDEX_DIR").map(|s| s.trim().to_string()),
            index_engine,
            history_backend: parse_named(
                &lookup,
                "TAILOR_HISTORY_BACKEND",
                "postgres, memory",
                default_backend,
            )?,
            seed_users: lookup("TAILOR_SEED_USERS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Like `parse_or`, but a present value that names nothing known is an error.
fn parse_named<F, T>(
    lookup: &F,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|s| !s.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            expected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PersonalizationConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(cfg, PersonalizationConfig::default());
        assert_eq!(cfg.weights.base_click, 1.0);
        assert_eq!(cfg.weights.increment_term, 0.2);
        assert_eq!(cfg.weights.cap, None);
        assert_eq!(cfg.record_policy, RecordPolicy::OnSuccess);
    }

    #[test]
    fn overrides_and_fallbacks() {
        let cfg = PersonalizationConfig::from_lookup(env(&[
            ("TAILOR_PAGE_SIZE", "25"),
            ("TAILOR_TERM_LOOKBACK", "not-a-number"),
            ("TAILOR_FUZZINESS", "1"),
            ("TAILOR_RECORD_HISTORY", "eager"),
            ("TAILOR_WEIGHT_CAP", "4.5"),
        ]))
        .unwrap();
        assert_eq!(cfg.page_size, 25);
        assert_eq!(cfg.term_lookback, 20);
        assert_eq!(cfg.fuzziness, Fuzziness::Fixed(1));
        assert_eq!(cfg.record_policy, RecordPolicy::Eager);
        assert_eq!(cfg.weights.cap, Some(4.5));
    }

    #[test]
    fn invalid_values_abort() {
        assert_eq!(
            PersonalizationConfig::from_lookup(env(&[("TAILOR_PAGE_SIZE", "0")])),
            Err(ConfigError::Zero("TAILOR_PAGE_SIZE"))
        );
        assert!(matches!(
            PersonalizationConfig::from_lookup(env(&[("TAILOR_RECORD_HISTORY", "sometimes")])),
            Err(ConfigError::Invalid { key: "TAILOR_RECORD_HISTORY", .. })
        ));
        assert!(matches!(
            PersonalizationConfig::from_lookup(env(&[("TAILOR_WEIGHT_INCREMENT_CLICK", "0")])),
            Err(ConfigError::Weights(_))
        ));
        assert!(matches!(
            PersonalizationConfig::from_lookup(env(&[("TAILOR_WEIGHT_CAP", "0.1")])),
            Err(ConfigError::Weights(_))
        ));
    }

    #[test]
    fn server_backend_follows_database_url() {
        let cfg = ServerConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(cfg.history_backend, HistoryBackend::Memory);
        assert_eq!(cfg.addr, "127.0.0.1:5001");
        assert_eq!(cfg.index_engine, "tantivy");

        let cfg = ServerConfig::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/tailor"),
            ("TAILOR_SEED_USERS", " ana, ,bo "),
        ]))
        .unwrap();
        assert_eq!(cfg.history_backend, HistoryBackend::Postgres);
        assert_eq!(cfg.seed_users, vec!["ana".to_string(), "bo".to_string()]);

        assert!(ServerConfig::from_lookup(env(&[("TAILOR_INDEX_ENGINE", "lucene")])).is_err());
    }
}
