//! Data layer configuration.
//!
//! Provides [`DataLayerConfig`], the process-wide tunables shared by every
//! repository: evaluation-cap bounds for the pagination engine, the
//! unknown-operator policy of the compiler, and batch read behavior.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default per-round evaluation cap when the caller does not supply one.
pub const DEFAULT_EVALUATION_LIMIT: usize = 10;
/// Smallest evaluation cap ever sent to the store.
pub const MIN_EVALUATION_LIMIT: usize = 5;
/// Largest caller-supplied evaluation cap accepted before clamping.
pub const MAX_EVALUATION_LIMIT: usize = 500;

/// Data layer configuration.
///
/// # Examples
///
/// ```
/// use dynaquery_core::config::DataLayerConfig;
///
/// let config = DataLayerConfig::default();
/// assert_eq!(config.default_evaluation_limit, 10);
/// assert!(!config.strict_operators);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct DataLayerConfig {
    /// Evaluation cap used when a page size is requested without an explicit cap.
    #[builder(default = DEFAULT_EVALUATION_LIMIT)]
    pub default_evaluation_limit: usize,

    /// Lower clamp for the evaluation cap.
    #[builder(default = MIN_EVALUATION_LIMIT)]
    pub min_evaluation_limit: usize,

    /// Upper clamp for the evaluation cap.
    #[builder(default = MAX_EVALUATION_LIMIT)]
    pub max_evaluation_limit: usize,

    /// Reject unknown operator tags instead of ignoring them.
    #[builder(default = false)]
    pub strict_operators: bool,

    /// Fail with `InvalidCursor` instead of restarting from the beginning
    /// when a cursor token cannot be decoded.
    #[builder(default = false)]
    pub reject_malformed_cursor: bool,

    /// Upper bound on `BatchGetItem` rounds spent re-requesting unprocessed keys.
    #[builder(default = 10)]
    pub batch_get_max_rounds: usize,

    /// Request strongly consistent reads for batch gets.
    #[builder(default = true)]
    pub consistent_batch_reads: bool,
}

impl Default for DataLayerConfig {
    fn default() -> Self {
        Self {
            default_evaluation_limit: DEFAULT_EVALUATION_LIMIT,
            min_evaluation_limit: MIN_EVALUATION_LIMIT,
            max_evaluation_limit: MAX_EVALUATION_LIMIT,
            strict_operators: false,
            reject_malformed_cursor: false,
            batch_get_max_rounds: 10,
            consistent_batch_reads: true,
        }
    }
}

impl DataLayerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DYNAQUERY_DEFAULT_EVALUATION_LIMIT` | `10` |
    /// | `DYNAQUERY_MIN_EVALUATION_LIMIT` | `5` |
    /// | `DYNAQUERY_MAX_EVALUATION_LIMIT` | `500` |
    /// | `DYNAQUERY_STRICT_OPERATORS` | `false` |
    /// | `DYNAQUERY_REJECT_MALFORMED_CURSOR` | `false` |
    /// | `DYNAQUERY_BATCH_GET_MAX_ROUNDS` | `10` |
    /// | `DYNAQUERY_CONSISTENT_BATCH_READS` | `true` |
    ///
    /// Unparseable numbers keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_usize("DYNAQUERY_DEFAULT_EVALUATION_LIMIT") {
            config.default_evaluation_limit = n;
        }
        if let Some(n) = env_usize("DYNAQUERY_MIN_EVALUATION_LIMIT") {
            config.min_evaluation_limit = n;
        }
        if let Some(n) = env_usize("DYNAQUERY_MAX_EVALUATION_LIMIT") {
            config.max_evaluation_limit = n;
        }
        if let Ok(v) = std::env::var("DYNAQUERY_STRICT_OPERATORS") {
            config.strict_operators = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("DYNAQUERY_REJECT_MALFORMED_CURSOR") {
            config.reject_malformed_cursor = parse_bool(&v);
        }
        if let Some(n) = env_usize("DYNAQUERY_BATCH_GET_MAX_ROUNDS") {
            config.batch_get_max_rounds = n;
        }
        if let Ok(v) = std::env::var("DYNAQUERY_CONSISTENT_BATCH_READS") {
            config.consistent_batch_reads = parse_bool(&v);
        }

        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
