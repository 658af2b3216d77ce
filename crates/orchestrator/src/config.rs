use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use huggnote_core::prompt::MAX_PROMPT_CHARS;

/// Delays and ceilings of the generation workflow.
///
/// Production values come from [`OrchestratorConfig::from_env`]; tests
/// build this directly with short durations and paused time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Wait before the single retry of a failed variation request.
    pub request_backoff: Duration,
    /// Gap between consecutive variation requests of one song.
    pub request_pacing: Duration,
    /// Interval between completion polls.
    pub poll_interval: Duration,
    /// Wall-clock ceiling for one song's completion watch.
    pub watch_timeout: Duration,
    /// Prompts longer than this are truncated before submission.
    pub max_prompt_chars: usize,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            request_backoff: Duration::from_secs(5),
            request_pacing: Duration::from_secs(5),
            poll_interval: Duration::from_secs(15),
            watch_timeout: Duration::from_secs(300),
            max_prompt_chars: MAX_PROMPT_CHARS,
        }
    }
}

/// Orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL of the order record service, including `/api/v1`.
    pub record_api_url: String,
    pub prompt_api_url: String,
    pub music_api_url: String,
    pub music_api_key: Option<String>,
    pub payment_api_url: String,
    /// Directory holding the local mirror of order records.
    pub local_store_dir: PathBuf,
    /// Signed-in user to associate orders with, if any.
    pub user_id: Option<String>,
    pub timings: Timings,
}

/// A configuration variable that is present but unparseable.
#[derive(Debug, thiserror::Error)]
#[error("{key} has invalid value '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                        |
    /// |------------------------|--------------------------------|
    /// | `RECORD_API_URL`       | `http://localhost:3000/api/v1` |
    /// | `PROMPT_API_URL`       | `http://localhost:4000`        |
    /// | `MUSIC_API_URL`        | `http://localhost:4100`        |
    /// | `MUSIC_API_KEY`        | unset                          |
    /// | `PAYMENT_API_URL`      | `http://localhost:4200`        |
    /// | `LOCAL_STORE_DIR`      | `./.huggnote`                  |
    /// | `HUGGNOTE_USER_ID`     | unset                          |
    /// | `REQUEST_BACKOFF_SECS` | `5`                            |
    /// | `REQUEST_PACING_SECS`  | `5`                            |
    /// | `POLL_INTERVAL_SECS`   | `15`                           |
    /// | `WATCH_TIMEOUT_SECS`   | `300`                          |
    /// | `MAX_PROMPT_CHARS`     | `280`                          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = |key: &str, default: &str| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let timings = Timings {
            request_backoff: Duration::from_secs(parse_or(&lookup, "REQUEST_BACKOFF_SECS", 5)?),
            request_pacing: Duration::from_secs(parse_or(&lookup, "REQUEST_PACING_SECS", 5)?),
            poll_interval: Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 15)?),
            watch_timeout: Duration::from_secs(parse_or(&lookup, "WATCH_TIMEOUT_SECS", 300)?),
            max_prompt_chars: parse_or(&lookup, "MAX_PROMPT_CHARS", MAX_PROMPT_CHARS)?,
        };

        Ok(Self {
            record_api_url: url("RECORD_API_URL", "http://localhost:3000/api/v1"),
            prompt_api_url: url("PROMPT_API_URL", "http://localhost:4000"),
            music_api_url: url("MUSIC_API_URL", "http://localhost:4100"),
            music_api_key: lookup("MUSIC_API_KEY").filter(|s| !s.is_empty()),
            payment_api_url: url("PAYMENT_API_URL", "http://localhost:4200"),
            local_store_dir: PathBuf::from(url("LOCAL_STORE_DIR", "./.huggnote")),
            user_id: lookup("HUGGNOTE_USER_ID").filter(|s| !s.is_empty()),
            timings,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
    }
}
