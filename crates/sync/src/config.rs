use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serial_engine::{
    MaterializeOptions, DEFAULT_ARCHIVED_REASON, DEFAULT_INITIAL_STATUS, EXTERNAL_NOTE_SOURCE,
};
use std::path::Path;

const MAX_CONCURRENCY: usize = 32;

pub const CONCURRENCY_ENV: &str = "SERIAL_SYNC_CONCURRENCY";
pub const BATCH_SIZE_ENV: &str = "SERIAL_SYNC_BATCH_SIZE";

/// Settings for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Orders fetched and reconciled per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Orders in flight at once within a batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Pause between batches, for upstream rate limits.
    #[serde(default)]
    pub batch_delay_ms: u64,
    /// Re-reads of the mapping after a concurrent write before giving up.
    #[serde(default = "default_max_mapping_retries")]
    pub max_mapping_retries: u32,
    #[serde(default = "default_initial_status")]
    pub initial_status: String,
    #[serde(default = "default_archived_reason")]
    pub archived_reason: String,
    #[serde(default = "default_note_source")]
    pub note_source: String,
}

fn default_batch_size() -> usize {
    25
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_mapping_retries() -> u32 {
    3
}

fn default_initial_status() -> String {
    DEFAULT_INITIAL_STATUS.to_string()
}

fn default_archived_reason() -> String {
    DEFAULT_ARCHIVED_REASON.to_string()
}

fn default_note_source() -> String {
    EXTERNAL_NOTE_SOURCE.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            batch_delay_ms: 0,
            max_mapping_retries: default_max_mapping_retries(),
            initial_status: default_initial_status(),
            archived_reason: default_archived_reason(),
            note_source: default_note_source(),
        }
    }
}

impl SyncConfig {
    /// Reads a JSON or TOML config file, applies environment overrides and
    /// validates the result.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read sync config {}", path.display()))?;
        let config = Self::parse(&bytes)
            .with_context(|| format!("Invalid sync config {}", path.display()))?;
        config.with_env_overrides().validated()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides().validated()
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice(bytes) {
            Ok(config) => Ok(config),
            Err(json_err) => {
                let utf8 =
                    std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
                toml::from_str(utf8).map_err(|toml_err| {
                    anyhow!("Config is not valid JSON ({json_err}) or TOML ({toml_err})")
                })
            }
        }
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        let concurrency = std::env::var(CONCURRENCY_ENV).ok();
        self.max_concurrency = parse_positive(concurrency.as_deref(), self.max_concurrency);
        let batch_size = std::env::var(BATCH_SIZE_ENV).ok();
        self.batch_size = parse_positive(batch_size.as_deref(), self.batch_size);
        self
    }

    pub fn validated(mut self) -> Result<Self> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be > 0"));
        }
        if self.initial_status.trim().is_empty() {
            return Err(anyhow!("initial_status must not be empty"));
        }
        if self.note_source.trim().is_empty() {
            return Err(anyhow!("note_source must not be empty"));
        }
        self.max_concurrency = self.max_concurrency.clamp(1, MAX_CONCURRENCY);
        Ok(self)
    }

    pub fn materialize_options(&self) -> MaterializeOptions {
        MaterializeOptions {
            initial_status: self.initial_status.clone(),
            archived_reason: self.archived_reason.clone(),
        }
    }
}

fn parse_positive(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_json_with_defaults() {
        let config = SyncConfig::parse(br#"{"batch_size": 10}"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.initial_status, DEFAULT_INITIAL_STATUS);
    }

    #[test]
    fn parses_toml() {
        let raw = b"max_concurrency = 8\nbatch_delay_ms = 250\ninitial_status = \"queued\"\n";
        let config = SyncConfig::parse(raw).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.batch_delay_ms, 250);
        assert_eq!(config.initial_status, "queued");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(SyncConfig::parse(br#"{"batch_sise": 10}"#).is_err());
    }

    #[test]
    fn validation_clamps_concurrency() {
        let config = SyncConfig {
            max_concurrency: 0,
            ..SyncConfig::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.max_concurrency, 1);

        let config = SyncConfig {
            max_concurrency: 500,
            ..SyncConfig::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.max_concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn validation_rejects_zero_batch() {
        let config = SyncConfig {
            batch_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn parse_positive_defaults_and_ignores_garbage() {
        assert_eq!(parse_positive(None, 4), 4);
        assert_eq!(parse_positive(Some(""), 4), 4);
        assert_eq!(parse_positive(Some("  "), 4), 4);
        assert_eq!(parse_positive(Some("0"), 4), 4);
        assert_eq!(parse_positive(Some("abc"), 4), 4);
        assert_eq!(parse_positive(Some(" 6 "), 4), 6);
    }
}
