use std::path::PathBuf;
use std::time::Duration;

use crate::error::WorkerError;

const DEFAULT_RENDER_COMMAND: &str = "magick";
const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 120;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: Option<&str>) -> Result<Self, WorkerError> {
        match value.map(str::trim) {
            None | Some("") | Some("text") => Ok(Self::Text),
            Some("json") => Ok(Self::Json),
            Some(other) => Err(WorkerError::Config(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{other}'"
            ))),
        }
    }

    /// `LOG_FORMAT` alone, read before the rest of the configuration.
    /// Invalid values fall back to text.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_FORMAT").ok().as_deref()).unwrap_or(Self::Text)
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// JSON batch describing series, episodes, templates and destinations.
    pub batch_file: PathBuf,
    /// Raster command invoked once per card (default: `magick`).
    pub render_command: String,
    /// Upper bound on one renderer invocation (default: 120 seconds).
    pub render_timeout: Duration,
    /// Episodes reconciled at the same time (default: `4`).
    pub max_concurrency: usize,
    /// Redeliver to every destination regardless of recorded size.
    pub force_redelivery: bool,
    /// Plan only: nothing is rendered, deleted or delivered.
    pub dry_run: bool,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default  |
    /// |-----------------------------|----------|
    /// | `CARDSYNC_BATCH_FILE`       | required |
    /// | `CARDSYNC_RENDER_COMMAND`   | `magick` |
    /// | `CARDSYNC_RENDER_TIMEOUT`   | `120`    |
    /// | `CARDSYNC_MAX_CONCURRENCY`  | `4`      |
    /// | `CARDSYNC_FORCE_REDELIVERY` | `false`  |
    /// | `CARDSYNC_DRY_RUN`          | `false`  |
    /// | `LOG_FORMAT`                | `text`   |
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkerConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let batch_file = lookup("CARDSYNC_BATCH_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                WorkerError::Config("CARDSYNC_BATCH_FILE environment variable is required".into())
            })?;

        let render_command = lookup("CARDSYNC_RENDER_COMMAND")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RENDER_COMMAND.into());

        let max_concurrency = match lookup("CARDSYNC_MAX_CONCURRENCY") {
            None => DEFAULT_MAX_CONCURRENCY,
            Some(v) => v
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    WorkerError::Config(format!(
                        "CARDSYNC_MAX_CONCURRENCY must be a positive integer, got '{v}'"
                    ))
                })?,
        };

        let render_timeout = match lookup("CARDSYNC_RENDER_TIMEOUT") {
            None => Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
            Some(v) => v
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    WorkerError::Config(format!(
                        "CARDSYNC_RENDER_TIMEOUT must be a positive number of seconds, got '{v}'"
                    ))
                })?,
        };

        let log_format = LogFormat::parse(lookup("LOG_FORMAT").as_deref())?;

        Ok(Self {
            batch_file,
            render_command,
            render_timeout,
            max_concurrency,
            force_redelivery: parse_flag(&lookup, "CARDSYNC_FORCE_REDELIVERY")?,
            dry_run: parse_flag(&lookup, "CARDSYNC_DRY_RUN")?,
            log_format,
        })
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, WorkerError> {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(WorkerError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, WorkerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("CARDSYNC_BATCH_FILE", "batch.json")]).unwrap();
        assert_eq!(config.batch_file, PathBuf::from("batch.json"));
        assert_eq!(config.render_command, "magick");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.render_timeout, Duration::from_secs(120));
        assert!(!config.force_redelivery);
        assert!(!config.dry_run);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn batch_file_is_required() {
        assert_matches!(load(&[]), Err(WorkerError::Config(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("CARDSYNC_BATCH_FILE", "b.json"),
            ("CARDSYNC_RENDER_COMMAND", "/usr/bin/convert"),
            ("CARDSYNC_MAX_CONCURRENCY", "8"),
            ("CARDSYNC_RENDER_TIMEOUT", "30"),
            ("CARDSYNC_FORCE_REDELIVERY", "TRUE"),
            ("CARDSYNC_DRY_RUN", "1"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.render_command, "/usr/bin/convert");
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.render_timeout, Duration::from_secs(30));
        assert!(config.force_redelivery);
        assert!(config.dry_run);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = ("CARDSYNC_BATCH_FILE", "b.json");
        assert_matches!(
            load(&[base, ("CARDSYNC_MAX_CONCURRENCY", "0")]),
            Err(WorkerError::Config(_))
        );
        assert_matches!(
            load(&[base, ("CARDSYNC_RENDER_TIMEOUT", "0")]),
            Err(WorkerError::Config(_))
        );
        assert_matches!(
            load(&[base, ("CARDSYNC_RENDER_TIMEOUT", "soon")]),
            Err(WorkerError::Config(_))
        );
        assert_matches!(
            load(&[base, ("CARDSYNC_DRY_RUN", "maybe")]),
            Err(WorkerError::Config(_))
        );
        assert_matches!(load(&[base, ("LOG_FORMAT", "xml")]), Err(WorkerError::Config(_)));
    }
}
