//! Logging setup shared by the fsweep binaries.
//!
//! Builds a `tracing-subscriber` registry with an env filter, a stderr layer
//! (text or JSON) and an optional non-blocking JSON file layer.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, fmt};

/// Environment variable holding a full filter directive (`fsweep=debug,info`).
pub const LOG_FILTER_ENV: &str = "FSWEEP_LOG";
/// Environment variable selecting `text` or `json` output.
pub const LOG_FORMAT_ENV: &str = "FSWEEP_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("global subscriber already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "human" => Some(Self::Text),
            "json" | "jsonl" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration assembled from the environment and CLI flags.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    /// Explicit filter directive; overrides `level` when set.
    pub filter: Option<String>,
    pub format: LogFormat,
    pub stderr: bool,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Start from `default_level`, honouring `FSWEEP_LOG` and `FSWEEP_LOG_FORMAT`.
    pub fn from_env(default_level: &str) -> Self {
        let filter = std::env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();

        Self {
            level: default_level.to_string(),
            filter,
            format,
            stderr: false,
            file: None,
        }
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    /// Raise or lower the level. An explicit `FSWEEP_LOG` filter still wins.
    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    fn directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => format!("{level},fsweep={level},fsweep_common={level}", level = self.level),
        }
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let directive = config.directive();
    let filter = EnvFilter::try_new(&directive).map_err(|source| LoggingError::Filter {
        directive: directive.clone(),
        source,
    })?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guards = Vec::new();

    if config.stderr {
        let layer = match config.format {
            LogFormat::Text => fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .boxed(),
        };
        layers.push(layer);
    }

    if let Some(path) = &config.file {
        let (dir, name) = split_log_path(path);
        std::fs::create_dir_all(&dir).map_err(|source| LoggingError::LogDir {
            path: dir.clone(),
            source,
        })?;
        let appender = tracing_appender::rolling::never(&dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(LoggingGuards { _guards: guards })
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fsweep.log".to_string());
    (dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_directive_uses_level_without_filter() {
        let config = LogConfig {
            level: "debug".to_string(),
            filter: None,
            format: LogFormat::Text,
            stderr: true,
            file: None,
        };
        assert_eq!(config.directive(), "debug,fsweep=debug,fsweep_common=debug");
    }

    #[test]
    fn test_explicit_filter_wins_over_level() {
        let config = LogConfig {
            level: "info".to_string(),
            filter: Some("fsweep::luks=trace".to_string()),
            format: LogFormat::Text,
            stderr: true,
            file: None,
        }
        .with_level("debug");
        assert_eq!(config.directive(), "fsweep::luks=trace");
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("/var/log/fsweep/run.jsonl"));
        assert_eq!(dir, PathBuf::from("/var/log/fsweep"));
        assert_eq!(name, "run.jsonl");

        let (dir, name) = split_log_path(Path::new("run.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "run.log");
    }
}
