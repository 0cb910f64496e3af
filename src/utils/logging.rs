//! Logging initialization for Plugwarden.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; use the [`log_component!`] macro to
//!   add a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines, optionally appended to a file

use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, WardenError};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` wins over `cfg.level` when set.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let installed = match cfg.format {
        LogFormat::Json => match &cfg.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .try_init()
            }
            None => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .try_init(),
        },
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Component => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init(),
    };

    installed.map_err(|e| WardenError::Config(format!("failed to initialize logging: {}", e)))
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`):
///
/// ```
/// # use plugwarden::log_component;
/// log_component!(info, "manager", "plugin manager ready");
/// log_component!(warn, "monitor", "heartbeat stale", elapsed_ms = 31000u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_log_format_deserialize_json() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn test_log_format_partial_config_uses_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"trace"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Component);
        assert!(cfg.file.is_none());
        assert_eq!(cfg.level, "trace");
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_component_macro_expands() {
        crate::log_component!(debug, "registry", "no subscriber installed");
        crate::log_component!(debug, "registry", "with fields", plugins = 3u64);
    }

    #[test]
    fn test_unwritable_log_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            level: "info".to_string(),
            file: Some(dir.path().join("missing").join("log.jsonl").display().to_string()),
        };
        assert!(super::init_logging(&cfg).is_err());
    }
}
