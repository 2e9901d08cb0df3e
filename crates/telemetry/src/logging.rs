//! Logging setup shared by the gate binaries.
//!
//! Environment:
//!   RUST_LOG       filter directives (default `info`)
//!   LOG_FORMAT     pretty | compact | json
//!   LOG_DIR        when set, also write a daily rolling file there
//!   PLATE_GATE_ID  control point name attached to the startup line

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "plate-gate.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line, for log shippers
    Json,
}

impl LogFormat {
    /// Unknown values fall back to pretty output
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub service_name: String,
    pub format: LogFormat,
    /// Control point this process serves
    pub gate_id: Option<String>,
    /// Directory for the rolling log file, if any
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    /// Defaults taken from the process environment
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::from_lookup(service_name, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(service_name: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            service_name: service_name.into(),
            format: LogFormat::parse(&lookup("LOG_FORMAT").unwrap_or_default()),
            gate_id: lookup("PLATE_GATE_ID").filter(|v| !v.trim().is_empty()),
            log_dir: lookup("LOG_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_gate_id(mut self, gate_id: impl Into<String>) -> Self {
        self.gate_id = Some(gate_id.into());
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

fn env_filter() -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // ONNX Runtime is chatty at info
    if let Ok(directive) = "ort=warn".parse() {
        filter = filter.add_directive(directive);
    }
    filter
}

fn stdout_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_line_number(true).boxed(),
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit when a log directory is set;
/// dropping it flushes the file writer. Returns `None` when a subscriber was
/// already installed (tests) or no file output was requested.
pub fn init_structured_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match config.log_dir.as_ref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer(config.format))
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        return None;
    }

    tracing::info!(
        service = %config.service_name,
        gate_id = ?config.gate_id,
        format = ?config.format,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );
    guard
}

/// Install logging configured from the environment for `service_name`
pub fn init_with_service(service_name: impl Into<String>) -> Option<WorkerGuard> {
    init_structured_logging(LogConfig::new(service_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Pretty);
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("LOG_FORMAT", "json"),
            ("PLATE_GATE_ID", "gate-north"),
            ("LOG_DIR", ""),
        ]
        .into_iter()
        .collect();
        let config =
            LogConfig::from_lookup("plate-detect", |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.service_name, "plate-detect");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.gate_id.as_deref(), Some("gate-north"));
        // Blank directory means no file output
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let config = LogConfig::from_lookup("svc", |_| None)
            .with_format(LogFormat::Compact)
            .with_gate_id("gate-south")
            .with_log_dir("/var/log/plate-gate");

        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.gate_id.as_deref(), Some("gate-south"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/plate-gate")));
    }

    #[test]
    fn test_second_init_is_harmless() {
        let dir = std::env::temp_dir();
        let _ = init_structured_logging(LogConfig::from_lookup("first", |_| None));
        assert!(
            init_structured_logging(LogConfig::from_lookup("second", |_| None).with_log_dir(dir))
                .is_none()
        );
    }
}
