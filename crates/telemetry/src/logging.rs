use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse log format from environment variable
    pub fn from_env() -> Self {
        Self::parse(&env::var("LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::default(),
        }
    }
}

/// Configuration for structured logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log output format (pretty/compact/json)
    pub format: LogFormat,
    /// Service name (e.g., "lpr-service")
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Node ID when several pipeline instances share a log sink
    pub node_id: Option<String>,
    /// Environment (dev/staging/production)
    pub environment: String,
    /// Enable span events (enter/exit/close)
    pub enable_span_events: bool,
    /// Log to file in addition to stdout
    pub log_to_file: bool,
    /// Log file directory
    pub log_dir: Option<String>,
}

impl LogConfig {
    /// Create a new log configuration from the environment
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            format: LogFormat::from_env(),
            service_name: service_name.into(),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            node_id: env::var("NODE_ID").ok(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            enable_span_events: env_flag("LOG_SPAN_EVENTS"),
            log_to_file: env_flag("LOG_TO_FILE"),
            log_dir: env::var("LOG_DIR").ok(),
        }
    }

    /// Override the node id, e.g. with one generated by the service config
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn file_name(&self) -> String {
        format!("{}.log", self.service_name)
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

fn env_filter() -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    ["hyper=warn", "tower_http=info", "tokio=warn"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

/// Keeps the background file writer alive; drop it only at process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize structured logging with the given configuration
pub fn init_structured_logging(config: LogConfig) -> LoggingGuard {
    let registry = tracing_subscriber::registry().with(env_filter());
    let span_events = config.span_events();
    let mut file_guard = None;

    match config.format {
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_span_events(span_events.clone())
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_writer(io::stdout);

            match config.log_dir.as_deref().filter(|_| config.log_to_file) {
                Some(log_dir) => {
                    let file_appender =
                        tracing_appender::rolling::daily(log_dir, config.file_name());
                    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                    file_guard = Some(guard);

                    let file_layer = fmt::layer()
                        .json()
                        .with_span_events(span_events)
                        .with_writer(non_blocking);

                    registry.with(json_layer).with(file_layer).init();
                }
                None => registry.with(json_layer).init(),
            }
        }
        LogFormat::Compact => {
            let compact_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(false);

            registry.with(compact_layer).init();
        }
        LogFormat::Pretty => {
            let pretty_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true);

            registry.with(pretty_layer).init();
        }
    }

    tracing::info!(
        service.name = %config.service_name,
        service.version = %config.service_version,
        node_id = config.node_id.as_deref().unwrap_or("-"),
        environment = %config.environment,
        format = ?config.format,
        file_logging = file_guard.is_some(),
        "structured logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("verbose"), LogFormat::Pretty);
    }

    #[test]
    fn test_node_id_override() {
        let config = LogConfig::new("lpr-service").with_node_id("lpr-service-host1");

        assert_eq!(config.service_name, "lpr-service");
        assert_eq!(config.node_id.as_deref(), Some("lpr-service-host1"));
        assert_eq!(config.file_name(), "lpr-service.log");
    }

    #[test]
    fn test_span_events_follow_flag() {
        let mut config = LogConfig::new("lpr-service");
        config.enable_span_events = false;
        assert_eq!(config.span_events(), FmtSpan::NONE);

        config.enable_span_events = true;
        assert_eq!(config.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);
    }
}
