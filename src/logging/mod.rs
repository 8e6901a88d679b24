//! Logging infrastructure - structured tracing for the bridge
//!
//! Design: `tracing` events and spans throughout, with one subscriber
//! installed per process:
//! - Pretty, compact or JSON formatting
//! - Stdout, stderr or a daily-rotated file through `tracing-appender`
//! - Filter directives on top of `RUST_LOG`
//! - Installation is idempotent; later calls are ignored

use crate::frontend::config::LoggingConfig;
use once_cell::sync::OnceCell;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rotation under `directory`
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events (one span per boundary crossing)
    pub span_events: bool,
    /// Extra directives, e.g. "crossbind::interop=trace"
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Settings from the `[logging]` table of a configuration file
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut log = Self::default();
        if let Some(level) = parse_level(&config.level) {
            log.level = level;
        }
        if config.json {
            log.format = LogFormat::Json;
        }
        log
    }

    /// Apply environment overrides on top of `self`
    pub fn with_env(mut self) -> Self {
        // CROSSBIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level) = std::env::var("CROSSBIND_LOG_LEVEL").ok().as_deref().and_then(parse_level) {
            self.level = level;
        }

        // CROSSBIND_LOG_FILE: directory for rotated log files
        if let Ok(directory) = std::env::var("CROSSBIND_LOG_FILE") {
            self.output = LogOutput::File { directory, prefix: "crossbind".to_string() };
        }

        if std::env::var("CROSSBIND_LOG_JSON").is_ok() {
            self.format = LogFormat::Json;
        }

        if std::env::var("CROSSBIND_LOG_SPANS").is_ok() {
            self.span_events = true;
        }

        self
    }

    pub fn from_env() -> Self {
        Self::default().with_env()
    }
}

pub fn parse_level(level: &str) -> Option<Level> {
    level.trim().parse().ok()
}

/// Install the global subscriber.
///
/// The returned guard flushes the background writer when dropped; keep it
/// alive for the duration of the program. Returns `None` when logging was
/// already initialized.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(&config);
        guard = Some(match &config.output {
            LogOutput::Stdout => {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
                install(writer, &config, filter);
                guard
            }
            LogOutput::Stderr => {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
                install(writer, &config, filter);
                guard
            }
            LogOutput::File { directory, prefix } => {
                let (writer, guard) = tracing_appender::non_blocking(rolling::daily(directory, prefix));
                install(writer, &config, filter);
                guard
            }
        });
    });
    guard
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

fn install<W>(writer: W, config: &LogConfig, filter: EnvFilter)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let spans = span_events_config(config.span_events);
    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer().with_writer(writer).pretty().with_span_events(spans).with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer().with_writer(writer).compact().with_span_events(spans).with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Json => {
            let layer = fmt::layer().with_writer(writer).json().with_span_events(spans).with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
    };
    // Another subscriber (a test harness, an embedding application) wins
    if let Err(err) = result {
        eprintln!("crossbind: logging not installed: {}", err);
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(directives) => directives.split(',').fold(base, |filter, directive| {
            filter.add_directive(directive.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid filter directive: {}", directive);
                config.level.into()
            }))
        }),
        None => base,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_filter("crossbind=trace");

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.filter, Some("crossbind=trace".to_string()));
    }

    #[test]
    fn test_from_config_table() {
        let table = LoggingConfig { level: "debug".to_string(), json: true };
        let config = LogConfig::from_config(&table);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);

        let table = LoggingConfig { level: "loud".to_string(), json: false };
        assert_eq!(LogConfig::from_config(&table).level, Level::WARN);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level(" ERROR "), Some(Level::ERROR));
        assert_eq!(parse_level("chatty"), None);
    }
}
