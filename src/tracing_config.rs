//! Tracing configuration module for structured logging
//!
//! The binary configures the subscriber; library code only emits spans and
//! events through the helpers at the bottom of this file.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default)
    Console,
    /// Compact console output without colors, for CI and containers
    Compact,
    /// JSON structured logging for log shippers
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stdout (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Output to both console and a daily-rolled file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps background log writers alive; drop it only at process exit
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_writer: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    /// Output format
    pub format: TracingFormat,
    /// Output destination
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Instance ID logged once at startup
    pub instance_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            instance_id: None,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set output format
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Set output destination
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set the ID that identifies this server instance in the logs
    pub fn with_instance_id<S: Into<String>>(mut self, instance_id: S) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug,hyper=info,h2=info",
            _ => "trace",
        }
    }

    /// Initialize tracing subscriber based on configuration
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        use tracing_subscriber::fmt;

        let filter = if let Some(env_filter) = &self.env_filter {
            EnvFilter::try_new(env_filter)?
        } else {
            EnvFilter::try_new(self.verbosity_to_filter())?
        };

        let registry = Registry::default().with(filter);
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            (TracingFormat::Compact, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .compact();

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);

                registry.with(fmt_layer).try_init()?;
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::never(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("wav2lip-server.log")),
                );
                let (file_writer, worker) = non_blocking(file_appender);
                guard._file_writer = Some(worker);

                match format {
                    TracingFormat::Console | TracingFormat::Compact => {
                        let layer = fmt::layer()
                            .with_ansi(false)
                            .with_writer(file_writer)
                            .compact();
                        registry.with(layer).try_init()?;
                    },
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_writer(file_writer)
                            .with_current_span(true)
                            .with_span_list(true);
                        registry.with(layer).try_init()?;
                    },
                }
            },

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::Both(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::daily(
                    path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_stem()
                        .unwrap_or_else(|| std::ffi::OsStr::new("wav2lip-server")),
                );
                let (file_writer, worker) = non_blocking(file_appender);
                guard._file_writer = Some(worker);

                let file_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .compact();
                let console_layer = fmt::layer()
                    .with_ansi(*format == TracingFormat::Console)
                    .with_target(false)
                    .compact();

                registry.with(console_layer).with(file_layer).try_init()?;
            },
        }

        if let Some(instance_id) = &self.instance_id {
            tracing::info!(instance_id = %instance_id, "🚀 Wav2Lip server instance started");
        }

        Ok(guard)
    }
}

/// Initialize tracing with CLI-friendly defaults.
///
/// `RUST_LOG` takes precedence over the verbosity flag when set.
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, compact: bool) -> anyhow::Result<TracingGuard> {
    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(if compact {
            TracingFormat::Compact
        } else {
            TracingFormat::Console
        })
        .with_instance_id(uuid::Uuid::new_v4().to_string());

    if let Ok(filter) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !filter.trim().is_empty() {
            config = config.with_env_filter(filter);
        }
    }

    config.init()
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one generation request
    pub fn request(request_id: &str, quality: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "request",
            request_id = %request_id,
            quality = %quality
        )
    }

    /// Span covering one inference process run
    pub fn inference(engine: &str, out_height: u32, scale: u32) -> Span {
        tracing::span!(
            Level::INFO,
            "inference",
            engine = %engine,
            out_height = %out_height,
            scale = %scale
        )
    }

    /// Span covering one on-disk render from the command line
    pub fn render(face: &std::path::Path, audio: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "render",
            face = %face.display(),
            audio = %audio.display()
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{debug, error};

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(
            error = %error,
            context = %context,
            "❌ Operation failed"
        );
    }

    /// Log how long an operation took
    pub fn performance_metric(operation: &str, duration_ms: u64) {
        debug!(
            operation = %operation,
            duration_ms = %duration_ms,
            "⏱️  Performance metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert!(TracingConfig::new()
            .with_verbosity(1)
            .verbosity_to_filter()
            .starts_with("debug"));
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_env_filter("wav2lip_server=debug")
            .with_instance_id("instance-1");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("wav2lip_server=debug"));
        assert_eq!(config.instance_id.as_deref(), Some("instance-1"));
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert_eq!(config.output, TracingOutput::Console);
        assert!(config.env_filter.is_none());
        assert!(config.instance_id.is_none());
    }
}
