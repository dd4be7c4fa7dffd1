use std::env::var;

use serde::{Deserialize, Serialize};
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging preferences, usually read from the `[logging]` config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Default level directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::Compact }
    }
}

impl LogOptions {
    fn level_filter(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }

    /// `RUST_LOG_FORMAT` wins over the configured format.
    fn resolved_format(&self) -> LogFormat {
        match var("RUST_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => self.format,
        }
    }
}

/// Initialize tracing with the default options.
pub fn init_tracing() {
    init(&LogOptions::default());
}

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(options: &LogOptions) {
    let env_filter =
        EnvFilter::builder().with_default_directive(options.level_filter().into()).from_env_lossy();

    let log_layer = match options.resolved_format() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    if let Err(error) = tracing_subscriber::registry().with(log_layer).try_init() {
        warn!("Tracing subscriber already installed: {error}");
    }
}
