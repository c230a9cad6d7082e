//! Structured logging initialization.
//!
//! Provides an `EnvFilter`-driven `tracing-subscriber` setup: pretty, colored output for
//! interactive terminals, compact/uncolored otherwise, or JSON for log aggregation. Mirrors
//! the teacher's tracing setup, generalized to a single `LogFormat` selection instead of a
//! config-struct-specific loader.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output format for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty-printed, colored (suited to an interactive terminal).
    Pretty,
    /// Compact, uncolored (suited to captured output / CI logs).
    Compact,
    /// JSON, one object per line (suited to log aggregation).
    Json,
}

impl LogFormat {
    /// Chooses [`LogFormat::Pretty`] when stdout is a TTY, [`LogFormat::Compact`] otherwise.
    #[must_use]
    pub fn auto_detect() -> Self {
        if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

/// Tracing initialization options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default level used when `RUST_LOG` is unset.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Emit span ENTER/CLOSE events (useful for tracing per-file spans' durations).
    pub with_span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self { level: Level::INFO, format: LogFormat::auto_detect(), with_span_events: true }
    }
}

/// Initializes the global `tracing` subscriber.
///
/// Idempotent: a second call (e.g. from a test harness that also calls `init`) is treated as
/// success rather than a panic, since `tracing`'s global dispatcher can only be set once per
/// process.
///
/// # Errors
/// Returns an error string if subscriber construction fails for a reason other than
/// double-initialization.
pub fn init(config: TracingConfig) -> Result<(), String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str(config.level)));
    let span_events =
        if config.with_span_events { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE };

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .pretty()
                    .with_span_events(span_events)
                    .with_ansi(true)
                    .with_filter(env_filter),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .compact()
                    .with_span_events(span_events)
                    .with_ansi(false)
                    .with_filter(env_filter),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_span_events(span_events).with_filter(env_filter))
            .try_init(),
    };

    result.or_else(|e| {
        if e.to_string().contains("a global default trace dispatcher has already been set") {
            Ok(())
        } else {
            Err(format!("failed to initialize tracing: {e}"))
        }
    })
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        assert!(init(TracingConfig::default()).is_ok());
        assert!(init(TracingConfig::default()).is_ok());
    }
}
