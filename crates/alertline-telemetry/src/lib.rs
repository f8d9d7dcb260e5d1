mod metrics;
pub mod names;

pub use metrics::{MetricSample, MetricsRecorder, MetricsSnapshot};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "alertline_client" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from a directive such as `"info"` or `"warn,alertline_server=debug"`.
    ///
    /// Unparseable parts are skipped; the default level stays INFO if none is given.
    pub fn from_directive(directive: &str, json: bool) -> Self {
        let mut config = Self {
            json,
            ..Self::default()
        };
        for part in directive.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((module, level)) => {
                    if let Ok(level) = level.trim().parse::<Level>() {
                        config.module_levels.push((module.trim().to_string(), level));
                    }
                }
                None => {
                    if let Ok(level) = part.parse::<Level>() {
                        config.log_level = level;
                    }
                }
            }
        }
        config
    }

    fn filter_string(&self) -> String {
        let mut filter_str = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter_str
    }
}

/// Handle to the process-wide telemetry state.
pub struct TelemetryGuard {
    metrics: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    /// Shared metrics recorder.
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.filter_string()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    if let Err(e) = tracing_subscriber::registry().with(fmt_layer).try_init() {
        eprintln!("alertline-telemetry: subscriber already installed: {e}");
    }

    TelemetryGuard {
        metrics: Arc::new(MetricsRecorder::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_with_modules() {
        let config = TelemetryConfig::from_directive(
            "warn, alertline_server=debug,alertline_client=trace",
            true,
        );
        assert_eq!(config.log_level, Level::WARN);
        assert_eq!(
            config.module_levels,
            vec![
                ("alertline_server".to_string(), Level::DEBUG),
                ("alertline_client".to_string(), Level::TRACE),
            ]
        );
        assert!(config.json);
        assert_eq!(
            config.filter_string(),
            "warn,alertline_server=debug,alertline_client=trace"
        );
    }

    #[test]
    fn bad_directive_parts_skipped() {
        let config = TelemetryConfig::from_directive("loud,alertline_core=nope", false);
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.module_levels.is_empty());
        assert_eq!(config.filter_string(), "info");
    }

    #[test]
    fn empty_directive_is_default() {
        let config = TelemetryConfig::from_directive("", false);
        assert_eq!(config.log_level, Level::INFO);
        assert!(!config.json);
    }
}
