//! Structured logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::lifecycle::BoxError;

/// Filter directive used when nothing else is configured.
const DEFAULT_DIRECTIVE: &str = "info";

/// Build the env filter. Precedence: explicit override, `RUST_LOG`, config.
pub fn filter(config: &ObservabilityConfig, level_override: Option<&str>) -> EnvFilter {
    if let Some(level) = level_override {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if config.log_level.trim().is_empty() {
            DEFAULT_DIRECTIVE
        } else {
            config.log_level.as_str()
        };
        EnvFilter::new(format!("{level},tower_http=warn"))
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &ObservabilityConfig, level_override: Option<&str>) -> Result<(), BoxError> {
    let json = config.json_logs;
    tracing_subscriber::registry()
        .with(filter(config, level_override))
        .with(json.then(|| fmt::layer().json().with_current_span(false)))
        .with((!json).then(fmt::layer))
        .try_init()?;
    Ok(())
}
