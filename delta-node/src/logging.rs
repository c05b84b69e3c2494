//! Process-wide tracing subscriber

use crate::config::LoggingConfig;
use crate::{NodeError, NodeResult};
use tracing_subscriber::EnvFilter;

/// Filter for `level`, a directive such as `info` or `delta_node=debug`
pub fn build_filter(level: &str) -> NodeResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| NodeError::Config {
        reason: format!("invalid log filter '{}': {}", level, e),
    })
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &LoggingConfig) -> NodeResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.level)?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| NodeError::Config {
        reason: format!("failed to install logger: {}", e),
    })
}
