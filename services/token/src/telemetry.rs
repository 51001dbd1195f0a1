//! Tracing subscriber setup for processes embedding the token core.
//!
//! The subscriber is driven by [`Config`]: `LOG_LEVEL` is the fallback
//! filter when `RUST_LOG` is unset, `LOG_JSON` picks the output layer.

use crate::config::Config;
use crate::error::TokenError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse a filter directive such as `info` or `oidc_token_core=debug,warn`.
pub fn parse_filter(directives: &str) -> Result<EnvFilter, TokenError> {
    EnvFilter::try_new(directives).map_err(|e| {
        TokenError::config(format!("Invalid LOG_LEVEL {:?}: {}", directives, e))
    })
}

/// Install the global subscriber for `config`.
///
/// Returns `Ok(false)` when a subscriber was already installed, so embedding
/// applications and tests can call this more than once.
pub fn init_tracing(config: &Config) -> Result<bool, TokenError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&config.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init().is_ok()
    };

    if installed {
        tracing::info!(
            issuer = %config.issuer,
            json = config.log_json,
            "Tracing initialized"
        );
    }
    Ok(installed)
}
