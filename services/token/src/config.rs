//! Configuration for the token core.
//!
//! Loaded from environment variables (with `.env` support) and validated
//! before any key is loaded. [`Config::builder`] covers programmatic setups.

use crate::error::TokenError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Allowed user code lengths for the device flow.
pub const USER_CODE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 6..=20;

/// Token core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Token settings
    /// Issuer written to and expected in tokens
    pub issuer: String,
    /// JSON key-set file; `None` when keys are registered in code
    pub signing_keys_file: Option<PathBuf>,
    /// Overrides the key set's `default_kid`
    pub default_signer_kid: Option<String>,
    /// Capacity of the client-secret verifier cache
    pub client_verifier_cache_size: usize,

    // Grant lifetimes
    /// Device code lifetime
    pub device_code_ttl: Duration,
    /// Length of human-typed user codes
    pub user_code_length: usize,
    /// Permission ticket lifetime
    pub permission_ticket_ttl: Duration,
    /// Nonce lifetime
    pub nonce_ttl: Duration,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,

    // Logging
    /// Log level filter
    pub log_level: String,
    /// JSON log output
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            signing_keys_file: None,
            default_signer_kid: None,
            client_verifier_cache_size: 256,
            device_code_ttl: Duration::from_secs(600),
            user_code_length: 8,
            permission_ticket_ttl: Duration::from_secs(3600),
            nonce_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or a value is out of
    /// range.
    pub fn from_env() -> Result<Self, TokenError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            issuer: env::var("OIDC_ISSUER").unwrap_or(defaults.issuer),
            signing_keys_file: env::var("SIGNING_KEYS_FILE").ok().map(PathBuf::from),
            default_signer_kid: env::var("DEFAULT_SIGNER_KID").ok(),
            client_verifier_cache_size: parse_env(
                "CLIENT_VERIFIER_CACHE_SIZE",
                defaults.client_verifier_cache_size,
            )?,
            device_code_ttl: Duration::from_secs(parse_env("DEVICE_CODE_TTL", 600)?),
            user_code_length: parse_env("USER_CODE_LENGTH", defaults.user_code_length)?,
            permission_ticket_ttl: Duration::from_secs(parse_env("PERMISSION_TICKET_TTL", 3600)?),
            nonce_ttl: Duration::from_secs(parse_env("NONCE_TTL", 300)?),
            sweep_interval: Duration::from_secs(parse_env("SWEEP_INTERVAL", 60)?),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: parse_env("LOG_JSON", defaults.log_json)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Builder starting from [`Config::default`].
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.issuer.is_empty() {
            return Err(TokenError::config("OIDC_ISSUER must not be empty"));
        }
        for (name, value) in [
            ("DEVICE_CODE_TTL", self.device_code_ttl),
            ("PERMISSION_TICKET_TTL", self.permission_ticket_ttl),
            ("NONCE_TTL", self.nonce_ttl),
            ("SWEEP_INTERVAL", self.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(TokenError::config(format!("{} must be positive", name)));
            }
        }
        if !USER_CODE_LENGTH_RANGE.contains(&self.user_code_length) {
            return Err(TokenError::config(format!(
                "USER_CODE_LENGTH must be within {}..={}, got {}",
                USER_CODE_LENGTH_RANGE.start(),
                USER_CODE_LENGTH_RANGE.end(),
                self.user_code_length
            )));
        }
        if self.client_verifier_cache_size == 0 {
            return Err(TokenError::config("CLIENT_VERIFIER_CACHE_SIZE must be positive"));
        }
        crate::telemetry::parse_filter(&self.log_level)?;
        Ok(())
    }
}

/// Programmatic configuration, starting from the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = issuer.into();
        self
    }

    /// Load keys from this key-set file.
    #[must_use]
    pub fn with_signing_keys_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.signing_keys_file = Some(path.into());
        self
    }

    /// Sign with this kid by default.
    #[must_use]
    pub fn with_default_signer(mut self, kid: impl Into<String>) -> Self {
        self.config.default_signer_kid = Some(kid.into());
        self
    }

    /// Set the device code lifetime.
    #[must_use]
    pub const fn with_device_code_ttl(mut self, ttl: Duration) -> Self {
        self.config.device_code_ttl = ttl;
        self
    }

    /// Set the user code length.
    #[must_use]
    pub const fn with_user_code_length(mut self, length: usize) -> Self {
        self.config.user_code_length = length;
        self
    }

    /// Set the permission ticket lifetime.
    #[must_use]
    pub const fn with_permission_ticket_ttl(mut self, ttl: Duration) -> Self {
        self.config.permission_ticket_ttl = ttl;
        self
    }

    /// Set the nonce lifetime.
    #[must_use]
    pub const fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.config.nonce_ttl = ttl;
        self
    }

    /// Set the interval between expiry sweeps.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the client-secret verifier cache capacity.
    #[must_use]
    pub const fn with_client_verifier_cache_size(mut self, size: usize) -> Self {
        self.config.client_verifier_cache_size = size;
        self
    }

    /// Set the log filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Emit logs as JSON lines.
    #[must_use]
    pub const fn with_json_logs(mut self) -> Self {
        self.config.log_json = true;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Config, TokenError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, TokenError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| TokenError::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device_code_ttl, Duration::from_secs(600));
        assert_eq!(config.permission_ticket_ttl, Duration::from_secs(3600));
        assert_eq!(config.nonce_ttl, Duration::from_secs(300));
        assert_eq!(config.user_code_length, 8);
    }

    #[test]
    fn test_builder_validates() {
        let config = Config::builder()
            .with_issuer("https://issuer.example")
            .with_default_signer("k1")
            .with_nonce_ttl(Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(config.issuer, "https://issuer.example");
        assert_eq!(config.default_signer_kid.as_deref(), Some("k1"));

        assert!(Config::builder().with_user_code_length(4).build().is_err());
        assert!(Config::builder().with_user_code_length(21).build().is_err());
        assert!(Config::builder()
            .with_sweep_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(Config::builder().with_issuer("").build().is_err());
    }

    #[test]
    fn test_log_settings() {
        let config = Config::builder()
            .with_log_level("oidc_token_core=debug,warn")
            .with_json_logs()
            .build()
            .unwrap();
        assert!(config.log_json);

        assert!(matches!(
            Config::builder().with_log_level("oidc_token_core=loud").build(),
            Err(TokenError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_env_default_and_error() {
        assert_eq!(parse_env("OIDC_CORE_TEST_UNSET_VARIABLE", 42u64).unwrap(), 42);

        env::set_var("OIDC_CORE_TEST_BAD_NUMBER", "ten");
        let result: Result<u64, _> = parse_env("OIDC_CORE_TEST_BAD_NUMBER", 10);
        assert!(matches!(result, Err(TokenError::Configuration(_))));
        env::remove_var("OIDC_CORE_TEST_BAD_NUMBER");
    }
}
