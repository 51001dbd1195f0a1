//! Signing-and-validation service over the key registry.
//!
//! Signs with the designated default signer and verifies by trying every
//! configured key of the token's algorithm family in configuration order,
//! so old and new keys are both accepted during a rollover.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::TokenError;
use crate::jwks::Jwks;
use crate::jwt::{jws, Claims, CompactJws};
use crate::keys::{KeyRegistry, KeySetConfig, PublicKey, SigningAlgorithm, SigningKey};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Signs claim sets and validates compact JWS strings.
///
/// Immutable after construction; clone the `Arc`s to share.
pub struct SigningService {
    registry: Arc<KeyRegistry>,
    default_kid: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SigningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningService")
            .field("keys", &self.registry.len())
            .field("default_kid", &self.default_kid)
            .finish_non_exhaustive()
    }
}

impl SigningService {
    /// Service that signs and verifies.
    ///
    /// # Errors
    ///
    /// `Configuration` when the registry has no default signer or the default
    /// signer is a verification-only key.
    pub fn new(registry: Arc<KeyRegistry>) -> Result<Self, TokenError> {
        let default_kid = registry.default_signing_key()?.kid().to_string();
        info!(
            default_kid = %default_kid,
            keys = registry.len(),
            "Signing service initialized"
        );
        Ok(Self {
            registry,
            default_kid: Some(default_kid),
            clock: Arc::new(SystemClock),
        })
    }

    /// Service that only verifies; every signing call fails with `Signing`.
    #[must_use]
    pub fn verify_only(registry: Arc<KeyRegistry>) -> Self {
        info!(keys = registry.len(), "Verification-only service initialized");
        Self {
            registry,
            default_kid: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Load the key set named by `config` and build a signing service.
    pub fn from_config(config: &Config) -> Result<Self, TokenError> {
        let path = config
            .signing_keys_file
            .as_ref()
            .ok_or_else(|| TokenError::config("SIGNING_KEYS_FILE is not set"))?;
        let mut key_set = KeySetConfig::from_file(path)?;
        if let Some(kid) = &config.default_signer_kid {
            key_set.default_kid = Some(kid.clone());
        }
        Self::new(Arc::new(KeyRegistry::from_config(&key_set)?))
    }

    /// Replace the clock used by [`SigningService::is_expired`] and
    /// [`SigningService::validate`].
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registry the service signs and verifies with.
    #[must_use]
    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Kid used by [`SigningService::sign_claims`].
    #[must_use]
    pub fn default_signer_key_id(&self) -> Option<&str> {
        self.default_kid.as_deref()
    }

    /// Algorithm of the default signer.
    #[must_use]
    pub fn default_signing_algorithm(&self) -> Option<SigningAlgorithm> {
        self.default_signer().ok().map(SigningKey::algorithm)
    }

    /// Algorithms some configured key can sign with, for discovery metadata.
    #[must_use]
    pub fn signing_algorithms_supported(&self) -> Vec<SigningAlgorithm> {
        SigningAlgorithm::ALL
            .into_iter()
            .filter(|alg| self.registry.keys().any(|k| k.can_sign_with(*alg)))
            .collect()
    }

    fn default_signer(&self) -> Result<&SigningKey, TokenError> {
        let kid = self
            .default_kid
            .as_deref()
            .ok_or_else(|| TokenError::signing("No default signer configured"))?;
        self.registry.lookup(kid)
    }

    /// Sign with the default signer under its registered algorithm.
    pub fn sign_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        let key = self.default_signer()?;
        self.sign_with_key(claims, key, key.algorithm())
    }

    /// Sign under `algorithm`, preferring the default signer and falling back
    /// to the first signing-capable key that accepts the algorithm.
    pub fn sign_claims_with(
        &self,
        claims: &Claims,
        algorithm: SigningAlgorithm,
    ) -> Result<String, TokenError> {
        if self.default_kid.is_none() {
            return Err(TokenError::signing("No default signer configured"));
        }

        let default = self.default_signer()?;
        let key = if default.can_sign_with(algorithm) {
            default
        } else {
            self.registry
                .keys()
                .find(|k| k.can_sign_with(algorithm))
                .ok_or_else(|| {
                    TokenError::signing(format!("No signing key for algorithm {}", algorithm))
                })?
        };
        self.sign_with_key(claims, key, algorithm)
    }

    fn sign_with_key(
        &self,
        claims: &Claims,
        key: &SigningKey,
        algorithm: SigningAlgorithm,
    ) -> Result<String, TokenError> {
        let token = jws::sign(claims, key, algorithm)?;
        metrics::record_token_signed(algorithm.as_str());
        debug!(kid = %key.kid(), alg = %algorithm, "Signed claims");
        Ok(token)
    }

    /// True when some configured key verifies the signature.
    ///
    /// Keys are tried in configuration order, restricted to the family of
    /// the header's algorithm. Malformed input and unsupported algorithms
    /// are errors; a signature no key reproduces is `Ok(false)`.
    pub fn validate_signature(&self, compact: &str) -> Result<bool, TokenError> {
        let jws = CompactJws::parse(compact).map_err(|e| {
            metrics::record_signature_validation("malformed");
            e
        })?;
        self.validate_parsed(&jws)
    }

    fn validate_parsed(&self, jws: &CompactJws) -> Result<bool, TokenError> {
        let algorithm = jws.algorithm().map_err(|e| {
            metrics::record_signature_validation("error");
            e
        })?;

        for key in self.registry.keys().filter(|k| k.supports(algorithm)) {
            if jws.verify_with(key)? {
                metrics::record_signature_validation("valid");
                debug!(kid = %key.kid(), alg = %algorithm, "Signature verified");
                return Ok(true);
            }
        }

        metrics::record_signature_validation("invalid");
        debug!(alg = %algorithm, header_kid = ?jws.kid(), "No key verified signature");
        Ok(false)
    }

    /// True iff `iss` is present and equals `expected_issuer` exactly.
    #[must_use]
    pub fn validate_issued_jwt(&self, claims: &Claims, expected_issuer: &str) -> bool {
        claims.issuer() == Some(expected_issuer)
    }

    /// Expiry check against an explicit instant.
    ///
    /// No `exp` means the token does not expire. A present `exp` that is not
    /// a number is treated as expired.
    #[must_use]
    pub fn is_jwt_expired(&self, claims: &Claims, now: DateTime<Utc>) -> bool {
        if !claims.contains(crate::jwt::claims::names::EXPIRATION) {
            return false;
        }
        match claims.expiration() {
            Some(exp) => now.timestamp_millis() > exp.saturating_mul(1000),
            None => true,
        }
    }

    /// Expiry check against the service clock.
    #[must_use]
    pub fn is_expired(&self, claims: &Claims) -> bool {
        self.is_jwt_expired(claims, self.clock.now())
    }

    /// Decode, verify, then check issuer and expiry.
    pub fn validate(&self, compact: &str, expected_issuer: &str) -> Result<Claims, TokenError> {
        let jws = CompactJws::parse(compact).map_err(|e| {
            metrics::record_signature_validation("malformed");
            e
        })?;
        let claims = jws.claims()?;

        if !self.validate_parsed(&jws)? {
            return Err(TokenError::SignatureInvalid);
        }
        if !self.validate_issued_jwt(&claims, expected_issuer) {
            warn!(
                expected = %expected_issuer,
                actual = ?claims.issuer(),
                "Token issuer mismatch"
            );
            return Err(TokenError::IssuerMismatch);
        }
        if self.is_expired(&claims) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Public keys by kid; HMAC keys are left out.
    #[must_use]
    pub fn all_public_keys(&self) -> HashMap<String, PublicKey> {
        self.registry.all_public_keys()
    }

    /// JWK Set of the public keys, for the `jwks_uri` endpoint.
    #[must_use]
    pub fn jwk_set(&self) -> Jwks {
        self.registry.jwk_set()
    }
}
