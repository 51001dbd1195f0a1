//! HMAC verifiers derived from OAuth client secrets.
//!
//! `client_secret_jwt` assertions are signed with the client's own secret,
//! so they cannot be checked against the key registry. Verifiers are built
//! on first use and kept in an LRU cache keyed by client id; a changed
//! secret replaces the cached verifier.

use crate::error::TokenError;
use crate::jwt::CompactJws;
use crate::keys::{AlgorithmFamily, SigningKey};
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

struct CachedVerifier {
    secret_digest: [u8; 32],
    key: Arc<SigningKey>,
}

/// LRU cache of per-client HMAC verifiers.
pub struct ClientSecretVerifierCache {
    cache: Mutex<LruCache<String, CachedVerifier>>,
}

impl ClientSecretVerifierCache {
    /// Cache holding at most `capacity` verifiers (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Verify `compact` as signed by `client_id` with `secret`.
    ///
    /// The header must declare an HMAC algorithm; anything else is a
    /// `KeyAlgorithmMismatch`.
    pub fn validate_signature(
        &self,
        client_id: &str,
        secret: &[u8],
        compact: &str,
    ) -> Result<bool, TokenError> {
        let jws = CompactJws::parse(compact)?;
        let algorithm = jws.algorithm()?;
        if algorithm.family() != AlgorithmFamily::Hmac {
            return Err(TokenError::mismatch(client_id, algorithm.as_str()));
        }

        let key = self.verifier(client_id, secret);
        jws.verify_with(&key)
    }

    fn verifier(&self, client_id: &str, secret: &[u8]) -> Arc<SigningKey> {
        let digest: [u8; 32] = Sha256::digest(secret).into();
        let mut cache = self.cache.lock();

        if let Some(cached) = cache.get(client_id) {
            if bool::from(cached.secret_digest.ct_eq(&digest)) {
                return Arc::clone(&cached.key);
            }
            debug!(client_id = %client_id, "Client secret changed, rebuilding verifier");
        }

        let key = Arc::new(SigningKey::client_secret(client_id, secret));
        cache.put(
            client_id.to_string(),
            CachedVerifier {
                secret_digest: digest,
                key: Arc::clone(&key),
            },
        );
        key
    }

    /// Drop the verifier of a client, e.g. after its registration changed.
    pub fn invalidate(&self, client_id: &str) {
        self.cache.lock().pop(client_id);
    }

    /// Cached verifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// True when no verifier is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{jws, Claims};
    use crate::keys::SigningAlgorithm;

    fn assertion(secret: &[u8], alg: SigningAlgorithm) -> String {
        let key = SigningKey::client_secret("client-1", secret);
        let claims = Claims::new()
            .with_claim("iss", "client-1")
            .with_claim("sub", "client-1");
        jws::sign(&claims, &key, alg).unwrap()
    }

    #[test]
    fn test_validates_client_assertion() {
        let cache = ClientSecretVerifierCache::new(4);
        let secret = b"a-client-secret-that-is-long-enough!";
        let token = assertion(secret, SigningAlgorithm::HS256);

        assert!(cache.validate_signature("client-1", secret, &token).unwrap());
        assert!(!cache
            .validate_signature("client-1", b"another-secret-entirely-wrong!!!!", &token)
            .unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_secret_rotation_replaces_verifier() {
        let cache = ClientSecretVerifierCache::new(4);
        let old = b"old-secret-old-secret-old-secret";
        let new = b"new-secret-new-secret-new-secret";

        let old_token = assertion(old, SigningAlgorithm::HS256);
        let new_token = assertion(new, SigningAlgorithm::HS256);

        assert!(cache.validate_signature("client-1", old, &old_token).unwrap());
        assert!(cache.validate_signature("client-1", new, &new_token).unwrap());
        assert!(!cache.validate_signature("client-1", new, &old_token).unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let cache = ClientSecretVerifierCache::new(2);
        let secret = b"shared-secret-shared-secret-1234";
        let token = assertion(secret, SigningAlgorithm::HS256);

        for client in ["a", "b", "c"] {
            cache.validate_signature(client, secret, &token).unwrap();
        }
        assert_eq!(cache.len(), 2);

        cache.invalidate("c");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_rejects_asymmetric_algorithms() {
        let cache = ClientSecretVerifierCache::new(2);
        let header = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            r#"{"alg":"RS256"}"#,
        );
        let token = format!("{}.e30.c2ln", header);
        assert!(matches!(
            cache.validate_signature("client-1", b"secret", &token),
            Err(TokenError::KeyAlgorithmMismatch { .. })
        ));
    }
}
