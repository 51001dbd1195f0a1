//! Key registry: the ordered, immutable set of configured keys.
//!
//! Keys are collected by a [`KeyRegistryBuilder`] during configuration load.
//! [`KeyRegistryBuilder::build`] freezes them into a [`KeyRegistry`], which is
//! the only form the signing service accepts.

use crate::error::TokenError;
use crate::jwks::Jwks;
use crate::keys::algorithm::SigningAlgorithm;
use crate::keys::keyset::KeySetConfig;
use crate::keys::material::{KeyMaterial, PublicKey, SigningKey};
use std::collections::HashMap;
use tracing::{info, warn};

/// Collects keys in configuration order.
#[derive(Debug, Default)]
pub struct KeyRegistryBuilder {
    keys: Vec<SigningKey>,
    default_kid: Option<String>,
}

impl KeyRegistryBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `material` for `algorithm` and add it under `kid`.
    pub fn register(
        self,
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        material: KeyMaterial,
    ) -> Result<Self, TokenError> {
        let key = SigningKey::from_material(kid, algorithm, material)?;
        self.register_key(key)
    }

    /// Add an already loaded key.
    ///
    /// A kid registered again with the same algorithm has its material
    /// replaced in place; with a different algorithm it is rejected.
    pub fn register_key(mut self, key: SigningKey) -> Result<Self, TokenError> {
        match self.keys.iter().position(|k| k.kid() == key.kid()) {
            Some(idx) => {
                let existing = self.keys[idx].algorithm();
                if existing != key.algorithm() {
                    return Err(TokenError::config(format!(
                        "Key {} already registered with {}, cannot re-register with {}",
                        key.kid(),
                        existing,
                        key.algorithm()
                    )));
                }
                warn!(kid = %key.kid(), alg = %key.algorithm(), "Replacing key material");
                self.keys[idx] = key;
            }
            None => self.keys.push(key),
        }
        Ok(self)
    }

    /// Designate the default signer.
    #[must_use]
    pub fn default_signer(mut self, kid: impl Into<String>) -> Self {
        self.default_kid = Some(kid.into());
        self
    }

    /// Freeze the registry. A designated default signer must be registered.
    pub fn build(self) -> Result<KeyRegistry, TokenError> {
        if let Some(kid) = &self.default_kid {
            if !self.keys.iter().any(|k| k.kid() == kid) {
                return Err(TokenError::config(format!(
                    "Default signer {} is not a registered key",
                    kid
                )));
            }
        }

        let index = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.kid().to_string(), i))
            .collect();

        info!(
            keys = self.keys.len(),
            default_kid = ?self.default_kid,
            "Key registry initialized"
        );

        Ok(KeyRegistry {
            keys: self.keys,
            index,
            default_kid: self.default_kid,
        })
    }
}

/// Immutable key set. `Send + Sync`; share it behind an `Arc`.
#[derive(Debug)]
pub struct KeyRegistry {
    keys: Vec<SigningKey>,
    index: HashMap<String, usize>,
    default_kid: Option<String>,
}

impl KeyRegistry {
    /// Start registering keys.
    #[must_use]
    pub fn builder() -> KeyRegistryBuilder {
        KeyRegistryBuilder::new()
    }

    /// Load every key of a key-set file.
    pub fn from_config(config: &KeySetConfig) -> Result<Self, TokenError> {
        let mut builder = KeyRegistryBuilder::new();
        for entry in &config.keys {
            let algorithm = SigningAlgorithm::from_name(&entry.alg)?;
            let material = entry.material(algorithm)?;
            builder = builder.register(entry.kid.clone(), algorithm, material)?;
        }
        if let Some(kid) = &config.default_kid {
            builder = builder.default_signer(kid.clone());
        }
        builder.build()
    }

    /// Key registered under `kid`.
    pub fn lookup(&self, kid: &str) -> Result<&SigningKey, TokenError> {
        self.index
            .get(kid)
            .map(|&i| &self.keys[i])
            .ok_or_else(|| TokenError::KeyNotFound(kid.to_string()))
    }

    /// Keys in configuration order.
    pub fn keys(&self) -> impl Iterator<Item = &SigningKey> {
        self.keys.iter()
    }

    /// Registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Kid of the default signer, if one was designated.
    #[must_use]
    pub fn default_kid(&self) -> Option<&str> {
        self.default_kid.as_deref()
    }

    /// The designated default signer, which must hold a private component.
    pub fn default_signing_key(&self) -> Result<&SigningKey, TokenError> {
        let kid = self
            .default_kid
            .as_deref()
            .ok_or_else(|| TokenError::config("No default signing key designated"))?;
        let key = self.lookup(kid)?;
        if !key.can_sign() {
            return Err(TokenError::config(format!(
                "Default signer {} is a verification-only key",
                kid
            )));
        }
        Ok(key)
    }

    /// Public halves of every asymmetric key. HMAC secrets are never listed.
    #[must_use]
    pub fn all_public_keys(&self) -> HashMap<String, PublicKey> {
        self.keys
            .iter()
            .filter_map(SigningKey::public_key)
            .map(|pk| (pk.kid.clone(), pk))
            .collect()
    }

    /// Public keys as a JWK Set, in configuration order.
    #[must_use]
    pub fn jwk_set(&self) -> Jwks {
        let public: Vec<PublicKey> = self.keys.iter().filter_map(SigningKey::public_key).collect();
        Jwks::from_public_keys(&public)
    }
}
