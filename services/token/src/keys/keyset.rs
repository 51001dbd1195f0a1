//! JSON key-set file consumed by [`KeyRegistry::from_config`].
//!
//! ```json
//! {
//!   "default_kid": "rsa-2024",
//!   "keys": [
//!     { "kid": "rsa-2024", "alg": "RS256", "private_key_file": "/etc/oidc/rsa.pem" },
//!     { "kid": "hmac-1", "alg": "HS256", "secret_base64": "c2VjcmV0..." }
//!   ]
//! }
//! ```
//!
//! [`KeyRegistry::from_config`]: crate::keys::KeyRegistry::from_config

use crate::error::TokenError;
use crate::keys::algorithm::{AlgorithmFamily, SigningAlgorithm};
use crate::keys::material::KeyMaterial;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Whole key-set file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySetConfig {
    /// Kid of the default signer
    #[serde(default)]
    pub default_kid: Option<String>,
    /// Keys in configuration order
    #[serde(default)]
    pub keys: Vec<KeyEntryConfig>,
}

impl KeySetConfig {
    /// Read and parse a key-set file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TokenError::config(format!("Cannot read key set {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Parse a key set from JSON text.
    pub fn from_json(raw: &str) -> Result<Self, TokenError> {
        serde_json::from_str(raw)
            .map_err(|e| TokenError::config(format!("Invalid key set: {}", e)))
    }
}

/// One key. Exactly one source of material must be given for the family.
#[derive(Clone, Default, Deserialize)]
pub struct KeyEntryConfig {
    /// Key id
    pub kid: String,
    /// Algorithm name, e.g. `RS256`
    pub alg: String,
    /// HMAC secret as UTF-8 text
    #[serde(default)]
    pub secret: Option<String>,
    /// HMAC secret, standard base64
    #[serde(default)]
    pub secret_base64: Option<String>,
    /// Inline private key PEM
    #[serde(default)]
    pub private_key_pem: Option<String>,
    /// Path to a private key PEM
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    /// Inline public key PEM
    #[serde(default)]
    pub public_key_pem: Option<String>,
    /// Path to a public key PEM
    #[serde(default)]
    pub public_key_file: Option<PathBuf>,
}

impl fmt::Debug for KeyEntryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntryConfig")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("private_key_file", &self.private_key_file)
            .field("public_key_file", &self.public_key_file)
            .finish_non_exhaustive()
    }
}

impl KeyEntryConfig {
    /// Resolve the entry into key material for `algorithm`.
    pub fn material(&self, algorithm: SigningAlgorithm) -> Result<KeyMaterial, TokenError> {
        match algorithm.family() {
            AlgorithmFamily::Hmac => self.secret_material(),
            AlgorithmFamily::Rsa => {
                let public_pem = self.public_pem()?;
                match self.private_pem()? {
                    Some(private_pem) => Ok(KeyMaterial::RsaPrivatePem {
                        private_pem,
                        public_pem,
                    }),
                    None => public_pem
                        .map(KeyMaterial::RsaPublicPem)
                        .ok_or_else(|| self.missing("a private or public key")),
                }
            }
            AlgorithmFamily::Ec(_) => match self.private_pem()? {
                Some(private_pem) => Ok(KeyMaterial::EcPrivatePem(private_pem)),
                None => self
                    .public_pem()?
                    .map(KeyMaterial::EcPublicPem)
                    .ok_or_else(|| self.missing("a private or public key")),
            },
        }
    }

    fn secret_material(&self) -> Result<KeyMaterial, TokenError> {
        match (&self.secret, &self.secret_base64) {
            (Some(_), Some(_)) => Err(TokenError::config(format!(
                "Key {}: give either secret or secret_base64, not both",
                self.kid
            ))),
            (Some(secret), None) => Ok(KeyMaterial::Secret(secret.as_bytes().to_vec())),
            (None, Some(encoded)) => STANDARD
                .decode(encoded.trim())
                .map(KeyMaterial::Secret)
                .map_err(|e| {
                    TokenError::config(format!("Key {}: invalid secret_base64: {}", self.kid, e))
                }),
            (None, None) => Err(self.missing("a secret")),
        }
    }

    fn private_pem(&self) -> Result<Option<String>, TokenError> {
        read_pem(&self.kid, &self.private_key_pem, &self.private_key_file)
    }

    fn public_pem(&self) -> Result<Option<String>, TokenError> {
        read_pem(&self.kid, &self.public_key_pem, &self.public_key_file)
    }

    fn missing(&self, what: &str) -> TokenError {
        TokenError::config(format!("Key {} ({}) needs {}", self.kid, self.alg, what))
    }
}

fn read_pem(
    kid: &str,
    inline: &Option<String>,
    file: &Option<PathBuf>,
) -> Result<Option<String>, TokenError> {
    match (inline, file) {
        (Some(_), Some(_)) => Err(TokenError::config(format!(
            "Key {}: give either an inline PEM or a PEM file, not both",
            kid
        ))),
        (Some(pem), None) => Ok(Some(pem.clone())),
        (None, Some(path)) => std::fs::read_to_string(path).map(Some).map_err(|e| {
            TokenError::config(format!("Key {}: cannot read {}: {}", kid, path.display(), e))
        }),
        (None, None) => Ok(None),
    }
}
