//! Token core errors and their stable codes.

use thiserror::Error;

/// Errors raised by key loading, JWS signing and token validation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TokenError {
    /// Invalid configuration or key material.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Not a compact JWS, or a segment that does not decode.
    #[error("Malformed token: {reason}")]
    MalformedToken { reason: String },

    /// `alg` outside the supported set, `none` included.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key and algorithm belong to different families.
    #[error("Key {kid} cannot be used with algorithm {algorithm}")]
    KeyAlgorithmMismatch { kid: String, algorithm: String },

    /// No key registered under this kid.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The signing primitive failed, or the key cannot sign.
    #[error("Signing error: {0}")]
    Signing(String),

    /// No registered key verified the signature.
    #[error("Token signature invalid")]
    SignatureInvalid,

    /// `iss` differs from the expected issuer.
    #[error("Token issuer mismatch")]
    IssuerMismatch,

    /// Past `exp`.
    #[error("Token expired")]
    Expired,

    /// Claims could not be (de)serialized as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TokenError {
    /// Shorthand for [`TokenError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        TokenError::Configuration(msg.into())
    }

    /// Shorthand for [`TokenError::MalformedToken`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        TokenError::MalformedToken {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TokenError::UnsupportedAlgorithm`].
    pub fn unsupported(algorithm: impl Into<String>) -> Self {
        TokenError::UnsupportedAlgorithm(algorithm.into())
    }

    /// Shorthand for [`TokenError::KeyAlgorithmMismatch`].
    pub fn mismatch(kid: impl Into<String>, algorithm: impl Into<String>) -> Self {
        TokenError::KeyAlgorithmMismatch {
            kid: kid.into(),
            algorithm: algorithm.into(),
        }
    }

    /// Shorthand for [`TokenError::Signing`].
    pub fn signing(msg: impl Into<String>) -> Self {
        TokenError::Signing(msg.into())
    }

    /// True for failures caused by setup (keys, algorithms) rather than by
    /// the presented token.
    #[must_use]
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            TokenError::Configuration(_)
                | TokenError::KeyAlgorithmMismatch { .. }
                | TokenError::KeyNotFound(_)
                | TokenError::Signing(_)
        )
    }

    /// Stable code for the protocol layer.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            TokenError::Configuration(_) => TOKEN_CONFIGURATION_ERROR,
            TokenError::MalformedToken { .. } => TOKEN_MALFORMED,
            TokenError::UnsupportedAlgorithm(_) => TOKEN_UNSUPPORTED_ALGORITHM,
            TokenError::KeyAlgorithmMismatch { .. } => TOKEN_KEY_MISMATCH,
            TokenError::KeyNotFound(_) => TOKEN_KEY_NOT_FOUND,
            TokenError::Signing(_) => TOKEN_SIGNING_ERROR,
            TokenError::SignatureInvalid => TOKEN_SIGNATURE_INVALID,
            TokenError::IssuerMismatch => TOKEN_ISSUER_MISMATCH,
            TokenError::Expired => TOKEN_EXPIRED,
            TokenError::Serialization(_) => TOKEN_SERIALIZATION_ERROR,
        }
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        TokenError::Serialization(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        TokenError::Signing(err.to_string())
    }
}

// Error codes surfaced to the protocol layer
/// Code for [`TokenError::Configuration`].
pub const TOKEN_CONFIGURATION_ERROR: &str = "TOKEN_CONFIGURATION_ERROR";
/// Code for [`TokenError::MalformedToken`].
pub const TOKEN_MALFORMED: &str = "TOKEN_MALFORMED";
/// Code for [`TokenError::UnsupportedAlgorithm`].
pub const TOKEN_UNSUPPORTED_ALGORITHM: &str = "TOKEN_UNSUPPORTED_ALGORITHM";
/// Code for [`TokenError::KeyAlgorithmMismatch`].
pub const TOKEN_KEY_MISMATCH: &str = "TOKEN_KEY_MISMATCH";
/// Code for [`TokenError::KeyNotFound`].
pub const TOKEN_KEY_NOT_FOUND: &str = "TOKEN_KEY_NOT_FOUND";
/// Code for [`TokenError::Signing`].
pub const TOKEN_SIGNING_ERROR: &str = "TOKEN_SIGNING_ERROR";
/// Code for [`TokenError::SignatureInvalid`].
pub const TOKEN_SIGNATURE_INVALID: &str = "TOKEN_SIGNATURE_INVALID";
/// Code for [`TokenError::IssuerMismatch`].
pub const TOKEN_ISSUER_MISMATCH: &str = "TOKEN_ISSUER_MISMATCH";
/// Code for [`TokenError::Expired`].
pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
/// Code for [`TokenError::Serialization`].
pub const TOKEN_SERIALIZATION_ERROR: &str = "TOKEN_SERIALIZATION_ERROR";
