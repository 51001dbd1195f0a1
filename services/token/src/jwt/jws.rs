//! JWS Compact Serialization (RFC 7515 §7.1).

use crate::error::TokenError;
use crate::jwt::claims::Claims;
use crate::keys::{SigningAlgorithm, SigningKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Protected header. Serialized as `{"alg","kid","typ"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Algorithm name
    pub alg: String,
    /// Id of the signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Media type, `JWT` for tokens signed here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// A structurally valid compact JWS: three base64url segments with a JSON
/// header. The payload is kept as bytes until [`CompactJws::claims`].
#[derive(Debug, Clone)]
pub struct CompactJws {
    header: JwsHeader,
    payload: Vec<u8>,
    signing_input: String,
    signature: Vec<u8>,
}

impl CompactJws {
    /// Split and decode `compact` without checking the signature.
    pub fn parse(compact: &str) -> Result<Self, TokenError> {
        let segments: Vec<&str> = compact.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let header_bytes = decode_segment("header", segments[0])?;
        let payload = decode_segment("payload", segments[1])?;
        let signature = decode_segment("signature", segments[2])?;

        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| TokenError::malformed(format!("invalid header JSON: {}", e)))?;

        let signing_input_len = segments[0].len() + 1 + segments[1].len();
        Ok(Self {
            header,
            payload,
            signing_input: compact[..signing_input_len].to_string(),
            signature,
        })
    }

    /// Decoded protected header.
    #[must_use]
    pub fn header(&self) -> &JwsHeader {
        &self.header
    }

    /// Algorithm declared in the header.
    pub fn algorithm(&self) -> Result<SigningAlgorithm, TokenError> {
        SigningAlgorithm::from_name(&self.header.alg)
    }

    /// `kid` from the header. Informational only, never used to pick a key.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// Decoded claim set. Invalid payload JSON is `MalformedToken`.
    pub fn claims(&self) -> Result<Claims, TokenError> {
        Claims::from_slice(&self.payload)
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Check the signature with `key` under the header's algorithm.
    pub fn verify_with(&self, key: &SigningKey) -> Result<bool, TokenError> {
        let algorithm = self.algorithm()?;
        key.verify_input(algorithm, self.signing_input.as_bytes(), &self.signature)
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::malformed(format!("{} is not base64url: {}", name, e)))
}

/// Sign `claims` with `key` under `algorithm`.
pub fn sign(
    claims: &Claims,
    key: &SigningKey,
    algorithm: SigningAlgorithm,
) -> Result<String, TokenError> {
    let header = JwsHeader {
        alg: algorithm.as_str().to_string(),
        kid: Some(key.kid().to_string()),
        typ: Some("JWT".to_string()),
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(claims.to_vec()?);
    let signing_input = format!("{}.{}", header_b64, payload_b64);

    let signature = key.sign_input(algorithm, signing_input.as_bytes())?;
    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify the signature of `compact` with `key`.
///
/// Only the signature is checked; the payload does not have to be JSON and
/// no claim is inspected.
pub fn verify(compact: &str, key: &SigningKey) -> Result<bool, TokenError> {
    CompactJws::parse(compact)?.verify_with(key)
}

/// Parse `compact` into its header and claims without checking the signature.
pub fn decode(compact: &str) -> Result<(JwsHeader, Claims), TokenError> {
    let jws = CompactJws::parse(compact)?;
    let claims = jws.claims()?;
    Ok((jws.header, claims))
}
