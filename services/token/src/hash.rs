//! OIDC token hashes (`at_hash`, `c_hash`).
//!
//! The digest is chosen by the signing algorithm's hash size, the left half
//! of the digest is kept and encoded as unpadded base64url.

use crate::error::TokenError;
use crate::keys::SigningAlgorithm;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash `token` for the JWS algorithm named `algorithm`.
///
/// Fails with `UnsupportedAlgorithm` for `none` and any algorithm outside the
/// supported set.
pub fn compute_hash(algorithm: &str, token: &str) -> Result<String, TokenError> {
    let algorithm = SigningAlgorithm::from_name(algorithm)?;
    Ok(token_hash(algorithm, token))
}

/// `at_hash` for an access token.
#[must_use]
pub fn at_hash(algorithm: SigningAlgorithm, access_token: &str) -> String {
    token_hash(algorithm, access_token)
}

/// `c_hash` for an authorization code.
#[must_use]
pub fn c_hash(algorithm: SigningAlgorithm, code: &str) -> String {
    token_hash(algorithm, code)
}

fn token_hash(algorithm: SigningAlgorithm, token: &str) -> String {
    let digest = match algorithm.hash_len() {
        32 => Sha256::digest(token.as_bytes()).to_vec(),
        48 => Sha384::digest(token.as_bytes()).to_vec(),
        _ => Sha512::digest(token.as_bytes()).to_vec(),
    };
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}
