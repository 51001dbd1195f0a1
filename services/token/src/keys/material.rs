//! Key material parsing and the per-family signing primitives.
//!
//! HMAC keys sign through `ring::hmac`; RSA and EC keys go through
//! `jsonwebtoken::crypto`. Public components are extracted at load time so
//! they can be published without touching private material again.

use crate::error::TokenError;
use crate::keys::algorithm::{AlgorithmFamily, EcCurve, SigningAlgorithm};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{DecodingKey, EncodingKey};
use ring::agreement;
use ring::signature::{EcdsaKeyPair, KeyPair};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::spki::{ObjectIdentifier, SubjectPublicKeyInfoRef};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const MIN_RSA_BITS: usize = 2048;

/// id-ecPublicKey (RFC 5480)
const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Raw key material as supplied by configuration.
#[derive(Clone)]
pub enum KeyMaterial {
    /// HMAC shared secret
    Secret(Vec<u8>),
    /// RSA private key (PKCS#1 or PKCS#8 PEM), with an optional public key
    /// (SPKI or PKCS#1 PEM) that must match it
    RsaPrivatePem {
        /// Private key PEM
        private_pem: String,
        /// Public key PEM
        public_pem: Option<String>,
    },
    /// RSA public key only; verification-only key
    RsaPublicPem(String),
    /// EC private key, PKCS#8 PEM
    EcPrivatePem(String),
    /// EC public key, SPKI PEM; verification-only key
    EcPublicPem(String),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            KeyMaterial::Secret(_) => "Secret",
            KeyMaterial::RsaPrivatePem { .. } => "RsaPrivatePem",
            KeyMaterial::RsaPublicPem(_) => "RsaPublicPem",
            KeyMaterial::EcPrivatePem(_) => "EcPrivatePem",
            KeyMaterial::EcPublicPem(_) => "EcPublicPem",
        };
        f.debug_tuple(kind).field(&"<redacted>").finish()
    }
}

/// Public components of an asymmetric key, big-endian unsigned bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyMaterial {
    /// RSA modulus and public exponent
    Rsa {
        /// Modulus
        n: Vec<u8>,
        /// Public exponent
        e: Vec<u8>,
    },
    /// EC affine point
    Ec {
        /// Curve
        curve: EcCurve,
        /// X coordinate
        x: Vec<u8>,
        /// Y coordinate
        y: Vec<u8>,
    },
}

/// Public key exposed for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Key id
    pub kid: String,
    /// Registered algorithm
    pub algorithm: SigningAlgorithm,
    /// Public components
    pub material: PublicKeyMaterial,
}

enum KeyKind {
    Hmac(Zeroizing<Vec<u8>>),
    Asymmetric {
        encoding: Option<EncodingKey>,
        decoding: DecodingKey,
        public: PublicKeyMaterial,
    },
}

/// A loaded signing/verification key. Immutable once built.
pub struct SigningKey {
    kid: String,
    algorithm: SigningAlgorithm,
    kind: KeyKind,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.can_sign())
            .field("material", &"<redacted>")
            .finish()
    }
}

impl SigningKey {
    /// Build a key, checking that `material` has the shape `algorithm` needs.
    pub fn from_material(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        material: KeyMaterial,
    ) -> Result<Self, TokenError> {
        let kid = kid.into();
        let kind = match (algorithm.family(), material) {
            (AlgorithmFamily::Hmac, KeyMaterial::Secret(secret)) => {
                if secret.len() < algorithm.hash_len() {
                    return Err(TokenError::config(format!(
                        "Key {}: {} requires a secret of at least {} bytes, got {}",
                        kid,
                        algorithm,
                        algorithm.hash_len(),
                        secret.len()
                    )));
                }
                KeyKind::Hmac(Zeroizing::new(secret))
            }
            (AlgorithmFamily::Rsa, KeyMaterial::RsaPrivatePem { private_pem, public_pem }) => {
                load_rsa_private(&kid, &private_pem, public_pem.as_deref())?
            }
            (AlgorithmFamily::Rsa, KeyMaterial::RsaPublicPem(public_pem)) => {
                load_rsa_public(&kid, &public_pem)?
            }
            (AlgorithmFamily::Ec(curve), KeyMaterial::EcPrivatePem(private_pem)) => {
                load_ec_private(&kid, curve, &private_pem)?
            }
            (AlgorithmFamily::Ec(curve), KeyMaterial::EcPublicPem(public_pem)) => {
                load_ec_public(&kid, curve, &public_pem)?
            }
            (_, material) => {
                return Err(TokenError::config(format!(
                    "Key {}: {:?} material cannot be used for {}",
                    kid, material, algorithm
                )));
            }
        };

        Ok(Self {
            kid,
            algorithm,
            kind,
        })
    }

    /// HMAC verifier for an OAuth client secret.
    ///
    /// Client secrets are chosen at client registration, so the registry's
    /// minimum-length rule is not applied when the verifier is built.
    #[must_use]
    pub fn client_secret(client_id: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            kid: client_id.into(),
            algorithm: SigningAlgorithm::HS256,
            kind: KeyKind::Hmac(Zeroizing::new(secret.to_vec())),
        }
    }

    /// Key id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm the key was registered with.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// False for verification-only keys.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        match &self.kind {
            KeyKind::Hmac(_) => true,
            KeyKind::Asymmetric { encoding, .. } => encoding.is_some(),
        }
    }

    /// True when `algorithm` belongs to this key's family.
    #[must_use]
    pub fn supports(&self, algorithm: SigningAlgorithm) -> bool {
        algorithm.family() == self.algorithm.family()
    }

    /// True when [`SigningKey::sign_input`] would accept `algorithm`.
    #[must_use]
    pub fn can_sign_with(&self, algorithm: SigningAlgorithm) -> bool {
        if !self.supports(algorithm) {
            return false;
        }
        match &self.kind {
            KeyKind::Hmac(secret) => secret.len() >= algorithm.hash_len(),
            KeyKind::Asymmetric { encoding, .. } => encoding.is_some(),
        }
    }

    /// Public half of the key; `None` for HMAC secrets.
    #[must_use]
    pub fn public_key(&self) -> Option<PublicKey> {
        match &self.kind {
            KeyKind::Hmac(_) => None,
            KeyKind::Asymmetric { public, .. } => Some(PublicKey {
                kid: self.kid.clone(),
                algorithm: self.algorithm,
                material: public.clone(),
            }),
        }
    }

    /// Sign `input` and return the base64url signature segment.
    pub(crate) fn sign_input(
        &self,
        algorithm: SigningAlgorithm,
        input: &[u8],
    ) -> Result<String, TokenError> {
        if !self.supports(algorithm) {
            return Err(TokenError::mismatch(&self.kid, algorithm.as_str()));
        }

        match &self.kind {
            KeyKind::Hmac(secret) => {
                if secret.len() < algorithm.hash_len() {
                    return Err(TokenError::mismatch(&self.kid, algorithm.as_str()));
                }
                let hmac_alg = algorithm
                    .hmac_algorithm()
                    .ok_or_else(|| TokenError::mismatch(&self.kid, algorithm.as_str()))?;
                let key = ring::hmac::Key::new(hmac_alg, secret);
                let tag = ring::hmac::sign(&key, input);
                Ok(URL_SAFE_NO_PAD.encode(tag.as_ref()))
            }
            KeyKind::Asymmetric { encoding, .. } => {
                let encoding = encoding.as_ref().ok_or_else(|| {
                    TokenError::signing(format!("Key {} has no private component", self.kid))
                })?;
                Ok(jsonwebtoken::crypto::sign(
                    input,
                    encoding,
                    algorithm.to_jsonwebtoken(),
                )?)
            }
        }
    }

    /// Check `signature` over `input`. `Ok(false)` means the signature did
    /// not match; errors are reserved for key/algorithm problems.
    pub(crate) fn verify_input(
        &self,
        algorithm: SigningAlgorithm,
        input: &[u8],
        signature: &[u8],
    ) -> Result<bool, TokenError> {
        if !self.supports(algorithm) {
            return Err(TokenError::mismatch(&self.kid, algorithm.as_str()));
        }

        match &self.kind {
            KeyKind::Hmac(secret) => {
                let hmac_alg = algorithm
                    .hmac_algorithm()
                    .ok_or_else(|| TokenError::mismatch(&self.kid, algorithm.as_str()))?;
                let key = ring::hmac::Key::new(hmac_alg, secret);
                let expected = ring::hmac::sign(&key, input);
                let expected = expected.as_ref();
                if expected.len() != signature.len() {
                    return Ok(false);
                }
                Ok(expected.ct_eq(signature).into())
            }
            KeyKind::Asymmetric { decoding, .. } => {
                let encoded = URL_SAFE_NO_PAD.encode(signature);
                Ok(jsonwebtoken::crypto::verify(
                    &encoded,
                    input,
                    decoding,
                    algorithm.to_jsonwebtoken(),
                )?)
            }
        }
    }
}

fn parse_rsa_private(kid: &str, pem: &str) -> Result<RsaPrivateKey, TokenError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| TokenError::config(format!("Key {}: invalid RSA private key: {}", kid, e)))
}

fn parse_rsa_public(kid: &str, pem: &str) -> Result<RsaPublicKey, TokenError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| TokenError::config(format!("Key {}: invalid RSA public key: {}", kid, e)))
}

fn check_rsa_size(kid: &str, public: &RsaPublicKey) -> Result<(), TokenError> {
    let bits = public.size() * 8;
    if bits < MIN_RSA_BITS {
        return Err(TokenError::config(format!(
            "Key {}: RSA modulus of {} bits is below the {} bit minimum",
            kid, bits, MIN_RSA_BITS
        )));
    }
    Ok(())
}

fn rsa_decoding_key(kid: &str, n: &[u8], e: &[u8]) -> Result<DecodingKey, TokenError> {
    DecodingKey::from_rsa_components(&URL_SAFE_NO_PAD.encode(n), &URL_SAFE_NO_PAD.encode(e))
        .map_err(|err| TokenError::config(format!("Key {}: {}", kid, err)))
}

fn load_rsa_private(
    kid: &str,
    private_pem: &str,
    public_pem: Option<&str>,
) -> Result<KeyKind, TokenError> {
    let private = parse_rsa_private(kid, private_pem)?;
    private
        .validate()
        .map_err(|e| TokenError::config(format!("Key {}: inconsistent RSA key: {}", kid, e)))?;

    let public = private.to_public_key();
    check_rsa_size(kid, &public)?;

    if let Some(pem) = public_pem {
        if parse_rsa_public(kid, pem)? != public {
            return Err(TokenError::config(format!(
                "Key {}: RSA public key does not belong to the private key",
                kid
            )));
        }
    }

    let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
        .map_err(|e| TokenError::config(format!("Key {}: {}", kid, e)))?;
    let n = public.n().to_bytes_be();
    let e = public.e().to_bytes_be();
    let decoding = rsa_decoding_key(kid, &n, &e)?;

    Ok(KeyKind::Asymmetric {
        encoding: Some(encoding),
        decoding,
        public: PublicKeyMaterial::Rsa { n, e },
    })
}

fn load_rsa_public(kid: &str, public_pem: &str) -> Result<KeyKind, TokenError> {
    let public = parse_rsa_public(kid, public_pem)?;
    check_rsa_size(kid, &public)?;

    let n = public.n().to_bytes_be();
    let e = public.e().to_bytes_be();
    let decoding = rsa_decoding_key(kid, &n, &e)?;

    Ok(KeyKind::Asymmetric {
        encoding: None,
        decoding,
        public: PublicKeyMaterial::Rsa { n, e },
    })
}

fn ec_signing_algorithm(curve: EcCurve) -> &'static ring::signature::EcdsaSigningAlgorithm {
    match curve {
        EcCurve::P256 => &ring::signature::ECDSA_P256_SHA256_FIXED_SIGNING,
        EcCurve::P384 => &ring::signature::ECDSA_P384_SHA384_FIXED_SIGNING,
    }
}

fn pem_contents(kid: &str, pem_text: &str, expected_tag: &str) -> Result<Vec<u8>, TokenError> {
    let parsed = pem::parse(pem_text)
        .map_err(|e| TokenError::config(format!("Key {}: invalid PEM: {}", kid, e)))?;
    if parsed.tag() != expected_tag {
        return Err(TokenError::config(format!(
            "Key {}: expected a {} PEM block, got {}",
            kid,
            expected_tag,
            parsed.tag()
        )));
    }
    Ok(parsed.contents().to_vec())
}

/// Split an uncompressed SEC1 point (`0x04 || x || y`) into coordinates.
fn split_ec_point(kid: &str, curve: EcCurve, point: &[u8]) -> Result<PublicKeyMaterial, TokenError> {
    let len = curve.coordinate_len();
    if point.len() != 1 + 2 * len || point[0] != 0x04 {
        return Err(TokenError::config(format!(
            "Key {}: public point is not an uncompressed {} point",
            kid,
            curve.name()
        )));
    }
    Ok(PublicKeyMaterial::Ec {
        curve,
        x: point[1..=len].to_vec(),
        y: point[1 + len..].to_vec(),
    })
}

fn ec_decoding_key(kid: &str, public: &PublicKeyMaterial) -> Result<DecodingKey, TokenError> {
    match public {
        PublicKeyMaterial::Ec { x, y, .. } => {
            DecodingKey::from_ec_components(&URL_SAFE_NO_PAD.encode(x), &URL_SAFE_NO_PAD.encode(y))
                .map_err(|e| TokenError::config(format!("Key {}: {}", kid, e)))
        }
        PublicKeyMaterial::Rsa { .. } => Err(TokenError::config(format!(
            "Key {}: expected EC public components",
            kid
        ))),
    }
}

fn load_ec_private(kid: &str, curve: EcCurve, private_pem: &str) -> Result<KeyKind, TokenError> {
    let der = Zeroizing::new(pem_contents(kid, private_pem, "PRIVATE KEY")?);
    let rng = ring::rand::SystemRandom::new();
    let pair = EcdsaKeyPair::from_pkcs8(ec_signing_algorithm(curve), &der, &rng).map_err(|e| {
        TokenError::config(format!(
            "Key {}: not a PKCS#8 {} key: {}",
            kid,
            curve.name(),
            e
        ))
    })?;

    let public = split_ec_point(kid, curve, pair.public_key().as_ref())?;
    let encoding = EncodingKey::from_ec_pem(private_pem.as_bytes())
        .map_err(|e| TokenError::config(format!("Key {}: {}", kid, e)))?;
    let decoding = ec_decoding_key(kid, &public)?;

    Ok(KeyKind::Asymmetric {
        encoding: Some(encoding),
        decoding,
        public,
    })
}

fn ec_curve_oid(curve: EcCurve) -> ObjectIdentifier {
    match curve {
        EcCurve::P256 => SECP256R1,
        EcCurve::P384 => SECP384R1,
    }
}

fn ecdh_algorithm(curve: EcCurve) -> &'static agreement::Algorithm {
    match curve {
        EcCurve::P256 => &agreement::ECDH_P256,
        EcCurve::P384 => &agreement::ECDH_P384,
    }
}

/// Full public-key validation: the point must be a valid, non-identity point
/// of `curve`. ring runs this check on every ECDH peer key.
fn check_ec_point(kid: &str, curve: EcCurve, point: &[u8]) -> Result<(), TokenError> {
    let rng = ring::rand::SystemRandom::new();
    let ephemeral = agreement::EphemeralPrivateKey::generate(ecdh_algorithm(curve), &rng)
        .map_err(|_| TokenError::config(format!("Key {}: cannot check {} point", kid, curve.name())))?;
    let peer = agreement::UnparsedPublicKey::new(ecdh_algorithm(curve), point);
    agreement::agree_ephemeral(ephemeral, &peer, |_| ()).map_err(|_| {
        TokenError::config(format!(
            "Key {}: public point is not on {}",
            kid,
            curve.name()
        ))
    })
}

fn load_ec_public(kid: &str, curve: EcCurve, public_pem: &str) -> Result<KeyKind, TokenError> {
    let der = pem_contents(kid, public_pem, "PUBLIC KEY")?;
    let spki = SubjectPublicKeyInfoRef::try_from(der.as_slice()).map_err(|e| {
        TokenError::config(format!("Key {}: invalid SubjectPublicKeyInfo: {}", kid, e))
    })?;

    if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
        return Err(TokenError::config(format!(
            "Key {}: expected an EC public key, got algorithm {}",
            kid, spki.algorithm.oid
        )));
    }
    let named_curve = spki.algorithm.parameters_oid().map_err(|e| {
        TokenError::config(format!("Key {}: EC key without a named curve: {}", kid, e))
    })?;
    if named_curve != ec_curve_oid(curve) {
        return Err(TokenError::config(format!(
            "Key {}: expected a {} key, got curve {}",
            kid,
            curve.name(),
            named_curve
        )));
    }

    let point = spki.subject_public_key.as_bytes().ok_or_else(|| {
        TokenError::config(format!("Key {}: public key is not a whole number of bytes", kid))
    })?;
    let public = split_ec_point(kid, curve, point)?;
    check_ec_point(kid, curve, point)?;
    let decoding = ec_decoding_key(kid, &public)?;

    Ok(KeyKind::Asymmetric {
        encoding: None,
        decoding,
        public,
    })
}
