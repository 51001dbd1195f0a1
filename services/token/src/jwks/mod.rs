//! JWK Set rendering of the registry's public keys (RFC 7517).

use crate::keys::{PublicKey, PublicKeyMaterial};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// One public key as a JWK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, `RSA` or `EC`
    pub kty: String,
    /// Key id
    pub kid: String,
    /// Always `sig`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm the key is registered for
    pub alg: String,
    /// RSA modulus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC curve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl From<&PublicKey> for Jwk {
    fn from(key: &PublicKey) -> Self {
        let mut jwk = Jwk {
            kty: String::new(),
            kid: key.kid.clone(),
            key_use: "sig".to_string(),
            alg: key.algorithm.as_str().to_string(),
            n: None,
            e: None,
            crv: None,
            x: None,
            y: None,
        };

        match &key.material {
            PublicKeyMaterial::Rsa { n, e } => {
                jwk.kty = "RSA".to_string();
                jwk.n = Some(URL_SAFE_NO_PAD.encode(n));
                jwk.e = Some(URL_SAFE_NO_PAD.encode(e));
            }
            PublicKeyMaterial::Ec { curve, x, y } => {
                jwk.kty = "EC".to_string();
                jwk.crv = Some(curve.name().to_string());
                jwk.x = Some(URL_SAFE_NO_PAD.encode(x));
                jwk.y = Some(URL_SAFE_NO_PAD.encode(y));
            }
        }

        jwk
    }
}

/// A JWK Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// Keys in registry order
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Render `keys` in order.
    #[must_use]
    pub fn from_public_keys(keys: &[PublicKey]) -> Self {
        Jwks {
            keys: keys.iter().map(Jwk::from).collect(),
        }
    }

    /// Key with this kid.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Serialize for the `jwks_uri` endpoint.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{EcCurve, SigningAlgorithm};

    #[test]
    fn test_rsa_jwk() {
        let key = PublicKey {
            kid: "key-1".to_string(),
            algorithm: SigningAlgorithm::RS256,
            material: PublicKeyMaterial::Rsa {
                n: vec![0xc0, 0xff, 0xee],
                e: vec![0x01, 0x00, 0x01],
            },
        };

        let jwk = Jwk::from(&key);
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert!(jwk.crv.is_none());
    }

    #[test]
    fn test_ec_jwk_serialization() {
        let key = PublicKey {
            kid: "ec-1".to_string(),
            algorithm: SigningAlgorithm::ES256,
            material: PublicKeyMaterial::Ec {
                curve: EcCurve::P256,
                x: vec![1; 32],
                y: vec![2; 32],
            },
        };

        let jwks = Jwks::from_public_keys(&[key]);
        let json: serde_json::Value = serde_json::from_str(&jwks.to_json().unwrap()).unwrap();
        let first = &json["keys"][0];
        assert_eq!(first["kty"], "EC");
        assert_eq!(first["crv"], "P-256");
        assert_eq!(first["use"], "sig");
        assert!(first.get("n").is_none());
        assert!(jwks.find("ec-1").is_some());
    }
}
