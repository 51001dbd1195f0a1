use crate::error::TokenError;
use crate::hash;
use crate::jwt::claims::{names, Claims};
use crate::keys::SigningAlgorithm;
use serde_json::{Map, Value};

const DEFAULT_TTL_SECONDS: i64 = 900;

/// Assembles a claim set in the conventional order
/// (`iss sub aud exp iat nbf jti nonce scope at_hash c_hash`, then custom claims).
#[derive(Debug, Clone)]
pub struct ClaimsBuilder {
    issuer: String,
    subject: Option<String>,
    audience: Vec<String>,
    ttl_seconds: i64,
    issued_at: Option<i64>,
    not_before: bool,
    jwt_id: Option<String>,
    nonce: Option<String>,
    scopes: Vec<String>,
    at_hash: Option<String>,
    c_hash: Option<String>,
    custom_claims: Map<String, Value>,
}

impl ClaimsBuilder {
    /// Builder for tokens issued by `issuer`, valid for 15 minutes by default.
    pub fn new(issuer: impl Into<String>) -> Self {
        ClaimsBuilder {
            issuer: issuer.into(),
            subject: None,
            audience: Vec::new(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            issued_at: None,
            not_before: false,
            jwt_id: None,
            nonce: None,
            scopes: Vec::new(),
            at_hash: None,
            c_hash: None,
            custom_claims: Map::new(),
        }
    }

    /// Set `sub`; required.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set `aud`. One value is written as a string, several as an array.
    pub fn audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }

    /// Lifetime added to `iat` to form `exp`.
    pub fn ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    /// Pin `iat`; defaults to the current time when the claims are built.
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.issued_at = Some(timestamp);
        self
    }

    /// Emit `nbf` equal to `iat`.
    pub fn not_before_now(mut self) -> Self {
        self.not_before = true;
        self
    }

    /// Override the generated `jti`.
    pub fn jwt_id(mut self, jti: impl Into<String>) -> Self {
        self.jwt_id = Some(jti.into());
        self
    }

    /// Echo the authentication request nonce.
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the granted scopes, written space-delimited.
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Bind the token to an access token through `at_hash`.
    pub fn access_token_hash(
        mut self,
        algorithm: SigningAlgorithm,
        access_token: &str,
    ) -> Self {
        self.at_hash = Some(hash::at_hash(algorithm, access_token));
        self
    }

    /// Bind the token to an authorization code through `c_hash`.
    pub fn code_hash(mut self, algorithm: SigningAlgorithm, code: &str) -> Self {
        self.c_hash = Some(hash::c_hash(algorithm, code));
        self
    }

    /// Extra claim; registered claims set above win on a name clash.
    pub fn custom_claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_claims.insert(key.into(), value.into());
        self
    }

    /// Assemble the claim set.
    ///
    /// Fails without a subject, with a non-positive TTL, or when `exp` would
    /// overflow.
    pub fn build(self) -> Result<Claims, TokenError> {
        let subject = self
            .subject
            .ok_or_else(|| TokenError::config("Subject is required"))?;
        if self.ttl_seconds <= 0 {
            return Err(TokenError::config("Token TTL must be positive"));
        }

        let iat = self
            .issued_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let exp = iat
            .checked_add(self.ttl_seconds)
            .ok_or_else(|| TokenError::config("Token expiry overflows the timestamp range"))?;

        let mut map = Map::new();
        map.insert(names::ISSUER.into(), self.issuer.into());
        map.insert(names::SUBJECT.into(), subject.into());
        match self.audience.len() {
            0 => {}
            1 => {
                map.insert(names::AUDIENCE.into(), self.audience[0].clone().into());
            }
            _ => {
                map.insert(names::AUDIENCE.into(), self.audience.into());
            }
        }
        map.insert(names::EXPIRATION.into(), exp.into());
        map.insert(names::ISSUED_AT.into(), iat.into());
        if self.not_before {
            map.insert(names::NOT_BEFORE.into(), iat.into());
        }
        let jti = self
            .jwt_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        map.insert(names::JWT_ID.into(), jti.into());

        if let Some(nonce) = self.nonce {
            map.insert(names::NONCE.into(), nonce.into());
        }
        if !self.scopes.is_empty() {
            map.insert(names::SCOPE.into(), self.scopes.join(" ").into());
        }
        if let Some(at_hash) = self.at_hash {
            map.insert(names::ACCESS_TOKEN_HASH.into(), at_hash.into());
        }
        if let Some(c_hash) = self.c_hash {
            map.insert(names::CODE_HASH.into(), c_hash.into());
        }

        for (key, value) in self.custom_claims {
            map.entry(key).or_insert(value);
        }

        Ok(Claims::from(map))
    }
}
