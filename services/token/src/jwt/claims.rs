use crate::error::TokenError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Registered claim names used by the accessors below.
pub mod names {
    /// Issuer
    pub const ISSUER: &str = "iss";
    /// Subject
    pub const SUBJECT: &str = "sub";
    /// Audience, a string or an array of strings
    pub const AUDIENCE: &str = "aud";
    /// Expiration time
    pub const EXPIRATION: &str = "exp";
    /// Issued-at time
    pub const ISSUED_AT: &str = "iat";
    /// Not-before time
    pub const NOT_BEFORE: &str = "nbf";
    /// Token id
    pub const JWT_ID: &str = "jti";
    /// Authentication request nonce
    pub const NONCE: &str = "nonce";
    /// Space-delimited scopes
    pub const SCOPE: &str = "scope";
    /// Access token hash
    pub const ACCESS_TOKEN_HASH: &str = "at_hash";
    /// Authorization code hash
    pub const CODE_HASH: &str = "c_hash";
}

/// JWT claim set: an ordered JSON object.
///
/// Values are never mutated in place; [`Claims::with_claim`] and
/// [`Claims::without_claim`] return a modified copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of these claims with `name` set to `value`. An existing claim
    /// keeps its position.
    #[must_use]
    pub fn with_claim(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = self.0.clone();
        map.insert(name.into(), value.into());
        Self(map)
    }

    /// Copy of these claims without `name`.
    #[must_use]
    pub fn without_claim(&self, name: &str) -> Self {
        let mut map = self.0.clone();
        map.shift_remove(name);
        Self(map)
    }

    /// Raw value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// True when `name` is present, whatever its value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// NumericDate claims; fractional seconds are truncated.
    fn time_claim(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        }
    }

    /// `iss` when it is a string.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.str_claim(names::ISSUER)
    }

    /// `sub` when it is a string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.str_claim(names::SUBJECT)
    }

    /// `aud` may be a single string or an array of strings.
    #[must_use]
    pub fn audience(&self) -> Vec<&str> {
        match self.0.get(names::AUDIENCE) {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Numeric `exp`. `None` when absent or not a number; use
    /// [`Claims::contains`] to tell the two apart.
    #[must_use]
    pub fn expiration(&self) -> Option<i64> {
        self.time_claim(names::EXPIRATION)
    }

    /// Numeric `iat`.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.time_claim(names::ISSUED_AT)
    }

    /// Numeric `nbf`.
    #[must_use]
    pub fn not_before(&self) -> Option<i64> {
        self.time_claim(names::NOT_BEFORE)
    }

    /// `jti` when it is a string.
    #[must_use]
    pub fn jwt_id(&self) -> Option<&str> {
        self.str_claim(names::JWT_ID)
    }

    /// `nonce` when it is a string.
    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.str_claim(names::NONCE)
    }

    /// Space-delimited `scope` split into its values.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.str_claim(names::SCOPE)
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// `at_hash` when it is a string.
    #[must_use]
    pub fn access_token_hash(&self) -> Option<&str> {
        self.str_claim(names::ACCESS_TOKEN_HASH)
    }

    /// `c_hash` when it is a string.
    #[must_use]
    pub fn code_hash(&self) -> Option<&str> {
        self.str_claim(names::CODE_HASH)
    }

    /// Claim names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON object.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Parse a JWS payload; anything but a JSON object is malformed.
    pub fn from_slice(payload: &[u8]) -> Result<Self, TokenError> {
        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(_) => Err(TokenError::malformed("payload is not a JSON object")),
            Err(e) => Err(TokenError::malformed(format!("invalid payload JSON: {}", e))),
        }
    }

    /// Serialize as a JWS payload.
    pub fn to_vec(&self) -> Result<Vec<u8>, TokenError> {
        Ok(serde_json::to_vec(&self.0)?)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Claims {
    type Error = TokenError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(TokenError::malformed("claims must be a JSON object")),
        }
    }
}
