//! Shared proptest generators for token core tests.

use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;

/// Every supported JWS algorithm name.
pub const ALGORITHM_NAMES: [&str; 11] = [
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256",
    "ES384",
];

/// Generate issuer URLs.
pub fn issuer_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{3,12}", prop_oneof![Just("com"), Just("org"), Just("net")])
        .prop_map(|(host, tld)| format!("https://{}.example.{}", host, tld))
}

/// Generate subject identifiers.
pub fn subject_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,32}"
}

/// Generate audience lists (1 to 3 client ids).
pub fn audience_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z][a-z0-9-]{2,15}", 1..=3)
}

/// Generate Unix timestamps between 2001 and 2096.
pub fn unix_timestamp_strategy() -> impl Strategy<Value = i64> {
    1_000_000_000i64..4_000_000_000i64
}

/// Generate claim sets with `iss`, `sub`, `aud`, `iat`, `exp` and a few
/// custom string claims.
pub fn claims_map_strategy() -> impl Strategy<Value = Map<String, Value>> {
    (
        issuer_strategy(),
        subject_strategy(),
        audience_strategy(),
        unix_timestamp_strategy(),
        1i64..86_400,
        prop::collection::btree_map("x_[a-z]{1,8}", "[ -~]{0,24}", 0..4),
    )
        .prop_map(|(iss, sub, aud, iat, ttl, custom)| {
            let mut map = Map::new();
            map.insert("iss".into(), iss.into());
            map.insert("sub".into(), sub.into());
            map.insert("aud".into(), aud.into());
            map.insert("iat".into(), iat.into());
            map.insert("exp".into(), (iat + ttl).into());
            for (name, value) in custom {
                map.insert(name, value.into());
            }
            map
        })
}

/// Generate JWS algorithm names.
pub fn jwt_algorithm_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(ALGORITHM_NAMES.to_vec()).prop_map(str::to_string)
}

/// Generate HMAC algorithm names.
pub fn hmac_algorithm_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("HS256".to_string()),
        Just("HS384".to_string()),
        Just("HS512".to_string()),
    ]
}

/// Generate names that are not supported JWS algorithms.
pub fn unsupported_algorithm_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("none".to_string()),
        Just("EdDSA".to_string()),
        Just("ES512".to_string()),
        Just("hs256".to_string()),
        "[A-Z]{2}[0-9]{1,2}".prop_filter("must not be a supported name", |name| {
            !ALGORITHM_NAMES.contains(&name.as_str())
        }),
    ]
}

/// Generate HMAC secrets of at least `min_len` bytes.
pub fn hmac_secret_strategy(min_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), min_len..=min_len + 32)
}

/// Generate opaque token values (access tokens, codes).
pub fn token_value_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.~-]{16,64}"
}

/// Generate non-empty scope sets.
pub fn scope_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(
        prop_oneof![
            Just("openid".to_string()),
            Just("profile".to_string()),
            Just("email".to_string()),
            Just("offline_access".to_string()),
            "[a-z]{3,10}",
        ],
        1..5,
    )
}

/// Generate TTL values (1 minute to 24 hours).
pub fn ttl_strategy() -> impl Strategy<Value = Duration> {
    (60u64..86400).prop_map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_issuer_format() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let value = issuer_strategy().new_tree(&mut runner).unwrap().current();
            assert!(value.starts_with("https://"));
            assert!(value.contains(".example."));
        }
    }

    #[test]
    fn test_claims_map_has_registered_claims() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let value = claims_map_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            for name in ["iss", "sub", "aud", "iat", "exp"] {
                assert!(value.contains_key(name));
            }
            assert!(value["exp"].as_i64().unwrap() > value["iat"].as_i64().unwrap());
        }
    }

    #[test]
    fn test_unsupported_names_are_unsupported() {
        let mut runner = TestRunner::default();
        for _ in 0..20 {
            let value = unsupported_algorithm_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(!ALGORITHM_NAMES.contains(&value.as_str()));
        }
    }

    #[test]
    fn test_ttl_range() {
        let mut runner = TestRunner::default();
        for _ in 0..10 {
            let value = ttl_strategy().new_tree(&mut runner).unwrap().current();
            assert!(value.as_secs() >= 60);
            assert!(value.as_secs() < 86400);
        }
    }
}
