//! Prometheus metrics for token signing, validation and grant lifecycles.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, CounterVec};

/// Tokens signed counter.
pub static TOKENS_SIGNED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "oidc_tokens_signed_total",
        "Total number of tokens signed",
        &["algorithm"]
    )
    .expect("Failed to register tokens_signed metric")
});

/// Signature validations counter.
pub static SIGNATURE_VALIDATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "oidc_signature_validations_total",
        "Total number of signature validations",
        &["outcome"]
    )
    .expect("Failed to register signature_validations metric")
});

/// Grants created counter.
pub static GRANTS_CREATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "oidc_grants_created_total",
        "Total number of expiring grants created",
        &["kind"]
    )
    .expect("Failed to register grants_created metric")
});

/// Grant redemption attempts counter.
pub static GRANTS_REDEEMED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "oidc_grants_redeemed_total",
        "Total number of grant redemption attempts",
        &["kind", "outcome"]
    )
    .expect("Failed to register grants_redeemed metric")
});

/// Grants removed by expiry sweeps.
pub static GRANTS_SWEPT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "oidc_grants_swept_total",
        "Total number of expired grants swept",
        &["kind"]
    )
    .expect("Failed to register grants_swept metric")
});

/// Record a signed token.
pub fn record_token_signed(algorithm: &str) {
    TOKENS_SIGNED.with_label_values(&[algorithm]).inc();
}

/// Record a signature validation (`valid`, `invalid`, `malformed`, `error`).
pub fn record_signature_validation(outcome: &str) {
    SIGNATURE_VALIDATIONS.with_label_values(&[outcome]).inc();
}

/// Record a created grant.
pub fn record_grant_created(kind: &str) {
    GRANTS_CREATED.with_label_values(&[kind]).inc();
}

/// Record a redemption attempt.
pub fn record_grant_redeemed(kind: &str, outcome: &str) {
    GRANTS_REDEEMED.with_label_values(&[kind, outcome]).inc();
}

/// Record swept grants.
pub fn record_grants_swept(kind: &str, count: usize) {
    GRANTS_SWEPT.with_label_values(&[kind]).inc_by(count as f64);
}
