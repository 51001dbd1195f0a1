//! OpenID Connect token core.
//!
//! JWS signing and multi-key validation, OIDC token hashes, and the
//! expiring single-use grants (device codes, UMA permission tickets,
//! nonces) of an authorization server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod grants;
pub mod hash;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod metrics;
pub mod signing;
pub mod telemetry;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::TokenError;
pub use grants::GrantError;
pub use jwt::{Claims, ClaimsBuilder};
pub use keys::{KeyMaterial, KeyRegistry, SigningAlgorithm};
pub use signing::{ClientSecretVerifierCache, SigningService};
