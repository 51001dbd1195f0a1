//! JWT claim sets and their compact JWS encoding.

/// Claim set assembly with the registered OIDC claims.
pub mod builder;
/// Ordered JWT claim sets.
pub mod claims;
pub mod jws;

pub use builder::ClaimsBuilder;
pub use claims::Claims;
pub use jws::{CompactJws, JwsHeader};
