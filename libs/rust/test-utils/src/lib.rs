//! Shared test utilities for the OIDC token core.
//!
//! This crate provides:
//! - Proptest generators for issuers, subjects, claim sets, secrets and tokens
//! - Key fixtures (HMAC secrets, RSA and EC PEM pairs) generated once per
//!   test binary

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use generators::*;
