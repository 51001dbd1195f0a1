//! Multi-key signing and validation.

pub mod client_secret;
pub mod service;

pub use client_secret::ClientSecretVerifierCache;
pub use service::SigningService;
