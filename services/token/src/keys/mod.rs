//! Signing keys: algorithms, material parsing and the registry.

pub mod algorithm;
pub mod keyset;
pub mod material;
pub mod registry;

pub use algorithm::{AlgorithmFamily, EcCurve, SigningAlgorithm};
pub use keyset::{KeyEntryConfig, KeySetConfig};
pub use material::{KeyMaterial, PublicKey, PublicKeyMaterial, SigningKey};
pub use registry::{KeyRegistry, KeyRegistryBuilder};
