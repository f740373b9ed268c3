//! Key material: loading, generation, rotation and the raw RSA primitives.

pub mod provisioner;
pub mod ring;
pub mod store;

pub use provisioner::{KeyPairProvisioner, ProvisionedKeyPair};
pub use ring::KeyRing;
pub use store::{load_public_key, KeyMaterial, MAX_KEY_BITS, MIN_KEY_BITS};
