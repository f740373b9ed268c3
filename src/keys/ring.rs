//! Atomically swappable handle to the active key pair.

use super::store::KeyMaterial;
use crate::config::Config;
use crate::error::TokenError;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Holds the key pair used by issuance and verification.
///
/// Each call takes one [`KeyRing::current`] snapshot and uses it throughout,
/// so a concurrent [`KeyRing::rotate`] is never observed halfway.
#[derive(Debug)]
pub struct KeyRing {
    active: ArcSwap<KeyMaterial>,
}

impl KeyRing {
    /// Creates a ring around an initial key pair.
    #[must_use]
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            active: ArcSwap::from_pointee(material),
        }
    }

    /// Loads the configured key files into a new ring.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyLoad`] if the files cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self, TokenError> {
        Ok(Self::new(KeyMaterial::load(
            &config.private_key_file,
            &config.public_key_file,
        )?))
    }

    /// Snapshot of the active key pair.
    #[must_use]
    pub fn current(&self) -> Arc<KeyMaterial> {
        self.active.load_full()
    }

    /// Replaces the active key pair. In-flight calls keep their snapshot.
    pub fn rotate(&self, material: KeyMaterial) {
        info!(bits = material.bits(), "Rotating key pair");
        self.active.store(Arc::new(material));
    }

    /// Reloads the configured key files and swaps them in.
    ///
    /// The active pair is left untouched if loading fails.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyLoad`] if the files cannot be loaded.
    pub fn reload(&self, config: &Config) -> Result<(), TokenError> {
        let material = KeyMaterial::load(&config.private_key_file, &config.public_key_file)?;
        self.rotate(material);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_rotation() {
        let ring = KeyRing::new(KeyMaterial::generate(512).unwrap());
        let before = ring.current();
        let signature = before.sign(b"message").unwrap();

        ring.rotate(KeyMaterial::generate(512).unwrap());

        // Old snapshot still verifies its own signature
        assert_eq!(before.verify(&signature).unwrap(), b"message");
        // New key does not
        assert!(ring.current().verify(&signature).is_err());
    }

    #[test]
    fn test_current_returns_same_pair_until_rotated() {
        let ring = KeyRing::new(KeyMaterial::generate(512).unwrap());
        let a = ring.current();
        let b = ring.current();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
