//! Fresh key pairs for bootstrapping a new issuer identity.

use super::store::KeyMaterial;
use crate::error::TokenError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

/// File name the provisioner writes the private key to.
pub const PRIVATE_KEY_FILE_NAME: &str = "key-private.pem";

/// File name the provisioner writes the public key to.
pub const PUBLIC_KEY_FILE_NAME: &str = "key-public.pem";

/// A generated key pair together with its PEM export forms.
pub struct ProvisionedKeyPair {
    /// The generated key pair.
    pub material: KeyMaterial,
    /// PKCS#8 PEM of the private key. Wiped on drop.
    pub private_key_pem: Zeroizing<String>,
    /// SPKI PEM of the public key.
    pub public_key_pem: String,
}

impl ProvisionedKeyPair {
    /// Writes both PEM files into `dir`, creating it if needed.
    ///
    /// Existing key files are never replaced: overwriting the issuer's pair
    /// would make every token it has issued unverifiable. On Unix the
    /// private key file is created owner-only.
    ///
    /// Returns the private and public key paths.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Internal`] if either file already exists or on
    /// any other filesystem failure. Nothing is left behind on error.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf), TokenError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| write_error(dir, e))?;

        let private_path = dir.join(PRIVATE_KEY_FILE_NAME);
        let public_path = dir.join(PUBLIC_KEY_FILE_NAME);

        let private_file = create_new(&private_path, 0o600).map_err(|e| write_error(&private_path, e))?;
        let public_file = match create_new(&public_path, 0o644) {
            Ok(file) => file,
            Err(e) => {
                drop(private_file);
                let _ = fs::remove_file(&private_path);
                return Err(write_error(&public_path, e));
            }
        };

        let written = write_pem(private_file, self.private_key_pem.as_bytes())
            .map_err(|e| write_error(&private_path, e))
            .and_then(|()| {
                write_pem(public_file, self.public_key_pem.as_bytes())
                    .map_err(|e| write_error(&public_path, e))
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&private_path);
            let _ = fs::remove_file(&public_path);
            return Err(e);
        }

        info!(
            private_key_file = %private_path.display(),
            public_key_file = %public_path.display(),
            "Wrote key pair"
        );

        Ok((private_path, public_path))
    }
}

fn create_new(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn write_pem(mut file: File, pem: &[u8]) -> io::Result<()> {
    file.write_all(pem)?;
    file.sync_all()
}

fn write_error(path: &Path, e: io::Error) -> TokenError {
    if e.kind() == io::ErrorKind::AlreadyExists {
        TokenError::Internal(format!("refusing to overwrite existing key file {}", path.display()))
    } else {
        TokenError::Internal(format!("{}: {}", path.display(), e))
    }
}

/// Stateless key pair generator. Nothing is persisted unless the operator
/// calls [`ProvisionedKeyPair::write_to_dir`].
pub struct KeyPairProvisioner;

impl KeyPairProvisioner {
    /// Generate a key pair of `bits` and its PEM forms.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyGeneration`] for unsupported sizes.
    pub fn provision(bits: usize) -> Result<ProvisionedKeyPair, TokenError> {
        let material = KeyMaterial::generate(bits)?;
        let private_key_pem = material.private_key_pem()?;
        let public_key_pem = material.public_key_pem()?;

        info!(bits, "Provisioned key pair");

        Ok(ProvisionedKeyPair {
            material,
            private_key_pem,
            public_key_pem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_pem_forms_match_material() {
        let provisioned = KeyPairProvisioner::provision(512).unwrap();
        let reloaded =
            KeyMaterial::from_pem(&provisioned.private_key_pem, &provisioned.public_key_pem).unwrap();

        let signature = provisioned.material.sign(b"hello").unwrap();
        assert_eq!(reloaded.verify(&signature).unwrap(), b"hello");
    }

    #[test]
    fn test_provision_rejects_small_key() {
        assert!(matches!(
            KeyPairProvisioner::provision(128),
            Err(TokenError::KeyGeneration(_))
        ));
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let provisioned = KeyPairProvisioner::provision(512).unwrap();

        let (private_path, public_path) = provisioned.write_to_dir(dir.path().join("keys")).unwrap();
        assert!(private_path.exists());
        assert!(public_path.exists());

        let loaded = KeyMaterial::load(&private_path, &public_path).unwrap();
        assert_eq!(loaded.bits(), 512);
    }

    #[test]
    fn test_write_to_dir_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let first = KeyPairProvisioner::provision(512).unwrap();
        let (private_path, _) = first.write_to_dir(dir.path()).unwrap();
        let original = fs::read_to_string(&private_path).unwrap();

        let second = KeyPairProvisioner::provision(512).unwrap();
        let result = second.write_to_dir(dir.path());

        assert!(matches!(result, Err(TokenError::Internal(_))));
        assert_eq!(fs::read_to_string(&private_path).unwrap(), original);
    }

    #[test]
    fn test_write_to_dir_leaves_nothing_when_public_key_exists() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PUBLIC_KEY_FILE_NAME), "existing").unwrap();

        let provisioned = KeyPairProvisioner::provision(512).unwrap();
        assert!(provisioned.write_to_dir(dir.path()).is_err());

        assert!(!dir.path().join(PRIVATE_KEY_FILE_NAME).exists());
        assert_eq!(
            fs::read_to_string(dir.path().join(PUBLIC_KEY_FILE_NAME)).unwrap(),
            "existing"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let provisioned = KeyPairProvisioner::provision(512).unwrap();
        let (private_path, _) = provisioned.write_to_dir(dir.path()).unwrap();

        let mode = fs::metadata(&private_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }
}
