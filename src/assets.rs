//! Asset resolution
//!
//! Assets are the raw byte blobs (keys, CSRs, certificates) that vault
//! entities reference by file name. An [`AssetStore`] maps a logical
//! `(kind, name)` pair to a handle and opens it for reading; the vault store
//! in [`crate::storage`] is the file-backed implementation.

use crate::error::{Result, VaultError};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;

/// The closed set of asset kinds a vault stores.
///
/// A PKCS#12 archive is an export target only and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    KeyPem,
    CsrPem,
    CrtPem,
    CrtDer,
    IssuerPem,
}

impl AssetKind {
    /// Subdirectory of the vault root holding assets of this kind.
    pub fn directory(&self) -> &'static str {
        match self {
            AssetKind::KeyPem => "40-KEYPM",
            AssetKind::CsrPem => "45-CSRPM",
            AssetKind::CrtPem => "50-CRTPM",
            AssetKind::CrtDer => "55-CRTDR",
            AssetKind::IssuerPem => "60-ISUPM",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::KeyPem => "key-pem",
            AssetKind::CsrPem => "csr-pem",
            AssetKind::CrtPem => "crt-pem",
            AssetKind::CrtDer => "crt-der",
            AssetKind::IssuerPem => "issuer-pem",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a resolved asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultAsset {
    pub kind: AssetKind,
    pub name: String,
}

pub trait AssetStore {
    /// Resolve a stored asset by kind and file name.
    fn resolve_asset(&self, kind: AssetKind, name: &str) -> Result<VaultAsset>;

    /// Open a resolved asset for reading.
    fn open_asset(&self, asset: &VaultAsset) -> Result<Box<dyn Read>>;
}

/// Open `dest` for writing under the given overwrite policy.
///
/// Without `overwrite` the file must not exist yet; with it, an existing
/// file is truncated.
pub fn create_destination(dest: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(dest).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            VaultError::AlreadyExists(dest.to_path_buf())
        } else {
            VaultError::io(dest, e)
        }
    })
}

/// Stream a stored asset to `dest` without transforming it.
pub fn copy_to_file<S: AssetStore + ?Sized>(
    store: &S,
    kind: AssetKind,
    name: &str,
    dest: &Path,
    overwrite: bool,
) -> Result<u64> {
    let asset = store.resolve_asset(kind, name)?;
    let mut source = store.open_asset(&asset)?;
    let mut target = create_destination(dest, overwrite)?;
    let copied = io::copy(&mut source, &mut target).map_err(|e| VaultError::io(dest, e))?;
    tracing::debug!(kind = %kind, name, dest = %dest.display(), bytes = copied, "copied asset");
    Ok(copied)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// In-memory asset store for exercising export code without a vault root.
    #[derive(Default)]
    pub(crate) struct MemoryAssets {
        pub(crate) assets: HashMap<(AssetKind, String), Vec<u8>>,
    }

    impl MemoryAssets {
        pub(crate) fn with(mut self, kind: AssetKind, name: &str, bytes: &[u8]) -> Self {
            self.assets.insert((kind, name.to_string()), bytes.to_vec());
            self
        }
    }

    impl AssetStore for MemoryAssets {
        fn resolve_asset(&self, kind: AssetKind, name: &str) -> Result<VaultAsset> {
            if self.assets.contains_key(&(kind, name.to_string())) {
                Ok(VaultAsset {
                    kind,
                    name: name.to_string(),
                })
            } else {
                Err(VaultError::AssetNotFound {
                    kind: kind.as_str(),
                    name: name.to_string(),
                })
            }
        }

        fn open_asset(&self, asset: &VaultAsset) -> Result<Box<dyn Read>> {
            let bytes = self
                .assets
                .get(&(asset.kind, asset.name.clone()))
                .cloned()
                .unwrap_or_default();
            Ok(Box::new(Cursor::new(bytes)))
        }
    }

    #[test]
    fn test_copy_to_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryAssets::default().with(AssetKind::CrtDer, "c.der", &[0x30, 0x82, 0x00]);
        let dest = dir.path().join("out.der");

        let copied = copy_to_file(&store, AssetKind::CrtDer, "c.der", &dest, false).unwrap();

        assert_eq!(copied, 3);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![0x30, 0x82, 0x00]);
    }

    #[test]
    fn test_copy_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryAssets::default().with(AssetKind::KeyPem, "k.pem", b"new");
        let dest = dir.path().join("key.pem");
        std::fs::write(&dest, b"original").unwrap();

        let err = copy_to_file(&store, AssetKind::KeyPem, "k.pem", &dest, false).unwrap_err();

        assert!(matches!(err, VaultError::AlreadyExists(ref p) if p == &dest));
        assert_eq!(std::fs::read(&dest).unwrap(), b"original");
    }

    #[test]
    fn test_copy_overwrite_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryAssets::default().with(AssetKind::KeyPem, "k.pem", b"new");
        let dest = dir.path().join("key.pem");
        std::fs::write(&dest, b"a much longer original").unwrap();

        copy_to_file(&store, AssetKind::KeyPem, "k.pem", &dest, true).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_missing_asset_does_not_create_destination() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryAssets::default();
        let dest = dir.path().join("none.pem");

        let err = copy_to_file(&store, AssetKind::CsrPem, "x.pem", &dest, false).unwrap_err();

        assert!(matches!(err, VaultError::AssetNotFound { .. }));
        assert!(!dest.exists());
    }
}
