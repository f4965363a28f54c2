//! File-backed vault store
//!
//! A vault lives in a single root directory:
//!
//! ```text
//! <root>/
//!   .acme.vault        version tag ("1.0")
//!   00-VAULT           JSON envelope {meta, vault}
//!   00-VAULT.bak       previous generation of 00-VAULT
//!   40-KEYPM/ ...      asset files, one subdirectory per asset kind
//! ```
//!
//! The root is resolved to an absolute path once, when the store is created,
//! and every file operation joins onto it. Nothing here changes the process
//! working directory, so several stores can be used side by side.
//!
//! Saving copies the current data file to `.bak`, writes the new envelope to
//! a uniquely named temporary file in the root, copies that over the data
//! file and removes the temporary file. There is no locking: a single
//! writer per root is assumed.

use crate::assets::{AssetKind, AssetStore, VaultAsset};
use crate::configs::VaultSettings;
use crate::error::{Result, VaultError};
use crate::model::{EntityMeta, VaultConfig, VaultEnvelope};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const TAG_VERSION: &str = "1.0";
pub const TAG_FILE: &str = ".acme.vault";
pub const VAULT_FILE: &str = "00-VAULT";
pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    Created,
    Open,
    Disposed,
}

#[derive(Debug)]
pub struct VaultStore {
    root: PathBuf,
    tag_file: PathBuf,
    vault_file: PathBuf,
    envelope: Option<VaultEnvelope>,
    state: StoreState,
}

impl VaultStore {
    /// Create a store for `root`; relative paths are taken from the current
    /// directory. Nothing is read or written until [`init`](Self::init) or
    /// [`open`](Self::open).
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = absolute(root.as_ref())?;
        Ok(VaultStore {
            tag_file: root.join(TAG_FILE),
            vault_file: root.join(VAULT_FILE),
            root,
            envelope: None,
            state: StoreState::Created,
        })
    }

    /// Create a store for the root chosen by precedence: an explicit root,
    /// then the named profile, then the configured default profile, then the
    /// current directory.
    pub fn from_settings(
        root: Option<&Path>,
        profile: Option<&str>,
        settings: &VaultSettings,
    ) -> Result<Self> {
        Self::new(resolve_root(root, profile, settings)?)
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn is_open(&self) -> bool {
        self.state == StoreState::Open
    }

    pub fn is_disposed(&self) -> bool {
        self.state == StoreState::Disposed
    }

    /// Prepare the root for first use and open it.
    ///
    /// Unless `force` is set the root must not hold a tag or data file and
    /// must be empty.
    pub fn init(&mut self, force: bool) -> Result<()> {
        self.assert_not_disposed()?;

        if !force {
            if self.tag_file.exists() || self.vault_file.exists() {
                return Err(VaultError::Conflict {
                    root: self.root.clone(),
                    reason: "root path contains existing vault data",
                });
            }
            if self.root.exists() {
                let mut entries =
                    fs::read_dir(&self.root).map_err(|e| VaultError::io(&self.root, e))?;
                if entries.next().is_some() {
                    return Err(VaultError::Conflict {
                        root: self.root.clone(),
                        reason: "root path is not empty",
                    });
                }
            }
        }

        fs::create_dir_all(&self.root).map_err(|e| VaultError::io(&self.root, e))?;
        fs::write(&self.tag_file, TAG_VERSION).map_err(|e| VaultError::io(&self.tag_file, e))?;

        info!(root = %self.root.display(), force, "initialized vault");
        self.state = StoreState::Open;
        Ok(())
    }

    /// Open an initialized root, initializing it first when
    /// `init_if_missing` is set and no version tag exists.
    pub fn open(&mut self, init_if_missing: bool) -> Result<()> {
        self.assert_not_disposed()?;

        if !self.tag_file.exists() {
            if !init_if_missing {
                return Err(VaultError::NotInitialized(self.root.clone()));
            }
            self.init(false)?;
        }

        let tag = fs::read_to_string(&self.tag_file)
            .map_err(|e| VaultError::io(&self.tag_file, e))?;
        if tag != TAG_VERSION {
            return Err(VaultError::VersionMismatch {
                expected: TAG_VERSION,
                found: tag,
            });
        }

        self.envelope = if self.vault_file.exists() {
            let file =
                File::open(&self.vault_file).map_err(|e| VaultError::io(&self.vault_file, e))?;
            Some(serde_json::from_reader(BufReader::new(file))?)
        } else {
            None
        };

        debug!(
            root = %self.root.display(),
            loaded = self.envelope.is_some(),
            "opened vault"
        );
        self.state = StoreState::Open;
        Ok(())
    }

    /// Current vault graph.
    ///
    /// When `required` is set a missing graph is an error; otherwise `None`
    /// is returned for a vault that has never been saved.
    pub fn load(&self, required: bool) -> Result<Option<VaultConfig>> {
        self.assert_open()?;

        match &self.envelope {
            Some(envelope) => Ok(Some(envelope.vault.clone())),
            None if required => Err(VaultError::NotInitialized(self.root.clone())),
            None => Ok(None),
        }
    }

    /// Load, failing when the vault has never been saved.
    pub fn load_required(&self) -> Result<VaultConfig> {
        self.load(true)?
            .ok_or_else(|| VaultError::NotInitialized(self.root.clone()))
    }

    /// Metadata of the last loaded or saved envelope.
    pub fn meta(&self) -> Option<&EntityMeta> {
        self.envelope.as_ref().map(|envelope| &envelope.meta)
    }

    /// Commit `vault` to the root data file.
    ///
    /// On failure the previous data file and its backup are left in place
    /// and the in-memory state is unchanged.
    pub fn save(&mut self, vault: &VaultConfig) -> Result<()> {
        self.assert_open()?;

        let now = Utc::now();
        let who = acting_user();
        let meta = match &self.envelope {
            Some(envelope) => EntityMeta {
                update_date: now,
                update_user: who,
                ..envelope.meta.clone()
            },
            None => EntityMeta {
                create_date: now,
                create_user: who.clone(),
                create_host: acting_host(),
                update_date: now,
                update_user: who,
            },
        };
        let envelope = VaultEnvelope {
            meta,
            vault: vault.clone(),
        };

        if self.vault_file.exists() {
            let backup = self.backup_path();
            fs::copy(&self.vault_file, &backup).map_err(|e| VaultError::io(&backup, e))?;
        }

        // removed on drop if anything below fails
        let tmp = tempfile::Builder::new()
            .prefix(&format!("{}.tmp", VAULT_FILE))
            .tempfile_in(&self.root)
            .map_err(|e| VaultError::io(&self.root, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, &envelope)?;
            writer.flush().map_err(|e| VaultError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| VaultError::io(tmp.path(), e))?;

        fs::copy(tmp.path(), &self.vault_file).map_err(|e| VaultError::io(&self.vault_file, e))?;

        let tmp_path = tmp.path().to_path_buf();
        if let Err(e) = tmp.close() {
            warn!(path = %tmp_path.display(), error = %e, "failed to remove temporary vault file");
        }

        info!(
            root = %self.root.display(),
            registrations = vault.registrations.len(),
            identifiers = vault.identifiers.len(),
            certificates = vault.certificates.len(),
            "saved vault"
        );
        self.envelope = Some(envelope);
        Ok(())
    }

    pub fn backup_path(&self) -> PathBuf {
        self.root.join(format!("{}{}", VAULT_FILE, BACKUP_SUFFIX))
    }

    pub fn vault_file_path(&self) -> &Path {
        &self.vault_file
    }

    /// Write an asset into the vault, replacing any asset of the same kind
    /// and name.
    pub fn save_asset(&self, kind: AssetKind, name: &str, bytes: &[u8]) -> Result<VaultAsset> {
        self.assert_open()?;

        let path = self.asset_path(kind, name)?;
        let dir = self.root.join(kind.directory());
        fs::create_dir_all(&dir).map_err(|e| VaultError::io(&dir, e))?;
        fs::write(&path, bytes).map_err(|e| VaultError::io(&path, e))?;

        debug!(kind = %kind, name, bytes = bytes.len(), "stored asset");
        Ok(VaultAsset {
            kind,
            name: name.to_string(),
        })
    }

    /// Absolute path of an asset file.
    pub fn asset_path(&self, kind: AssetKind, name: &str) -> Result<PathBuf> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\');
        if invalid {
            return Err(VaultError::InvalidAssetName(name.to_string()));
        }
        Ok(self.root.join(kind.directory()).join(name))
    }

    /// Release the store. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == StoreState::Disposed {
            return;
        }
        debug!(root = %self.root.display(), "closed vault");
        self.envelope = None;
        self.state = StoreState::Disposed;
    }

    fn assert_not_disposed(&self) -> Result<()> {
        if self.state == StoreState::Disposed {
            return Err(VaultError::Disposed);
        }
        Ok(())
    }

    fn assert_open(&self) -> Result<()> {
        self.assert_not_disposed()?;
        if self.state != StoreState::Open {
            return Err(VaultError::NotOpen);
        }
        Ok(())
    }
}

impl AssetStore for VaultStore {
    fn resolve_asset(&self, kind: AssetKind, name: &str) -> Result<VaultAsset> {
        self.assert_open()?;

        let path = self.asset_path(kind, name)?;
        if !path.is_file() {
            return Err(VaultError::AssetNotFound {
                kind: kind.as_str(),
                name: name.to_string(),
            });
        }
        Ok(VaultAsset {
            kind,
            name: name.to_string(),
        })
    }

    fn open_asset(&self, asset: &VaultAsset) -> Result<Box<dyn Read>> {
        self.assert_open()?;

        let path = self.asset_path(asset.kind, &asset.name)?;
        let file = File::open(&path).map_err(|e| VaultError::io(&path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

impl Drop for VaultStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pick the vault root: explicit root, named profile, default profile,
/// current directory.
pub fn resolve_root(
    root: Option<&Path>,
    profile: Option<&str>,
    settings: &VaultSettings,
) -> Result<PathBuf> {
    let chosen = match (root, profile, settings.default_profile.as_deref()) {
        (Some(root), _, _) => root.to_path_buf(),
        (None, Some(profile), _) | (None, None, Some(profile)) => settings.profile_path(profile),
        (None, None, None) => PathBuf::new(),
    };
    absolute(&chosen)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| VaultError::io(path, e))?;
    if path.as_os_str().is_empty() {
        Ok(cwd)
    } else {
        Ok(cwd.join(path))
    }
}

fn acting_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn acting_host() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
