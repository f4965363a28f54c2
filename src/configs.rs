use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File looked up in the working directory by [`AppConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "acme-vault.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub vault: VaultSettings,
    #[serde(default)]
    pub export: ExportSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VaultSettings {
    /// Profile used when neither an explicit root nor a profile is given.
    #[serde(default)]
    pub default_profile: Option<String>,
    /// Named vault roots, e.g. `staging = "/srv/acme/staging"`.
    #[serde(default)]
    pub profiles: HashMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportSettings {
    #[serde(default = "default_pkcs12_password")]
    pub pkcs12_password: String,
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            pkcs12_password: default_pkcs12_password(),
            overwrite: false,
        }
    }
}

fn default_pkcs12_password() -> String {
    String::new()
}

impl VaultSettings {
    /// Resolve a profile name to a root path.
    ///
    /// Unknown profile names are taken as paths themselves.
    pub fn profile_path(&self, profile: &str) -> PathBuf {
        self.profiles
            .get(profile)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(profile))
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration with default path (acme-vault.toml), falling back
    /// to defaults when the file does not exist
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)
        } else {
            Ok(Self::default())
        }
    }
}
