//! Error taxonomy for the vault, reference lookups and exports.
//!
//! Every variant carries enough text for a front end to tell the user which
//! precondition was violated without looking at internal state.

use std::fmt;
use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Kind of entity a reference lookup was performed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Registration,
    Identifier,
    Certificate,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Registration => "registration",
            EntityKind::Identifier => "identifier",
            EntityKind::Certificate => "certificate",
        };
        f.write_str(name)
    }
}

/// Artifact an export was requested for but which is not available yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingArtifact {
    /// No private key file has been generated or imported.
    PrivateKey,
    /// No CSR file has been generated or imported.
    Csr,
    /// The CSR was not submitted, or the certificate was not retrieved.
    IssuedCertificate,
    /// The issuing CA certificate has not been resolved into the vault.
    IssuerCertificate,
}

impl MissingArtifact {
    pub fn reason(&self) -> &'static str {
        match self {
            MissingArtifact::PrivateKey => "private key hasn't been imported or generated",
            MissingArtifact::Csr => "CSR hasn't been imported or generated",
            MissingArtifact::IssuedCertificate => {
                "CSR hasn't been submitted or certificate hasn't been retrieved"
            }
            MissingArtifact::IssuerCertificate => "issuer certificate hasn't been resolved",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault root {0} does not contain vault data")]
    NotInitialized(PathBuf),

    #[error("vault is not open")]
    NotOpen,

    #[error("vault store has been closed")]
    Disposed,

    #[error("cannot initialize vault at {root}: {reason}")]
    Conflict { root: PathBuf, reason: &'static str },

    #[error("vault version mismatch: expected {expected:?}, found {found:?}")]
    VersionMismatch { expected: &'static str, found: String },

    /// `reference` is `None` when the collection searched was empty.
    #[error("{}", not_found_message(.kind, .reference))]
    NotFound {
        kind: EntityKind,
        reference: Option<String>,
    },

    #[error("cannot export {export}: {}", .missing.reason())]
    Precondition {
        export: &'static str,
        missing: MissingArtifact,
    },

    #[error("destination {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("asset {name:?} of kind {kind} not found in vault")]
    AssetNotFound { kind: &'static str, name: String },

    #[error("invalid asset name {0:?}")]
    InvalidAssetName(String),

    #[error("unsupported challenge type {0:?}")]
    InvalidChallengeType(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crypto engine failed to {action}: {source}")]
    Crypto {
        action: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("protocol client error: {0}")]
    Protocol(String),
}

impl VaultError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(kind: EntityKind, reference: &str) -> Self {
        VaultError::NotFound {
            kind,
            reference: Some(reference.to_string()),
        }
    }

    pub(crate) fn none_found(kind: EntityKind) -> Self {
        VaultError::NotFound {
            kind,
            reference: None,
        }
    }

    pub(crate) fn crypto<E>(action: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        VaultError::Crypto {
            action,
            source: Box::new(source),
        }
    }
}

fn not_found_message(kind: &EntityKind, reference: &Option<String>) -> String {
    match reference {
        Some(reference) => format!("unable to find a {} for reference {:?}", kind, reference),
        None => format!("no {}s found in vault", kind),
    }
}
