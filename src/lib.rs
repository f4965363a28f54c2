//! ACME Vault - Local persistence and artifact export for an ACME client
//!
//! Stores the registration, identifier and certificate records of an ACME
//! certificate-lifecycle client in a versioned directory on disk, resolves
//! user-supplied references to those records, and exports the stored keys,
//! CSRs and certificates, including PKCS#12 archives assembled from the
//! private key, the issued certificate and its issuer.
//!
//! # Overview
//!
//! ```text
//! VaultStore (root dir, version tag, 00-VAULT + .bak)
//!   └── VaultConfig
//!         ├── registrations   [0] is the active account
//!         ├── identifiers     dns name, authorization, challenges
//!         ├── certificates    alias/label, asset file names, issuer serial
//!         └── issuer_certificates (by serial number)
//! ```
//!
//! Every entity in an ordered collection can be referenced by its position,
//! alias, label or id; the first match in insertion order wins.
//!
//! # Module Overview
//!
//! ## [`storage`]
//!
//! The file-backed vault store: `init`, `open`, `load`, `save`, `close`, and
//! the [`AssetStore`](assets::AssetStore) implementation for asset files.
//!
//! ```no_run
//! use acme_vault::storage::VaultStore;
//!
//! let mut store = VaultStore::new("/srv/acme/vault")?;
//! store.open(true)?;
//! let vault = store.load(false)?.unwrap_or_default();
//! store.save(&vault)?;
//! # Ok::<(), acme_vault::VaultError>(())
//! ```
//!
//! ## [`export`]
//!
//! Certificate export pipeline. All requested exports are validated before
//! any file is written.
//!
//! ```no_run
//! use acme_vault::crypto::OpensslEngine;
//! use acme_vault::export::{export_certificate, CertificateExports};
//! use acme_vault::storage::VaultStore;
//!
//! let mut store = VaultStore::new("/srv/acme/vault")?;
//! store.open(false)?;
//! let vault = store.load_required()?;
//! let exports = CertificateExports {
//!     pkcs12: Some("www.p12".into()),
//!     ..Default::default()
//! };
//! export_certificate(&store, &vault, "www", &exports, &OpensslEngine::new())?;
//! # Ok::<(), acme_vault::VaultError>(())
//! ```
//!
//! ## [`challenge`]
//!
//! Records challenge answers submitted through a
//! [`ChallengeClient`](challenge::ChallengeClient).
//!
//! ## [`configs`]
//!
//! TOML configuration: named vault profiles and export defaults.
//!
//! # Error Handling
//!
//! Library operations return [`Result`] with a [`VaultError`] describing
//! the violated precondition. Configuration loading returns `anyhow::Result`.

pub mod assets;
pub mod challenge;
pub mod configs;
pub mod crypto;
pub mod error;
pub mod export;
pub mod model;
pub mod reference;
pub mod storage;

pub use error::{EntityKind, MissingArtifact, Result, VaultError};
pub use model::{Certificate, Identifier, IssuerCertificate, Registration, VaultConfig};
pub use storage::VaultStore;
