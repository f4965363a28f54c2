//! Certificate export pipeline
//!
//! Exports the assets of a single certificate record: the private key, the
//! CSR, the issued certificate in PEM or DER form, and a PKCS#12 archive
//! combining the key with the `[leaf, issuer]` chain. Every requested export
//! is checked before any file is written: the record must carry the
//! artifact, the source assets must resolve, and without `overwrite` no
//! destination may exist yet. A request rejected by those checks leaves the
//! file system untouched.

use crate::assets::{self, AssetKind, AssetStore};
use crate::crypto::{ArchiveFormat, CryptoEngine, EncodingFormat};
use crate::error::{MissingArtifact, Result, VaultError};
use crate::model::{Certificate, Identifier, VaultConfig};
use std::collections::HashSet;
use std::io::Write;
use std::iter::Enumerate;
use std::path::{Path, PathBuf};
use std::slice;
use tracing::info;

/// Destinations for the exports requested in one call.
#[derive(Debug, Clone, Default)]
pub struct CertificateExports {
    pub key_pem: Option<PathBuf>,
    pub csr_pem: Option<PathBuf>,
    pub crt_pem: Option<PathBuf>,
    pub crt_der: Option<PathBuf>,
    pub pkcs12: Option<PathBuf>,
    /// Replace existing destination files instead of failing.
    pub overwrite: bool,
}

impl CertificateExports {
    pub fn is_empty(&self) -> bool {
        self.key_pem.is_none()
            && self.csr_pem.is_none()
            && self.crt_pem.is_none()
            && self.crt_der.is_none()
            && self.pkcs12.is_none()
    }
}

#[derive(Debug)]
enum ExportStep<'a> {
    Copy {
        kind: AssetKind,
        name: &'a str,
        dest: &'a Path,
    },
    Pkcs12 {
        key: &'a str,
        crt: &'a str,
        issuer: &'a str,
        dest: &'a Path,
    },
}

fn require<'a>(
    file: Option<&'a str>,
    export: &'static str,
    missing: MissingArtifact,
) -> Result<&'a str> {
    file.ok_or(VaultError::Precondition { export, missing })
}

/// Check every requested export against the certificate record and return
/// the steps to run, in order.
fn plan_exports<'a>(
    vault: &'a VaultConfig,
    cert: &'a Certificate,
    exports: &'a CertificateExports,
) -> Result<Vec<ExportStep<'a>>> {
    let mut steps = Vec::new();

    if let Some(dest) = &exports.key_pem {
        let name = require(cert.key_pem_file(), "private key", MissingArtifact::PrivateKey)?;
        steps.push(ExportStep::Copy {
            kind: AssetKind::KeyPem,
            name,
            dest,
        });
    }

    if let Some(dest) = &exports.csr_pem {
        let name = require(cert.csr_pem_file(), "CSR", MissingArtifact::Csr)?;
        steps.push(ExportStep::Copy {
            kind: AssetKind::CsrPem,
            name,
            dest,
        });
    }

    if let Some(dest) = &exports.crt_pem {
        let name = require(
            cert.issued_crt_pem_file(),
            "certificate PEM",
            MissingArtifact::IssuedCertificate,
        )?;
        steps.push(ExportStep::Copy {
            kind: AssetKind::CrtPem,
            name,
            dest,
        });
    }

    if let Some(dest) = &exports.crt_der {
        let name = require(
            cert.issued_crt_der_file(),
            "certificate DER",
            MissingArtifact::IssuedCertificate,
        )?;
        steps.push(ExportStep::Copy {
            kind: AssetKind::CrtDer,
            name,
            dest,
        });
    }

    if let Some(dest) = &exports.pkcs12 {
        const EXPORT: &str = "PKCS#12 archive";
        let key = require(cert.key_pem_file(), EXPORT, MissingArtifact::PrivateKey)?;
        let crt = require(
            cert.crt_pem_file(),
            EXPORT,
            MissingArtifact::IssuedCertificate,
        )?;
        let issuer = require(
            vault.issuer_of(cert).and_then(|issuer| issuer.crt_pem_file()),
            EXPORT,
            MissingArtifact::IssuerCertificate,
        )?;
        steps.push(ExportStep::Pkcs12 {
            key,
            crt,
            issuer,
            dest,
        });
    }

    Ok(steps)
}

impl ExportStep<'_> {
    fn dest(&self) -> &Path {
        match self {
            ExportStep::Copy { dest, .. } | ExportStep::Pkcs12 { dest, .. } => dest,
        }
    }

    fn sources(&self) -> Vec<(AssetKind, &str)> {
        match self {
            ExportStep::Copy { kind, name, .. } => vec![(*kind, *name)],
            ExportStep::Pkcs12 {
                key, crt, issuer, ..
            } => vec![
                (AssetKind::KeyPem, *key),
                (AssetKind::CrtPem, *crt),
                (AssetKind::IssuerPem, *issuer),
            ],
        }
    }
}

/// Resolve every source asset and claim every destination before the first
/// write.
fn check_steps<S>(store: &S, steps: &[ExportStep<'_>], overwrite: bool) -> Result<()>
where
    S: AssetStore + ?Sized,
{
    let mut claimed = HashSet::new();
    for step in steps {
        for (kind, name) in step.sources() {
            store.resolve_asset(kind, name)?;
        }
        let dest = step.dest();
        if !overwrite && (dest.exists() || !claimed.insert(dest)) {
            return Err(VaultError::AlreadyExists(dest.to_path_buf()));
        }
    }
    Ok(())
}

/// Run the requested exports for the certificate `reference` resolves to
/// and return that certificate.
pub fn export_certificate<'v, S, E>(
    store: &S,
    vault: &'v VaultConfig,
    reference: &str,
    exports: &CertificateExports,
    engine: &E,
) -> Result<&'v Certificate>
where
    S: AssetStore + ?Sized,
    E: CryptoEngine,
{
    let cert = vault.certificate_by_ref(reference)?;

    let steps = plan_exports(vault, cert, exports)?;
    check_steps(store, &steps, exports.overwrite)?;

    for step in steps {
        match step {
            ExportStep::Copy { kind, name, dest } => {
                assets::copy_to_file(store, kind, name, dest, exports.overwrite)?;
                info!(certificate = %cert.id, kind = %kind, dest = %dest.display(), "exported asset");
            }
            ExportStep::Pkcs12 {
                key,
                crt,
                issuer,
                dest,
            } => {
                export_pkcs12(store, engine, key, crt, issuer, dest, exports.overwrite)?;
                info!(certificate = %cert.id, dest = %dest.display(), "exported PKCS#12 archive");
            }
        }
    }

    Ok(cert)
}

/// Assemble a PKCS#12 archive from three stored PEM assets and write it to
/// `dest`.
///
/// The destination is only opened once the archive has been assembled, so
/// a parse or assembly failure never leaves a partial file behind.
pub fn export_pkcs12<S, E>(
    store: &S,
    engine: &E,
    key_name: &str,
    crt_name: &str,
    issuer_name: &str,
    dest: &Path,
    overwrite: bool,
) -> Result<()>
where
    S: AssetStore + ?Sized,
    E: CryptoEngine,
{
    let key_asset = store.resolve_asset(AssetKind::KeyPem, key_name)?;
    let crt_asset = store.resolve_asset(AssetKind::CrtPem, crt_name)?;
    let issuer_asset = store.resolve_asset(AssetKind::IssuerPem, issuer_name)?;

    let archive = {
        let mut key_stream = store.open_asset(&key_asset)?;
        let mut crt_stream = store.open_asset(&crt_asset)?;
        let mut issuer_stream = store.open_asset(&issuer_asset)?;

        let key = engine.parse_private_key(EncodingFormat::Pem, key_stream.as_mut())?;
        let crt = engine.parse_certificate(EncodingFormat::Pem, crt_stream.as_mut())?;
        let issuer = engine.parse_certificate(EncodingFormat::Pem, issuer_stream.as_mut())?;

        engine.assemble_archive(&key, &[&crt, &issuer], ArchiveFormat::Pkcs12)?
    };

    let mut out = assets::create_destination(dest, overwrite)?;
    out.write_all(&archive)
        .and_then(|_| out.flush())
        .map_err(|e| VaultError::io(dest, e))
}

/// Lazily pairs each entity with its zero-based sequence position.
///
/// A clone continues independently from the same position; calling the
/// listing function again starts over.
#[derive(Debug, Clone)]
pub struct Listing<'a, T> {
    inner: Enumerate<slice::Iter<'a, T>>,
}

impl<'a, T> Iterator for Listing<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Listing<'_, T> {}

pub fn list_certificates(vault: &VaultConfig) -> Listing<'_, Certificate> {
    Listing {
        inner: vault.certificates.iter().enumerate(),
    }
}

pub fn list_identifiers(vault: &VaultConfig) -> Listing<'_, Identifier> {
    Listing {
        inner: vault.identifiers.iter().enumerate(),
    }
}
