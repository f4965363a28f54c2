//! Cryptographic engine seam used by the export pipeline.
//!
//! The pipeline only decides which bytes to hand over and what to assemble;
//! parsing and archive encoding happen behind [`CryptoEngine`].
//! [`OpensslEngine`] is the production implementation.

use crate::error::{Result, VaultError};
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::X509;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    Pem,
    Der,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Pkcs12,
}

pub trait CryptoEngine {
    type PrivateKey;
    type Certificate;

    fn parse_private_key(
        &self,
        format: EncodingFormat,
        source: &mut dyn Read,
    ) -> Result<Self::PrivateKey>;

    fn parse_certificate(
        &self,
        format: EncodingFormat,
        source: &mut dyn Read,
    ) -> Result<Self::Certificate>;

    /// Assemble an archive holding `key` and `chain`.
    ///
    /// The first certificate of `chain` is the one matching `key`; the rest
    /// follow in the given order.
    fn assemble_archive(
        &self,
        key: &Self::PrivateKey,
        chain: &[&Self::Certificate],
        format: ArchiveFormat,
    ) -> Result<Vec<u8>>;
}

/// OpenSSL-backed engine.
#[derive(Debug, Clone, Default)]
pub struct OpensslEngine {
    archive_password: String,
}

impl OpensslEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine protecting PKCS#12 archives with `password`.
    pub fn with_archive_password(password: impl Into<String>) -> Self {
        OpensslEngine {
            archive_password: password.into(),
        }
    }
}

fn read_all(source: &mut dyn Read) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    source
        .read_to_end(&mut bytes)
        .map_err(|e| VaultError::crypto("read input", e))?;
    Ok(bytes)
}

fn common_name(cert: &X509) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|name| name.to_string())
}

impl CryptoEngine for OpensslEngine {
    type PrivateKey = PKey<Private>;
    type Certificate = X509;

    fn parse_private_key(
        &self,
        format: EncodingFormat,
        source: &mut dyn Read,
    ) -> Result<PKey<Private>> {
        let bytes = read_all(source)?;
        let key = match format {
            EncodingFormat::Pem => PKey::private_key_from_pem(&bytes),
            EncodingFormat::Der => PKey::private_key_from_der(&bytes),
        };
        key.map_err(|e| VaultError::crypto("parse private key", e))
    }

    fn parse_certificate(&self, format: EncodingFormat, source: &mut dyn Read) -> Result<X509> {
        let bytes = read_all(source)?;
        let cert = match format {
            EncodingFormat::Pem => X509::from_pem(&bytes),
            EncodingFormat::Der => X509::from_der(&bytes),
        };
        cert.map_err(|e| VaultError::crypto("parse certificate", e))
    }

    fn assemble_archive(
        &self,
        key: &PKey<Private>,
        chain: &[&X509],
        format: ArchiveFormat,
    ) -> Result<Vec<u8>> {
        let ArchiveFormat::Pkcs12 = format;
        let (leaf, rest) = chain.split_first().ok_or_else(|| {
            VaultError::crypto(
                "assemble archive",
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty certificate chain"),
            )
        })?;

        let mut ca = Stack::new().map_err(|e| VaultError::crypto("assemble archive", e))?;
        for cert in rest {
            ca.push((*cert).clone())
                .map_err(|e| VaultError::crypto("assemble archive", e))?;
        }

        let mut builder = Pkcs12::builder();
        if let Some(name) = common_name(leaf) {
            builder.name(&name);
        }
        builder.pkey(key).cert(leaf).ca(ca);
        let archive = builder
            .build2(&self.archive_password)
            .map_err(|e| VaultError::crypto("assemble archive", e))?;
        archive
            .to_der()
            .map_err(|e| VaultError::crypto("encode archive", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::{BigNum, MsbOption};
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::x509::extension::BasicConstraints;
    use openssl::x509::{X509Builder, X509NameBuilder};

    fn generate_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    fn build_cert(
        common_name: &str,
        subject_key: &PKey<Private>,
        issuer: Option<(&X509, &PKey<Private>)>,
    ) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
        let name = name.build();

        let mut serial = BigNum::new().unwrap();
        serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        builder.set_pubkey(subject_key).unwrap();
        match issuer {
            Some((issuer_cert, issuer_key)) => {
                builder.set_issuer_name(issuer_cert.subject_name()).unwrap();
                builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
            }
            None => {
                builder
                    .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                    .unwrap();
                builder.set_issuer_name(&name).unwrap();
                builder.sign(subject_key, MessageDigest::sha256()).unwrap();
            }
        }
        builder.build()
    }

    /// Issuer certificate plus a leaf key and certificate signed by it.
    fn issue_chain() -> (PKey<Private>, X509, X509) {
        let issuer_key = generate_key();
        let issuer = build_cert("Test Issuer CA", &issuer_key, None);
        let leaf_key = generate_key();
        let leaf = build_cert("www.example.com", &leaf_key, Some((&issuer, &issuer_key)));
        (leaf_key, leaf, issuer)
    }

    #[test]
    fn test_parse_pem_and_der() {
        let engine = OpensslEngine::new();
        let (key, leaf, _) = issue_chain();

        let pem = key.private_key_to_pem_pkcs8().unwrap();
        let parsed = engine
            .parse_private_key(EncodingFormat::Pem, &mut pem.as_slice())
            .unwrap();
        assert!(parsed.public_eq(&key));

        let der = leaf.to_der().unwrap();
        let parsed = engine
            .parse_certificate(EncodingFormat::Der, &mut der.as_slice())
            .unwrap();
        assert_eq!(parsed.to_der().unwrap(), der);
    }

    #[test]
    fn test_parse_garbage_is_crypto_error() {
        let engine = OpensslEngine::new();
        let err = engine
            .parse_certificate(EncodingFormat::Pem, &mut &b"not a certificate"[..])
            .unwrap_err();
        assert!(matches!(err, VaultError::Crypto { action: "parse certificate", .. }));
    }

    #[test]
    fn test_pkcs12_keeps_leaf_then_issuer() {
        let engine = OpensslEngine::with_archive_password("secret");
        let (key, leaf, issuer) = issue_chain();

        let der = engine
            .assemble_archive(&key, &[&leaf, &issuer], ArchiveFormat::Pkcs12)
            .unwrap();
        let parsed = Pkcs12::from_der(&der).unwrap().parse2("secret").unwrap();

        assert_eq!(parsed.cert.unwrap().to_der().unwrap(), leaf.to_der().unwrap());
        assert!(parsed.pkey.unwrap().public_eq(&key));
        let ca = parsed.ca.unwrap();
        assert_eq!(ca.len(), 1);
        assert_eq!(ca.get(0).unwrap().to_der().unwrap(), issuer.to_der().unwrap());
    }

    #[test]
    fn test_empty_chain_rejected() {
        let engine = OpensslEngine::new();
        let key = generate_key();
        assert!(engine
            .assemble_archive(&key, &[], ArchiveFormat::Pkcs12)
            .is_err());
    }
}
