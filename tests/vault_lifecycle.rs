use acme_vault::assets::AssetKind;
use acme_vault::crypto::OpensslEngine;
use acme_vault::export::{export_certificate, list_certificates, CertificateExports};
use acme_vault::{
    Certificate, Identifier, IssuerCertificate, MissingArtifact, Registration, VaultConfig,
    VaultError, VaultStore,
};
use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509Builder, X509NameBuilder};
use serde_json::json;
use std::fs;

fn key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn cert(cn: &str, serial: u32, subject: &PKey<Private>, signer: &PKey<Private>, issuer: Option<&X509>) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = openssl::bn::BigNum::from_u32(serial).unwrap();
    builder.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some(issuer) => builder.set_issuer_name(issuer.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(90).unwrap()).unwrap();
    builder.set_pubkey(subject).unwrap();
    builder.sign(signer, MessageDigest::sha256()).unwrap();
    builder.build()
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    out: std::path::PathBuf,
    leaf_key: PKey<Private>,
    leaf: X509,
    issuer: X509,
}

/// Vault with one issued certificate ("www") and one pending one ("api").
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("vault");
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();

    let issuer_key = key();
    let issuer = cert("Fake LE Intermediate X1", 1, &issuer_key, &issuer_key, None);
    let leaf_key = key();
    let leaf = cert("www.example.com", 2, &leaf_key, &issuer_key, Some(&issuer));

    let mut store = VaultStore::new(&root).unwrap();
    store.init(false).unwrap();
    store
        .save_asset(AssetKind::KeyPem, "www-key.pem", &leaf_key.private_key_to_pem_pkcs8().unwrap())
        .unwrap();
    store
        .save_asset(AssetKind::CsrPem, "www-csr.pem", b"-----BEGIN CERTIFICATE REQUEST-----\n")
        .unwrap();
    store
        .save_asset(AssetKind::CrtPem, "www-crt.pem", &leaf.to_pem().unwrap())
        .unwrap();
    store
        .save_asset(AssetKind::CrtDer, "www-crt.der", &leaf.to_der().unwrap())
        .unwrap();
    store
        .save_asset(AssetKind::IssuerPem, "issuer-01.pem", &issuer.to_pem().unwrap())
        .unwrap();

    let mut vault = VaultConfig::new();
    let reg = Registration::new(vec!["mailto:ops@example.com".into()], json!({"kid": "acct"}));
    let mut ident = Identifier::new(&reg, "www.example.com");
    ident.alias = Some("www".into());

    let mut www = Certificate::new(&ident);
    www.alias = Some("www".into());
    www.label = Some("Production web".into());
    www.certificate_request = Some(json!({"status": "valid"}));
    www.key_pem_file = Some("www-key.pem".into());
    www.csr_pem_file = Some("www-csr.pem".into());
    www.crt_pem_file = Some("www-crt.pem".into());
    www.crt_der_file = Some("www-crt.der".into());
    www.issuer_serial_number = Some("01".into());

    let mut api = Certificate::new(&ident);
    api.alias = Some("api".into());

    vault.certificates = vec![www, api];
    vault.add_issuer_certificate(IssuerCertificate {
        serial_number: "01".into(),
        thumbprint: None,
        crt_pem_file: Some("issuer-01.pem".into()),
        crt_der_file: None,
    });
    vault.registrations.push(reg);
    vault.identifiers.push(ident);
    store.save(&vault).unwrap();
    store.close();

    Fixture {
        _dir: dir,
        root,
        out,
        leaf_key,
        leaf,
        issuer,
    }
}

#[test]
fn test_reopen_and_export_everything() {
    let fx = fixture();
    let mut store = VaultStore::new(&fx.root).unwrap();
    store.open(false).unwrap();
    let vault = store.load_required().unwrap();

    let exports = CertificateExports {
        key_pem: Some(fx.out.join("key.pem")),
        csr_pem: Some(fx.out.join("csr.pem")),
        crt_pem: Some(fx.out.join("crt.pem")),
        crt_der: Some(fx.out.join("crt.der")),
        pkcs12: Some(fx.out.join("www.p12")),
        overwrite: false,
    };
    let engine = OpensslEngine::with_archive_password("changeit");
    let cert = export_certificate(&store, &vault, "Production web", &exports, &engine).unwrap();
    assert_eq!(cert.alias.as_deref(), Some("www"));

    assert_eq!(
        fs::read(fx.out.join("key.pem")).unwrap(),
        fx.leaf_key.private_key_to_pem_pkcs8().unwrap()
    );
    assert_eq!(fs::read(fx.out.join("crt.der")).unwrap(), fx.leaf.to_der().unwrap());
    assert_eq!(fs::read(fx.out.join("crt.pem")).unwrap(), fx.leaf.to_pem().unwrap());

    let p12 = fs::read(fx.out.join("www.p12")).unwrap();
    let parsed = Pkcs12::from_der(&p12).unwrap().parse2("changeit").unwrap();
    assert_eq!(parsed.cert.unwrap().to_der().unwrap(), fx.leaf.to_der().unwrap());
    assert!(parsed.pkey.unwrap().public_eq(&fx.leaf_key));
    let ca = parsed.ca.unwrap();
    assert_eq!(ca.len(), 1);
    assert_eq!(ca.get(0).unwrap().to_der().unwrap(), fx.issuer.to_der().unwrap());
}

#[test]
fn test_pending_certificate_cannot_export_pkcs12() {
    let fx = fixture();
    let mut store = VaultStore::new(&fx.root).unwrap();
    store.open(false).unwrap();
    let vault = store.load_required().unwrap();
    let dest = fx.out.join("api.p12");

    let exports = CertificateExports {
        pkcs12: Some(dest.clone()),
        ..Default::default()
    };
    let err = export_certificate(&store, &vault, "api", &exports, &OpensslEngine::new()).unwrap_err();

    assert!(matches!(
        err,
        VaultError::Precondition { missing: MissingArtifact::PrivateKey, .. }
    ));
    assert!(!dest.exists());
}

#[test]
fn test_unresolved_issuer_writes_nothing() {
    let fx = fixture();
    let mut store = VaultStore::new(&fx.root).unwrap();
    store.open(false).unwrap();
    let mut vault = store.load_required().unwrap();
    vault.issuer_certificates.clear();
    store.save(&vault).unwrap();

    let dest = fx.out.join("www.p12");
    let exports = CertificateExports {
        pkcs12: Some(dest.clone()),
        ..Default::default()
    };
    let err = export_certificate(&store, &vault, "0", &exports, &OpensslEngine::new()).unwrap_err();

    assert!(matches!(
        err,
        VaultError::Precondition { missing: MissingArtifact::IssuerCertificate, .. }
    ));
    assert!(!dest.exists());
}

#[test]
fn test_mutations_survive_reopen_with_backup() {
    let fx = fixture();
    let original = {
        let mut store = VaultStore::new(&fx.root).unwrap();
        store.open(false).unwrap();
        store.load_required().unwrap()
    };

    let mut store = VaultStore::new(&fx.root).unwrap();
    store.open(false).unwrap();
    let mut vault = store.load_required().unwrap();
    vault.certificates[1].label = Some("staging api".into());
    store.save(&vault).unwrap();
    store.close();
    store.close();

    let mut reopened = VaultStore::new(&fx.root).unwrap();
    reopened.open(false).unwrap();
    let loaded = reopened.load_required().unwrap();
    assert_eq!(loaded, vault);
    let seqs: Vec<usize> = list_certificates(&loaded).map(|(seq, _)| seq).collect();
    assert_eq!(seqs, vec![0, 1]);
    assert_eq!(
        loaded.certificate_by_ref("staging api").unwrap().alias.as_deref(),
        Some("api")
    );

    let backup: serde_json::Value =
        serde_json::from_slice(&fs::read(reopened.backup_path()).unwrap()).unwrap();
    let backup_vault: VaultConfig = serde_json::from_value(backup["vault"].clone()).unwrap();
    assert_eq!(backup_vault, original);
}
