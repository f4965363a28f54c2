//! Vault data model
//!
//! [`VaultConfig`] is the root aggregate persisted by the vault store. It
//! owns the ordered registration, identifier and certificate collections and
//! the issuer certificates keyed by serial number. Protocol-level state
//! (account resources, authorizations, challenge records, certificate
//! request responses) is kept as opaque JSON and only carried through.

use crate::error::{EntityKind, Result, VaultError};
use crate::reference::{self, Referable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    #[serde(default)]
    pub issuer_certificates: BTreeMap<String, IssuerCertificate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    /// Account resource as returned by the certificate authority.
    #[serde(default)]
    pub registration: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub registration_ref: Uuid,
    pub dns: String,
    #[serde(default)]
    pub authorization: Value,
    /// Submitted challenge records keyed by challenge type.
    #[serde(default)]
    pub challenges: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub identifier_ref: Uuid,
    pub identifier_dns: String,
    /// Present once the CSR was submitted and a response received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pem_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csr_pem_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crt_pem_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crt_der_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_serial_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerCertificate {
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crt_pem_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crt_der_file: Option<String>,
}

/// Creation and update stamps persisted next to the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub create_date: DateTime<Utc>,
    pub create_user: String,
    pub create_host: String,
    pub update_date: DateTime<Utc>,
    pub update_user: String,
}

/// On-disk form of the vault data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultEnvelope {
    pub meta: EntityMeta,
    pub vault: VaultConfig,
}

/// A file reference counts as set only when it is present and non-empty.
fn file_ref(file: &Option<String>) -> Option<&str> {
    file.as_deref().filter(|name| !name.is_empty())
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultConfig {
    pub fn new() -> Self {
        VaultConfig {
            id: Uuid::new_v4(),
            alias: None,
            label: None,
            memo: None,
            registrations: Vec::new(),
            identifiers: Vec::new(),
            certificates: Vec::new(),
            issuer_certificates: BTreeMap::new(),
        }
    }

    /// The registration operations act on: the first one in the vault.
    pub fn active_registration(&self) -> Result<&Registration> {
        self.registrations
            .first()
            .ok_or_else(|| VaultError::none_found(EntityKind::Registration))
    }

    pub fn registration_by_ref(&self, token: &str) -> Result<&Registration> {
        if self.registrations.is_empty() {
            return Err(VaultError::none_found(EntityKind::Registration));
        }
        reference::find_by_ref(&self.registrations, token)
            .ok_or_else(|| VaultError::not_found(EntityKind::Registration, token))
    }

    pub fn identifier_by_ref(&self, token: &str) -> Result<&Identifier> {
        if self.identifiers.is_empty() {
            return Err(VaultError::none_found(EntityKind::Identifier));
        }
        reference::find_by_ref(&self.identifiers, token)
            .ok_or_else(|| VaultError::not_found(EntityKind::Identifier, token))
    }

    pub fn identifier_by_ref_mut(&mut self, token: &str) -> Result<&mut Identifier> {
        if self.identifiers.is_empty() {
            return Err(VaultError::none_found(EntityKind::Identifier));
        }
        reference::find_by_ref_mut(&mut self.identifiers, token)
            .ok_or_else(|| VaultError::not_found(EntityKind::Identifier, token))
    }

    pub fn certificate_by_ref(&self, token: &str) -> Result<&Certificate> {
        if self.certificates.is_empty() {
            return Err(VaultError::none_found(EntityKind::Certificate));
        }
        reference::find_by_ref(&self.certificates, token)
            .ok_or_else(|| VaultError::not_found(EntityKind::Certificate, token))
    }

    /// Issuer certificate a certificate was signed by, once resolved.
    pub fn issuer_of(&self, certificate: &Certificate) -> Option<&IssuerCertificate> {
        file_ref(&certificate.issuer_serial_number)
            .and_then(|serial| self.issuer_certificates.get(serial))
    }

    pub fn add_issuer_certificate(&mut self, issuer: IssuerCertificate) {
        self.issuer_certificates
            .insert(issuer.serial_number.clone(), issuer);
    }
}

impl Registration {
    pub fn new(contacts: Vec<String>, registration: Value) -> Self {
        Registration {
            id: Uuid::new_v4(),
            alias: None,
            label: None,
            memo: None,
            contacts,
            registration,
        }
    }
}

impl Identifier {
    pub fn new(registration: &Registration, dns: impl Into<String>) -> Self {
        Identifier {
            id: Uuid::new_v4(),
            alias: None,
            label: None,
            memo: None,
            registration_ref: registration.id,
            dns: dns.into(),
            authorization: Value::Null,
            challenges: BTreeMap::new(),
        }
    }
}

impl Certificate {
    pub fn new(identifier: &Identifier) -> Self {
        Certificate {
            id: Uuid::new_v4(),
            alias: None,
            label: None,
            memo: None,
            identifier_ref: identifier.id,
            identifier_dns: identifier.dns.clone(),
            certificate_request: None,
            key_pem_file: None,
            csr_pem_file: None,
            crt_pem_file: None,
            crt_der_file: None,
            issuer_serial_number: None,
        }
    }

    pub fn key_pem_file(&self) -> Option<&str> {
        file_ref(&self.key_pem_file)
    }

    pub fn csr_pem_file(&self) -> Option<&str> {
        file_ref(&self.csr_pem_file)
    }

    /// Certificate PEM file, only once the CSR has actually been submitted.
    pub fn issued_crt_pem_file(&self) -> Option<&str> {
        self.certificate_request
            .as_ref()
            .and_then(|_| file_ref(&self.crt_pem_file))
    }

    /// Certificate DER file, only once the CSR has actually been submitted.
    pub fn issued_crt_der_file(&self) -> Option<&str> {
        self.certificate_request
            .as_ref()
            .and_then(|_| file_ref(&self.crt_der_file))
    }

    /// Certificate PEM file regardless of the request record.
    pub fn crt_pem_file(&self) -> Option<&str> {
        file_ref(&self.crt_pem_file)
    }
}

impl IssuerCertificate {
    pub fn crt_pem_file(&self) -> Option<&str> {
        file_ref(&self.crt_pem_file)
    }
}

macro_rules! impl_referable {
    ($($entity:ty),*) => {
        $(
            impl Referable for $entity {
                fn id(&self) -> Uuid {
                    self.id
                }
                fn alias(&self) -> Option<&str> {
                    self.alias.as_deref()
                }
                fn label(&self) -> Option<&str> {
                    self.label.as_deref()
                }
            }
        )*
    };
}

impl_referable!(Registration, Identifier, Certificate);
