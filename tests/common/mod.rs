//! Shared fixtures for integration tests
//!
//! `FakeLibrary` treats a certificate's "DER" as JSON describing its fields
//! and the name of the key that signed it. A signature verifies when the
//! signer name equals the issuer key's `spki_der`.

#![allow(dead_code)]

use certpath::certificate::{CachedItem, Certificate};
use certpath::engine::{TrustEngine, TrustEngineBuilder};
use certpath::library::{
    BasicConstraints, CertFields, CertLibrary, CrlFields, KeyUsage, NameConstraints, PublicKeyInfo,
    RevokedEntry, SignatureOutcome, SignedItem,
};
use certpath::revocation::{OcspResponder, OcspStatus};
use certpath::sources::NetworkFetcher;
use certpath::utils::{LibraryError, SourceError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FakeItem {
    Cert { fields: CertFields, signed_by: String },
    Crl { fields: CrlFields, signed_by: String },
}

fn decode(der: &[u8]) -> Result<FakeItem, LibraryError> {
    serde_json::from_slice(der).map_err(|e| LibraryError::Malformed {
        message: e.to_string(),
    })
}

/// In-memory certificate library
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeLibrary;

impl CertLibrary for FakeLibrary {
    fn parse_certificate(&self, der: &[u8]) -> Result<CertFields, LibraryError> {
        match decode(der)? {
            FakeItem::Cert { fields, .. } => Ok(fields),
            FakeItem::Crl { .. } => Err(LibraryError::Malformed {
                message: "not a certificate".to_string(),
            }),
        }
    }

    fn parse_crl(&self, der: &[u8]) -> Result<CrlFields, LibraryError> {
        match decode(der)? {
            FakeItem::Crl { fields, .. } => Ok(fields),
            FakeItem::Cert { .. } => Err(LibraryError::Malformed {
                message: "not a CRL".to_string(),
            }),
        }
    }

    fn verify_signature(
        &self,
        item: SignedItem<'_>,
        issuer_key: &PublicKeyInfo,
        params: Option<&PublicKeyInfo>,
    ) -> SignatureOutcome {
        let raw = match item {
            SignedItem::Certificate(raw) | SignedItem::Crl(raw) => raw,
        };
        let signer = match decode(raw) {
            Ok(FakeItem::Cert { signed_by, .. }) | Ok(FakeItem::Crl { signed_by, .. }) => signed_by,
            Err(_) => return SignatureOutcome::Failed,
        };
        if issuer_key.is_partial {
            match params {
                None => return SignatureOutcome::NeedsMoreKeyMaterial,
                Some(p) if p.algorithm != issuer_key.algorithm || p.is_partial => {
                    return SignatureOutcome::Failed
                }
                Some(_) => {}
            }
        }
        if signer.as_bytes() == issuer_key.spki_der.as_slice() {
            SignatureOutcome::Verified
        } else {
            SignatureOutcome::Failed
        }
    }
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

/// Builder for a fake certificate. The key is named after the subject and
/// the signer after the issuer unless overridden.
#[derive(Clone)]
pub struct CertSpec {
    fields: CertFields,
    signed_by: String,
}

impl CertSpec {
    pub fn new(subject: &str, issuer: &str) -> Self {
        let fields = CertFields {
            subject: subject.as_bytes().to_vec(),
            issuer: issuer.as_bytes().to_vec(),
            subject_display: format!("CN={}", subject),
            issuer_display: format!("CN={}", issuer),
            serial: subject.bytes().take(8).collect(),
            version: 3,
            not_before: now() - days(30),
            not_after: now() + days(365),
            public_key: PublicKeyInfo {
                algorithm: "1.2.840.10045.2.1".to_string(),
                spki_der: subject.as_bytes().to_vec(),
                is_partial: false,
            },
            basic_constraints: None,
            key_usage: None,
            extended_key_usage: None,
            common_name: Some(subject.to_string()),
            dns_names: Vec::new(),
            emails: Vec::new(),
            ip_addresses: Vec::new(),
            crl_distribution_points: Vec::new(),
            ocsp_urls: Vec::new(),
            ca_issuer_urls: Vec::new(),
            name_constraints: None,
            unknown_critical_extensions: Vec::new(),
        };
        Self {
            fields,
            signed_by: issuer.to_string(),
        }
    }

    /// A CA certificate with basic constraints and keyCertSign
    pub fn ca(mut self) -> Self {
        self.fields.basic_constraints = Some(BasicConstraints {
            ca: true,
            path_len: None,
        });
        self.fields.key_usage = Some(KeyUsage {
            key_cert_sign: true,
            crl_sign: true,
            digital_signature: true,
            ..KeyUsage::default()
        });
        self
    }

    pub fn path_len(mut self, limit: u32) -> Self {
        self.fields.basic_constraints = Some(BasicConstraints {
            ca: true,
            path_len: Some(limit),
        });
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.fields.public_key.spki_der = key.as_bytes().to_vec();
        self
    }

    pub fn signed_by(mut self, key: &str) -> Self {
        self.signed_by = key.to_string();
        self
    }

    /// Key of the given algorithm that lacks its domain parameters
    pub fn partial_key(mut self, algorithm: &str) -> Self {
        self.fields.public_key.algorithm = algorithm.to_string();
        self.fields.public_key.is_partial = true;
        self
    }

    pub fn algorithm(mut self, algorithm: &str) -> Self {
        self.fields.public_key.algorithm = algorithm.to_string();
        self
    }

    pub fn validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.fields.not_before = not_before;
        self.fields.not_after = not_after;
        self
    }

    pub fn expired(self) -> Self {
        self.validity(now() - days(400), now() - days(1))
    }

    pub fn serial(mut self, serial: &[u8]) -> Self {
        self.fields.serial = serial.to_vec();
        self
    }

    pub fn dns(mut self, name: &str) -> Self {
        self.fields.dns_names.push(name.to_string());
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.fields.emails.push(email.to_string());
        self
    }

    pub fn eku(mut self, oids: &[&str]) -> Self {
        self.fields.extended_key_usage = Some(oids.iter().map(|o| o.to_string()).collect());
        self
    }

    pub fn crl_dp(mut self, url: &str) -> Self {
        self.fields.crl_distribution_points.push(url.to_string());
        self
    }

    pub fn ip(mut self, address: &str) -> Self {
        self.fields.ip_addresses.push(address.to_string());
        self
    }

    pub fn name_constraints(mut self, constraints: NameConstraints) -> Self {
        self.fields.name_constraints = Some(constraints);
        self
    }

    pub fn unknown_critical(mut self, oid: &str) -> Self {
        self.fields.unknown_critical_extensions.push(oid.to_string());
        self
    }

    pub fn der(&self) -> Vec<u8> {
        let item = FakeItem::Cert {
            fields: self.fields.clone(),
            signed_by: self.signed_by.clone(),
        };
        serde_json::to_vec(&item).unwrap()
    }
}

/// Self-signed CA
pub fn root(name: &str) -> CertSpec {
    CertSpec::new(name, name).ca()
}

/// CA issued by `issuer`
pub fn intermediate(name: &str, issuer: &str) -> CertSpec {
    CertSpec::new(name, issuer).ca()
}

/// End-entity certificate issued by `issuer`
pub fn leaf(name: &str, issuer: &str) -> CertSpec {
    CertSpec::new(name, issuer)
}

/// Builder for a fake CRL signed by the issuer's key
#[derive(Clone)]
pub struct CrlSpec {
    fields: CrlFields,
    signed_by: String,
}

impl CrlSpec {
    pub fn new(issuer: &str) -> Self {
        Self {
            fields: CrlFields {
                issuer: issuer.as_bytes().to_vec(),
                issuer_display: format!("CN={}", issuer),
                this_update: now() - days(1),
                next_update: Some(now() + days(7)),
                revoked: Vec::new(),
            },
            signed_by: issuer.to_string(),
        }
    }

    pub fn revoke(mut self, serial: &[u8], at: DateTime<Utc>) -> Self {
        self.fields.revoked.push(RevokedEntry {
            serial: serial.to_vec(),
            revoked_at: at,
            reason: Some("keyCompromise".to_string()),
        });
        self
    }

    pub fn window(mut self, this_update: DateTime<Utc>, next_update: DateTime<Utc>) -> Self {
        self.fields.this_update = this_update;
        self.fields.next_update = Some(next_update);
        self
    }

    pub fn signed_by(mut self, key: &str) -> Self {
        self.signed_by = key.to_string();
        self
    }

    pub fn der(&self) -> Vec<u8> {
        let item = FakeItem::Crl {
            fields: self.fields.clone(),
            signed_by: self.signed_by.clone(),
        };
        serde_json::to_vec(&item).unwrap()
    }
}

/// Hex SHA-1 of an encoded item, as used by trust settings
pub fn sha1_hex(der: &[u8]) -> String {
    hex::encode(Sha1::digest(der))
}

pub fn builder() -> TrustEngineBuilder {
    TrustEngine::builder(Arc::new(FakeLibrary))
}

/// Network fetcher serving issuers and CRLs keyed by issuer name
#[derive(Default)]
pub struct FakeFetcher {
    issuers: HashMap<Vec<u8>, Vec<u8>>,
    crls: HashMap<Vec<u8>, Vec<u8>>,
    pub issuer_calls: AtomicUsize,
    pub crl_calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `spec` to certificates naming `name` as issuer
    pub fn with_issuer(mut self, name: &str, spec: &CertSpec) -> Self {
        self.issuers.insert(name.as_bytes().to_vec(), spec.der());
        self
    }

    pub fn with_crl(mut self, issuer: &str, spec: &CrlSpec) -> Self {
        self.crls.insert(issuer.as_bytes().to_vec(), spec.der());
        self
    }

    pub fn issuer_calls(&self) -> usize {
        self.issuer_calls.load(Ordering::SeqCst)
    }

    pub fn crl_calls(&self) -> usize {
        self.crl_calls.load(Ordering::SeqCst)
    }
}

impl NetworkFetcher for FakeFetcher {
    fn fetch_crl(&self, for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError> {
        self.crl_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.crls.get(for_cert.issuer_name()).cloned())
    }

    fn fetch_issuer(&self, for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError> {
        self.issuer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.issuers.get(for_cert.issuer_name()).cloned())
    }
}

/// Fetcher whose every request fails
pub struct UnreachableFetcher;

impl NetworkFetcher for UnreachableFetcher {
    fn fetch_crl(&self, _for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError> {
        Err(SourceError::Unreachable {
            message: "offline".to_string(),
        })
    }

    fn fetch_issuer(&self, _for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError> {
        Err(SourceError::Timeout {
            url: "http://ca.test/issuer.crt".to_string(),
        })
    }
}

/// OCSP responder answering from a serial-keyed table
#[derive(Default)]
pub struct FakeOcsp {
    statuses: Mutex<HashMap<Vec<u8>, OcspStatus>>,
    pub calls: AtomicUsize,
}

impl FakeOcsp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(self, serial: &[u8], status: OcspStatus) -> Self {
        self.statuses.lock().unwrap().insert(serial.to_vec(), status);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcspResponder for FakeOcsp {
    fn check(
        &self,
        cert: &Certificate,
        _issuer: &Certificate,
        _as_of: DateTime<Utc>,
    ) -> Result<OcspStatus, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(cert.serial())
            .cloned()
            .ok_or_else(|| SourceError::HttpStatus {
                status: 503,
                url: "http://ocsp.test".to_string(),
            })
    }
}
