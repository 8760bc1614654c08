//! Certificate library capability
//!
//! The trust engine never touches ASN.1 directly. Parsing of certificates and
//! CRLs and the signature primitive are delegated to a [`CertLibrary`]. The
//! crate ships [`X509Library`], built on `x509-parser`.

pub mod x509;

pub use x509::X509Library;

use crate::utils::LibraryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subject public key as seen by the chain builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    /// Dotted algorithm OID
    pub algorithm: String,
    /// DER-encoded SubjectPublicKeyInfo
    pub spki_der: Vec<u8>,
    /// Key lacks domain parameters that must be inherited from an issuer
    #[serde(default)]
    pub is_partial: bool,
}

/// Basic constraints extension contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// Key usage bits the policy checks care about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyUsage {
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_encipherment: bool,
    pub data_encipherment: bool,
    pub key_agreement: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

/// One subtree of a name constraints extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSubtree {
    Dns(String),
    Email(String),
    /// Network address and mask of equal length (4 or 16 bytes)
    Ip { address: Vec<u8>, mask: Vec<u8> },
}

/// Name constraints extension contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameConstraints {
    pub permitted: Vec<NameSubtree>,
    pub excluded: Vec<NameSubtree>,
}

/// Fields extracted from a parsed certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertFields {
    /// Raw DER of the subject Name
    pub subject: Vec<u8>,
    /// Raw DER of the issuer Name
    pub issuer: Vec<u8>,
    /// One-line rendering of the subject
    pub subject_display: String,
    /// One-line rendering of the issuer
    pub issuer_display: String,
    /// Big-endian serial number bytes
    pub serial: Vec<u8>,
    /// X.509 version (1, 2 or 3)
    pub version: u32,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: PublicKeyInfo,
    #[serde(default)]
    pub basic_constraints: Option<BasicConstraints>,
    #[serde(default)]
    pub key_usage: Option<KeyUsage>,
    /// Extended key usage OIDs, `None` when the extension is absent
    #[serde(default)]
    pub extended_key_usage: Option<Vec<String>>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub crl_distribution_points: Vec<String>,
    #[serde(default)]
    pub ocsp_urls: Vec<String>,
    #[serde(default)]
    pub ca_issuer_urls: Vec<String>,
    /// Subtrees a CA places on names below it
    #[serde(default)]
    pub name_constraints: Option<NameConstraints>,
    /// OIDs of critical extensions the library does not understand
    #[serde(default)]
    pub unknown_critical_extensions: Vec<String>,
}

/// A single revoked entry from a CRL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedEntry {
    pub serial: Vec<u8>,
    pub revoked_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Fields extracted from a parsed CRL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrlFields {
    /// Raw DER of the issuer Name
    pub issuer: Vec<u8>,
    pub issuer_display: String,
    pub this_update: DateTime<Utc>,
    #[serde(default)]
    pub next_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked: Vec<RevokedEntry>,
}

/// The signed object handed to the signature primitive.
#[derive(Debug, Clone, Copy)]
pub enum SignedItem<'a> {
    Certificate(&'a [u8]),
    Crl(&'a [u8]),
}

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    Verified,
    Failed,
    /// The issuer key is partial and no parameters were supplied. Retry once
    /// a certificate carrying the missing parameters is known.
    NeedsMoreKeyMaterial,
}

/// Certificate Library and Crypto Provider capability.
pub trait CertLibrary: Send + Sync {
    /// Parse a DER certificate
    fn parse_certificate(&self, der: &[u8]) -> Result<CertFields, LibraryError>;

    /// Parse a DER CRL
    fn parse_crl(&self, der: &[u8]) -> Result<CrlFields, LibraryError>;

    /// Verify the signature on `item` with `issuer_key`.
    ///
    /// `params` supplies the domain parameters when `issuer_key` is partial.
    fn verify_signature(
        &self,
        item: SignedItem<'_>,
        issuer_key: &PublicKeyInfo,
        params: Option<&PublicKeyInfo>,
    ) -> SignatureOutcome;
}
