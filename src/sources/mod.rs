//! Issuer and CRL sources
//!
//! Collaborators consulted by the chain builder and the revocation checker
//! when the caller's input does not contain what is needed.

pub mod files;
pub mod http;

pub use files::{read_certificates, read_crls};
pub use http::HttpFetcher;

use crate::certificate::{CachedItem, Certificate};
use crate::library::CertLibrary;
use crate::utils::{LibraryError, SourceError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Directory / database collaborator.
pub trait CertDirectory: Send + Sync {
    /// Find a certificate whose subject is the issuer of `subject`
    fn find_issuer_cert(&self, subject: &dyn CachedItem) -> Result<Option<Vec<u8>>, SourceError>;

    /// Find a CRL issued by `issuer_name` covering `for_cert` at `as_of`
    fn find_issuer_crl(
        &self,
        issuer_name: &[u8],
        for_cert: &Certificate,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Vec<u8>>, SourceError>;
}

/// Network collaborator, consulted only when fetching is enabled.
pub trait NetworkFetcher: Send + Sync {
    /// Download a CRL from one of the certificate's distribution points
    fn fetch_crl(&self, for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError>;

    /// Download the issuer certificate from the AIA caIssuers location
    fn fetch_issuer(&self, for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError>;
}

/// In-memory directory indexed by subject name and CRL issuer name.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    certs: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    crls: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    crl_windows: HashMap<Vec<u8>, (DateTime<Utc>, Option<DateTime<Utc>>)>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a certificate under its subject name.
    pub fn add_certificate(
        &mut self,
        library: &dyn CertLibrary,
        der: Vec<u8>,
    ) -> Result<(), LibraryError> {
        let fields = library.parse_certificate(&der)?;
        self.certs.entry(fields.subject).or_default().push(der);
        Ok(())
    }

    /// Store a CRL under its issuer name.
    pub fn add_crl(&mut self, library: &dyn CertLibrary, der: Vec<u8>) -> Result<(), LibraryError> {
        let fields = library.parse_crl(&der)?;
        self.crl_windows
            .insert(der.clone(), (fields.this_update, fields.next_update));
        self.crls.entry(fields.issuer).or_default().push(der);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.certs.values().map(Vec::len).sum::<usize>()
            + self.crls.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CertDirectory for MemoryDirectory {
    fn find_issuer_cert(&self, subject: &dyn CachedItem) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self
            .certs
            .get(subject.issuer_name())
            .and_then(|found| found.iter().find(|der| der.as_slice() != subject.raw()))
            .cloned())
    }

    fn find_issuer_crl(
        &self,
        issuer_name: &[u8],
        _for_cert: &Certificate,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        let Some(found) = self.crls.get(issuer_name) else {
            return Ok(None);
        };
        // Prefer a CRL current at `as_of`, else hand back whatever exists
        let current = found.iter().find(|der| {
            self.crl_windows
                .get(*der)
                .is_some_and(|(start, end)| *start <= as_of && end.map_or(true, |e| as_of <= e))
        });
        Ok(current.or_else(|| found.first()).cloned())
    }
}

/// Decode a body that may be DER or PEM.
pub(crate) fn decode_der_or_pem(bytes: &[u8]) -> Result<Vec<u8>, SourceError> {
    if bytes.starts_with(b"-----BEGIN") {
        ::pem::parse(bytes)
            .map(|p| p.into_contents())
            .map_err(|e| SourceError::Parse {
                message: e.to_string(),
            })
    } else {
        Ok(bytes.to_vec())
    }
}
