//! Verification evidence
//!
//! The ordered chain plus a parallel per-certificate status array, returned
//! when a caller asks for it.

use crate::certificate::{CachedItem, CertPool, CertificateChain, RootState};
use crate::trust_settings::TrustResult;
use crate::utils::StatusCode;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Per-certificate flags recorded during verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub is_expired: bool,
    pub is_not_valid_yet: bool,
    pub is_in_input_certs: bool,
    pub is_in_anchors: bool,
    pub is_root: bool,
    pub is_from_net: bool,
    pub trust_settings_found: bool,
    pub trust_settings_trust: bool,
    pub trust_settings_deny: bool,
    pub ignored_error: bool,
    pub revoke_check_good: bool,
    pub revoke_check_complete: bool,
}

/// One certificate in the evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub index: usize,
    pub subject: String,
    pub issuer: String,
    /// Base64 of the DER certificate
    pub der_base64: String,
    pub flags: StatusFlags,
    /// Every code recorded, including ones an allowed-error list overrode
    pub status_codes: Vec<StatusCode>,
}

impl EvidenceEntry {
    /// Decode the certificate back to DER
    pub fn der(&self) -> Option<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.der_base64)
            .ok()
    }
}

/// Constructed chain, leaf first, with per-certificate status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub certificates: Vec<EvidenceEntry>,
}

impl Evidence {
    pub fn from_chain(pool: &CertPool, chain: &CertificateChain) -> Self {
        let certificates = chain
            .ids()
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let cert = &pool[*id];
                let trust = cert.trust_evaluation();
                let flags = StatusFlags {
                    is_expired: cert.is_expired(),
                    is_not_valid_yet: cert.is_not_valid_yet(),
                    is_in_input_certs: cert.is_from_input_certs(),
                    is_in_anchors: cert.is_anchor(),
                    is_root: cert.root_state() == RootState::IsRoot,
                    is_from_net: cert.is_from_net(),
                    trust_settings_found: trust.is_some_and(|t| t.found_matching_entry),
                    trust_settings_trust: cert.trusted_by_settings(),
                    trust_settings_deny: trust.is_some_and(|t| t.result == TrustResult::Deny),
                    ignored_error: cert.has_ignored_error(),
                    revoke_check_good: cert.revoke_check_good(),
                    revoke_check_complete: cert.revoke_check_complete(),
                };
                EvidenceEntry {
                    index,
                    subject: cert.subject_display().to_string(),
                    issuer: cert.issuer_display().to_string(),
                    der_base64: base64::engine::general_purpose::STANDARD.encode(cert.raw()),
                    flags,
                    status_codes: cert.status_codes().to_vec(),
                }
            })
            .collect();
        Self { certificates }
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}
