//! Certificates as seen by the chain builder

use super::item::{CachedItem, ItemCore, ItemKind};
use crate::library::{CertFields, CertLibrary, PublicKeyInfo, SignatureOutcome};
use crate::policy::PolicyId;
use crate::trust_settings::{KeyUse, TrustDomain, TrustResult, TrustSettingsStore};
use crate::utils::{LibraryError, StatusCode};
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// Lazily computed self-signature state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootState {
    #[default]
    Unknown,
    /// Subject equals issuer but the self-signature could not be checked
    NamesMatch,
    NotRoot,
    IsRoot,
}

/// Where a certificate entered the verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertOrigin {
    Input,
    Anchor,
    Directory,
    Network,
}

/// Cached outcome of a trust-settings lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEvaluation {
    pub domain: Option<TrustDomain>,
    pub result: TrustResult,
    pub found_entry: bool,
    pub found_matching_entry: bool,
}

/// A parsed certificate plus the per-verification state attached to it.
#[derive(Debug, Clone)]
pub struct Certificate {
    core: ItemCore,
    fields: CertFields,
    sha1: [u8; 20],
    origin: CertOrigin,
    pub(crate) is_anchor: bool,
    pub(crate) is_leaf: bool,
    /// Scratch flag for one chain-build pass
    pub(crate) used: bool,
    root_state: RootState,
    status_codes: Vec<StatusCode>,
    allowed_errors: Vec<StatusCode>,
    /// An allowed error was recorded against this certificate
    ignored_error: bool,
    trust_evaluation: Option<TrustEvaluation>,
    pub(crate) revoke_check_good: bool,
    pub(crate) revoke_check_complete: bool,
}

impl Certificate {
    /// Parse `der` through the certificate library.
    pub fn from_der(
        library: &dyn CertLibrary,
        der: &[u8],
        origin: CertOrigin,
    ) -> Result<Self, LibraryError> {
        let fields = library.parse_certificate(der)?;
        Ok(Self::from_fields(Arc::from(der), fields, origin))
    }

    /// Assemble a certificate from already-extracted fields.
    pub fn from_fields(raw: Arc<[u8]>, fields: CertFields, origin: CertOrigin) -> Self {
        let sha1: [u8; 20] = Sha1::digest(&raw).into();
        let core = ItemCore::new(
            raw,
            fields.issuer.clone(),
            fields.issuer_display.clone(),
            fields.not_before,
            Some(fields.not_after),
        );
        Self {
            core,
            fields,
            sha1,
            origin,
            is_anchor: origin == CertOrigin::Anchor,
            is_leaf: false,
            used: false,
            root_state: RootState::Unknown,
            status_codes: Vec::new(),
            allowed_errors: Vec::new(),
            ignored_error: false,
            trust_evaluation: None,
            revoke_check_good: false,
            revoke_check_complete: false,
        }
    }

    pub fn fields(&self) -> &CertFields {
        &self.fields
    }

    /// Raw DER of the subject name
    pub fn subject_name(&self) -> &[u8] {
        &self.fields.subject
    }

    pub fn subject_display(&self) -> &str {
        &self.fields.subject_display
    }

    pub fn public_key(&self) -> &PublicKeyInfo {
        &self.fields.public_key
    }

    pub fn serial(&self) -> &[u8] {
        &self.fields.serial
    }

    /// SHA-1 over the encoded certificate, the trust-settings key
    pub fn sha1(&self) -> &[u8; 20] {
        &self.sha1
    }

    pub fn origin(&self) -> CertOrigin {
        self.origin
    }

    pub fn is_anchor(&self) -> bool {
        self.is_anchor
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn is_from_input_certs(&self) -> bool {
        self.origin == CertOrigin::Input
    }

    pub fn is_from_net(&self) -> bool {
        self.origin == CertOrigin::Network
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Subject and issuer names are identical
    pub fn is_self_issued(&self) -> bool {
        self.fields.subject == self.fields.issuer
    }

    pub fn root_state(&self) -> RootState {
        self.root_state
    }

    /// Forget the cached root state so the next query recomputes it.
    pub fn invalidate_root_state(&mut self) {
        self.root_state = RootState::Unknown;
    }

    /// Whether this certificate is a verified self-signed root.
    ///
    /// The self-signature is checked at most once per lifetime.
    pub fn is_self_signed(&mut self, library: &dyn CertLibrary) -> bool {
        if self.root_state == RootState::Unknown {
            self.root_state = if !self.is_self_issued() {
                RootState::NotRoot
            } else {
                match self.verify_with_issuer(self, None, library) {
                    SignatureOutcome::Verified => RootState::IsRoot,
                    SignatureOutcome::Failed => RootState::NotRoot,
                    SignatureOutcome::NeedsMoreKeyMaterial => RootState::NamesMatch,
                }
            };
        }
        self.root_state == RootState::IsRoot
    }

    /// Same public key and subject as `other`
    pub fn same_identity(&self, other: &Certificate) -> bool {
        self.fields.subject == other.fields.subject
            && self.fields.public_key.spki_der == other.fields.public_key.spki_der
    }

    /// Record `code` against this certificate.
    ///
    /// Returns true when the code is fatal, i.e. not in the allowed-error list.
    pub fn add_status_code(&mut self, code: StatusCode) -> bool {
        if !self.status_codes.contains(&code) {
            self.status_codes.push(code);
        }
        let fatal = self.is_status_fatal(code);
        if !fatal {
            self.ignored_error = true;
        }
        fatal
    }

    /// Whether `code` would be fatal for this certificate
    pub fn is_status_fatal(&self, code: StatusCode) -> bool {
        !self.allowed_errors.contains(&code)
    }

    pub fn has_status_code(&self, code: StatusCode) -> bool {
        self.status_codes.contains(&code)
    }

    pub fn status_codes(&self) -> &[StatusCode] {
        &self.status_codes
    }

    pub fn allowed_errors(&self) -> &[StatusCode] {
        &self.allowed_errors
    }

    pub fn has_ignored_error(&self) -> bool {
        self.ignored_error
    }

    pub fn revoke_check_good(&self) -> bool {
        self.revoke_check_good
    }

    pub fn revoke_check_complete(&self) -> bool {
        self.revoke_check_complete
    }

    pub fn trust_evaluation(&self) -> Option<&TrustEvaluation> {
        self.trust_evaluation.as_ref()
    }

    /// Consult the trust-settings store once and cache the answer.
    ///
    /// Populates the allowed-error list as a side effect. Returns
    /// `(match_found, any_entry_found)`.
    pub fn evaluate_trust_settings(
        &mut self,
        store: &dyn TrustSettingsStore,
        policy: PolicyId,
        policy_string: Option<&str>,
        key_use: Option<KeyUse>,
    ) -> (bool, bool) {
        if let Some(eval) = &self.trust_evaluation {
            return (eval.found_matching_entry, eval.found_entry);
        }

        let lookup = store.evaluate(&self.sha1, policy, policy_string, key_use);
        for code in &lookup.allowed_errors {
            if !self.allowed_errors.contains(code) {
                self.allowed_errors.push(*code);
            }
        }
        let eval = TrustEvaluation {
            domain: lookup.domain,
            result: lookup.result,
            found_entry: lookup.found_entry,
            found_matching_entry: lookup.found_matching_entry,
        };
        let answer = (eval.found_matching_entry, eval.found_entry);
        self.trust_evaluation = Some(eval);
        answer
    }

    /// Trust settings say to stop the search here
    pub fn trusted_by_settings(&self) -> bool {
        match self.trust_evaluation.as_ref().map(|e| e.result) {
            Some(TrustResult::TrustAsRoot) => true,
            Some(TrustResult::TrustRoot) => self.root_state == RootState::IsRoot,
            _ => false,
        }
    }

    pub fn denied_by_settings(&self) -> bool {
        self.trust_evaluation
            .as_ref()
            .is_some_and(|e| e.result == TrustResult::Deny)
    }

    /// Reset the per-pass scratch state.
    pub(crate) fn reset_pass(&mut self) {
        self.used = false;
    }
}

impl CachedItem for Certificate {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Certificate
    }

    fn expired_code(&self) -> StatusCode {
        StatusCode::CertExpired
    }

    fn not_valid_yet_code(&self) -> StatusCode {
        StatusCode::CertNotValidYet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust_settings::TrustSettingsLookup;
    use chrono::{TimeZone, Utc};

    fn fields(subject: &str, issuer: &str) -> CertFields {
        CertFields {
            subject: subject.as_bytes().to_vec(),
            issuer: issuer.as_bytes().to_vec(),
            subject_display: format!("CN={}", subject),
            issuer_display: format!("CN={}", issuer),
            serial: vec![1],
            version: 3,
            not_before: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            public_key: PublicKeyInfo {
                algorithm: "1.2.840.10045.2.1".to_string(),
                spki_der: subject.as_bytes().to_vec(),
                is_partial: false,
            },
            basic_constraints: None,
            key_usage: None,
            extended_key_usage: None,
            common_name: None,
            dns_names: Vec::new(),
            emails: Vec::new(),
            ip_addresses: Vec::new(),
            crl_distribution_points: Vec::new(),
            ocsp_urls: Vec::new(),
            ca_issuer_urls: Vec::new(),
            name_constraints: None,
            unknown_critical_extensions: Vec::new(),
        }
    }

    struct AllowExpired;

    impl TrustSettingsStore for AllowExpired {
        fn evaluate(
            &self,
            _cert_sha1: &[u8],
            _policy: PolicyId,
            _policy_string: Option<&str>,
            _key_use: Option<KeyUse>,
        ) -> TrustSettingsLookup {
            TrustSettingsLookup {
                domain: Some(TrustDomain::User),
                result: TrustResult::Unspecified,
                allowed_errors: vec![StatusCode::CertExpired],
                found_entry: true,
                found_matching_entry: true,
            }
        }
    }

    #[test]
    fn test_status_codes_respect_allow_list() {
        let mut cert = Certificate::from_fields(
            Arc::from(vec![0u8]),
            fields("leaf", "ca"),
            CertOrigin::Input,
        );
        assert!(cert.add_status_code(StatusCode::CertExpired));
        assert!(!cert.has_ignored_error());

        assert_eq!(
            cert.evaluate_trust_settings(&AllowExpired, PolicyId::Ssl, None, None),
            (true, true)
        );
        assert!(!cert.is_status_fatal(StatusCode::CertExpired));
        assert!(!cert.add_status_code(StatusCode::CertExpired));
        assert!(cert.has_ignored_error());
        assert!(cert.add_status_code(StatusCode::CertRevoked));
        assert_eq!(
            cert.status_codes(),
            &[StatusCode::CertExpired, StatusCode::CertRevoked]
        );
    }

    #[test]
    fn test_self_issued_detection() {
        let root = Certificate::from_fields(
            Arc::from(vec![1u8]),
            fields("root", "root"),
            CertOrigin::Anchor,
        );
        assert!(root.is_self_issued());
        assert!(root.is_anchor());
        let leaf = Certificate::from_fields(
            Arc::from(vec![2u8]),
            fields("leaf", "root"),
            CertOrigin::Input,
        );
        assert!(!leaf.is_self_issued());
        assert!(!leaf.same_identity(&root));
    }

    #[test]
    fn test_currency_recorded() {
        let mut cert = Certificate::from_fields(
            Arc::from(vec![3u8]),
            fields("leaf", "ca"),
            CertOrigin::Input,
        );
        let later = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            cert.calculate_current(Some(later)),
            Err(StatusCode::CertExpired)
        );
        assert!(cert.is_expired());
        let inside = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(cert.calculate_current(Some(inside)), Ok(()));
        assert!(!cert.is_expired());
    }
}
