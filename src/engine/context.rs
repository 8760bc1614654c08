//! Per-call verification inputs and outputs

use crate::certificate::BuildOutcome;
use crate::config::Settings;
use crate::models::Evidence;
use crate::policy::PolicyRequest;
use crate::revocation::RevocationPolicy;
use crate::utils::StatusCode;
use chrono::{DateTime, Utc};

/// Everything a `verify_chain` call needs beyond the candidate certificates.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// DER anchors trusted for this call
    pub anchors: Vec<Vec<u8>>,
    /// Policies to enforce, in order
    pub policies: Vec<PolicyRequest>,
    /// DER CRLs supplied with the call
    pub crls: Vec<Vec<u8>>,
    /// Validity checks use this instant, or now when unset
    pub verify_time: Option<DateTime<Utc>>,
    pub stop_on_first_failure: bool,
    /// Accept a chain ending in any self-signed root
    pub implicit_anchors: bool,
    pub allow_network: bool,
    pub honor_trust_settings: bool,
    /// Revocation policy run when `policies` names none
    pub default_revocation: RevocationPolicy,
    pub want_evidence: bool,
    pub max_chain_length: usize,
}

impl Default for VerifyContext {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl VerifyContext {
    /// Seed a context from configured defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            anchors: Vec::new(),
            policies: Vec::new(),
            crls: Vec::new(),
            verify_time: None,
            stop_on_first_failure: settings.verify.stop_on_first_failure,
            implicit_anchors: settings.construction.implicit_anchors,
            allow_network: settings.network.fetch_enabled,
            honor_trust_settings: settings.construction.honor_trust_settings,
            default_revocation: RevocationPolicy::default_from_settings(&settings.revocation),
            want_evidence: false,
            max_chain_length: settings.construction.max_chain_length,
        }
    }

    pub fn with_anchors(mut self, anchors: Vec<Vec<u8>>) -> Self {
        self.anchors = anchors;
        self
    }

    pub fn with_policy(mut self, policy: PolicyRequest) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_crls(mut self, crls: Vec<Vec<u8>>) -> Self {
        self.crls = crls;
        self
    }

    pub fn at(mut self, verify_time: DateTime<Utc>) -> Self {
        self.verify_time = Some(verify_time);
        self
    }
}

/// Result of a `verify_chain` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub result: Result<(), StatusCode>,
    pub verified_to_root: bool,
    pub verified_to_anchor: bool,
    pub verified_via_trust_setting: bool,
    pub evidence: Option<Evidence>,
}

impl VerifyOutcome {
    pub fn is_trusted(&self) -> bool {
        self.result.is_ok()
    }
}

/// Result of a `construct_chain` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructedChain {
    /// DER certificates, leaf first
    pub certificates: Vec<Vec<u8>>,
    pub outcome: BuildOutcome,
}

impl ConstructedChain {
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultRevocation;
    use crate::revocation::CrlOptions;

    #[test]
    fn test_context_from_settings() {
        let mut settings = Settings::default();
        settings.revocation.default_policy = DefaultRevocation::Crl;
        settings.revocation.crl_required_per_cert = true;
        settings.construction.implicit_anchors = true;

        let ctx = VerifyContext::from_settings(&settings);
        assert!(ctx.implicit_anchors);
        assert!(ctx.stop_on_first_failure);
        assert_eq!(
            ctx.default_revocation,
            RevocationPolicy::Crl(CrlOptions {
                require_per_cert: true,
                require_if_dp_present: false,
                sufficient: true,
            })
        );
    }

    #[test]
    fn test_default_context() {
        let ctx = VerifyContext::default().with_policy(PolicyRequest::BasicX509);
        assert_eq!(ctx.default_revocation, RevocationPolicy::None);
        assert_eq!(ctx.policies.len(), 1);
        assert!(!ctx.allow_network);
        assert_eq!(ctx.max_chain_length, 32);
    }
}
