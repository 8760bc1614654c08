//! Revocation checking
//!
//! [`check_revocation`] dispatches a revocation policy over a constructed
//! chain. CRLs are looked up in the call's supplied CRLs, the shared
//! [`RevocationCache`], the directory and finally the network; OCSP queries
//! go to an [`OcspResponder`].

pub mod cache;
pub mod crl;
pub mod ocsp;

pub use cache::{CacheStats, CrlLease, RevocationCache};
pub use ocsp::{HttpOcspResponder, OcspResponder, OcspStatus};

use crate::certificate::{BuildEnv, BuildFlags, CertGroup, CertPool, CertificateChain, Crl};
use crate::config::{DefaultRevocation, RevocationSettings};
use crate::utils::StatusCode;
use tracing::debug;

/// CRL policy options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrlOptions {
    /// Every certificate must be covered by a CRL
    pub require_per_cert: bool,
    /// A CRL is required when the certificate names a distribution point
    pub require_if_dp_present: bool,
    /// A good CRL answer settles the certificate for later policies
    pub sufficient: bool,
}

impl Default for CrlOptions {
    fn default() -> Self {
        Self {
            require_per_cert: false,
            require_if_dp_present: false,
            sufficient: true,
        }
    }
}

impl CrlOptions {
    pub fn from_settings(settings: &RevocationSettings) -> Self {
        Self {
            require_per_cert: settings.crl_required_per_cert,
            require_if_dp_present: settings.crl_required_if_dp_present,
            sufficient: settings.crl_sufficient,
        }
    }
}

/// OCSP policy options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcspOptions {
    /// Every certificate must get a definitive OCSP answer
    pub require_per_cert: bool,
    /// A good OCSP answer settles the certificate for later policies
    pub sufficient: bool,
}

impl Default for OcspOptions {
    fn default() -> Self {
        Self {
            require_per_cert: false,
            sufficient: true,
        }
    }
}

impl OcspOptions {
    pub fn from_settings(settings: &RevocationSettings) -> Self {
        Self {
            require_per_cert: settings.ocsp_required_per_cert,
            sufficient: settings.ocsp_sufficient,
        }
    }
}

/// The revocation policy run for one loop iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationPolicy {
    #[default]
    None,
    Crl(CrlOptions),
    Ocsp(OcspOptions),
}

impl RevocationPolicy {
    /// The policy configured to run when the caller asks for none
    pub fn default_from_settings(settings: &RevocationSettings) -> Self {
        match settings.default_policy {
            DefaultRevocation::None => Self::None,
            DefaultRevocation::Crl => Self::Crl(CrlOptions::from_settings(settings)),
            DefaultRevocation::Ocsp => Self::Ocsp(OcspOptions::from_settings(settings)),
        }
    }
}

/// Everything a revocation pass needs from the verification call
pub struct RevocationRun<'a> {
    pub pool: &'a mut CertPool,
    pub chain: &'a CertificateChain,
    /// Candidate certificates supplied with the call
    pub input: &'a CertGroup,
    pub anchors: &'a CertGroup,
    pub gathered: &'a mut CertGroup,
    pub env: BuildEnv<'a>,
    pub flags: BuildFlags,
    /// CRLs supplied with the call
    pub crls: &'a [Crl],
    pub cache: &'a RevocationCache,
    pub ocsp: Option<&'a dyn OcspResponder>,
    pub implicit_anchors: bool,
}

impl RevocationRun<'_> {
    /// Record `code` on chain member `pos`; true when it is fatal.
    fn record(&mut self, pos: usize, code: StatusCode) -> bool {
        match self.chain.get(pos) {
            Some(id) => self.pool[id].add_status_code(code),
            None => false,
        }
    }

    /// Chain positions a revocation policy still has to look at
    fn pending_positions(&mut self) -> Vec<usize> {
        let library = self.env.library;
        let mut pending = Vec::new();
        for (pos, id) in self.chain.ids().iter().copied().enumerate() {
            let cert = &mut self.pool[id];
            if cert.is_anchor() || cert.revoke_check_complete() || cert.is_self_signed(library) {
                continue;
            }
            pending.push(pos);
        }
        pending
    }
}

/// Run `policy` over the chain in `run`.
pub fn check_revocation(policy: RevocationPolicy, run: &mut RevocationRun<'_>) -> Result<(), StatusCode> {
    let result = match policy {
        RevocationPolicy::None => Ok(()),
        RevocationPolicy::Crl(opts) => crl::check_chain(opts, run),
        RevocationPolicy::Ocsp(opts) => ocsp::check_chain(opts, run),
    };
    debug!("Revocation policy {:?} finished: {:?}", policy, result);
    result
}
