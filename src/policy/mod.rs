//! Verification policies
//!
//! A verification call carries a list of [`PolicyRequest`]s. Certificate
//! policies (basic X.509, SSL, S/MIME, code signing) inspect the constructed
//! chain; revocation policies (CRL, OCSP) are handed to the revocation
//! checker.

pub mod names;
pub mod x509;

pub use x509::check_certificate_policy;

use crate::revocation::{CrlOptions, OcspOptions};
use crate::utils::TrustError;
use serde::{Deserialize, Serialize};

/// Policy identifier, also the key trust settings are filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyId {
    BasicX509,
    Ssl,
    Smime,
    CodeSigning,
    RevocationCrl,
    RevocationOcsp,
}

impl PolicyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicX509 => "basic_x509",
            Self::Ssl => "ssl",
            Self::Smime => "smime",
            Self::CodeSigning => "code_signing",
            Self::RevocationCrl => "revocation_crl",
            Self::RevocationOcsp => "revocation_ocsp",
        }
    }
}

/// SSL/TLS server or client policy options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslOptions {
    /// Host the leaf must be valid for
    pub hostname: Option<String>,
    /// Verify a client certificate rather than a server certificate
    pub client: bool,
}

/// S/MIME policy options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmimeOptions {
    pub email: Option<String>,
}

/// One requested policy with its options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRequest {
    BasicX509,
    Ssl(SslOptions),
    Smime(SmimeOptions),
    CodeSigning,
    Crl(CrlOptions),
    Ocsp(OcspOptions),
}

impl PolicyRequest {
    pub fn id(&self) -> PolicyId {
        match self {
            Self::BasicX509 => PolicyId::BasicX509,
            Self::Ssl(_) => PolicyId::Ssl,
            Self::Smime(_) => PolicyId::Smime,
            Self::CodeSigning => PolicyId::CodeSigning,
            Self::Crl(_) => PolicyId::RevocationCrl,
            Self::Ocsp(_) => PolicyId::RevocationOcsp,
        }
    }

    pub fn is_revocation(&self) -> bool {
        matches!(self, Self::Crl(_) | Self::Ocsp(_))
    }

    /// The string trust settings match against, if any
    pub fn policy_string(&self) -> Option<&str> {
        match self {
            Self::Ssl(opts) => opts.hostname.as_deref(),
            Self::Smime(opts) => opts.email.as_deref(),
            _ => None,
        }
    }

    /// Reject options that can never be satisfied.
    pub fn validate(&self) -> Result<(), TrustError> {
        let empty = match self {
            Self::Ssl(SslOptions {
                hostname: Some(h), ..
            }) => h.trim().is_empty().then_some("hostname"),
            Self::Smime(SmimeOptions { email: Some(e) }) => {
                (e.trim().is_empty() || !e.contains('@')).then_some("email")
            }
            _ => None,
        };
        match empty {
            Some(option) => Err(TrustError::InvalidArgument {
                message: format!("{} policy has an invalid {}", self.id().as_str(), option),
            }),
            None => Ok(()),
        }
    }
}
