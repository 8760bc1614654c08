//! Error types for certpath
//!
//! Three tiers of failure exist in a verification call:
//! - [`TrustError`] aborts the whole call (malformed input, bad arguments).
//! - A chain-terminal [`StatusCode`] (for example an invalid root) is returned
//!   as the construction result while the partial chain is kept.
//! - Per-certificate [`StatusCode`]s are accumulated on each certificate and
//!   checked against its allowed-error list before they affect the verdict.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal errors: the verification call cannot proceed at all.
#[derive(Error, Debug)]
pub enum TrustError {
    #[error("Failed to parse certificate #{index}: {message}")]
    MalformedCertificate { index: usize, message: String },

    #[error("Failed to parse anchor #{index}: {message}")]
    MalformedAnchor { index: usize, message: String },

    #[error("Failed to parse CRL: {message}")]
    MalformedCrl { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Failures reported by the certificate library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Malformed item: {message}")]
    Malformed { message: String },

    #[error("Unsupported item: {message}")]
    Unsupported { message: String },
}

/// Failures from directory, network and OCSP collaborators.
///
/// These never abort a verification. Callers log them and carry on as if the
/// lookup found nothing.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source unreachable: {message}")]
    Unreachable { message: String },

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to parse response: {message}")]
    Parse { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Failed to read {path}: {message}")]
    File { path: String, message: String },
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Per-certificate and chain-level status codes.
///
/// These are recorded against individual certificates and surface in the
/// evidence output even when an allowed-error override turns the verdict
/// into success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    CertExpired,
    CertNotValidYet,
    InvalidRoot,
    NotTrusted,
    RootNotAnchor,
    KeyIncomplete,
    InvalidSignature,
    CertRevoked,
    CrlNotFound,
    CrlExpired,
    CrlNotValidYet,
    CrlNotTrusted,
    OcspUnavailable,
    OcspStatusUnknown,
    HostnameMismatch,
    EmailMismatch,
    InvalidExtendedKeyUsage,
    InvalidKeyUsage,
    InvalidBasicConstraints,
    PathLengthExceeded,
    UnknownCriticalExtension,
    NameConstraintViolation,
    TrustSettingDeny,
}

impl StatusCode {
    /// Stable identifier, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::CertExpired => "cert_expired",
            StatusCode::CertNotValidYet => "cert_not_valid_yet",
            StatusCode::InvalidRoot => "invalid_root",
            StatusCode::NotTrusted => "not_trusted",
            StatusCode::RootNotAnchor => "root_not_anchor",
            StatusCode::KeyIncomplete => "key_incomplete",
            StatusCode::InvalidSignature => "invalid_signature",
            StatusCode::CertRevoked => "cert_revoked",
            StatusCode::CrlNotFound => "crl_not_found",
            StatusCode::CrlExpired => "crl_expired",
            StatusCode::CrlNotValidYet => "crl_not_valid_yet",
            StatusCode::CrlNotTrusted => "crl_not_trusted",
            StatusCode::OcspUnavailable => "ocsp_unavailable",
            StatusCode::OcspStatusUnknown => "ocsp_status_unknown",
            StatusCode::HostnameMismatch => "hostname_mismatch",
            StatusCode::EmailMismatch => "email_mismatch",
            StatusCode::InvalidExtendedKeyUsage => "invalid_extended_key_usage",
            StatusCode::InvalidKeyUsage => "invalid_key_usage",
            StatusCode::InvalidBasicConstraints => "invalid_basic_constraints",
            StatusCode::PathLengthExceeded => "path_length_exceeded",
            StatusCode::UnknownCriticalExtension => "unknown_critical_extension",
            StatusCode::NameConstraintViolation => "name_constraint_violation",
            StatusCode::TrustSettingDeny => "trust_setting_deny",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            StatusCode::CertExpired => "Certificate has expired",
            StatusCode::CertNotValidYet => "Certificate is not yet valid",
            StatusCode::InvalidRoot => "Root certificate failed self-signature verification",
            StatusCode::NotTrusted => "Chain does not end in a trusted certificate",
            StatusCode::RootNotAnchor => "Root certificate is not a trusted anchor",
            StatusCode::KeyIncomplete => "Public key is missing domain parameters",
            StatusCode::InvalidSignature => "Signature verification failed",
            StatusCode::CertRevoked => "Certificate has been revoked",
            StatusCode::CrlNotFound => "No CRL could be obtained",
            StatusCode::CrlExpired => "CRL has expired",
            StatusCode::CrlNotValidYet => "CRL is not yet valid",
            StatusCode::CrlNotTrusted => "CRL signature could not be verified",
            StatusCode::OcspUnavailable => "No OCSP response could be obtained",
            StatusCode::OcspStatusUnknown => "OCSP responder reported unknown status",
            StatusCode::HostnameMismatch => "Hostname does not match certificate",
            StatusCode::EmailMismatch => "Email address does not match certificate",
            StatusCode::InvalidExtendedKeyUsage => "Extended key usage does not permit this use",
            StatusCode::InvalidKeyUsage => "Key usage does not permit this use",
            StatusCode::InvalidBasicConstraints => "Certificate is not a CA but is used as issuer",
            StatusCode::PathLengthExceeded => "Path length constraint violated",
            StatusCode::UnknownCriticalExtension => "Unrecognized critical extension",
            StatusCode::NameConstraintViolation => "Name falls outside an issuer's name constraints",
            StatusCode::TrustSettingDeny => "Certificate is explicitly distrusted",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_str())
    }
}

/// Result type alias using TrustError
pub type Result<T> = std::result::Result<T, TrustError>;
