//! Certificate policy checks over a constructed chain

use super::names::{cert_matches_email, cert_matches_hostname, names_within_constraints};
use super::{PolicyRequest, SmimeOptions, SslOptions};
use crate::certificate::{CachedItem, CertPool, CertificateChain};
use crate::library::x509::{
    EKU_ANY, EKU_CLIENT_AUTH, EKU_CODE_SIGNING, EKU_EMAIL_PROTECTION, EKU_SERVER_AUTH,
};
use crate::library::CertFields;
use crate::utils::StatusCode;
use tracing::debug;

/// Records codes against chain members and remembers the first fatal one.
struct Findings {
    first_fatal: Option<StatusCode>,
}

impl Findings {
    fn record(&mut self, pool: &mut CertPool, chain: &CertificateChain, pos: usize, code: StatusCode) {
        let Some(id) = chain.get(pos) else {
            return;
        };
        if pool[id].add_status_code(code) && self.first_fatal.is_none() {
            self.first_fatal = Some(code);
        }
    }
}

/// Run one certificate policy over `chain`.
///
/// Basic X.509 checks apply under every certificate policy; the
/// policy-specific leaf checks follow.
pub fn check_certificate_policy(
    request: &PolicyRequest,
    pool: &mut CertPool,
    chain: &CertificateChain,
) -> Result<(), StatusCode> {
    let mut findings = Findings { first_fatal: None };

    basic_checks(pool, chain, &mut findings);

    if let Some(leaf) = chain.leaf() {
        let codes = match request {
            PolicyRequest::Ssl(opts) => ssl_checks(pool[leaf].fields(), opts),
            PolicyRequest::Smime(opts) => smime_checks(pool[leaf].fields(), opts),
            PolicyRequest::CodeSigning => code_signing_checks(pool[leaf].fields()),
            _ => Vec::new(),
        };
        for code in codes {
            findings.record(pool, chain, 0, code);
        }
    }

    debug!(
        "Policy {} finished: {:?}",
        request.id().as_str(),
        findings.first_fatal
    );
    match findings.first_fatal {
        Some(code) => Err(code),
        None => Ok(()),
    }
}

fn basic_checks(pool: &mut CertPool, chain: &CertificateChain, findings: &mut Findings) {
    // non-self-issued intermediates seen so far, counting up from the leaf
    let mut intermediates = 0u32;

    for (pos, id) in chain.ids().iter().copied().enumerate() {
        let mut codes = Vec::new();
        {
            let cert = &pool[id];
            if cert.is_expired() {
                codes.push(StatusCode::CertExpired);
            }
            if cert.is_not_valid_yet() {
                codes.push(StatusCode::CertNotValidYet);
            }
            if !cert.fields().unknown_critical_extensions.is_empty() {
                codes.push(StatusCode::UnknownCriticalExtension);
            }

            if pos > 0 {
                let fields = cert.fields();
                match fields.basic_constraints {
                    Some(bc) if bc.ca => {
                        if bc.path_len.is_some_and(|limit| intermediates > limit) {
                            codes.push(StatusCode::PathLengthExceeded);
                        }
                    }
                    Some(_) => codes.push(StatusCode::InvalidBasicConstraints),
                    // v1 and v2 certificates predate the extension
                    None if fields.version >= 3 => {
                        codes.push(StatusCode::InvalidBasicConstraints)
                    }
                    None => {}
                }
                if fields.key_usage.is_some_and(|ku| !ku.key_cert_sign) {
                    codes.push(StatusCode::InvalidKeyUsage);
                }
                if !cert.is_self_issued() {
                    intermediates += 1;
                }
            }
        }
        for code in codes {
            findings.record(pool, chain, pos, code);
        }
    }

    name_constraint_checks(pool, chain, findings);
}

/// Apply each CA's name constraints to every certificate below it.
///
/// Self-issued intermediates are exempt; the leaf never is.
fn name_constraint_checks(pool: &mut CertPool, chain: &CertificateChain, findings: &mut Findings) {
    let ids = chain.ids().to_vec();
    let mut violations = Vec::new();

    for (ca_pos, ca_id) in ids.iter().enumerate().skip(1) {
        let Some(constraints) = pool[*ca_id].fields().name_constraints.as_ref() else {
            continue;
        };
        for (pos, id) in ids.iter().enumerate().take(ca_pos) {
            let cert = &pool[*id];
            if pos > 0 && cert.is_self_issued() {
                continue;
            }
            if !names_within_constraints(cert.fields(), pos == 0, constraints) {
                debug!(
                    "{} violates name constraints of {}",
                    cert.subject_display(),
                    pool[*ca_id].subject_display()
                );
                violations.push(pos);
            }
        }
    }

    violations.sort_unstable();
    violations.dedup();
    for pos in violations {
        findings.record(pool, chain, pos, StatusCode::NameConstraintViolation);
    }
}

fn eku_permits(fields: &CertFields, wanted: &str) -> bool {
    match &fields.extended_key_usage {
        None => true,
        Some(ekus) => ekus.iter().any(|e| e == wanted || e == EKU_ANY),
    }
}

fn ssl_checks(fields: &CertFields, opts: &SslOptions) -> Vec<StatusCode> {
    let mut codes = Vec::new();
    if let Some(hostname) = &opts.hostname {
        if !cert_matches_hostname(fields, hostname) {
            codes.push(StatusCode::HostnameMismatch);
        }
    }
    let wanted = if opts.client {
        EKU_CLIENT_AUTH
    } else {
        EKU_SERVER_AUTH
    };
    if !eku_permits(fields, wanted) {
        codes.push(StatusCode::InvalidExtendedKeyUsage);
    }
    codes
}

fn smime_checks(fields: &CertFields, opts: &SmimeOptions) -> Vec<StatusCode> {
    let mut codes = Vec::new();
    if let Some(email) = &opts.email {
        if !cert_matches_email(fields, email) {
            codes.push(StatusCode::EmailMismatch);
        }
    }
    if !eku_permits(fields, EKU_EMAIL_PROTECTION) {
        codes.push(StatusCode::InvalidExtendedKeyUsage);
    }
    if fields
        .key_usage
        .is_some_and(|ku| !ku.digital_signature && !ku.non_repudiation && !ku.key_encipherment)
    {
        codes.push(StatusCode::InvalidKeyUsage);
    }
    codes
}

fn code_signing_checks(fields: &CertFields) -> Vec<StatusCode> {
    // code signing requires the extension to be present
    let permitted = fields
        .extended_key_usage
        .as_ref()
        .is_some_and(|ekus| ekus.iter().any(|e| e == EKU_CODE_SIGNING));
    if permitted {
        Vec::new()
    } else {
        vec![StatusCode::InvalidExtendedKeyUsage]
    }
}
