//! Hostname and email matching against certificate identities

use crate::library::{CertFields, NameConstraints, NameSubtree};
use std::net::IpAddr;

/// Check `hostname` against the certificate's SAN entries, falling back to
/// the subject CN only when no DNS SANs are present.
pub fn cert_matches_hostname(fields: &CertFields, hostname: &str) -> bool {
    let host = hostname.trim_end_matches('.').to_ascii_lowercase();

    if let Ok(ip) = host.parse::<IpAddr>() {
        return fields
            .ip_addresses
            .iter()
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .any(|candidate| candidate == ip);
    }

    if !fields.dns_names.is_empty() {
        return fields
            .dns_names
            .iter()
            .any(|san| matches_hostname(&san.to_ascii_lowercase(), &host));
    }

    fields
        .common_name
        .as_deref()
        .is_some_and(|cn| matches_hostname(&cn.to_ascii_lowercase(), &host))
}

/// Match a pattern against a hostname, both lowercase.
///
/// A `*.` wildcard matches exactly one leftmost label.
pub fn matches_hostname(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    if pattern == hostname {
        return true;
    }

    if let Some(suffix) = pattern.strip_prefix("*.") {
        // bare "*.com" style patterns are never honored
        if !suffix.contains('.') {
            return false;
        }
        if let Some((label, rest)) = hostname.split_once('.') {
            return !label.is_empty() && rest == suffix;
        }
    }

    false
}

/// Check `email` against the certificate's rfc822 SAN entries.
///
/// The domain part compares case-insensitively, the local part exactly.
pub fn cert_matches_email(fields: &CertFields, email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    fields.emails.iter().any(|candidate| {
        candidate
            .rsplit_once('@')
            .is_some_and(|(l, d)| l == local && d.eq_ignore_ascii_case(domain))
    })
}

/// Whether the DNS name falls inside the subtree rooted at `base`.
///
/// `example.com` covers the host and every subdomain; `.example.com` covers
/// subdomains only.
pub fn dns_in_subtree(name: &str, base: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let base = base.trim_end_matches('.').to_ascii_lowercase();
    if base.is_empty() {
        return true;
    }
    match base.strip_prefix('.') {
        Some(suffix) => name.ends_with(&format!(".{}", suffix)),
        None => name == base || name.ends_with(&format!(".{}", base)),
    }
}

/// Whether the mailbox falls inside `base`: a full mailbox, a host, or a
/// `.domain` covering every host below it.
pub fn email_in_subtree(email: &str, base: &str) -> bool {
    let Some((local, host)) = email.rsplit_once('@') else {
        return false;
    };
    if let Some((base_local, base_host)) = base.rsplit_once('@') {
        return local == base_local && host.eq_ignore_ascii_case(base_host);
    }
    let host = host.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    match base.strip_prefix('.') {
        Some(suffix) => host.ends_with(&format!(".{}", suffix)),
        None => host == base,
    }
}

/// Whether `ip` lies in the network `address`/`mask`.
pub fn ip_in_subtree(ip: &IpAddr, address: &[u8], mask: &[u8]) -> bool {
    let octets = match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    };
    octets.len() == address.len()
        && address.len() == mask.len()
        && octets
            .iter()
            .zip(address)
            .zip(mask)
            .all(|((o, a), m)| o & m == a & m)
}

enum SubjectName<'a> {
    Dns(&'a str),
    Email(&'a str),
    Ip(IpAddr),
}

impl SubjectName<'_> {
    /// `None` when the subtree constrains a different name form
    fn within(&self, subtree: &NameSubtree, excluding: bool) -> Option<bool> {
        match (self, subtree) {
            (SubjectName::Dns(name), NameSubtree::Dns(base)) => {
                let inside = dns_in_subtree(name, base);
                // a wildcard also reaches every host in an excluded subtree below it
                let reaches = excluding
                    && name
                        .strip_prefix("*.")
                        .is_some_and(|domain| dns_in_subtree(base, domain));
                Some(inside || reaches)
            }
            (SubjectName::Email(email), NameSubtree::Email(base)) => {
                Some(email_in_subtree(email, base))
            }
            (SubjectName::Ip(ip), NameSubtree::Ip { address, mask }) => {
                Some(ip_in_subtree(ip, address, mask))
            }
            _ => None,
        }
    }
}

/// Check a certificate's names against a CA's name constraints.
///
/// Each name must fall inside at least one permitted subtree of its form (if
/// the CA lists any) and inside no excluded subtree. A leaf without DNS SANs
/// has its subject CN checked as a DNS name.
pub fn names_within_constraints(
    fields: &CertFields,
    is_leaf: bool,
    constraints: &NameConstraints,
) -> bool {
    let mut names: Vec<SubjectName> = fields
        .dns_names
        .iter()
        .map(|n| SubjectName::Dns(n))
        .collect();
    if is_leaf && names.is_empty() {
        if let Some(cn) = fields.common_name.as_deref() {
            if cn.contains('.') && !cn.contains(' ') && cn.parse::<IpAddr>().is_err() {
                names.push(SubjectName::Dns(cn));
            }
        }
    }
    names.extend(fields.emails.iter().map(|e| SubjectName::Email(e)));
    names.extend(
        fields
            .ip_addresses
            .iter()
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .map(SubjectName::Ip),
    );

    names.iter().all(|name| {
        let excluded = constraints
            .excluded
            .iter()
            .any(|subtree| name.within(subtree, true) == Some(true));
        let mut same_form = constraints
            .permitted
            .iter()
            .filter_map(|subtree| name.within(subtree, false))
            .peekable();
        let permitted = same_form.peek().is_none() || same_form.any(|inside| inside);
        !excluded && permitted
    })
}
