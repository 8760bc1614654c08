//! `x509-parser` backed certificate library

use super::{
    BasicConstraints, CertFields, CertLibrary, CrlFields, KeyUsage, NameConstraints, NameSubtree,
    PublicKeyInfo, RevokedEntry, SignatureOutcome, SignedItem,
};
use crate::utils::LibraryError;
use chrono::{DateTime, TimeZone, Utc};
use std::net::{Ipv4Addr, Ipv6Addr};
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

const OID_DSA: &str = "1.2.840.10040.4.1";
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";
const OID_AD_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// Extended key usage OIDs
pub const EKU_ANY: &str = "2.5.29.37.0";
pub const EKU_SERVER_AUTH: &str = "1.3.6.1.5.5.7.3.1";
pub const EKU_CLIENT_AUTH: &str = "1.3.6.1.5.5.7.3.2";
pub const EKU_CODE_SIGNING: &str = "1.3.6.1.5.5.7.3.3";
pub const EKU_EMAIL_PROTECTION: &str = "1.3.6.1.5.5.7.3.4";
pub const EKU_TIME_STAMPING: &str = "1.3.6.1.5.5.7.3.8";
pub const EKU_OCSP_SIGNING: &str = "1.3.6.1.5.5.7.3.9";

/// Certificate library on top of `x509-parser` and its `ring` verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct X509Library;

impl X509Library {
    pub fn new() -> Self {
        Self
    }
}

impl CertLibrary for X509Library {
    fn parse_certificate(&self, der: &[u8]) -> Result<CertFields, LibraryError> {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| LibraryError::Malformed {
            message: format!("Failed to parse certificate: {}", e),
        })?;

        let spki = cert.public_key();
        let algorithm = spki.algorithm.algorithm.to_id_string();
        let is_partial = algorithm == OID_DSA && spki.algorithm.parameters.is_none();

        let basic_constraints = cert
            .basic_constraints()
            .ok()
            .flatten()
            .map(|bc| BasicConstraints {
                ca: bc.value.ca,
                path_len: bc.value.path_len_constraint,
            });

        let key_usage = cert.key_usage().ok().flatten().map(|ku| KeyUsage {
            digital_signature: ku.value.digital_signature(),
            non_repudiation: ku.value.non_repudiation(),
            key_encipherment: ku.value.key_encipherment(),
            data_encipherment: ku.value.data_encipherment(),
            key_agreement: ku.value.key_agreement(),
            key_cert_sign: ku.value.key_cert_sign(),
            crl_sign: ku.value.crl_sign(),
        });

        let extended_key_usage = cert
            .extended_key_usage()
            .ok()
            .flatten()
            .map(|eku| extended_key_usage_oids(eku.value));

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|s| s.to_string());

        let mut fields = CertFields {
            subject: cert.subject().as_raw().to_vec(),
            issuer: cert.issuer().as_raw().to_vec(),
            subject_display: cert.subject().to_string(),
            issuer_display: cert.issuer().to_string(),
            serial: cert.raw_serial().to_vec(),
            version: cert.version().0 + 1,
            not_before: asn1_time_to_datetime(cert.validity().not_before)?,
            not_after: asn1_time_to_datetime(cert.validity().not_after)?,
            public_key: PublicKeyInfo {
                algorithm,
                spki_der: spki.raw.to_vec(),
                is_partial,
            },
            basic_constraints,
            key_usage,
            extended_key_usage,
            common_name,
            dns_names: Vec::new(),
            emails: Vec::new(),
            ip_addresses: Vec::new(),
            crl_distribution_points: Vec::new(),
            ocsp_urls: Vec::new(),
            ca_issuer_urls: Vec::new(),
            name_constraints: None,
            unknown_critical_extensions: Vec::new(),
        };

        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => fields.dns_names.push(dns.to_string()),
                    GeneralName::RFC822Name(email) => fields.emails.push(email.to_string()),
                    GeneralName::IPAddress(ip) => {
                        if let Some(text) = ip_bytes_to_string(ip) {
                            fields.ip_addresses.push(text);
                        }
                    }
                    _ => {}
                }
            }
        }

        for ext in cert.extensions() {
            let oid = ext.oid.to_id_string();
            let mut understood = is_known_extension(&oid);
            match ext.parsed_extension() {
                ParsedExtension::AuthorityInfoAccess(aia) => {
                    for desc in &aia.accessdescs {
                        if let GeneralName::URI(uri) = desc.access_location {
                            match desc.access_method.to_id_string().as_str() {
                                OID_AD_OCSP => fields.ocsp_urls.push(uri.to_string()),
                                OID_AD_CA_ISSUERS => fields.ca_issuer_urls.push(uri.to_string()),
                                _ => {}
                            }
                        }
                    }
                }
                ParsedExtension::CRLDistributionPoints(cdp) => {
                    for dp in cdp.iter() {
                        if let Some(DistributionPointName::FullName(names)) = &dp.distribution_point
                        {
                            for name in names {
                                if let GeneralName::URI(uri) = name {
                                    fields.crl_distribution_points.push(uri.to_string());
                                }
                            }
                        }
                    }
                }
                ParsedExtension::NameConstraints(nc) => {
                    // enforced only when every subtree has a form the policy checks handle
                    if let Some(constraints) = convert_name_constraints(nc) {
                        fields.name_constraints = Some(constraints);
                        understood = true;
                    }
                }
                _ => {}
            }

            if ext.critical && !understood {
                fields.unknown_critical_extensions.push(oid);
            }
        }

        Ok(fields)
    }

    fn parse_crl(&self, der: &[u8]) -> Result<CrlFields, LibraryError> {
        let (_, crl) =
            CertificateRevocationList::from_der(der).map_err(|e| LibraryError::Malformed {
                message: format!("Failed to parse CRL: {}", e),
            })?;

        let mut revoked = Vec::new();
        for entry in crl.iter_revoked_certificates() {
            revoked.push(RevokedEntry {
                serial: entry.raw_serial().to_vec(),
                revoked_at: asn1_time_to_datetime(entry.revocation_date)?,
                reason: entry
                    .reason_code()
                    .map(|(_, rc)| crl_reason_name(rc.0).to_string()),
            });
        }

        Ok(CrlFields {
            issuer: crl.issuer().as_raw().to_vec(),
            issuer_display: crl.issuer().to_string(),
            this_update: asn1_time_to_datetime(crl.last_update())?,
            next_update: crl.next_update().map(asn1_time_to_datetime).transpose()?,
            revoked,
        })
    }

    fn verify_signature(
        &self,
        item: SignedItem<'_>,
        issuer_key: &PublicKeyInfo,
        params: Option<&PublicKeyInfo>,
    ) -> SignatureOutcome {
        if issuer_key.is_partial {
            match params {
                // ring has no DSA support, so an inherited-parameter key can
                // never be checked here even when parameters are available.
                Some(p) if p.algorithm == issuer_key.algorithm => return SignatureOutcome::Failed,
                _ => return SignatureOutcome::NeedsMoreKeyMaterial,
            }
        }

        let spki = match SubjectPublicKeyInfo::from_der(&issuer_key.spki_der) {
            Ok((_, spki)) => spki,
            Err(_) => return SignatureOutcome::Failed,
        };

        let verified = match item {
            SignedItem::Certificate(der) => match X509Certificate::from_der(der) {
                Ok((_, cert)) => cert.verify_signature(Some(&spki)).is_ok(),
                Err(_) => false,
            },
            SignedItem::Crl(der) => match CertificateRevocationList::from_der(der) {
                Ok((_, crl)) => crl.verify_signature(&spki).is_ok(),
                Err(_) => false,
            },
        };

        if verified {
            SignatureOutcome::Verified
        } else {
            SignatureOutcome::Failed
        }
    }
}

fn extended_key_usage_oids(eku: &x509_parser::extensions::ExtendedKeyUsage) -> Vec<String> {
    let mut oids = Vec::new();
    if eku.any {
        oids.push(EKU_ANY.to_string());
    }
    if eku.server_auth {
        oids.push(EKU_SERVER_AUTH.to_string());
    }
    if eku.client_auth {
        oids.push(EKU_CLIENT_AUTH.to_string());
    }
    if eku.code_signing {
        oids.push(EKU_CODE_SIGNING.to_string());
    }
    if eku.email_protection {
        oids.push(EKU_EMAIL_PROTECTION.to_string());
    }
    if eku.time_stamping {
        oids.push(EKU_TIME_STAMPING.to_string());
    }
    if eku.ocsp_signing {
        oids.push(EKU_OCSP_SIGNING.to_string());
    }
    oids.extend(eku.other.iter().map(|oid| oid.to_id_string()));
    oids
}

fn convert_name_constraints(
    nc: &x509_parser::extensions::NameConstraints,
) -> Option<NameConstraints> {
    fn subtrees(
        list: &Option<Vec<x509_parser::extensions::GeneralSubtree>>,
    ) -> Option<Vec<NameSubtree>> {
        list.iter()
            .flatten()
            .map(|subtree| match &subtree.base {
                GeneralName::DNSName(dns) => Some(NameSubtree::Dns(dns.to_string())),
                GeneralName::RFC822Name(email) => Some(NameSubtree::Email(email.to_string())),
                GeneralName::IPAddress(ip) if ip.len() == 8 || ip.len() == 32 => {
                    let (address, mask) = ip.split_at(ip.len() / 2);
                    Some(NameSubtree::Ip {
                        address: address.to_vec(),
                        mask: mask.to_vec(),
                    })
                }
                _ => None,
            })
            .collect()
    }

    Some(NameConstraints {
        permitted: subtrees(&nc.permitted_subtrees)?,
        excluded: subtrees(&nc.excluded_subtrees)?,
    })
}

/// Extensions whose presence never changes a verdict, or that the policy
/// checks enforce. Name constraints are handled where they are parsed.
fn is_known_extension(oid: &str) -> bool {
    matches!(
        oid,
        "2.5.29.14" // Subject Key Identifier
            | "2.5.29.15" // Key Usage
            | "2.5.29.17" // Subject Alternative Name
            | "2.5.29.18" // Issuer Alternative Name
            | "2.5.29.19" // Basic Constraints
            | "2.5.29.31" // CRL Distribution Points
            | "2.5.29.32" // Certificate Policies
            | "2.5.29.35" // Authority Key Identifier
            | "2.5.29.37" // Extended Key Usage
            | "1.3.6.1.5.5.7.1.1" // Authority Information Access
            | "1.3.6.1.5.5.7.1.11" // Subject Information Access
    )
}

fn ip_bytes_to_string(ip: &[u8]) -> Option<String> {
    match ip.len() {
        4 => {
            let octets: [u8; 4] = ip.try_into().ok()?;
            Some(Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = ip.try_into().ok()?;
            Some(Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

/// RFC 5280 reason code names
pub(crate) fn crl_reason_name(code: u8) -> &'static str {
    match code {
        1 => "keyCompromise",
        2 => "cACompromise",
        3 => "affiliationChanged",
        4 => "superseded",
        5 => "cessationOfOperation",
        6 => "certificateHold",
        8 => "removeFromCRL",
        9 => "privilegeWithdrawn",
        10 => "aACompromise",
        _ => "unspecified",
    }
}

fn asn1_time_to_datetime(time: ASN1Time) -> Result<DateTime<Utc>, LibraryError> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| LibraryError::Malformed {
            message: "Invalid timestamp".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_malformed() {
        let lib = X509Library::new();
        assert!(matches!(
            lib.parse_certificate(b"not a certificate"),
            Err(LibraryError::Malformed { .. })
        ));
        assert!(lib.parse_crl(&[0x30, 0x03, 0x02, 0x01]).is_err());
    }

    #[test]
    fn test_partial_key_defers_without_params() {
        let lib = X509Library::new();
        let partial = PublicKeyInfo {
            algorithm: OID_DSA.to_string(),
            spki_der: vec![0x30, 0x00],
            is_partial: true,
        };
        assert_eq!(
            lib.verify_signature(SignedItem::Certificate(&[]), &partial, None),
            SignatureOutcome::NeedsMoreKeyMaterial
        );
    }

    #[test]
    fn test_ip_rendering() {
        assert_eq!(ip_bytes_to_string(&[10, 0, 0, 1]).as_deref(), Some("10.0.0.1"));
        assert_eq!(ip_bytes_to_string(&[1, 2, 3]), None);
    }

    #[test]
    fn test_known_extensions() {
        assert!(is_known_extension("2.5.29.19"));
        assert!(!is_known_extension("1.2.3.4"));
        // policy processing is not implemented
        assert!(!is_known_extension("2.5.29.33"));
        assert!(!is_known_extension("2.5.29.36"));
        assert!(!is_known_extension("2.5.29.54"));
        // only understood once its subtrees convert
        assert!(!is_known_extension("2.5.29.30"));
    }
}
