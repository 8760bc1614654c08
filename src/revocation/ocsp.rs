//! OCSP revocation policy
//!
//! Queries an [`OcspResponder`] for each certificate in the chain that a
//! previous revocation policy has not already settled.

use super::{OcspOptions, RevocationRun};
use crate::certificate::Certificate;
use crate::library::x509::crl_reason_name;
use crate::utils::{SourceError, StatusCode};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::{debug, warn};
use x509_parser::der_parser::asn1_rs::{Any, BitString, Class, Oid, Tag};
use x509_parser::prelude::*;

const OID_OCSP_BASIC: &str = "1.3.6.1.5.5.7.48.1.1";
const OID_SHA1: &str = "1.3.14.3.2.26";
/// Tolerated clock difference between responder and verifier
const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Status reported by an OCSP responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcspStatus {
    Good,
    Revoked {
        revoked_at: Option<DateTime<Utc>>,
        reason: Option<String>,
    },
    Unknown {
        reason: String,
    },
}

/// OCSP collaborator
pub trait OcspResponder: Send + Sync {
    /// Status of `cert` as of `as_of`, issued by `issuer`
    fn check(
        &self,
        cert: &Certificate,
        issuer: &Certificate,
        as_of: DateTime<Utc>,
    ) -> Result<OcspStatus, SourceError>;
}

/// Sends OCSP requests to the responder named in the certificate's AIA
pub struct HttpOcspResponder {
    client: Client,
}

impl HttpOcspResponder {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Backend {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn query(&self, url: &str, request: Vec<u8>) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/ocsp-request")
            .body(request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    SourceError::Unreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SourceError::Parse {
                message: e.to_string(),
            })
    }
}

impl OcspResponder for HttpOcspResponder {
    fn check(
        &self,
        cert: &Certificate,
        issuer: &Certificate,
        as_of: DateTime<Utc>,
    ) -> Result<OcspStatus, SourceError> {
        let Some(url) = cert
            .fields()
            .ocsp_urls
            .iter()
            .find(|u| u.starts_with("http://") || u.starts_with("https://"))
        else {
            return Ok(OcspStatus::Unknown {
                reason: "certificate names no OCSP responder".to_string(),
            });
        };

        let request = build_request(cert, issuer)?;
        let body = self.query(url, request)?;
        evaluate_response(&body, cert, issuer, as_of)
    }
}

/// Build a DER-encoded OCSP request with a SHA-1 CertID
pub fn build_request(cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>, SourceError> {
    let (_, spki) = SubjectPublicKeyInfo::from_der(&issuer.public_key().spki_der).map_err(|e| {
        SourceError::Parse {
            message: format!("Failed to parse issuer key: {:?}", e),
        }
    })?;

    let issuer_name_hash = Sha1::digest(issuer.subject_name());
    // hash over the BIT STRING content, without tag and length
    let issuer_key_hash = Sha1::digest(&*spki.subject_public_key.data);
    let serial = cert.serial();

    // SHA-1 AlgorithmIdentifier: SEQUENCE { OID 1.3.14.3.2.26 }
    let sha1_alg_id: [u8; 9] = [0x30, 0x07, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a];

    let mut cert_id = Vec::new();
    cert_id.extend_from_slice(&sha1_alg_id);
    cert_id.push(0x04);
    cert_id.push(issuer_name_hash.len() as u8);
    cert_id.extend_from_slice(&issuer_name_hash);
    cert_id.push(0x04);
    cert_id.push(issuer_key_hash.len() as u8);
    cert_id.extend_from_slice(&issuer_key_hash);
    cert_id.push(0x02);
    der_encode_length(&mut cert_id, serial.len());
    cert_id.extend_from_slice(serial);

    // OCSPRequest { TBSRequest { requestList { Request { CertID } } } }
    let cert_id = der_wrap_sequence(&cert_id);
    let request = der_wrap_sequence(&cert_id);
    let request_list = der_wrap_sequence(&request);
    let tbs_request = der_wrap_sequence(&request_list);
    Ok(der_wrap_sequence(&tbs_request))
}

fn parse_error(message: impl Into<String>) -> SourceError {
    SourceError::Parse {
        message: message.into(),
    }
}

/// One DER element together with its full encoding
struct Element<'a> {
    any: Any<'a>,
    raw: &'a [u8],
}

impl<'a> Element<'a> {
    fn is_universal(&self, tag: Tag) -> bool {
        self.any.header.class() == Class::Universal && self.any.header.tag() == tag
    }

    fn is_context(&self, number: u32) -> bool {
        self.any.header.class() == Class::ContextSpecific && self.any.header.tag().0 == number
    }

    fn children(&self) -> Result<Vec<Element<'a>>, SourceError> {
        elements(self.any.data)
    }
}

/// Split DER content into its elements
fn elements(content: &[u8]) -> Result<Vec<Element<'_>>, SourceError> {
    let mut rest = content;
    let mut items = Vec::new();
    while !rest.is_empty() {
        let (next, any) = Any::from_der(rest)
            .map_err(|e| parse_error(format!("Malformed DER in OCSP response: {:?}", e)))?;
        items.push(Element {
            any,
            raw: &rest[..rest.len() - next.len()],
        });
        rest = next;
    }
    Ok(items)
}

fn field<'e, 'a>(
    items: &'e [Element<'a>],
    index: usize,
    tag: Tag,
    what: &str,
) -> Result<&'e Element<'a>, SourceError> {
    items
        .get(index)
        .filter(|e| e.is_universal(tag))
        .ok_or_else(|| parse_error(format!("OCSP response missing {}", what)))
}

/// The content of an EXPLICIT wrapper
fn unwrap_explicit<'a>(wrapper: &Element<'a>, what: &str) -> Result<Element<'a>, SourceError> {
    wrapper
        .children()?
        .into_iter()
        .next()
        .ok_or_else(|| parse_error(format!("Empty {}", what)))
}

/// One SingleResponse with its CertID
#[derive(Debug)]
struct SingleResponse {
    hash_algorithm: String,
    issuer_name_hash: Vec<u8>,
    issuer_key_hash: Vec<u8>,
    serial: Vec<u8>,
    status: OcspStatus,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
}

/// A decoded BasicOCSPResponse whose signature has not been checked
struct BasicResponse<'a> {
    tbs_raw: &'a [u8],
    signature_algorithm: AlgorithmIdentifier<'a>,
    signature: BitString<'a>,
    /// Certificates the responder sent along, raw DER
    certs: Vec<&'a [u8]>,
    responses: Vec<SingleResponse>,
}

enum Decoded<'a> {
    /// responseStatus other than successful
    Unsuccessful(&'static str),
    Basic(BasicResponse<'a>),
}

fn decode_response(bytes: &[u8]) -> Result<Decoded<'_>, SourceError> {
    let (_, outer) = Any::from_der(bytes)
        .map_err(|e| parse_error(format!("Failed to parse OCSP response: {:?}", e)))?;
    if outer.header.tag() != Tag::Sequence {
        return Err(parse_error("OCSP response is not a SEQUENCE"));
    }
    let outer = elements(outer.data)?;
    let status = field(&outer, 0, Tag::Enumerated, "responseStatus")?
        .any
        .data
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));

    if status != 0 {
        let name = match status {
            1 => "malformedRequest",
            2 => "internalError",
            3 => "tryLater",
            5 => "sigRequired",
            6 => "unauthorized",
            _ => "unknown",
        };
        return Ok(Decoded::Unsuccessful(name));
    }

    // responseBytes [0] EXPLICIT ResponseBytes { responseType, response }
    let wrapper = outer
        .get(1)
        .filter(|e| e.is_context(0))
        .ok_or_else(|| parse_error("No responseBytes in successful OCSP response"))?;
    let response_bytes = unwrap_explicit(wrapper, "responseBytes")?.children()?;
    let (_, response_type) = Oid::from_der(field(&response_bytes, 0, Tag::Oid, "responseType")?.raw)
        .map_err(|_| parse_error("Invalid responseType"))?;
    if response_type.to_id_string() != OID_OCSP_BASIC {
        return Err(parse_error(format!(
            "Unsupported OCSP response type {}",
            response_type
        )));
    }
    let basic = field(&response_bytes, 1, Tag::OctetString, "response")?.any.data;

    // BasicOCSPResponse { tbsResponseData, signatureAlgorithm, signature, certs [0] }
    let (_, basic) = Any::from_der(basic)
        .map_err(|e| parse_error(format!("Failed to parse BasicOCSPResponse: {:?}", e)))?;
    let basic = elements(basic.data)?;
    let tbs = field(&basic, 0, Tag::Sequence, "tbsResponseData")?;
    let (_, signature_algorithm) =
        AlgorithmIdentifier::from_der(field(&basic, 1, Tag::Sequence, "signatureAlgorithm")?.raw)
            .map_err(|_| parse_error("Invalid signatureAlgorithm"))?;
    let (_, signature) = BitString::from_der(field(&basic, 2, Tag::BitString, "signature")?.raw)
        .map_err(|_| parse_error("Invalid signature"))?;
    let certs = match basic.get(3).filter(|e| e.is_context(0)) {
        Some(wrapper) => unwrap_explicit(wrapper, "certs")?
            .children()?
            .into_iter()
            .map(|cert| cert.raw)
            .collect(),
        None => Vec::new(),
    };

    // ResponseData { version [0], responderID, producedAt, responses, extensions [1] }
    let data = tbs.children()?;
    let responses = data
        .iter()
        .find(|e| e.is_universal(Tag::Sequence))
        .ok_or_else(|| parse_error("OCSP response missing responses"))?
        .children()?
        .iter()
        .map(decode_single)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Decoded::Basic(BasicResponse {
        tbs_raw: tbs.raw,
        signature_algorithm,
        signature,
        certs,
        responses,
    }))
}

fn decode_single(single: &Element<'_>) -> Result<SingleResponse, SourceError> {
    let items = single.children()?;
    let cert_id = field(&items, 0, Tag::Sequence, "certID")?.children()?;
    let (_, hash_algorithm) =
        AlgorithmIdentifier::from_der(field(&cert_id, 0, Tag::Sequence, "hashAlgorithm")?.raw)
            .map_err(|_| parse_error("Invalid CertID hashAlgorithm"))?;
    let status = items
        .get(1)
        .ok_or_else(|| parse_error("OCSP response missing certStatus"))?;
    let this_update = items
        .get(2)
        .and_then(generalized_time)
        .ok_or_else(|| parse_error("OCSP response missing thisUpdate"))?;
    let next_update = match items.get(3).filter(|e| e.is_context(0)) {
        Some(wrapper) => Some(
            generalized_time(&unwrap_explicit(wrapper, "nextUpdate")?)
                .ok_or_else(|| parse_error("Invalid nextUpdate"))?,
        ),
        None => None,
    };

    Ok(SingleResponse {
        hash_algorithm: hash_algorithm.algorithm.to_id_string(),
        issuer_name_hash: field(&cert_id, 1, Tag::OctetString, "issuerNameHash")?
            .any
            .data
            .to_vec(),
        issuer_key_hash: field(&cert_id, 2, Tag::OctetString, "issuerKeyHash")?
            .any
            .data
            .to_vec(),
        serial: field(&cert_id, 3, Tag::Integer, "serialNumber")?
            .any
            .data
            .to_vec(),
        status: decode_cert_status(status)?,
        this_update,
        next_update,
    })
}

/// CertStatus ::= CHOICE { good [0], revoked [1] RevokedInfo, unknown [2] }
fn decode_cert_status(status: &Element<'_>) -> Result<OcspStatus, SourceError> {
    if status.any.header.class() != Class::ContextSpecific {
        return Err(parse_error("Invalid certStatus"));
    }
    Ok(match status.any.header.tag().0 {
        0 => OcspStatus::Good,
        1 => {
            // RevokedInfo { revocationTime, revocationReason [0] EXPLICIT CRLReason }
            let info = status.children()?;
            let reason = match info.get(1).filter(|e| e.is_context(0)) {
                Some(wrapper) => unwrap_explicit(wrapper, "revocationReason")?
                    .any
                    .data
                    .first()
                    .map(|code| crl_reason_name(*code).to_string()),
                None => None,
            };
            OcspStatus::Revoked {
                revoked_at: info.first().and_then(generalized_time),
                reason,
            }
        }
        2 => OcspStatus::Unknown {
            reason: "Responder reported unknown status".to_string(),
        },
        tag => OcspStatus::Unknown {
            reason: format!("Unexpected CertStatus tag: {}", tag),
        },
    })
}

fn generalized_time(element: &Element<'_>) -> Option<DateTime<Utc>> {
    if !element.is_universal(Tag::GeneralizedTime) {
        return None;
    }
    let text = std::str::from_utf8(element.any.data).ok()?;
    let digits = text.trim_end_matches('Z').split('.').next()?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn signature_verifies(basic: &BasicResponse<'_>, key: &SubjectPublicKeyInfo<'_>) -> bool {
    x509_parser::verify::verify_signature(
        key,
        &basic.signature_algorithm,
        &basic.signature,
        basic.tbs_raw,
    )
    .is_ok()
}

/// A delegated responder: issued and signed by the CA, current, and
/// carrying the OCSP signing extended key usage.
fn authorized_responder(
    responder: &X509Certificate<'_>,
    issuer: &Certificate,
    issuer_key: &SubjectPublicKeyInfo<'_>,
    as_of: DateTime<Utc>,
) -> bool {
    let ocsp_signing = responder
        .extended_key_usage()
        .ok()
        .flatten()
        .is_some_and(|eku| eku.value.ocsp_signing);
    let validity = responder.validity();
    let current = validity.not_before.timestamp() <= as_of.timestamp()
        && as_of.timestamp() <= validity.not_after.timestamp();

    ocsp_signing
        && current
        && responder.issuer().as_raw() == issuer.subject_name()
        && responder.verify_signature(Some(issuer_key)).is_ok()
}

/// Whether the response was signed by the issuer or a responder it authorized
fn signed_by_authorized_key(
    basic: &BasicResponse<'_>,
    issuer: &Certificate,
    issuer_key: &SubjectPublicKeyInfo<'_>,
    as_of: DateTime<Utc>,
) -> bool {
    if signature_verifies(basic, issuer_key) {
        return true;
    }
    basic.certs.iter().any(|raw| {
        let Ok((_, responder)) = X509Certificate::from_der(raw) else {
            return false;
        };
        authorized_responder(&responder, issuer, issuer_key, as_of)
            && signature_verifies(basic, responder.public_key())
    })
}

/// Decode an OCSP response and return the status it gives `cert`.
///
/// The response must be signed by `issuer` or by a responder `issuer`
/// delegated to, answer for `cert` under `issuer`'s name and key hashes, and
/// be current at `as_of`. Anything else yields [`OcspStatus::Unknown`].
pub fn evaluate_response(
    bytes: &[u8],
    cert: &Certificate,
    issuer: &Certificate,
    as_of: DateTime<Utc>,
) -> Result<OcspStatus, SourceError> {
    let basic = match decode_response(bytes)? {
        Decoded::Unsuccessful(name) => {
            return Ok(OcspStatus::Unknown {
                reason: format!("OCSP responder returned: {}", name),
            })
        }
        Decoded::Basic(basic) => basic,
    };

    let (_, issuer_key) = SubjectPublicKeyInfo::from_der(&issuer.public_key().spki_der)
        .map_err(|e| parse_error(format!("Failed to parse issuer key: {:?}", e)))?;
    if !signed_by_authorized_key(&basic, issuer, &issuer_key, as_of) {
        warn!(
            "OCSP response for {} is not signed by an authorized responder",
            cert.subject_display()
        );
        return Ok(OcspStatus::Unknown {
            reason: "OCSP response signature does not verify".to_string(),
        });
    }

    let name_hash = Sha1::digest(issuer.subject_name());
    let key_hash = Sha1::digest(&*issuer_key.subject_public_key.data);
    let wanted = trim_leading_zeros(cert.serial());
    let Some(single) = basic.responses.into_iter().find(|single| {
        single.hash_algorithm == OID_SHA1
            && single.issuer_name_hash == name_hash.as_slice()
            && single.issuer_key_hash == key_hash.as_slice()
            && trim_leading_zeros(&single.serial) == wanted
    }) else {
        return Ok(OcspStatus::Unknown {
            reason: "Could not find matching SingleResponse in OCSP response".to_string(),
        });
    };

    let skew = chrono::Duration::seconds(MAX_CLOCK_SKEW_SECS);
    if single.this_update > as_of + skew {
        return Ok(OcspStatus::Unknown {
            reason: format!("OCSP response not valid until {}", single.this_update),
        });
    }
    if single.next_update.is_some_and(|next| next < as_of - skew) {
        return Ok(OcspStatus::Unknown {
            reason: "OCSP response is stale".to_string(),
        });
    }
    Ok(single.status)
}

/// Encode a DER length
fn der_encode_length(buf: &mut Vec<u8>, len: usize) {
    if len < 128 {
        buf.push(len as u8);
    } else if len < 256 {
        buf.push(0x81);
        buf.push(len as u8);
    } else {
        buf.push(0x82);
        buf.push((len >> 8) as u8);
        buf.push((len & 0xff) as u8);
    }
}

/// Wrap content in a DER SEQUENCE
fn der_wrap_sequence(content: &[u8]) -> Vec<u8> {
    let mut result = vec![0x30];
    der_encode_length(&mut result, content.len());
    result.extend_from_slice(content);
    result
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let pos = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[pos..]
}

/// Run the OCSP policy over every certificate still needing a check.
pub(crate) fn check_chain(opts: OcspOptions, run: &mut RevocationRun<'_>) -> Result<(), StatusCode> {
    let mut first_fatal = None;
    let mut fail = |run: &mut RevocationRun<'_>, pos: usize, code: StatusCode| {
        if run.record(pos, code) && first_fatal.is_none() {
            first_fatal = Some(code);
        }
    };

    let responder = if run.flags.allow_network { run.ocsp } else { None };
    let as_of = run.env.as_of();

    for pos in run.pending_positions() {
        let (Some(id), issuer) = (run.chain.get(pos), run.chain.get(pos + 1)) else {
            continue;
        };

        let answer = match (responder, issuer) {
            (Some(responder), Some(issuer)) => {
                responder.check(&run.pool[id], &run.pool[issuer], as_of)
            }
            _ => Err(SourceError::Unreachable {
                message: "no OCSP responder or issuer available".to_string(),
            }),
        };

        match answer {
            Ok(OcspStatus::Good) => {
                debug!("OCSP good for {}", run.pool[id].subject_display());
                let cert = &mut run.pool[id];
                cert.revoke_check_good = true;
                if opts.sufficient {
                    cert.revoke_check_complete = true;
                }
            }
            Ok(OcspStatus::Revoked { revoked_at, reason }) => {
                warn!(
                    "{} revoked via OCSP at {:?} ({})",
                    run.pool[id].subject_display(),
                    revoked_at,
                    reason.as_deref().unwrap_or("unspecified")
                );
                fail(run, pos, StatusCode::CertRevoked);
            }
            Ok(OcspStatus::Unknown { reason }) => {
                debug!("OCSP unknown for {}: {}", run.pool[id].subject_display(), reason);
                if opts.require_per_cert {
                    fail(run, pos, StatusCode::OcspStatusUnknown);
                }
            }
            Err(e) => {
                debug!("OCSP unavailable for {}: {}", run.pool[id].subject_display(), e);
                if opts.require_per_cert {
                    fail(run, pos, StatusCode::OcspUnavailable);
                }
            }
        }
    }

    match first_fatal {
        Some(code) => Err(code),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertOrigin;
    use crate::library::X509Library;
    use rcgen::{
        BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
        IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
    };
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

    // AlgorithmIdentifier { ecdsa-with-SHA256 }
    const ECDSA_SHA256: [u8; 12] = [
        0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02,
    ];
    const GOOD: [u8; 2] = [0x80, 0x00];

    struct Party {
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    impl Party {
        fn certificate(&self) -> Certificate {
            Certificate::from_der(&X509Library::new(), &self.cert.der().to_vec(), CertOrigin::Input)
                .unwrap()
        }

        fn sign(&self, message: &[u8]) -> Vec<u8> {
            let rng = SystemRandom::new();
            let pair = EcdsaKeyPair::from_pkcs8(
                &ECDSA_P256_SHA256_ASN1_SIGNING,
                &self.key.serialize_der(),
                &rng,
            )
            .unwrap();
            pair.sign(&rng, message).unwrap().as_ref().to_vec()
        }
    }

    fn authority(name: &str) -> Party {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Party { cert, key }
    }

    fn issued(name: &str, ca: &Party, ekus: Vec<ExtendedKeyUsagePurpose>) -> Party {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        params.serial_number = Some(SerialNumber::from(42u64));
        params.extended_key_usages = ekus;
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &ca.cert, &ca.key).unwrap();
        Party { cert, key }
    }

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        der_encode_length(&mut out, content.len());
        out.extend_from_slice(content);
        out
    }

    fn generalized(at: DateTime<Utc>) -> Vec<u8> {
        tlv(0x18, at.format("%Y%m%d%H%M%SZ").to_string().as_bytes())
    }

    /// The CertID the request builder sends for `cert`
    fn cert_id(cert: &Certificate, issuer: &Certificate) -> Vec<u8> {
        let request = build_request(cert, issuer).unwrap();
        // OCSPRequest > TBSRequest > requestList > Request > CertID
        let mut element = elements(&request).unwrap().remove(0);
        for _ in 0..4 {
            element = element.children().unwrap().remove(0);
        }
        element.raw.to_vec()
    }

    struct Answer {
        cert_id: Vec<u8>,
        status: Vec<u8>,
        this_update: DateTime<Utc>,
        next_update: Option<DateTime<Utc>>,
    }

    impl Answer {
        fn good(cert_id: Vec<u8>) -> Self {
            Self {
                cert_id,
                status: GOOD.to_vec(),
                this_update: Utc::now() - chrono::Duration::hours(1),
                next_update: Some(Utc::now() + chrono::Duration::days(1)),
            }
        }
    }

    /// A successful OCSPResponse carrying `answer`, signed by `sign`
    fn response(answer: &Answer, sign: impl Fn(&[u8]) -> Vec<u8>, certs: &[&Party]) -> Vec<u8> {
        let mut single = answer.cert_id.clone();
        single.extend_from_slice(&answer.status);
        single.extend(generalized(answer.this_update));
        if let Some(next) = answer.next_update {
            single.extend(tlv(0xa0, &generalized(next)));
        }

        // responderID byKey, producedAt, responses
        let mut data = tlv(0xa2, &tlv(0x04, &[0u8; 20]));
        data.extend(generalized(answer.this_update));
        data.extend(der_wrap_sequence(&der_wrap_sequence(&single)));
        let tbs = der_wrap_sequence(&data);

        let mut signature = vec![0u8];
        signature.extend(sign(&tbs));
        let mut basic = tbs;
        basic.extend_from_slice(&ECDSA_SHA256);
        basic.extend(tlv(0x03, &signature));
        if !certs.is_empty() {
            let ders: Vec<u8> = certs.iter().flat_map(|p| p.cert.der().to_vec()).collect();
            basic.extend(tlv(0xa0, &der_wrap_sequence(&ders)));
        }

        // id-pkix-ocsp-basic
        let mut bytes = tlv(0x06, &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, 0x01]);
        bytes.extend(tlv(0x04, &der_wrap_sequence(&basic)));
        let mut outer = tlv(0x0a, &[0]);
        outer.extend(tlv(0xa0, &der_wrap_sequence(&bytes)));
        der_wrap_sequence(&outer)
    }

    fn unknown_reason(status: OcspStatus) -> String {
        match status {
            OcspStatus::Unknown { reason } => reason,
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_der_encode_length() {
        let mut buf = Vec::new();
        der_encode_length(&mut buf, 5);
        assert_eq!(buf, vec![5]);
        buf.clear();
        der_encode_length(&mut buf, 200);
        assert_eq!(buf, vec![0x81, 200]);
        buf.clear();
        der_encode_length(&mut buf, 0x1234);
        assert_eq!(buf, vec![0x82, 0x12, 0x34]);
    }

    #[test]
    fn test_der_wrap_sequence() {
        assert_eq!(der_wrap_sequence(&[0x05, 0x00]), vec![0x30, 0x02, 0x05, 0x00]);
    }

    #[test]
    fn test_unsuccessful_response_status() {
        // OCSPResponse { responseStatus tryLater }
        let body = [0x30, 0x03, 0x0a, 0x01, 0x03];
        assert!(matches!(
            decode_response(&body),
            Ok(Decoded::Unsuccessful("tryLater"))
        ));
    }

    #[test]
    fn test_garbage_response() {
        assert!(matches!(
            decode_response(&[0x30, 0x05, 0x0a]),
            Err(SourceError::Parse { .. })
        ));
    }

    #[test]
    fn test_issuer_signed_good_response() {
        let ca = authority("OCSP Test CA");
        let leaf = issued("www.example.com", &ca, Vec::new());
        let (cert, issuer) = (leaf.certificate(), ca.certificate());

        let body = response(&Answer::good(cert_id(&cert, &issuer)), |tbs| ca.sign(tbs), &[]);
        let status = evaluate_response(&body, &cert, &issuer, Utc::now()).unwrap();
        assert_eq!(status, OcspStatus::Good);
    }

    #[test]
    fn test_revoked_response_carries_time_and_reason() {
        let ca = authority("OCSP Test CA");
        let leaf = issued("www.example.com", &ca, Vec::new());
        let (cert, issuer) = (leaf.certificate(), ca.certificate());
        let revoked_at = Utc::now() - chrono::Duration::days(3);

        let mut info = generalized(revoked_at);
        info.extend(tlv(0xa0, &tlv(0x0a, &[1])));
        let answer = Answer {
            status: tlv(0xa1, &info),
            ..Answer::good(cert_id(&cert, &issuer))
        };
        let body = response(&answer, |tbs| ca.sign(tbs), &[]);

        match evaluate_response(&body, &cert, &issuer, Utc::now()).unwrap() {
            OcspStatus::Revoked { revoked_at: at, reason } => {
                assert_eq!(at.map(|t| t.timestamp()), Some(revoked_at.timestamp()));
                assert_eq!(reason.as_deref(), Some("keyCompromise"));
            }
            other => panic!("expected revoked, got {:?}", other),
        }
    }

    #[test]
    fn test_forged_signature_is_not_trusted() {
        let ca = authority("OCSP Test CA");
        let leaf = issued("www.example.com", &ca, Vec::new());
        let (cert, issuer) = (leaf.certificate(), ca.certificate());
        let answer = Answer::good(cert_id(&cert, &issuer));

        let garbage = response(&answer, |_| vec![0xde, 0xad], &[]);
        let reason = unknown_reason(evaluate_response(&garbage, &cert, &issuer, Utc::now()).unwrap());
        assert!(reason.contains("signature"));

        let stranger = authority("OCSP Test CA");
        let foreign = response(&answer, |tbs| stranger.sign(tbs), &[]);
        let reason = unknown_reason(evaluate_response(&foreign, &cert, &issuer, Utc::now()).unwrap());
        assert!(reason.contains("signature"));
    }

    #[test]
    fn test_delegated_responder_needs_ocsp_signing() {
        let ca = authority("OCSP Test CA");
        let leaf = issued("www.example.com", &ca, Vec::new());
        let (cert, issuer) = (leaf.certificate(), ca.certificate());
        let answer = Answer::good(cert_id(&cert, &issuer));

        let responder = issued("ocsp.example.com", &ca, vec![ExtendedKeyUsagePurpose::OcspSigning]);
        let body = response(&answer, |tbs| responder.sign(tbs), &[&responder]);
        assert_eq!(
            evaluate_response(&body, &cert, &issuer, Utc::now()).unwrap(),
            OcspStatus::Good
        );

        let plain = issued("ocsp.example.com", &ca, vec![ExtendedKeyUsagePurpose::ServerAuth]);
        let body = response(&answer, |tbs| plain.sign(tbs), &[&plain]);
        unknown_reason(evaluate_response(&body, &cert, &issuer, Utc::now()).unwrap());

        // responder certified by some other CA
        let other_ca = authority("Other CA");
        let outsider = issued("ocsp.example.com", &other_ca, vec![ExtendedKeyUsagePurpose::OcspSigning]);
        let body = response(&answer, |tbs| outsider.sign(tbs), &[&outsider]);
        unknown_reason(evaluate_response(&body, &cert, &issuer, Utc::now()).unwrap());
    }

    #[test]
    fn test_cert_id_must_name_the_issuer() {
        let ca = authority("OCSP Test CA");
        let other_ca = authority("Other CA");
        let leaf = issued("www.example.com", &ca, Vec::new());
        let (cert, issuer) = (leaf.certificate(), ca.certificate());

        // same serial, but hashed under a different issuer
        let answer = Answer::good(cert_id(&cert, &other_ca.certificate()));
        let body = response(&answer, |tbs| ca.sign(tbs), &[]);
        let reason = unknown_reason(evaluate_response(&body, &cert, &issuer, Utc::now()).unwrap());
        assert!(reason.contains("matching"));
    }

    #[test]
    fn test_response_freshness() {
        let ca = authority("OCSP Test CA");
        let leaf = issued("www.example.com", &ca, Vec::new());
        let (cert, issuer) = (leaf.certificate(), ca.certificate());
        let now = Utc::now();

        let stale = Answer {
            this_update: now - chrono::Duration::days(10),
            next_update: Some(now - chrono::Duration::days(3)),
            ..Answer::good(cert_id(&cert, &issuer))
        };
        let body = response(&stale, |tbs| ca.sign(tbs), &[]);
        let reason = unknown_reason(evaluate_response(&body, &cert, &issuer, now).unwrap());
        assert!(reason.contains("stale"));
        // the same answer is acceptable when verifying at an earlier time
        assert_eq!(
            evaluate_response(&body, &cert, &issuer, now - chrono::Duration::days(5)).unwrap(),
            OcspStatus::Good
        );

        let early = Answer {
            this_update: now + chrono::Duration::days(1),
            next_update: None,
            ..Answer::good(cert_id(&cert, &issuer))
        };
        let body = response(&early, |tbs| ca.sign(tbs), &[]);
        let reason = unknown_reason(evaluate_response(&body, &cert, &issuer, now).unwrap());
        assert!(reason.contains("not valid until"));
    }
}
