//! PEM export of constructed chains

use crate::models::Evidence;
use ::pem::{EncodeConfig, LineEnding, Pem};

/// PEM exporter for evidence chains
pub struct PemExporter;

impl PemExporter {
    /// Export every certificate in the evidence, leaf first
    pub fn export_chain(evidence: &Evidence) -> String {
        let ders: Vec<Vec<u8>> = evidence
            .certificates
            .iter()
            .filter_map(|entry| entry.der())
            .collect();
        Self::export_ders(&ders)
    }

    /// Export DER certificates as concatenated PEM blocks
    pub fn export_ders(chain: &[Vec<u8>]) -> String {
        let blocks: Vec<Pem> = chain
            .iter()
            .map(|der| Pem::new("CERTIFICATE", der.as_slice()))
            .collect();
        ::pem::encode_many_config(&blocks, EncodeConfig::new().set_line_ending(LineEnding::LF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceEntry, StatusFlags};
    use base64::Engine;

    #[test]
    fn test_export_chain_round_trips_through_pem_crate() {
        let der = vec![0x30u8; 100];
        let evidence = Evidence {
            certificates: vec![EvidenceEntry {
                index: 0,
                subject: "CN=leaf".to_string(),
                issuer: "CN=ca".to_string(),
                der_base64: base64::engine::general_purpose::STANDARD.encode(&der),
                flags: StatusFlags::default(),
                status_codes: Vec::new(),
            }],
        };

        let pem = PemExporter::export_chain(&evidence);
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.lines().all(|l| l.len() <= 64));
        let parsed = ::pem::parse_many(pem.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].contents(), der.as_slice());
    }

    #[test]
    fn test_blocks_separated() {
        let pem = PemExporter::export_ders(&[vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(pem.matches("-----BEGIN CERTIFICATE-----").count(), 2);
        assert!(pem.contains("-----END CERTIFICATE-----\n\n-----BEGIN"));
        assert!(!pem.contains('\r'));
    }
}
