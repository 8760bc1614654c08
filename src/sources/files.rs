//! Certificate and CRL file reading
//!
//! Auto-detects PEM and DER and returns the DER bytes of every matching item.

use crate::utils::SourceError;
use std::path::Path;

/// Detected file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Pem,
    Der,
}

impl std::fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectedFormat::Pem => write!(f, "PEM"),
            DetectedFormat::Der => write!(f, "DER"),
        }
    }
}

/// Detect the format from raw bytes
pub fn detect_format_from_bytes(data: &[u8]) -> Result<DetectedFormat, SourceError> {
    if let Ok(text) = std::str::from_utf8(data) {
        if text.contains("-----BEGIN ") {
            return Ok(DetectedFormat::Pem);
        }
    }

    // DER items start with an ASN.1 SEQUENCE
    if data.first() == Some(&0x30) {
        return Ok(DetectedFormat::Der);
    }

    Err(SourceError::Parse {
        message: "unknown format (could not detect PEM or DER)".to_string(),
    })
}

/// Read every CERTIFICATE from a PEM or DER file
pub fn read_certificates(path: &Path) -> Result<Vec<Vec<u8>>, SourceError> {
    read_items(path, &["CERTIFICATE", "TRUSTED CERTIFICATE"])
}

/// Read every X509 CRL from a PEM or DER file
pub fn read_crls(path: &Path) -> Result<Vec<Vec<u8>>, SourceError> {
    read_items(path, &["X509 CRL"])
}

fn read_items(path: &Path, tags: &[&str]) -> Result<Vec<Vec<u8>>, SourceError> {
    let file_error = |message: String| SourceError::File {
        path: path.display().to_string(),
        message,
    };

    let data = std::fs::read(path).map_err(|e| file_error(e.to_string()))?;
    let format = detect_format_from_bytes(&data).map_err(|e| file_error(e.to_string()))?;

    match format {
        DetectedFormat::Der => Ok(vec![data]),
        DetectedFormat::Pem => {
            let items: Vec<Vec<u8>> = ::pem::parse_many(&data)
                .map_err(|e| file_error(format!("Failed to parse PEM: {}", e)))?
                .into_iter()
                .filter(|p| tags.contains(&p.tag()))
                .map(|p| p.into_contents())
                .collect();

            if items.is_empty() {
                return Err(file_error(format!("No {} blocks found in PEM file", tags[0])));
            }
            Ok(items)
        }
    }
}
