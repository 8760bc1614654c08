//! HTTP retrieval of issuer certificates and CRLs

use super::{decode_der_or_pem, NetworkFetcher};
use crate::certificate::Certificate;
use crate::utils::SourceError;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

/// Fetches AIA issuers and CRL distribution points over HTTP
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Backend {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Download `url` and return the DER body.
    pub fn get_der(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(url).send().map_err(|e| {
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

        let body = response.bytes().map_err(|e| SourceError::Parse {
            message: e.to_string(),
        })?;
        decode_der_or_pem(&body)
    }

    /// Try each http(s) URL in turn, returning the first body that downloads.
    fn first_available(&self, urls: &[String]) -> Result<Option<Vec<u8>>, SourceError> {
        let mut last_err = None;
        for url in urls.iter().filter(|u| is_http(u)) {
            match self.get_der(url) {
                Ok(der) => {
                    debug!("Fetched {} bytes from {}", der.len(), url);
                    return Ok(Some(der));
                }
                Err(e) => {
                    debug!("Fetch from {} failed: {}", url, e);
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl NetworkFetcher for HttpFetcher {
    fn fetch_crl(&self, for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError> {
        self.first_available(&for_cert.fields().crl_distribution_points)
    }

    fn fetch_issuer(&self, for_cert: &Certificate) -> Result<Option<Vec<u8>>, SourceError> {
        self.first_available(&for_cert.fields().ca_issuer_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_http_urls_fetched() {
        assert!(is_http("http://crl.example.com/ca.crl"));
        assert!(is_http("https://example.com/ca.der"));
        assert!(!is_http("ldap://ldap.example.com/cn=CA"));
    }

    #[test]
    fn test_no_urls_is_not_found() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let urls = vec!["ldap://ldap.example.com/cn=CA".to_string()];
        assert_eq!(fetcher.first_available(&urls).unwrap(), None);
    }
}
