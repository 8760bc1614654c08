//! Trust settings
//!
//! A trust-settings store lets an administrator or user mark a certificate as
//! trusted, or explicitly distrusted, for particular policies independently of
//! the cryptographic chain. Entries are keyed by the SHA-1 hash of the
//! certificate.

use crate::config::TrustSettingEntry;
use crate::policy::PolicyId;
use crate::utils::{ConfigError, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who installed a trust setting. Searched in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDomain {
    User,
    Admin,
    System,
}

/// Outcome attached to a trust-settings entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustResult {
    #[default]
    Unspecified,
    /// Trusted as a root; only meaningful for self-signed certificates
    TrustRoot,
    /// Trusted as if it were a root, wherever it sits in the chain
    TrustAsRoot,
    Deny,
}

/// The use a certificate is being put to in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUse {
    Signature,
    Encrypt,
    KeyExchange,
    SignCert,
    SignCrl,
}

/// Answer from a trust-settings lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustSettingsLookup {
    pub domain: Option<TrustDomain>,
    pub result: TrustResult,
    pub allowed_errors: Vec<StatusCode>,
    /// Some entry exists for this certificate
    pub found_entry: bool,
    /// An entry matched the policy, policy string and key use
    pub found_matching_entry: bool,
}

/// Platform trust-settings collaborator
pub trait TrustSettingsStore: Send + Sync {
    fn evaluate(
        &self,
        cert_sha1: &[u8],
        policy: PolicyId,
        policy_string: Option<&str>,
        key_use: Option<KeyUse>,
    ) -> TrustSettingsLookup;
}

/// Trust settings loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustSettings {
    entries: HashMap<Vec<u8>, Vec<TrustSettingEntry>>,
}

impl StaticTrustSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from configured entries.
    pub fn from_entries(entries: &[TrustSettingEntry]) -> Result<Self, ConfigError> {
        let mut store = Self::new();
        for entry in entries {
            store.insert(entry.clone())?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, entry: TrustSettingEntry) -> Result<(), ConfigError> {
        let hash = hex::decode(entry.sha1.trim()).map_err(|e| ConfigError::InvalidValue {
            key: "trust_settings.sha1".to_string(),
            message: e.to_string(),
        })?;
        if hash.len() != 20 {
            return Err(ConfigError::InvalidValue {
                key: "trust_settings.sha1".to_string(),
                message: format!("expected 20 bytes, got {}", hash.len()),
            });
        }
        self.entries.entry(hash).or_default().push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TrustSettingsStore for StaticTrustSettings {
    fn evaluate(
        &self,
        cert_sha1: &[u8],
        policy: PolicyId,
        policy_string: Option<&str>,
        key_use: Option<KeyUse>,
    ) -> TrustSettingsLookup {
        let Some(entries) = self.entries.get(cert_sha1) else {
            return TrustSettingsLookup::default();
        };

        let mut lookup = TrustSettingsLookup {
            found_entry: !entries.is_empty(),
            ..TrustSettingsLookup::default()
        };

        for domain in [TrustDomain::User, TrustDomain::Admin, TrustDomain::System] {
            let matching = entries
                .iter()
                .filter(|e| e.domain == domain)
                .find(|e| entry_matches(e, policy, policy_string, key_use));
            if let Some(entry) = matching {
                lookup.domain = Some(domain);
                lookup.result = entry.result;
                lookup.allowed_errors = entry.allowed_errors.clone();
                lookup.found_matching_entry = true;
                break;
            }
        }

        lookup
    }
}

fn entry_matches(
    entry: &TrustSettingEntry,
    policy: PolicyId,
    policy_string: Option<&str>,
    key_use: Option<KeyUse>,
) -> bool {
    if entry.policy.is_some_and(|p| p != policy) {
        return false;
    }
    if let Some(expected) = &entry.policy_string {
        match policy_string {
            Some(actual) if actual.eq_ignore_ascii_case(expected) => {}
            _ => return false,
        }
    }
    match (&entry.key_use, key_use) {
        (Some(allowed), Some(wanted)) => allowed.contains(&wanted),
        _ => true,
    }
}
