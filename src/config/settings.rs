//! Engine settings configuration
//!
//! Defines network, chain construction, revocation and verification defaults
//! plus statically configured trust settings.

use crate::policy::PolicyId;
use crate::trust_settings::{KeyUse, TrustDomain, TrustResult};
use crate::utils::{ConfigError, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Network fetch settings
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub fetch_enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            fetch_enabled: false,
            timeout_secs: 10,
        }
    }
}

impl NetworkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chain construction settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConstructionSettings {
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,
    #[serde(default)]
    pub implicit_anchors: bool,
    #[serde(default = "default_true")]
    pub honor_trust_settings: bool,
}

fn default_max_chain_length() -> usize {
    32
}

fn default_true() -> bool {
    true
}

impl Default for ConstructionSettings {
    fn default() -> Self {
        Self {
            max_chain_length: 32,
            implicit_anchors: false,
            honor_trust_settings: true,
        }
    }
}

/// Revocation policy applied when the caller requests none
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRevocation {
    #[default]
    None,
    Crl,
    Ocsp,
}

/// Revocation settings
#[derive(Debug, Clone, Deserialize)]
pub struct RevocationSettings {
    #[serde(default)]
    pub default_policy: DefaultRevocation,
    #[serde(default)]
    pub crl_required_per_cert: bool,
    #[serde(default)]
    pub crl_required_if_dp_present: bool,
    #[serde(default = "default_true")]
    pub crl_sufficient: bool,
    #[serde(default)]
    pub ocsp_required_per_cert: bool,
    #[serde(default = "default_true")]
    pub ocsp_sufficient: bool,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

fn default_cache_max_entries() -> usize {
    256
}

impl Default for RevocationSettings {
    fn default() -> Self {
        Self {
            default_policy: DefaultRevocation::None,
            crl_required_per_cert: false,
            crl_required_if_dp_present: false,
            crl_sufficient: true,
            ocsp_required_per_cert: false,
            ocsp_sufficient: true,
            cache_max_entries: 256,
        }
    }
}

/// Verification loop settings
#[derive(Debug, Clone, Deserialize)]
pub struct VerifySettings {
    #[serde(default = "default_true")]
    pub stop_on_first_failure: bool,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            stop_on_first_failure: true,
        }
    }
}

/// A statically configured trust setting for one certificate
#[derive(Debug, Clone, Deserialize)]
pub struct TrustSettingEntry {
    /// Hex SHA-1 of the DER certificate
    pub sha1: String,
    pub domain: TrustDomain,
    #[serde(default)]
    pub policy: Option<PolicyId>,
    #[serde(default)]
    pub policy_string: Option<String>,
    #[serde(default)]
    pub key_use: Option<Vec<KeyUse>>,
    #[serde(default)]
    pub result: TrustResult,
    #[serde(default)]
    pub allowed_errors: Vec<StatusCode>,
}

/// Engine settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub construction: ConstructionSettings,
    #[serde(default)]
    pub revocation: RevocationSettings,
    #[serde(default)]
    pub verify: VerifySettings,
    #[serde(default)]
    pub trust_settings: Vec<TrustSettingEntry>,
}

impl Settings {
    /// Load settings from the default config file
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_path = Path::new("config/default.toml");
        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.construction.max_chain_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "construction.max_chain_length".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.revocation.cache_max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "revocation.cache_max_entries".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.network.fetch_enabled);
        assert_eq!(settings.network.timeout(), Duration::from_secs(10));
        assert_eq!(settings.construction.max_chain_length, 32);
        assert!(settings.construction.honor_trust_settings);
        assert_eq!(settings.revocation.default_policy, DefaultRevocation::None);
        assert!(settings.revocation.crl_sufficient);
        assert!(settings.verify.stop_on_first_failure);
        assert!(settings.trust_settings.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[revocation]
default_policy = "crl"
crl_required_per_cert = true

[[trust_settings]]
sha1 = "00112233445566778899aabbccddeeff00112233"
domain = "admin"
result = "trust_as_root"
allowed_errors = ["cert_expired"]
"#
        )
        .unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.revocation.default_policy, DefaultRevocation::Crl);
        assert!(settings.revocation.crl_required_per_cert);
        assert_eq!(settings.revocation.cache_max_entries, 256);
        assert_eq!(settings.construction.max_chain_length, 32);
        assert_eq!(settings.trust_settings.len(), 1);
        let entry = &settings.trust_settings[0];
        assert_eq!(entry.domain, TrustDomain::Admin);
        assert_eq!(entry.result, TrustResult::TrustAsRoot);
        assert_eq!(entry.allowed_errors, vec![StatusCode::CertExpired]);
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load_from_file("/nonexistent/certpath.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_zero_chain_length_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[construction]\nmax_chain_length = 0\n").unwrap();
        let err = Settings::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
