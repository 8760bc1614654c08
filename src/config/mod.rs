//! Configuration module for certpath
//!
//! Handles loading and managing configuration from TOML files.

pub mod settings;

pub use settings::{
    ConstructionSettings, DefaultRevocation, NetworkSettings, RevocationSettings, Settings,
    TrustSettingEntry, VerifySettings,
};
