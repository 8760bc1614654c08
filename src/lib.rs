//! certpath Library
//!
//! X.509 certification path construction and verification:
//! - Chain construction from unordered candidates, anchors, a directory and the network
//! - Root, anchor and trust-settings termination
//! - Certificate policies (basic X.509, TLS, S/MIME, code signing)
//! - CRL and OCSP revocation checking with a shared CRL cache
//! - Per-certificate evidence for callers that want it
//!
//! # Usage
//!
//! ```rust,ignore
//! use certpath::{PolicyRequest, TrustEngine, VerifyContext, X509Library};
//! use std::sync::Arc;
//!
//! let engine = TrustEngine::builder(Arc::new(X509Library::new())).build()?;
//! let ctx = VerifyContext::default()
//!     .with_anchors(vec![root_der])
//!     .with_policy(PolicyRequest::BasicX509);
//! let outcome = engine.verify_chain(&[leaf_der, intermediate_der], &ctx)?;
//! println!("trusted: {}", outcome.is_trusted());
//! ```

pub mod certificate;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod library;
pub mod models;
pub mod output;
pub mod policy;
pub mod revocation;
pub mod sources;
pub mod trust_settings;
pub mod utils;

// Re-export commonly used types
pub use cli::Cli;
pub use config::Settings;
pub use engine::{ConstructedChain, TrustEngine, VerifyContext, VerifyOutcome};
pub use library::{CertLibrary, X509Library};
pub use models::Evidence;
pub use policy::{PolicyId, PolicyRequest};
pub use revocation::{RevocationCache, RevocationPolicy};
pub use utils::{Result, StatusCode, TrustError};
