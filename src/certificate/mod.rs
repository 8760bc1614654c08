//! Certificate handling module
//!
//! This module provides:
//! - The [`CachedItem`] behaviour shared by certificates and CRLs
//! - Per-call certificate ownership through [`CertPool`]
//! - Certification path construction

pub mod cert;
pub mod chain;
pub mod crl;
pub mod item;
pub mod pool;

pub use cert::{CertOrigin, Certificate, RootState, TrustEvaluation};
pub use chain::{BuildEnv, BuildFlags, BuildGroups, BuildOutcome, CertificateChain, Subject};
pub use crl::{Crl, CrlOrigin};
pub use item::{CachedItem, Currency, ItemCore, ItemKind};
pub use pool::{CertGroup, CertId, CertPool, Ownership};
