//! Data models for certpath
//!
//! Serializable structures handed back to callers.

pub mod evidence;

pub use evidence::{Evidence, EvidenceEntry, StatusFlags};
