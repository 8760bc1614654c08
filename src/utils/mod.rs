//! Utility modules for certpath
//!
//! This module contains error and status types shared across the crate.

pub mod error;

pub use error::{ConfigError, LibraryError, Result, SourceError, StatusCode, TrustError};
