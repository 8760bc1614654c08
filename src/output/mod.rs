//! Output formatting module
//!
//! Provides output formats for verification results:
//! - JSON verdicts with optional evidence
//! - PEM export of the constructed chain

pub mod json;
pub mod pem;

pub use json::{print_json, to_json_output, JsonOutput};
pub use pem::PemExporter;
