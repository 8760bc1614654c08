//! JSON output formatter

use crate::engine::VerifyOutcome;
use crate::models::Evidence;
use crate::utils::StatusCode;
use serde::Serialize;

/// JSON-serializable verdict
#[derive(Serialize)]
pub struct JsonOutput {
    pub trusted: bool,
    pub status: Option<StatusCode>,
    pub message: String,
    pub verified_to_root: bool,
    pub verified_to_anchor: bool,
    pub verified_via_trust_setting: bool,
    pub evidence: Option<Evidence>,
}

impl JsonOutput {
    pub fn from_outcome(outcome: &VerifyOutcome) -> Self {
        Self {
            trusted: outcome.result.is_ok(),
            status: outcome.result.err(),
            message: match outcome.result {
                Ok(()) => "Certificate chain is trusted".to_string(),
                Err(code) => code.to_string(),
            },
            verified_to_root: outcome.verified_to_root,
            verified_to_anchor: outcome.verified_to_anchor,
            verified_via_trust_setting: outcome.verified_via_trust_setting,
            evidence: outcome.evidence.clone(),
        }
    }
}

/// Render an outcome as pretty JSON
pub fn to_json_output(outcome: &VerifyOutcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonOutput::from_outcome(outcome))
}

/// Print an outcome as JSON to stdout
pub fn print_json(outcome: &VerifyOutcome) -> anyhow::Result<()> {
    let json = to_json_output(outcome)?;
    println!("{}", json);
    Ok(())
}
