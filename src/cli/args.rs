//! CLI argument definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "certpath")]
#[command(version)]
#[command(about = "X.509 certification path construction and verification", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to config/default.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build and verify a certificate chain
    Verify(VerifyArgs),

    /// Order certificates into a chain without evaluating trust
    Build(BuildArgs),
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Leaf certificate (PEM or DER)
    #[arg(required = true)]
    pub leaf: PathBuf,

    /// File of intermediate certificates (repeatable)
    #[arg(short, long = "intermediate", value_name = "FILE")]
    pub intermediates: Vec<PathBuf>,

    /// File of trusted anchor certificates (repeatable)
    #[arg(short, long = "anchor", value_name = "FILE")]
    pub anchors: Vec<PathBuf>,

    /// CRL file (repeatable)
    #[arg(long = "crl", value_name = "FILE")]
    pub crls: Vec<PathBuf>,

    /// Certificate policy to enforce
    #[arg(short, long, value_enum, default_value = "basic")]
    pub policy: PolicyArg,

    /// Hostname for the ssl policy
    #[arg(long)]
    pub hostname: Option<String>,

    /// Check a TLS client certificate instead of a server certificate
    #[arg(long)]
    pub client: bool,

    /// Email address for the smime policy
    #[arg(long)]
    pub email: Option<String>,

    /// Revocation policy (defaults to the configured policy)
    #[arg(short, long, value_enum)]
    pub revocation: Option<RevocationArg>,

    /// Fail when a certificate's revocation status cannot be established
    #[arg(long)]
    pub require_revocation: bool,

    /// Allow fetching issuers, CRLs and OCSP responses over the network
    #[arg(long)]
    pub network: bool,

    /// Accept any chain ending in a self-signed root
    #[arg(long)]
    pub implicit_anchors: bool,

    /// Verification time (RFC 3339), defaults to now
    #[arg(long, value_name = "TIME")]
    pub at: Option<String>,

    /// Run every policy even after one fails
    #[arg(long)]
    pub all_errors: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Leaf certificate (PEM or DER)
    #[arg(required = true)]
    pub leaf: PathBuf,

    /// File of candidate issuer certificates (repeatable)
    #[arg(short, long = "intermediate", value_name = "FILE")]
    pub intermediates: Vec<PathBuf>,

    /// File of trusted anchor certificates (repeatable)
    #[arg(short, long = "anchor", value_name = "FILE")]
    pub anchors: Vec<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Basic X.509 path checks
    Basic,
    /// TLS server or client certificate
    Ssl,
    /// S/MIME email certificate
    Smime,
    /// Code signing certificate
    CodeSigning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RevocationArg {
    None,
    Crl,
    Ocsp,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable verdict (default)
    Text,
    /// JSON verdict with evidence
    Json,
    /// PEM bundle of the constructed chain
    Pem,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Pem => write!(f, "pem"),
        }
    }
}
