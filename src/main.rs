//! certpath - X.509 certification path construction and verification
//!
//! This tool provides functionality for:
//! - Building a certificate chain from a leaf, intermediates and anchors
//! - Verifying the chain against a certificate policy
//! - CRL and OCSP revocation checking

use certpath::cli::{Cli, Commands};
use certpath::commands;
use certpath::config::Settings;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load_default()?,
    };

    match &cli.command {
        Commands::Verify(args) => commands::run_verify(args, settings, cli.format),
        Commands::Build(args) => commands::run_build(args, settings, cli.format),
    }
}
