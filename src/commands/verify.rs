//! Verify and build command implementations

use crate::cli::{BuildArgs, OutputFormat, PolicyArg, RevocationArg, VerifyArgs};
use crate::config::Settings;
use crate::engine::{TrustEngine, VerifyContext, VerifyOutcome};
use crate::library::X509Library;
use crate::output::{print_json, PemExporter};
use crate::policy::{PolicyRequest, SmimeOptions, SslOptions};
use crate::revocation::{CrlOptions, HttpOcspResponder, OcspOptions, RevocationPolicy};
use crate::sources::{read_certificates, read_crls, HttpFetcher};
use crate::utils::SourceError;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Build an engine with the production library and, when fetching is
/// enabled, the HTTP fetcher and OCSP responder.
pub fn build_engine(settings: Settings) -> anyhow::Result<TrustEngine> {
    let mut builder = TrustEngine::builder(Arc::new(X509Library::new()));
    if settings.network.fetch_enabled {
        let timeout = settings.network.timeout();
        builder = builder
            .fetcher(Arc::new(HttpFetcher::new(timeout)?))
            .ocsp_responder(Arc::new(HttpOcspResponder::new(timeout)?));
    }
    Ok(builder.settings(settings).build()?)
}

/// Read the leaf file followed by every intermediate file.
fn read_candidates(leaf: &Path, intermediates: &[PathBuf]) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut candidates = read_certificates(leaf)?;
    if candidates.len() > 1 {
        debug!(
            "{} holds {} certificates; the first is the leaf",
            leaf.display(),
            candidates.len()
        );
    }
    for path in intermediates {
        candidates.extend(read_certificates(path)?);
    }
    Ok(candidates)
}

fn read_all(
    paths: &[PathBuf],
    read: fn(&Path) -> Result<Vec<Vec<u8>>, SourceError>,
) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut items = Vec::new();
    for path in paths {
        items.extend(read(path)?);
    }
    Ok(items)
}

/// Map the CLI policy choice to a request.
pub fn policy_request(args: &VerifyArgs) -> PolicyRequest {
    match args.policy {
        PolicyArg::Basic => PolicyRequest::BasicX509,
        PolicyArg::Ssl => PolicyRequest::Ssl(SslOptions {
            hostname: args.hostname.clone(),
            client: args.client,
        }),
        PolicyArg::Smime => PolicyRequest::Smime(SmimeOptions {
            email: args.email.clone(),
        }),
        PolicyArg::CodeSigning => PolicyRequest::CodeSigning,
    }
}

/// Map the CLI revocation choice to a policy, starting from configured options.
fn revocation_policy(args: &VerifyArgs, settings: &Settings) -> RevocationPolicy {
    let policy = match args.revocation {
        None => RevocationPolicy::default_from_settings(&settings.revocation),
        Some(RevocationArg::None) => RevocationPolicy::None,
        Some(RevocationArg::Crl) => {
            RevocationPolicy::Crl(CrlOptions::from_settings(&settings.revocation))
        }
        Some(RevocationArg::Ocsp) => {
            RevocationPolicy::Ocsp(OcspOptions::from_settings(&settings.revocation))
        }
    };
    if !args.require_revocation {
        return policy;
    }
    match policy {
        RevocationPolicy::Crl(opts) => RevocationPolicy::Crl(CrlOptions {
            require_per_cert: true,
            ..opts
        }),
        RevocationPolicy::Ocsp(opts) => RevocationPolicy::Ocsp(OcspOptions {
            require_per_cert: true,
            ..opts
        }),
        RevocationPolicy::None => RevocationPolicy::None,
    }
}

/// Assemble the per-call context from arguments and settings.
pub fn verify_context(args: &VerifyArgs, settings: &Settings) -> anyhow::Result<VerifyContext> {
    let mut ctx = VerifyContext::from_settings(settings)
        .with_anchors(read_all(&args.anchors, read_certificates)?)
        .with_crls(read_all(&args.crls, read_crls)?)
        .with_policy(policy_request(args));

    ctx.default_revocation = revocation_policy(args, settings);
    ctx.implicit_anchors |= args.implicit_anchors;
    ctx.allow_network |= args.network;
    ctx.want_evidence = true;
    if args.all_errors {
        ctx.stop_on_first_failure = false;
    }
    if let Some(at) = &args.at {
        let time = DateTime::parse_from_rfc3339(at)
            .with_context(|| format!("Invalid --at time: {}", at))?;
        ctx.verify_time = Some(time.with_timezone(&Utc));
    }
    Ok(ctx)
}

/// Run the `verify` command.
///
/// Returns `Ok(true)` if the chain is trusted, `Ok(false)` otherwise.
pub fn run_verify(
    args: &VerifyArgs,
    mut settings: Settings,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    settings.network.fetch_enabled |= args.network;
    let ctx = verify_context(args, &settings)?;
    let candidates = read_candidates(&args.leaf, &args.intermediates)?;
    let engine = build_engine(settings)?;

    let outcome = engine.verify_chain(&candidates, &ctx)?;
    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Pem => {
            if let Some(evidence) = &outcome.evidence {
                print!("{}", PemExporter::export_chain(evidence));
            }
        }
        OutputFormat::Text => print_verdict(&outcome),
    }
    Ok(outcome.is_trusted())
}

/// Run the `build` command.
///
/// Returns `Ok(true)` if the chain reached a root, an anchor or a trust setting.
pub fn run_build(args: &BuildArgs, settings: Settings, format: OutputFormat) -> anyhow::Result<bool> {
    let candidates = read_candidates(&args.leaf, &args.intermediates)?;
    let anchors = read_all(&args.anchors, read_certificates)?;
    let engine = build_engine(settings)?;

    let chain = engine.construct_chain(&candidates, &anchors)?;
    let complete = chain.outcome.result.is_ok()
        && (chain.outcome.verified_to_root
            || chain.outcome.verified_to_anchor
            || chain.outcome.verified_via_trust_setting);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "length": chain.len(),
                "complete": complete,
                "status": chain.outcome.result.err(),
                "verified_to_root": chain.outcome.verified_to_root,
                "verified_to_anchor": chain.outcome.verified_to_anchor,
                "verified_via_trust_setting": chain.outcome.verified_via_trust_setting,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Pem => print!("{}", PemExporter::export_ders(&chain.certificates)),
        OutputFormat::Text => {
            println!("Chain of {} certificate(s)", chain.len());
            if let Err(code) = chain.outcome.result {
                println!("  Construction stopped: {}", code);
            } else if !complete {
                println!("  Chain is incomplete");
            }
        }
    }
    Ok(complete)
}

fn print_verdict(outcome: &VerifyOutcome) {
    match outcome.result {
        Ok(()) => println!("TRUSTED"),
        Err(code) => println!("NOT TRUSTED: {}", code),
    }

    let Some(evidence) = &outcome.evidence else {
        return;
    };
    for entry in &evidence.certificates {
        let mut marks = Vec::new();
        if entry.flags.is_in_anchors {
            marks.push("anchor");
        }
        if entry.flags.is_root {
            marks.push("root");
        }
        if entry.flags.is_from_net {
            marks.push("fetched");
        }
        if entry.flags.trust_settings_trust {
            marks.push("trusted by settings");
        }
        if entry.flags.revoke_check_good {
            marks.push("not revoked");
        }
        let marks = if marks.is_empty() {
            String::new()
        } else {
            format!(" [{}]", marks.join(", "))
        };
        println!("  {}: {}{}", entry.index, entry.subject, marks);
        for code in &entry.status_codes {
            println!("       {}", code);
        }
    }
}
