//! CRL revocation policy

use super::cache::{CrlLease, RevocationCache};
use super::{CrlOptions, RevocationRun};
use crate::certificate::{
    BuildGroups, CachedItem, CertId, CertificateChain, Crl, CrlOrigin, Currency, Ownership,
    Subject,
};
use crate::utils::StatusCode;
use tracing::{debug, warn};

/// A CRL obtained for one certificate, tagged by how it must be disposed of
pub enum CrlHandle<'a> {
    /// Supplied with the call; nothing to give back
    Supplied(&'a Crl),
    /// Leased from the shared cache
    Cached(CrlLease),
    /// Fetched from the directory for this check only
    Owned(Crl),
}

impl CrlHandle<'_> {
    pub fn crl(&self) -> &Crl {
        match self {
            Self::Supplied(crl) => crl,
            Self::Cached(lease) => lease.crl(),
            Self::Owned(crl) => crl,
        }
    }

    /// Return the CRL to where it came from.
    pub fn dispose(self, cache: &RevocationCache) {
        match self {
            Self::Cached(lease) => cache.release(lease),
            Self::Supplied(_) | Self::Owned(_) => {}
        }
    }
}

/// Check currency and build a trusted chain for `crl`.
fn verify_crl(run: &mut RevocationRun<'_>, crl: &Crl) -> Result<(), StatusCode> {
    match crl.core().currency_at(run.env.as_of()) {
        Currency::Current => {}
        Currency::Expired => return Err(StatusCode::CrlExpired),
        Currency::NotValidYet => return Err(StatusCode::CrlNotValidYet),
    }

    // the chain's members first, then any other candidate the caller supplied
    let mut input = run.chain.as_group();
    for id in run.input.ids() {
        input.push(*id);
    }
    let mut crl_chain = CertificateChain::new(Ownership::Borrowed);
    let outcome = crl_chain.build_chain(
        &mut *run.pool,
        Subject::Crl(crl),
        BuildGroups {
            input: &input,
            anchors: run.anchors,
            gathered: &mut *run.gathered,
        },
        &run.env,
        run.flags,
    );

    let trusted = outcome.verified_to_anchor
        || outcome.verified_via_trust_setting
        || (outcome.verified_to_root && run.implicit_anchors);
    if outcome.result.is_ok() && !crl_chain.is_empty() && trusted {
        Ok(())
    } else {
        debug!(
            "CRL from {} does not verify to a trusted root",
            crl.issuer_display()
        );
        Err(StatusCode::CrlNotTrusted)
    }
}

/// Find a usable CRL for the certificate at `id`.
///
/// Sources are tried in order: supplied CRLs, the shared cache, the
/// directory, the network. Also returns the reason the last candidate was
/// rejected.
pub fn find_crl_for_cert<'c>(
    run: &mut RevocationRun<'_>,
    id: CertId,
    supplied: &'c [Crl],
) -> (Option<CrlHandle<'c>>, Option<StatusCode>) {
    let mut rejected = None;
    let issuer_name = run.pool[id].issuer_name().to_vec();
    let as_of = run.env.as_of();

    for crl in supplied.iter().filter(|c| c.issuer_name() == issuer_name) {
        match verify_crl(run, crl) {
            Ok(()) => {
                debug!("Using supplied CRL from {}", crl.issuer_display());
                return (Some(CrlHandle::Supplied(crl)), rejected);
            }
            Err(code) => rejected = Some(code),
        }
    }

    let cache = run.cache;
    while let Some(lease) = cache.search(&run.pool[id], as_of) {
        let verdict = if lease.currency() == Currency::Current {
            verify_crl(run, lease.crl())
        } else {
            Err(StatusCode::CrlExpired)
        };
        match verdict {
            Ok(()) => {
                debug!(
                    "Using {:?} CRL from {}",
                    lease.crl().origin(),
                    lease.crl().issuer_display()
                );
                return (Some(CrlHandle::Cached(lease)), rejected);
            }
            Err(code) => {
                debug!("Evicting cached CRL: {}", code);
                rejected = Some(code);
                cache.remove(lease);
            }
        }
    }

    if let Some(directory) = run.env.directory {
        match directory.find_issuer_crl(&issuer_name, &run.pool[id], as_of) {
            Ok(Some(der)) => match Crl::from_der(run.env.library, &der, CrlOrigin::Database) {
                Ok(crl) => match verify_crl(run, &crl) {
                    Ok(()) => {
                        debug!("Using directory CRL from {}", crl.issuer_display());
                        return (Some(CrlHandle::Owned(crl)), rejected);
                    }
                    Err(code) => rejected = Some(code),
                },
                Err(e) => warn!("Discarding unparseable directory CRL: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("Directory CRL lookup failed: {}", e),
        }
    }

    if run.flags.allow_network {
        if let Some(fetcher) = run.env.fetcher {
            match fetcher.fetch_crl(&run.pool[id]) {
                Ok(Some(der)) => match Crl::from_der(run.env.library, &der, CrlOrigin::Network) {
                    Ok(crl) => match verify_crl(run, &crl) {
                        Ok(()) => {
                            debug!("Caching network CRL from {}", crl.issuer_display());
                            let lease = cache.add(crl, as_of);
                            return (Some(CrlHandle::Cached(lease)), rejected);
                        }
                        Err(code) => rejected = Some(code),
                    },
                    Err(e) => warn!("Discarding unparseable network CRL: {}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("CRL fetch failed: {}", e),
            }
        }
    }

    (None, rejected)
}

/// Run the CRL policy over every certificate still needing a check.
pub(crate) fn check_chain(opts: CrlOptions, run: &mut RevocationRun<'_>) -> Result<(), StatusCode> {
    let mut first_fatal = None;
    let supplied = run.crls;
    let as_of = run.env.as_of();

    for pos in run.pending_positions() {
        let Some(id) = run.chain.get(pos) else {
            continue;
        };
        let (handle, rejected) = find_crl_for_cert(run, id, supplied);

        let Some(handle) = handle else {
            let has_dp = !run.pool[id].fields().crl_distribution_points.is_empty();
            let required = opts.require_per_cert || (opts.require_if_dp_present && has_dp);
            if required {
                let code = rejected.unwrap_or(StatusCode::CrlNotFound);
                debug!("No usable CRL for {}: {}", run.pool[id].subject_display(), code);
                if run.record(pos, code) && first_fatal.is_none() {
                    first_fatal = Some(code);
                }
            } else {
                debug!("No CRL for {}, tolerated", run.pool[id].subject_display());
            }
            continue;
        };

        let revoked = handle
            .crl()
            .is_revoked(run.pool[id].serial(), as_of)
            .cloned();
        handle.dispose(run.cache);

        match revoked {
            Some(entry) => {
                warn!(
                    "{} revoked at {} ({})",
                    run.pool[id].subject_display(),
                    entry.revoked_at,
                    entry.reason.as_deref().unwrap_or("unspecified")
                );
                if run.record(pos, StatusCode::CertRevoked) && first_fatal.is_none() {
                    first_fatal = Some(StatusCode::CertRevoked);
                }
            }
            None => {
                let cert = &mut run.pool[id];
                cert.revoke_check_good = true;
                if opts.sufficient {
                    cert.revoke_check_complete = true;
                }
            }
        }
    }

    match first_fatal {
        Some(code) => Err(code),
        None => Ok(()),
    }
}
