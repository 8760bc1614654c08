//! One verification call
//!
//! A session owns the certificate pool and groups for a single call to
//! [`TrustEngine::verify_chain`](super::TrustEngine::verify_chain) or
//! [`TrustEngine::construct_chain`](super::TrustEngine::construct_chain).
//! Nothing in it outlives the call except CRLs added to the shared cache.

use super::context::{VerifyContext, VerifyOutcome};
use super::TrustEngine;
use crate::certificate::{
    BuildEnv, BuildFlags, BuildGroups, BuildOutcome, CachedItem, CertGroup, CertId, CertOrigin,
    CertPool, Certificate, CertificateChain, Crl, CrlOrigin, Ownership, Subject,
};
use crate::models::Evidence;
use crate::policy::{check_certificate_policy, PolicyId, PolicyRequest};
use crate::revocation::{check_revocation, RevocationPolicy, RevocationRun};
use crate::utils::{StatusCode, TrustError};
use tracing::{debug, info, warn};

pub(crate) struct Session<'e> {
    engine: &'e TrustEngine,
    pool: CertPool,
    input: CertGroup,
    anchors: CertGroup,
    gathered: CertGroup,
    chain: CertificateChain,
    crls: Vec<Crl>,
}

impl<'e> Session<'e> {
    /// Parse the caller's inputs into a fresh pool.
    ///
    /// A malformed leaf, anchor or CRL aborts the call. Other malformed
    /// candidates are skipped.
    pub(crate) fn new(
        engine: &'e TrustEngine,
        candidate_certs: &[Vec<u8>],
        anchors: &[Vec<u8>],
        crls: &[Vec<u8>],
    ) -> Result<Self, TrustError> {
        if candidate_certs.is_empty() {
            return Err(TrustError::InvalidArgument {
                message: "no certificates to verify".to_string(),
            });
        }

        let library = engine.library.as_ref();
        let mut session = Self {
            engine,
            pool: CertPool::new(),
            input: CertGroup::new(Ownership::Borrowed),
            anchors: CertGroup::new(Ownership::Borrowed),
            gathered: CertGroup::new(Ownership::Owned),
            chain: CertificateChain::new(Ownership::Borrowed),
            crls: Vec::with_capacity(crls.len()),
        };

        for (index, der) in candidate_certs.iter().enumerate() {
            if session.pool.find_by_raw(der).is_some() {
                debug!("Skipping duplicate input certificate #{}", index);
                continue;
            }
            match Certificate::from_der(library, der, CertOrigin::Input) {
                Ok(cert) => {
                    let id = session.pool.insert(cert);
                    session.input.push(id);
                }
                Err(e) if index == 0 => {
                    return Err(TrustError::MalformedCertificate {
                        index,
                        message: e.to_string(),
                    });
                }
                Err(e) => warn!("Ignoring unparseable certificate #{}: {}", index, e),
            }
        }

        for (index, der) in anchors.iter().enumerate() {
            let id = match session.pool.find_by_raw(der) {
                Some(id) => {
                    session.pool[id].is_anchor = true;
                    id
                }
                None => {
                    let cert = Certificate::from_der(library, der, CertOrigin::Anchor).map_err(
                        |e| TrustError::MalformedAnchor {
                            index,
                            message: e.to_string(),
                        },
                    )?;
                    session.pool.insert(cert)
                }
            };
            session.anchors.push(id);
        }

        for der in crls {
            let crl = Crl::from_der(library, der, CrlOrigin::InGroup).map_err(|e| {
                TrustError::MalformedCrl {
                    message: e.to_string(),
                }
            })?;
            session.crls.push(crl);
        }

        debug!(
            "Session with {} certificates, {} anchors, {} CRLs",
            session.input.len(),
            session.anchors.len(),
            session.crls.len()
        );
        Ok(session)
    }

    fn leaf(&self) -> Option<CertId> {
        self.input.ids().first().copied()
    }

    /// Build the chain from the leaf.
    pub(crate) fn construct(&mut self, env: &BuildEnv<'_>, flags: BuildFlags) -> BuildOutcome {
        let Some(leaf) = self.leaf() else {
            return BuildOutcome {
                result: Err(StatusCode::NotTrusted),
                ..BuildOutcome::default()
            };
        };
        let groups = BuildGroups {
            input: &self.input,
            anchors: &self.anchors,
            gathered: &mut self.gathered,
        };
        self.chain
            .build_chain(&mut self.pool, Subject::Certificate(leaf), groups, env, flags)
    }

    /// DER of each chain member, leaf first
    pub(crate) fn chain_ders(&self) -> Vec<Vec<u8>> {
        self.chain
            .ids()
            .iter()
            .map(|id| self.pool[*id].raw().to_vec())
            .collect()
    }

    /// Run the full verification state machine.
    pub(crate) fn verify(mut self, ctx: &VerifyContext) -> VerifyOutcome {
        let engine = self.engine;
        let (policy, policy_string) = ctx
            .policies
            .iter()
            .find(|p| !p.is_revocation())
            .map(|p| (p.id(), p.policy_string()))
            .unwrap_or((PolicyId::BasicX509, None));
        let env = BuildEnv {
            library: engine.library.as_ref(),
            directory: engine.directory.as_deref(),
            fetcher: engine.fetcher.as_deref(),
            trust_settings: engine.trust_settings.as_deref(),
            policy,
            policy_string,
            verify_time: ctx.verify_time,
        };
        let flags = BuildFlags {
            allow_network: ctx.allow_network,
            honor_trust_settings: ctx.honor_trust_settings,
            max_chain_length: ctx.max_chain_length,
        };

        let built = self.construct(&env, flags);
        debug!(
            "Constructed chain of {} certificates: {:?}",
            self.chain.len(),
            built.result
        );

        let mut construction = built.result.and_then(|()| self.infer_status(&built, ctx));
        let allowed = self.chain.allowed_errors(&self.pool);
        construction = override_allowed(construction, &allowed);

        let halted = |status: &Result<(), StatusCode>| status.is_err() && ctx.stop_on_first_failure;
        let mut policies = Ok(());
        let mut ran_certificate_policy = false;
        let mut ran_revocation_policy = false;

        if !halted(&construction) {
            for request in &ctx.policies {
                let result = if request.is_revocation() {
                    ran_revocation_policy = true;
                    let revocation = match request {
                        PolicyRequest::Crl(opts) => RevocationPolicy::Crl(*opts),
                        PolicyRequest::Ocsp(opts) => RevocationPolicy::Ocsp(*opts),
                        _ => RevocationPolicy::None,
                    };
                    self.run_revocation(revocation, env, flags, ctx)
                } else {
                    ran_certificate_policy = true;
                    check_certificate_policy(request, &mut self.pool, &self.chain)
                };
                let result = override_allowed(result, &allowed);
                if policies.is_ok() {
                    policies = result;
                }
                if halted(&policies) {
                    debug!("Stopping after {:?} failed", request.id());
                    break;
                }
            }

            if !ran_certificate_policy && !halted(&policies) {
                let result = check_certificate_policy(&PolicyRequest::BasicX509, &mut self.pool, &self.chain);
                if policies.is_ok() {
                    policies = override_allowed(result, &allowed);
                }
            }
            if !ran_revocation_policy && !halted(&policies) {
                let result = self.run_revocation(ctx.default_revocation, env, flags, ctx);
                if policies.is_ok() {
                    policies = override_allowed(result, &allowed);
                }
            }
        }

        let result = construction.and(policies);
        let evidence = ctx
            .want_evidence
            .then(|| Evidence::from_chain(&self.pool, &self.chain));

        let leaf_name = self
            .chain
            .leaf()
            .map(|id| self.pool[id].subject_display().to_string())
            .unwrap_or_default();
        match result {
            Ok(()) => info!("Chain for {} is trusted", leaf_name),
            Err(code) => info!("Chain for {} rejected: {}", leaf_name, code),
        }

        VerifyOutcome {
            result,
            verified_to_root: built.verified_to_root,
            verified_to_anchor: built.verified_to_anchor,
            verified_via_trust_setting: built.verified_via_trust_setting,
            evidence,
        }
    }

    /// Turn the construction flags into a verdict. The code is also
    /// recorded on the chain's last certificate.
    fn infer_status(&mut self, built: &BuildOutcome, ctx: &VerifyContext) -> Result<(), StatusCode> {
        if built.verified_to_anchor || built.verified_via_trust_setting {
            return Ok(());
        }
        let code = if !built.verified_to_root {
            StatusCode::NotTrusted
        } else if ctx.implicit_anchors {
            return Ok(());
        } else if self.chain.len() == 1 {
            StatusCode::NotTrusted
        } else {
            StatusCode::RootNotAnchor
        };

        if let Some(tail) = self.chain.tail() {
            self.pool[tail].add_status_code(code);
        }
        Err(code)
    }

    fn run_revocation(
        &mut self,
        policy: RevocationPolicy,
        env: BuildEnv<'_>,
        flags: BuildFlags,
        ctx: &VerifyContext,
    ) -> Result<(), StatusCode> {
        if policy == RevocationPolicy::None {
            return Ok(());
        }
        let engine = self.engine;
        let mut run = RevocationRun {
            pool: &mut self.pool,
            chain: &self.chain,
            input: &self.input,
            anchors: &self.anchors,
            gathered: &mut self.gathered,
            env,
            flags,
            crls: &self.crls,
            cache: engine.crl_cache.as_ref(),
            ocsp: engine.ocsp.as_deref(),
            implicit_anchors: ctx.implicit_anchors,
        };
        check_revocation(policy, &mut run)
    }
}

/// Clear a failure when any chain member allows its code.
fn override_allowed(result: Result<(), StatusCode>, allowed: &[StatusCode]) -> Result<(), StatusCode> {
    match result {
        Err(code) if allowed.contains(&code) => {
            debug!("Status {} overridden by an allowed-error entry", code.as_str());
            Ok(())
        }
        other => other,
    }
}
