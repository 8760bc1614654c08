//! Certification path construction
//!
//! [`CertificateChain::build_chain`] walks issuer links from a subject
//! certificate or CRL, consulting, in order, the caller's input certificates,
//! certificates gathered earlier in the same call, the trusted anchors, the
//! directory collaborator and finally the network.

use super::item::{CachedItem, Currency};
use super::pool::{CertGroup, CertId, CertPool, Ownership};
use super::{CertOrigin, Certificate, Crl, RootState};
use crate::library::{CertLibrary, SignatureOutcome};
use crate::policy::PolicyId;
use crate::sources::{CertDirectory, NetworkFetcher};
use crate::trust_settings::{KeyUse, TrustSettingsStore};
use crate::utils::StatusCode;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// The item a chain is built from
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// A pool certificate; it becomes chain member 0
    Certificate(CertId),
    /// A CRL; the chain holds only its issuers
    Crl(&'a Crl),
}

/// Collaborators and per-call parameters for one build
#[derive(Clone, Copy)]
pub struct BuildEnv<'a> {
    pub library: &'a dyn CertLibrary,
    pub directory: Option<&'a dyn CertDirectory>,
    pub fetcher: Option<&'a dyn NetworkFetcher>,
    pub trust_settings: Option<&'a dyn TrustSettingsStore>,
    pub policy: PolicyId,
    pub policy_string: Option<&'a str>,
    pub verify_time: Option<DateTime<Utc>>,
}

impl BuildEnv<'_> {
    /// The verification time, or now
    pub fn as_of(&self) -> DateTime<Utc> {
        self.verify_time.unwrap_or_else(Utc::now)
    }
}

/// Switches for one build
#[derive(Debug, Clone, Copy)]
pub struct BuildFlags {
    pub allow_network: bool,
    pub honor_trust_settings: bool,
    pub max_chain_length: usize,
}

/// Certificate groups consulted during a build
pub struct BuildGroups<'a> {
    /// Unordered caller-supplied candidates
    pub input: &'a CertGroup,
    pub anchors: &'a CertGroup,
    /// Receives certificates fetched from the directory or the network
    pub gathered: &'a mut CertGroup,
}

/// What a build established about the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub result: Result<(), StatusCode>,
    pub verified_to_root: bool,
    pub verified_to_anchor: bool,
    pub verified_via_trust_setting: bool,
}

impl Default for BuildOutcome {
    fn default() -> Self {
        Self {
            result: Ok(()),
            verified_to_root: false,
            verified_to_anchor: false,
            verified_via_trust_setting: false,
        }
    }
}

/// A link whose signature could not be checked until more key material
/// was known. `subject` is `None` when the subject is the CRL.
#[derive(Debug, Clone, Copy)]
struct DeferredLink {
    subject: Option<usize>,
    issuer: usize,
}

/// Ordered chain of pool members; index 0 is the leaf.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    members: Vec<CertId>,
    ownership: Ownership,
}

impl CertificateChain {
    pub fn new(ownership: Ownership) -> Self {
        Self {
            members: Vec::new(),
            ownership,
        }
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> &[CertId] {
        &self.members
    }

    pub fn get(&self, index: usize) -> Option<CertId> {
        self.members.get(index).copied()
    }

    pub fn leaf(&self) -> Option<CertId> {
        self.members.first().copied()
    }

    pub fn tail(&self) -> Option<CertId> {
        self.members.last().copied()
    }

    pub fn contains(&self, id: CertId) -> bool {
        self.members.contains(&id)
    }

    fn push(&mut self, id: CertId) {
        self.members.push(id);
    }

    fn truncate(&mut self, len: usize) {
        self.members.truncate(len);
    }

    /// Borrowed view of the members as an unordered group
    pub fn as_group(&self) -> CertGroup {
        CertGroup::from_ids(self.members.clone(), Ownership::Borrowed)
    }

    /// Union of every member's allowed-error list
    pub fn allowed_errors(&self, pool: &CertPool) -> Vec<StatusCode> {
        let mut allowed = Vec::new();
        for id in &self.members {
            for code in pool[*id].allowed_errors() {
                if !allowed.contains(code) {
                    allowed.push(*code);
                }
            }
        }
        allowed
    }

    /// Build the chain for `subject`.
    ///
    /// Any previous contents are discarded. The returned outcome's `result`
    /// is a chain-terminal failure such as `InvalidRoot`; per-certificate
    /// problems are recorded on the certificates themselves.
    pub fn build_chain(
        &mut self,
        pool: &mut CertPool,
        subject: Subject<'_>,
        groups: BuildGroups<'_>,
        env: &BuildEnv<'_>,
        flags: BuildFlags,
    ) -> BuildOutcome {
        self.members.clear();
        pool.reset_pass();
        let mut outcome = BuildOutcome::default();
        let mut deferred = Vec::new();

        if let Subject::Certificate(leaf) = subject {
            self.push(leaf);
            let cert = &mut pool[leaf];
            cert.used = true;
            cert.is_leaf = true;
            if flags.honor_trust_settings {
                if let Some(store) = env.trust_settings {
                    cert.evaluate_trust_settings(store, env.policy, env.policy_string, None);
                }
            }
            if let Err(code) = cert.calculate_current(env.verify_time) {
                if cert.add_status_code(code) {
                    debug!("Leaf {} rejected: {}", cert.subject_display(), code);
                    outcome.result = Err(code);
                    return outcome;
                }
            }
        }

        loop {
            if let Some(tail) = self.tail() {
                if self.tail_terminates(pool, tail, groups.anchors, env, flags, &mut outcome) {
                    break;
                }
                if self.len() >= flags.max_chain_length {
                    debug!("Chain length limit {} reached", flags.max_chain_length);
                    break;
                }
            }

            let Some((issuer, sig)) = self.find_issuer(pool, subject, &groups, env, flags) else {
                self.note_unresolved_root(pool, &mut outcome);
                break;
            };

            if let Some(gathered_id) = issuer.gathered {
                groups.gathered.push(gathered_id);
            }
            let subject_pos = if self.is_empty() {
                None
            } else {
                Some(self.len() - 1)
            };
            self.push(issuer.id);
            if sig == SignatureOutcome::NeedsMoreKeyMaterial {
                deferred.push(DeferredLink {
                    subject: subject_pos,
                    issuer: self.len() - 1,
                });
            }

            let key_use = match (subject, subject_pos) {
                (Subject::Crl(_), None) => KeyUse::SignCrl,
                _ => KeyUse::SignCert,
            };
            let cert = &mut pool[issuer.id];
            cert.used = true;
            if flags.honor_trust_settings {
                if let Some(store) = env.trust_settings {
                    cert.evaluate_trust_settings(store, env.policy, env.policy_string, Some(key_use));
                }
            }
            if let Err(code) = cert.calculate_current(env.verify_time) {
                cert.add_status_code(code);
            }
        }

        if !deferred.is_empty() {
            self.verify_with_partial_keys(pool, subject, &deferred, env, &mut outcome);
        }

        outcome
    }

    /// Decide whether the tail ends the search. Sets the anchor, root and
    /// trust-setting flags on `outcome`.
    fn tail_terminates(
        &self,
        pool: &mut CertPool,
        tail: CertId,
        anchors: &CertGroup,
        env: &BuildEnv<'_>,
        flags: BuildFlags,
        outcome: &mut BuildOutcome,
    ) -> bool {
        let is_anchor = pool[tail].is_anchor()
            || anchors
                .ids()
                .iter()
                .any(|a| *a != tail && pool[*a].same_identity(&pool[tail]));
        let self_signed = pool[tail].is_self_signed(env.library);

        if is_anchor {
            debug!("Chain reached anchor {}", pool[tail].subject_display());
            outcome.verified_to_anchor = true;
            outcome.verified_to_root = self_signed;
            return true;
        }

        if flags.honor_trust_settings {
            let cert = &mut pool[tail];
            if cert.denied_by_settings() {
                debug!("Trust settings deny {}", cert.subject_display());
                if cert.add_status_code(StatusCode::TrustSettingDeny) {
                    outcome.result = Err(StatusCode::TrustSettingDeny);
                }
                return true;
            }
            if cert.trusted_by_settings() {
                debug!("Trust settings trust {}", cert.subject_display());
                outcome.verified_via_trust_setting = true;
                outcome.verified_to_root = self_signed;
                return true;
            }
        }

        if self_signed {
            debug!("Chain reached root {}", pool[tail].subject_display());
            outcome.verified_to_root = true;
            return true;
        }

        false
    }

    /// A self-issued tail whose self-signature failed and for which no
    /// other issuer exists is an invalid root.
    fn note_unresolved_root(&self, pool: &mut CertPool, outcome: &mut BuildOutcome) {
        let Some(tail) = self.tail() else {
            return;
        };
        let cert = &mut pool[tail];
        if cert.is_self_issued() && cert.root_state() == RootState::NotRoot {
            warn!("Self-issued {} fails its own signature", cert.subject_display());
            if cert.add_status_code(StatusCode::InvalidRoot) {
                outcome.result = Err(StatusCode::InvalidRoot);
            }
        } else {
            debug!("No issuer found for {}", cert.subject_display());
        }
    }

    /// Search every source in priority order for the issuer of the tail.
    fn find_issuer(
        &self,
        pool: &mut CertPool,
        subject: Subject<'_>,
        groups: &BuildGroups<'_>,
        env: &BuildEnv<'_>,
        flags: BuildFlags,
    ) -> Option<(FoundIssuer, SignatureOutcome)> {
        let tail = self.tail();
        let issuer_name = match tail {
            Some(id) => pool[id].issuer_name().to_vec(),
            None => match subject {
                Subject::Crl(crl) => crl.issuer_name().to_vec(),
                Subject::Certificate(_) => return None,
            },
        };

        let in_group = |group: &CertGroup, pool: &CertPool| -> Vec<CertId> {
            group
                .ids()
                .iter()
                .copied()
                .filter(|id| {
                    let c = &pool[*id];
                    !c.is_used() && !self.contains(*id) && c.subject_name() == issuer_name
                })
                .collect()
        };

        for (label, group) in [
            ("input", &*groups.input),
            ("gathered", &*groups.gathered),
            ("anchors", groups.anchors),
        ] {
            let candidates = in_group(group, &*pool);
            if candidates.is_empty() {
                continue;
            }
            if let Some((id, sig)) = self.select_issuer(pool, subject, &candidates, env) {
                debug!("Issuer {} found in {}", pool[id].subject_display(), label);
                return Some((FoundIssuer { id, gathered: None }, sig));
            }
        }

        if let Some(directory) = env.directory {
            let lookup = {
                let tail_item = self.tail_item(pool, subject)?;
                directory.find_issuer_cert(tail_item)
            };
            match lookup {
                Ok(Some(der)) => {
                    if let Some(found) =
                        self.adopt_fetched(pool, subject, &der, CertOrigin::Directory, env)
                    {
                        debug!("Issuer found in directory");
                        return Some(found);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Directory lookup failed: {}", e),
            }
        }

        if flags.allow_network {
            if let (Some(fetcher), Some(tail)) = (env.fetcher, tail) {
                match fetcher.fetch_issuer(&pool[tail]) {
                    Ok(Some(der)) => {
                        if let Some(found) =
                            self.adopt_fetched(pool, subject, &der, CertOrigin::Network, env)
                        {
                            debug!("Issuer fetched from network");
                            return Some(found);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Issuer fetch failed: {}", e),
                }
            }
        }

        None
    }

    fn tail_item<'p>(
        &self,
        pool: &'p CertPool,
        subject: Subject<'p>,
    ) -> Option<&'p dyn CachedItem> {
        match (self.tail(), subject) {
            (Some(id), _) => Some(&pool[id] as &dyn CachedItem),
            (None, Subject::Crl(crl)) => Some(crl as &dyn CachedItem),
            (None, Subject::Certificate(_)) => None,
        }
    }

    /// Pick the candidate that signed the tail.
    ///
    /// Currently valid candidates are tried before expired or not yet valid
    /// ones. A verified signature wins outright; a candidate whose key needs
    /// more material is accepted only when nothing verifies.
    fn select_issuer(
        &self,
        pool: &CertPool,
        subject: Subject<'_>,
        candidates: &[CertId],
        env: &BuildEnv<'_>,
    ) -> Option<(CertId, SignatureOutcome)> {
        let tail_item = self.tail_item(pool, subject)?;
        let as_of = env.as_of();
        let mut ordered: Vec<CertId> = candidates.to_vec();
        ordered.sort_by_key(|id| pool[*id].core().currency_at(as_of) != Currency::Current);

        let mut deferred = None;
        for id in ordered {
            match tail_item.verify_with_issuer(&pool[id], None, env.library) {
                SignatureOutcome::Verified => return Some((id, SignatureOutcome::Verified)),
                SignatureOutcome::NeedsMoreKeyMaterial => {
                    deferred.get_or_insert(id);
                }
                SignatureOutcome::Failed => {
                    debug!(
                        "Candidate issuer {} did not sign {}",
                        pool[id].subject_display(),
                        tail_item.issuer_display()
                    );
                }
            }
        }
        deferred.map(|id| (id, SignatureOutcome::NeedsMoreKeyMaterial))
    }

    /// Parse a certificate from the directory or the network and accept it
    /// if it is new to the chain, names the tail's issuer and signed it.
    fn adopt_fetched(
        &self,
        pool: &mut CertPool,
        subject: Subject<'_>,
        der: &[u8],
        origin: CertOrigin,
        env: &BuildEnv<'_>,
    ) -> Option<(FoundIssuer, SignatureOutcome)> {
        if let Some(existing) = pool.find_by_raw(der) {
            if self.contains(existing) || pool[existing].is_used() {
                debug!("Fetched issuer already in chain");
                return None;
            }
            let sig = self.check_link(pool, subject, existing, env)?;
            return Some((
                FoundIssuer {
                    id: existing,
                    gathered: Some(existing),
                },
                sig,
            ));
        }

        let cert = match Certificate::from_der(env.library, der, origin) {
            Ok(cert) => cert,
            Err(e) => {
                warn!("Discarding unparseable issuer: {}", e);
                return None;
            }
        };
        let id = pool.insert(cert);
        let sig = self.check_link(pool, subject, id, env)?;
        Some((
            FoundIssuer {
                id,
                gathered: Some(id),
            },
            sig,
        ))
    }

    fn check_link(
        &self,
        pool: &CertPool,
        subject: Subject<'_>,
        candidate: CertId,
        env: &BuildEnv<'_>,
    ) -> Option<SignatureOutcome> {
        let tail_item = self.tail_item(pool, subject)?;
        if pool[candidate].subject_name() != tail_item.issuer_name() {
            return None;
        }
        match tail_item.verify_with_issuer(&pool[candidate], None, env.library) {
            SignatureOutcome::Failed => None,
            sig => Some(sig),
        }
    }

    /// Retry links deferred for lack of key material now that the whole
    /// chain is known.
    ///
    /// Parameters come from the nearest certificate above the issuer with
    /// the same key algorithm and a complete key.
    fn verify_with_partial_keys(
        &mut self,
        pool: &mut CertPool,
        subject: Subject<'_>,
        deferred: &[DeferredLink],
        env: &BuildEnv<'_>,
        outcome: &mut BuildOutcome,
    ) {
        for link in deferred {
            let Some(issuer_id) = self.get(link.issuer) else {
                continue;
            };
            let algorithm = pool[issuer_id].public_key().algorithm.clone();
            let params = self.members[link.issuer + 1..].iter().copied().find(|id| {
                let key = pool[*id].public_key();
                key.algorithm == algorithm && !key.is_partial
            });

            let sig = match params {
                None => SignatureOutcome::NeedsMoreKeyMaterial,
                Some(params_id) => {
                    let subject_item: &dyn CachedItem = match (link.subject, subject) {
                        (Some(pos), _) => &pool[self.members[pos]] as &dyn CachedItem,
                        (None, Subject::Crl(crl)) => crl as &dyn CachedItem,
                        (None, Subject::Certificate(_)) => continue,
                    };
                    subject_item.verify_with_issuer(
                        &pool[issuer_id],
                        Some(&pool[params_id]),
                        env.library,
                    )
                }
            };

            match sig {
                SignatureOutcome::Verified => {}
                SignatureOutcome::NeedsMoreKeyMaterial => {
                    let cert = &mut pool[issuer_id];
                    warn!("Key of {} is still incomplete", cert.subject_display());
                    if cert.add_status_code(StatusCode::KeyIncomplete) && outcome.result.is_ok() {
                        outcome.result = Err(StatusCode::KeyIncomplete);
                    }
                }
                SignatureOutcome::Failed => {
                    warn!(
                        "Deferred signature check against {} failed",
                        pool[issuer_id].subject_display()
                    );
                    if let Some(pos) = link.subject {
                        pool[self.members[pos]].add_status_code(StatusCode::InvalidSignature);
                    }
                    self.truncate(link.issuer);
                    outcome.verified_to_root = false;
                    outcome.verified_to_anchor = false;
                    outcome.verified_via_trust_setting = false;
                    return;
                }
            }
        }
    }
}

/// An accepted issuer and whether it must join the gathered group
#[derive(Debug, Clone, Copy)]
struct FoundIssuer {
    id: CertId,
    gathered: Option<CertId>,
}
