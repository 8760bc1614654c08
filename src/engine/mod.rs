//! Trust engine
//!
//! [`TrustEngine`] holds the collaborators shared by every verification:
//! the certificate library, optional directory, network, OCSP and
//! trust-settings sources, and the process-wide CRL cache. Each call builds
//! its own pool and chain, so one engine can serve many threads.
//!
//! # Usage
//!
//! ```rust,ignore
//! use certpath::engine::{TrustEngine, VerifyContext};
//! use certpath::library::X509Library;
//! use certpath::policy::PolicyRequest;
//! use std::sync::Arc;
//!
//! let engine = TrustEngine::builder(Arc::new(X509Library::new())).build()?;
//! let ctx = VerifyContext::default()
//!     .with_anchors(vec![root_der])
//!     .with_policy(PolicyRequest::BasicX509);
//! let outcome = engine.verify_chain(&[leaf_der, intermediate_der], &ctx)?;
//! assert!(outcome.is_trusted());
//! ```

pub mod context;
mod session;

pub use context::{ConstructedChain, VerifyContext, VerifyOutcome};

use crate::certificate::{BuildEnv, BuildFlags};
use crate::config::Settings;
use crate::library::CertLibrary;
use crate::policy::PolicyId;
use crate::revocation::{OcspResponder, RevocationCache};
use crate::sources::{CertDirectory, NetworkFetcher};
use crate::trust_settings::{StaticTrustSettings, TrustSettingsStore};
use crate::utils::TrustError;
use session::Session;
use std::sync::Arc;
use tracing::debug;

/// Shared verification engine
pub struct TrustEngine {
    library: Arc<dyn CertLibrary>,
    directory: Option<Arc<dyn CertDirectory>>,
    fetcher: Option<Arc<dyn NetworkFetcher>>,
    ocsp: Option<Arc<dyn OcspResponder>>,
    trust_settings: Option<Arc<dyn TrustSettingsStore>>,
    crl_cache: Arc<RevocationCache>,
    settings: Settings,
}

/// Builder for [`TrustEngine`]
pub struct TrustEngineBuilder {
    library: Arc<dyn CertLibrary>,
    directory: Option<Arc<dyn CertDirectory>>,
    fetcher: Option<Arc<dyn NetworkFetcher>>,
    ocsp: Option<Arc<dyn OcspResponder>>,
    trust_settings: Option<Arc<dyn TrustSettingsStore>>,
    crl_cache: Option<Arc<RevocationCache>>,
    settings: Settings,
}

impl TrustEngineBuilder {
    pub fn directory(mut self, directory: Arc<dyn CertDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn NetworkFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn ocsp_responder(mut self, responder: Arc<dyn OcspResponder>) -> Self {
        self.ocsp = Some(responder);
        self
    }

    /// Use `store` instead of the trust settings listed in the configuration
    pub fn trust_settings(mut self, store: Arc<dyn TrustSettingsStore>) -> Self {
        self.trust_settings = Some(store);
        self
    }

    /// Share a CRL cache with other engines
    pub fn crl_cache(mut self, cache: Arc<RevocationCache>) -> Self {
        self.crl_cache = Some(cache);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<TrustEngine, TrustError> {
        self.settings.validate()?;

        let trust_settings = match self.trust_settings {
            Some(store) => Some(store),
            None if !self.settings.trust_settings.is_empty() => {
                let store = StaticTrustSettings::from_entries(&self.settings.trust_settings)?;
                debug!("Loaded {} configured trust settings", store.len());
                Some(Arc::new(store) as Arc<dyn TrustSettingsStore>)
            }
            None => None,
        };
        let crl_cache = self.crl_cache.unwrap_or_else(|| {
            Arc::new(RevocationCache::new(self.settings.revocation.cache_max_entries))
        });

        Ok(TrustEngine {
            library: self.library,
            directory: self.directory,
            fetcher: self.fetcher,
            ocsp: self.ocsp,
            trust_settings,
            crl_cache,
            settings: self.settings,
        })
    }
}

impl TrustEngine {
    pub fn builder(library: Arc<dyn CertLibrary>) -> TrustEngineBuilder {
        TrustEngineBuilder {
            library,
            directory: None,
            fetcher: None,
            ocsp: None,
            trust_settings: None,
            crl_cache: None,
            settings: Settings::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn library(&self) -> &dyn CertLibrary {
        self.library.as_ref()
    }

    pub fn crl_cache(&self) -> &Arc<RevocationCache> {
        &self.crl_cache
    }

    /// A context seeded from this engine's settings
    pub fn context(&self) -> VerifyContext {
        VerifyContext::from_settings(&self.settings)
    }

    /// Order `candidate_certs` into a chain without running any policy.
    ///
    /// The first candidate is the leaf. The chain may be partial; the
    /// outcome says how far it got.
    pub fn construct_chain(
        &self,
        candidate_certs: &[Vec<u8>],
        anchors: &[Vec<u8>],
    ) -> Result<ConstructedChain, TrustError> {
        let mut session = Session::new(self, candidate_certs, anchors, &[])?;
        let env = BuildEnv {
            library: self.library.as_ref(),
            directory: self.directory.as_deref(),
            fetcher: self.fetcher.as_deref(),
            trust_settings: self.trust_settings.as_deref(),
            policy: PolicyId::BasicX509,
            policy_string: None,
            verify_time: None,
        };
        let flags = BuildFlags {
            allow_network: self.settings.network.fetch_enabled,
            honor_trust_settings: self.settings.construction.honor_trust_settings,
            max_chain_length: self.settings.construction.max_chain_length,
        };
        let outcome = session.construct(&env, flags);
        Ok(ConstructedChain {
            certificates: session.chain_ders(),
            outcome,
        })
    }

    /// Construct and evaluate a chain for the first of `candidate_certs`.
    ///
    /// Returns `Err` only when the call cannot proceed; an untrusted chain
    /// is reported through [`VerifyOutcome::result`].
    pub fn verify_chain(
        &self,
        candidate_certs: &[Vec<u8>],
        ctx: &VerifyContext,
    ) -> Result<VerifyOutcome, TrustError> {
        if ctx.max_chain_length == 0 {
            return Err(TrustError::InvalidArgument {
                message: "max_chain_length must be at least 1".to_string(),
            });
        }
        for policy in &ctx.policies {
            policy.validate()?;
        }

        let session = Session::new(self, candidate_certs, &ctx.anchors, &ctx.crls)?;
        Ok(session.verify(ctx))
    }
}
