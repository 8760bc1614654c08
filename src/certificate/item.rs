//! Behaviour shared by certificates and CRLs
//!
//! Both kinds of item carry an issuer name, a validity window and a signature
//! that can be checked against a candidate issuer. [`CachedItem`] captures
//! that common surface; [`Certificate`] and [`Crl`] implement it.
//!
//! [`Certificate`]: super::Certificate
//! [`Crl`]: super::Crl

use super::Certificate;
use crate::library::{CertLibrary, SignatureOutcome, SignedItem};
use crate::utils::StatusCode;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Which kind of item this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Certificate,
    Crl,
}

/// State common to every cached item.
#[derive(Debug, Clone)]
pub struct ItemCore {
    raw: Arc<[u8]>,
    issuer: Vec<u8>,
    issuer_display: String,
    not_before: DateTime<Utc>,
    /// `None` for a CRL without a nextUpdate
    not_after: Option<DateTime<Utc>>,
    is_expired: bool,
    is_not_valid_yet: bool,
}

impl ItemCore {
    pub fn new(
        raw: Arc<[u8]>,
        issuer: Vec<u8>,
        issuer_display: String,
        not_before: DateTime<Utc>,
        not_after: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            raw,
            issuer,
            issuer_display,
            not_before,
            not_after,
            is_expired: false,
            is_not_valid_yet: false,
        }
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    /// Evaluate the validity window without recording anything.
    pub fn currency_at(&self, as_of: DateTime<Utc>) -> Currency {
        if as_of < self.not_before {
            Currency::NotValidYet
        } else if self.not_after.is_some_and(|end| as_of > end) {
            Currency::Expired
        } else {
            Currency::Current
        }
    }
}

/// Position of a point in time relative to an item's validity window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Current,
    Expired,
    NotValidYet,
}

/// A certificate or CRL that has been parsed by the certificate library.
pub trait CachedItem {
    fn core(&self) -> &ItemCore;

    fn core_mut(&mut self) -> &mut ItemCore;

    fn kind(&self) -> ItemKind;

    /// Status code recorded when the item is past its validity window
    fn expired_code(&self) -> StatusCode;

    /// Status code recorded when the item is not yet valid
    fn not_valid_yet_code(&self) -> StatusCode;

    /// The raw encoded item
    fn raw(&self) -> &[u8] {
        &self.core().raw
    }

    /// Raw DER of the issuer name
    fn issuer_name(&self) -> &[u8] {
        &self.core().issuer
    }

    fn issuer_display(&self) -> &str {
        &self.core().issuer_display
    }

    fn is_expired(&self) -> bool {
        self.core().is_expired
    }

    fn is_not_valid_yet(&self) -> bool {
        self.core().is_not_valid_yet
    }

    fn signed_item(&self) -> SignedItem<'_> {
        match self.kind() {
            ItemKind::Certificate => SignedItem::Certificate(self.raw()),
            ItemKind::Crl => SignedItem::Crl(self.raw()),
        }
    }

    /// Recompute the expired / not-yet-valid flags against `as_of`, or
    /// against the wall clock when `None`.
    fn calculate_current(&mut self, as_of: Option<DateTime<Utc>>) -> Result<(), StatusCode> {
        let as_of = as_of.unwrap_or_else(Utc::now);
        let currency = self.core().currency_at(as_of);
        let core = self.core_mut();
        core.is_expired = currency == Currency::Expired;
        core.is_not_valid_yet = currency == Currency::NotValidYet;
        match currency {
            Currency::Current => Ok(()),
            Currency::Expired => Err(self.expired_code()),
            Currency::NotValidYet => Err(self.not_valid_yet_code()),
        }
    }

    /// Check this item's signature against `issuer`.
    ///
    /// Name chaining is assumed to have been checked by the caller. When the
    /// issuer key is partial, `params` may supply the missing parameters.
    fn verify_with_issuer(
        &self,
        issuer: &Certificate,
        params: Option<&Certificate>,
        library: &dyn CertLibrary,
    ) -> SignatureOutcome {
        library.verify_signature(
            self.signed_item(),
            issuer.public_key(),
            params.map(|p| p.public_key()),
        )
    }
}
