//! Certificate revocation lists

use super::item::{CachedItem, ItemCore, ItemKind};
use crate::library::{CertLibrary, CrlFields, RevokedEntry};
use crate::utils::{LibraryError, StatusCode};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Where a CRL was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlOrigin {
    /// Supplied with the verification call
    InGroup,
    /// Held by the shared revocation cache
    LocalCache,
    Database,
    Network,
}

/// A parsed CRL. Its validity window runs from thisUpdate to nextUpdate.
#[derive(Debug, Clone)]
pub struct Crl {
    core: ItemCore,
    fields: CrlFields,
    origin: CrlOrigin,
}

impl Crl {
    pub fn from_der(
        library: &dyn CertLibrary,
        der: &[u8],
        origin: CrlOrigin,
    ) -> Result<Self, LibraryError> {
        let fields = library.parse_crl(der)?;
        Ok(Self::from_fields(Arc::from(der), fields, origin))
    }

    pub fn from_fields(raw: Arc<[u8]>, fields: CrlFields, origin: CrlOrigin) -> Self {
        let core = ItemCore::new(
            raw,
            fields.issuer.clone(),
            fields.issuer_display.clone(),
            fields.this_update,
            fields.next_update,
        );
        Self {
            core,
            fields,
            origin,
        }
    }

    pub fn fields(&self) -> &CrlFields {
        &self.fields
    }

    pub fn origin(&self) -> CrlOrigin {
        self.origin
    }

    pub(crate) fn with_origin(mut self, origin: CrlOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        self.fields.this_update
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.fields.next_update
    }

    /// Look up `serial` in the revoked list as of `as_of`.
    ///
    /// Entries revoked after `as_of` do not count.
    pub fn is_revoked(&self, serial: &[u8], as_of: DateTime<Utc>) -> Option<&RevokedEntry> {
        let wanted = trim_leading_zeros(serial);
        self.fields
            .revoked
            .iter()
            .find(|entry| trim_leading_zeros(&entry.serial) == wanted && entry.revoked_at <= as_of)
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl CachedItem for Crl {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Crl
    }

    fn expired_code(&self) -> StatusCode {
        StatusCode::CrlExpired
    }

    fn not_valid_yet_code(&self) -> StatusCode {
        StatusCode::CrlNotValidYet
    }
}
