//! Shared cache of verified CRLs
//!
//! One [`RevocationCache`] is shared, through an `Arc`, by every concurrent
//! verification call. Entries are reference counted: [`search`] and [`add`]
//! hand out a [`CrlLease`] that must be given back through [`release`] or
//! [`remove`]. An entry removed while others still hold it is detached and
//! freed by the last release.
//!
//! [`search`]: RevocationCache::search
//! [`add`]: RevocationCache::add
//! [`release`]: RevocationCache::release
//! [`remove`]: RevocationCache::remove

use crate::certificate::{CachedItem, Certificate, Crl, CrlOrigin, Currency};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Counters describing the cache's bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries ever added
    pub created: u64,
    /// Entries physically freed
    pub freed: u64,
    /// Entries still allocated, cached or detached
    pub live: usize,
    /// Detached entries waiting for their last holder
    pub pending: usize,
}

#[derive(Debug)]
struct CacheEntry {
    id: u64,
    crl: Arc<Crl>,
    ref_count: usize,
    pending_delete: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: Vec<CacheEntry>,
    detached: Vec<CacheEntry>,
    next_id: u64,
    created: u64,
    freed: u64,
}

impl CacheState {
    fn free(&mut self, entry: CacheEntry) {
        debug!("Freeing cached CRL from {}", entry.crl.issuer_display());
        self.freed += 1;
    }

    /// Drop one reference on a detached entry, freeing it on the last one.
    fn release_detached(&mut self, id: u64) -> bool {
        let Some(pos) = self.detached.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = &mut self.detached[pos];
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 && entry.pending_delete {
            let entry = self.detached.swap_remove(pos);
            self.free(entry);
        }
        true
    }

    /// Free idle entries, oldest first, until at most `max` remain.
    fn evict_idle(&mut self, max: usize) {
        while self.entries.len() > max {
            let Some(pos) = self.entries.iter().position(|e| e.ref_count == 0) else {
                break;
            };
            let entry = self.entries.remove(pos);
            self.free(entry);
        }
    }
}

/// A counted reference to a cached CRL.
///
/// Hand it back with [`RevocationCache::release`] or
/// [`RevocationCache::remove`].
#[must_use = "a lease must be released or removed"]
#[derive(Debug)]
pub struct CrlLease {
    id: u64,
    crl: Arc<Crl>,
    currency: Currency,
}

impl CrlLease {
    pub fn crl(&self) -> &Crl {
        &self.crl
    }

    /// Currency of the CRL at the time it was looked up
    pub fn currency(&self) -> Currency {
        self.currency
    }
}

/// Process-wide, thread-safe CRL cache.
#[derive(Debug)]
pub struct RevocationCache {
    state: Mutex<CacheState>,
    max_entries: usize,
}

impl Default for RevocationCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RevocationCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find a cached CRL issued by `cert`'s issuer.
    ///
    /// A CRL current at `as_of` is preferred. The caller decides what to do
    /// with a stale one.
    pub fn search(&self, cert: &Certificate, as_of: DateTime<Utc>) -> Option<CrlLease> {
        let mut state = self.lock();
        let issuer = cert.issuer_name();
        let mut matches = state
            .entries
            .iter_mut()
            .filter(|e| e.crl.issuer_name() == issuer)
            .map(|e| {
                let currency = e.crl.core().currency_at(as_of);
                (e, currency)
            })
            .collect::<Vec<_>>();
        matches.sort_by_key(|(_, currency)| *currency != Currency::Current);

        let (entry, currency) = matches.into_iter().next()?;
        entry.ref_count += 1;
        debug!(
            "CRL cache hit for {} (refs {})",
            entry.crl.issuer_display(),
            entry.ref_count
        );
        Some(CrlLease {
            id: entry.id,
            crl: Arc::clone(&entry.crl),
            currency,
        })
    }

    /// Insert a verified CRL; the caller holds the first reference.
    ///
    /// The cached copy reports [`CrlOrigin::LocalCache`].
    pub fn add(&self, crl: Crl, as_of: DateTime<Utc>) -> CrlLease {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.created += 1;

        let currency = crl.core().currency_at(as_of);
        let crl = Arc::new(crl.with_origin(CrlOrigin::LocalCache));
        state.entries.push(CacheEntry {
            id,
            crl: Arc::clone(&crl),
            ref_count: 1,
            pending_delete: false,
        });
        state.evict_idle(self.max_entries);
        debug!("Cached CRL from {}", crl.issuer_display());

        CrlLease { id, crl, currency }
    }

    /// Take the leased entry out of the cache and give up the reference.
    ///
    /// Freed now if nobody else holds it, otherwise by the last release.
    pub fn remove(&self, lease: CrlLease) {
        let mut state = self.lock();
        if let Some(pos) = state.entries.iter().position(|e| e.id == lease.id) {
            let mut entry = state.entries.remove(pos);
            entry.ref_count = entry.ref_count.saturating_sub(1);
            if entry.ref_count == 0 {
                state.free(entry);
            } else {
                entry.pending_delete = true;
                state.detached.push(entry);
            }
        } else {
            // already removed by another holder
            state.release_detached(lease.id);
        }
    }

    /// Give up a reference obtained from [`search`](Self::search) or
    /// [`add`](Self::add).
    pub fn release(&self, lease: CrlLease) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == lease.id) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        } else {
            state.release_detached(lease.id);
        }
        let max = self.max_entries;
        state.evict_idle(max);
    }

    /// Drop every entry. Entries still leased are freed by their last release.
    pub fn clear(&self) {
        let mut state = self.lock();
        let entries = std::mem::take(&mut state.entries);
        for mut entry in entries {
            if entry.ref_count == 0 {
                state.free(entry);
            } else {
                entry.pending_delete = true;
                state.detached.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            created: state.created,
            freed: state.freed,
            live: state.entries.len() + state.detached.len(),
            pending: state.detached.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertOrigin;
    use crate::library::{CertFields, CrlFields, PublicKeyInfo};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn crl(issuer: &[u8], next_update_days: i64) -> Crl {
        Crl::from_fields(
            Arc::from(issuer.to_vec()),
            CrlFields {
                issuer: issuer.to_vec(),
                issuer_display: String::from_utf8_lossy(issuer).into_owned(),
                this_update: now() - Duration::days(1),
                next_update: Some(now() + Duration::days(next_update_days)),
                revoked: Vec::new(),
            },
            CrlOrigin::Network,
        )
    }

    fn cert_issued_by(issuer: &[u8]) -> Certificate {
        Certificate::from_fields(
            Arc::from(vec![0u8]),
            CertFields {
                subject: b"leaf".to_vec(),
                issuer: issuer.to_vec(),
                subject_display: String::new(),
                issuer_display: String::new(),
                serial: vec![1],
                version: 3,
                not_before: now() - Duration::days(10),
                not_after: now() + Duration::days(10),
                public_key: PublicKeyInfo {
                    algorithm: String::new(),
                    spki_der: Vec::new(),
                    is_partial: false,
                },
                basic_constraints: None,
                key_usage: None,
                extended_key_usage: None,
                common_name: None,
                dns_names: Vec::new(),
                emails: Vec::new(),
                ip_addresses: Vec::new(),
                crl_distribution_points: Vec::new(),
                ocsp_urls: Vec::new(),
                ca_issuer_urls: Vec::new(),
                name_constraints: None,
                unknown_critical_extensions: Vec::new(),
            },
            CertOrigin::Input,
        )
    }

    #[test]
    fn test_search_matches_issuer() {
        let cache = RevocationCache::new(8);
        let lease = cache.add(crl(b"ca", 5), now());
        cache.release(lease);

        assert!(cache.search(&cert_issued_by(b"other"), now()).is_none());
        let hit = cache.search(&cert_issued_by(b"ca"), now()).unwrap();
        assert_eq!(hit.currency(), Currency::Current);
        assert_eq!(hit.crl().origin(), CrlOrigin::LocalCache);
        cache.release(hit);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_while_held_defers_free() {
        let cache = RevocationCache::new(8);
        let first = cache.add(crl(b"ca", 5), now());
        let second = cache.search(&cert_issued_by(b"ca"), now()).unwrap();

        cache.remove(second);
        let stats = cache.stats();
        assert_eq!(stats.freed, 0);
        assert_eq!(stats.pending, 1);
        assert!(cache.is_empty());

        cache.release(first);
        let stats = cache.stats();
        assert_eq!(stats.freed, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn test_release_does_not_free_cached_entry() {
        let cache = RevocationCache::new(8);
        let lease = cache.add(crl(b"ca", 5), now());
        cache.release(lease);
        assert_eq!(cache.stats().freed, 0);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert_eq!(cache.stats().freed, 1);
    }

    #[test]
    fn test_current_entry_preferred() {
        let cache = RevocationCache::new(8);
        cache.release(cache.add(crl(b"ca", -1), now()));
        cache.release(cache.add(crl(b"ca", 5), now()));
        let hit = cache.search(&cert_issued_by(b"ca"), now()).unwrap();
        assert_eq!(hit.currency(), Currency::Current);
        cache.release(hit);
    }

    #[test]
    fn test_idle_entries_evicted_over_capacity() {
        let cache = RevocationCache::new(2);
        for issuer in [b"a", b"b", b"c"] {
            let lease = cache.add(crl(issuer, 5), now());
            cache.release(lease);
        }
        assert_eq!(cache.len(), 2);
        let stats = cache.stats();
        assert_eq!(stats.created, 3);
        assert_eq!(stats.freed, 1);
    }
}
