//! Per-call certificate storage
//!
//! Every certificate taking part in one verification call lives in a
//! [`CertPool`]. Chains and groups refer to pool members by [`CertId`], so a
//! group can never outlive the pool that owns its certificates.

use super::Certificate;
use super::CachedItem;
use std::ops::{Index, IndexMut};

/// Stable index of a certificate inside its [`CertPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertId(usize);

impl CertId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Whether a group is responsible for its members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Members were created for this call and go away with it
    Owned,
    /// Members belong to the caller
    Borrowed,
}

/// Index-stable owner of every certificate in one verification call.
#[derive(Debug, Default)]
pub struct CertPool {
    certs: Vec<Certificate>,
}

impl CertPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cert: Certificate) -> CertId {
        self.certs.push(cert);
        CertId(self.certs.len() - 1)
    }

    pub fn get(&self, id: CertId) -> Option<&Certificate> {
        self.certs.get(id.0)
    }

    pub fn get_mut(&mut self, id: CertId) -> Option<&mut Certificate> {
        self.certs.get_mut(id.0)
    }

    /// Find a member with identical encoding
    pub fn find_by_raw(&self, raw: &[u8]) -> Option<CertId> {
        self.certs.iter().position(|c| c.raw() == raw).map(CertId)
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CertId, &Certificate)> {
        self.certs.iter().enumerate().map(|(i, c)| (CertId(i), c))
    }

    /// Clear the scratch `used` flag before a new chain-build pass.
    pub fn reset_pass(&mut self) {
        for cert in &mut self.certs {
            cert.reset_pass();
        }
    }
}

impl Index<CertId> for CertPool {
    type Output = Certificate;

    fn index(&self, id: CertId) -> &Certificate {
        &self.certs[id.0]
    }
}

impl IndexMut<CertId> for CertPool {
    fn index_mut(&mut self, id: CertId) -> &mut Certificate {
        &mut self.certs[id.0]
    }
}

/// An unordered group of pool members tagged with its ownership.
#[derive(Debug, Clone)]
pub struct CertGroup {
    ids: Vec<CertId>,
    ownership: Ownership,
}

impl CertGroup {
    pub fn new(ownership: Ownership) -> Self {
        Self {
            ids: Vec::new(),
            ownership,
        }
    }

    pub fn from_ids(ids: Vec<CertId>, ownership: Ownership) -> Self {
        Self { ids, ownership }
    }

    pub fn push(&mut self, id: CertId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn contains(&self, id: CertId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[CertId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }
}
