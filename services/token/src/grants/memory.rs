//! In-memory [`GrantRepository`] for tests and single-node deployments.

use crate::grants::error::GrantError;
use crate::grants::repository::{
    Grant, GrantId, GrantKey, GrantRepository, GrantUpdate, RedeemOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

struct Inner<G> {
    records: BTreeMap<GrantId, G>,
    by_code: HashMap<String, GrantId>,
    by_alternate: HashMap<String, GrantId>,
    next_id: GrantId,
}

impl<G: Grant> Inner<G> {
    fn id_for(&self, key: GrantKey<'_>) -> Option<GrantId> {
        match key {
            GrantKey::Code(code) => self.by_code.get(code).copied(),
            GrantKey::AlternateCode(code) => self.by_alternate.get(code).copied(),
        }
    }

    fn unindex(&mut self, grant: &G) {
        let id = grant.id();
        if self.by_code.get(grant.code()) == Some(&id) {
            self.by_code.remove(grant.code());
        }
        if let Some(alt) = grant.alternate_code() {
            if self.by_alternate.get(alt) == Some(&id) {
                self.by_alternate.remove(alt);
            }
        }
    }

    fn remove(&mut self, id: GrantId) -> Option<G> {
        let grant = self.records.remove(&id)?;
        self.unindex(&grant);
        Some(grant)
    }

    /// Store `grant`, assigning an id if needed and replacing whatever held
    /// its keys before.
    fn put(&mut self, mut grant: G) -> G {
        if grant.id() == 0 {
            self.next_id += 1;
            grant.set_id(self.next_id);
        } else if let Some(previous) = self.records.get(&grant.id()).cloned() {
            self.unindex(&previous);
        }

        for holder in self.holders(&grant) {
            if holder != grant.id() {
                self.remove(holder);
            }
        }

        let id = grant.id();
        self.by_code.insert(grant.code().to_string(), id);
        if let Some(alt) = grant.alternate_code() {
            self.by_alternate.insert(alt.to_string(), id);
        }
        self.records.insert(id, grant.clone());
        grant
    }

    /// Ids of records holding the code or alternate code of `grant`.
    fn holders(&self, grant: &G) -> Vec<GrantId> {
        let mut ids: Vec<GrantId> = self.by_code.get(grant.code()).copied().into_iter().collect();
        if let Some(alt) = grant.alternate_code() {
            if let Some(id) = self.by_alternate.get(alt) {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        ids
    }
}

/// `parking_lot::RwLock`-guarded maps indexed by id, code and alternate code.
pub struct InMemoryGrantRepository<G> {
    inner: RwLock<Inner<G>>,
}

impl<G: Grant> InMemoryGrantRepository<G> {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: BTreeMap::new(),
                by_code: HashMap::new(),
                by_alternate: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Stored records, expired and redeemed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

impl<G: Grant> Default for InMemoryGrantRepository<G> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<G: Grant> GrantRepository<G> for InMemoryGrantRepository<G> {
    async fn save(&self, grant: G) -> Result<G, GrantError> {
        Ok(self.inner.write().put(grant))
    }

    async fn insert_if_absent(&self, grant: G, now: DateTime<Utc>) -> Result<Option<G>, GrantError> {
        let mut inner = self.inner.write();

        let blocked = inner.holders(&grant).into_iter().any(|id| {
            inner
                .records
                .get(&id)
                .is_some_and(|existing| !existing.is_expired(now))
        });
        if blocked {
            return Ok(None);
        }

        let mut grant = grant;
        grant.set_id(0);
        Ok(Some(inner.put(grant)))
    }

    async fn get_by_id(&self, id: GrantId) -> Result<Option<G>, GrantError> {
        Ok(self.inner.read().records.get(&id).cloned())
    }

    async fn get_by_code(&self, key: GrantKey<'_>) -> Result<Option<G>, GrantError> {
        let inner = self.inner.read();
        Ok(inner
            .id_for(key)
            .and_then(|id| inner.records.get(&id))
            .cloned())
    }

    async fn remove(&self, id: GrantId) -> Result<bool, GrantError> {
        Ok(self.inner.write().remove(id).is_some())
    }

    async fn get_all(&self) -> Result<Vec<G>, GrantError> {
        Ok(self.inner.read().records.values().cloned().collect())
    }

    async fn get_all_expired(&self, now: DateTime<Utc>) -> Result<Vec<G>, GrantError> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .filter(|g| g.is_expired(now))
            .cloned()
            .collect())
    }

    async fn mark_redeemed(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome<G>, GrantError> {
        let mut inner = self.inner.write();
        let Some(id) = inner.by_code.get(code).copied() else {
            return Ok(RedeemOutcome::NotFound);
        };
        let Some(grant) = inner.records.get_mut(&id) else {
            return Ok(RedeemOutcome::NotFound);
        };

        if grant.is_redeemed() {
            return Ok(RedeemOutcome::AlreadyRedeemed);
        }
        if grant.is_expired(now) {
            return Ok(RedeemOutcome::Expired);
        }

        grant.set_redeemed_at(now);
        Ok(RedeemOutcome::Redeemed(grant.clone()))
    }

    async fn modify(
        &self,
        key: GrantKey<'_>,
        now: DateTime<Utc>,
        update: GrantUpdate<'_, G>,
    ) -> Result<G, GrantError> {
        let mut inner = self.inner.write();
        let id = inner.id_for(key).ok_or(GrantError::NotFound)?;
        let grant = inner.records.get_mut(&id).ok_or(GrantError::NotFound)?;

        if grant.is_redeemed() {
            return Err(GrantError::AlreadyRedeemed);
        }
        if grant.is_expired(now) {
            return Err(GrantError::Expired);
        }

        let mut updated = grant.clone();
        update(&mut updated)?;
        updated.set_id(id);
        *grant = updated.clone();
        Ok(updated)
    }
}
