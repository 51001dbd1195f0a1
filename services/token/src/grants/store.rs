//! Generic expiring-grant engine shared by device codes, permission tickets
//! and nonces.

use crate::clock::{Clock, SystemClock};
use crate::grants::code::CodeGenerator;
use crate::grants::error::GrantError;
use crate::grants::repository::{
    Grant, GrantId, GrantKey, GrantRepository, GrantUpdate, RedeemOutcome,
};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts at finding an unused code before giving up.
pub const MAX_CODE_ATTEMPTS: u32 = 8;

/// Inputs for building a new grant record.
#[derive(Debug, Clone)]
pub struct NewGrant {
    /// Fresh opaque code
    pub code: String,
    /// Creation time
    pub issued_at: DateTime<Utc>,
    /// Creation time plus the store TTL
    pub expires_at: DateTime<Utc>,
}

/// Expiry-aware access to a [`GrantRepository`].
pub struct GrantStore<G, R> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    _grant: PhantomData<fn() -> G>,
}

impl<G, R> GrantStore<G, R>
where
    G: Grant,
    R: GrantRepository<G>,
{
    /// Store issuing grants that live for `ttl`.
    pub fn new(repository: Arc<R>, ttl: std::time::Duration) -> Result<Self, GrantError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| GrantError::invalid_state(format!("{} TTL out of range: {}", G::KIND, e)))?;
        if ttl <= chrono::Duration::zero() {
            return Err(GrantError::invalid_state(format!("{} TTL must be positive", G::KIND)));
        }
        Ok(Self {
            repository,
            clock: Arc::new(SystemClock),
            ttl,
            _grant: PhantomData,
        })
    }

    /// Use `clock` for expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Backing repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Current time on the store clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Lifetime of new grants.
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Create a grant with a fresh random code.
    ///
    /// `build` is called once per attempt; a code that collides with an
    /// unexpired record is discarded and a new one drawn.
    pub async fn create_with<F>(&self, mut build: F) -> Result<G, GrantError>
    where
        F: FnMut(NewGrant) -> Result<G, GrantError> + Send,
    {
        self.create_coded(CodeGenerator::grant_code, &mut build).await
    }

    /// Like [`GrantStore::create_with`] with caller-chosen codes.
    pub async fn create_coded<C, F>(&self, mut next_code: C, mut build: F) -> Result<G, GrantError>
    where
        C: FnMut() -> String + Send,
        F: FnMut(NewGrant) -> Result<G, GrantError> + Send,
    {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let now = self.clock.now();
            let grant = build(NewGrant {
                code: next_code(),
                issued_at: now,
                expires_at: now + self.ttl,
            })?;

            if let Some(stored) = self.repository.insert_if_absent(grant, now).await? {
                metrics::record_grant_created(G::KIND);
                debug!(kind = G::KIND, id = stored.id(), "Grant created");
                return Ok(stored);
            }
            warn!(kind = G::KIND, attempt, "Grant code collision, retrying");
        }
        Err(GrantError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Insert a fully built grant; `None` when its code is still held.
    pub async fn insert(&self, grant: G) -> Result<Option<G>, GrantError> {
        let stored = self
            .repository
            .insert_if_absent(grant, self.clock.now())
            .await?;
        if stored.is_some() {
            metrics::record_grant_created(G::KIND);
        }
        Ok(stored)
    }

    /// Live record by code. Redeemed records count as absent.
    pub async fn get_by_code(&self, code: &str) -> Result<G, GrantError> {
        self.get_live(GrantKey::Code(code)).await
    }

    /// Live record by alternate code.
    pub async fn get_by_alternate_code(&self, code: &str) -> Result<G, GrantError> {
        self.get_live(GrantKey::AlternateCode(code)).await
    }

    async fn get_live(&self, key: GrantKey<'_>) -> Result<G, GrantError> {
        let grant = self
            .repository
            .get_by_code(key)
            .await?
            .ok_or(GrantError::NotFound)?;
        if grant.is_redeemed() {
            return Err(GrantError::NotFound);
        }
        if grant.is_expired(self.clock.now()) {
            return Err(GrantError::Expired);
        }
        Ok(grant)
    }

    /// Record by id in any state.
    pub async fn get_by_id(&self, id: GrantId) -> Result<G, GrantError> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(GrantError::NotFound)
    }

    /// Every stored record, expired or redeemed ones included.
    pub async fn get_all(&self) -> Result<Vec<G>, GrantError> {
        self.repository.get_all().await
    }

    /// Single-use redemption.
    pub async fn redeem(&self, code: &str) -> Result<G, GrantError> {
        let outcome = self.mark(code).await;
        self.record_redemption(code, &outcome);
        outcome
    }

    /// Redemption guarded by two caller checks.
    ///
    /// `visible` runs on the stored record before anything else; a record it
    /// rejects is reported as [`GrantError::NotFound`] whatever its state, so
    /// a caller cannot learn that someone else's code exists. `check` then
    /// sees the live record and can refuse it (e.g. a pending device
    /// authorization). The final mark is still the repository's atomic
    /// check-and-set.
    pub async fn redeem_if<V, F>(&self, code: &str, visible: V, check: F) -> Result<G, GrantError>
    where
        V: FnOnce(&G) -> bool + Send,
        F: FnOnce(&G) -> Result<(), GrantError> + Send,
    {
        let outcome = match self.precheck(code, visible, check).await {
            Ok(()) => self.mark(code).await,
            Err(e) => Err(e),
        };
        self.record_redemption(code, &outcome);
        outcome
    }

    async fn precheck<V, F>(&self, code: &str, visible: V, check: F) -> Result<(), GrantError>
    where
        V: FnOnce(&G) -> bool + Send,
        F: FnOnce(&G) -> Result<(), GrantError> + Send,
    {
        let grant = self
            .repository
            .get_by_code(GrantKey::Code(code))
            .await?
            .ok_or(GrantError::NotFound)?;
        if !visible(&grant) {
            return Err(GrantError::NotFound);
        }
        if grant.is_redeemed() {
            return Err(GrantError::AlreadyRedeemed);
        }
        if grant.is_expired(self.clock.now()) {
            return Err(GrantError::Expired);
        }
        check(&grant)
    }

    async fn mark(&self, code: &str) -> Result<G, GrantError> {
        match self.repository.mark_redeemed(code, self.clock.now()).await? {
            RedeemOutcome::Redeemed(grant) => Ok(grant),
            RedeemOutcome::AlreadyRedeemed => Err(GrantError::AlreadyRedeemed),
            RedeemOutcome::Expired => Err(GrantError::Expired),
            RedeemOutcome::NotFound => Err(GrantError::NotFound),
        }
    }

    fn record_redemption(&self, code: &str, outcome: &Result<G, GrantError>) {
        match outcome {
            Ok(grant) => {
                metrics::record_grant_redeemed(G::KIND, "redeemed");
                debug!(kind = G::KIND, id = grant.id(), "Grant redeemed");
            }
            Err(GrantError::AlreadyRedeemed) => {
                metrics::record_grant_redeemed(G::KIND, "already_redeemed");
                warn!(
                    kind = G::KIND,
                    code_prefix = %code.chars().take(6).collect::<String>(),
                    "Replayed grant redemption"
                );
            }
            Err(e) => metrics::record_grant_redeemed(G::KIND, e.outcome()),
        }
    }

    /// Atomically update the live record under `key`.
    pub async fn modify(&self, key: GrantKey<'_>, update: GrantUpdate<'_, G>) -> Result<G, GrantError> {
        self.repository.modify(key, self.clock.now(), update).await
    }

    /// Delete `grant`; `false` if it was already gone.
    pub async fn remove(&self, grant: &G) -> Result<bool, GrantError> {
        self.repository.remove(grant.id()).await
    }

    /// Delete every record with `expires_at <= now`; returns how many were
    /// removed. Safe to repeat and to run alongside other calls.
    pub async fn sweep_expired(&self) -> Result<usize, GrantError> {
        let now = self.clock.now();
        let expired = self.repository.get_all_expired(now).await?;

        let mut removed = 0;
        for grant in &expired {
            if self.repository.remove(grant.id()).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            metrics::record_grants_swept(G::KIND, removed);
            info!(kind = G::KIND, count = removed, "Swept expired grants");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::grants::memory::InMemoryGrantRepository;
    use chrono::Duration;

    #[derive(Debug, Clone)]
    struct Ticket {
        id: GrantId,
        code: String,
        expires_at: DateTime<Utc>,
        redeemed_at: Option<DateTime<Utc>>,
    }

    impl Grant for Ticket {
        const KIND: &'static str = "test_ticket";

        fn id(&self) -> GrantId {
            self.id
        }
        fn set_id(&mut self, id: GrantId) {
            self.id = id;
        }
        fn code(&self) -> &str {
            &self.code
        }
        fn expires_at(&self) -> DateTime<Utc> {
            self.expires_at
        }
        fn redeemed_at(&self) -> Option<DateTime<Utc>> {
            self.redeemed_at
        }
        fn set_redeemed_at(&mut self, at: DateTime<Utc>) {
            self.redeemed_at = Some(at);
        }
    }

    fn build(new: NewGrant) -> Result<Ticket, GrantError> {
        Ok(Ticket {
            id: 0,
            code: new.code,
            expires_at: new.expires_at,
            redeemed_at: None,
        })
    }

    fn store(clock: Arc<ManualClock>) -> GrantStore<Ticket, InMemoryGrantRepository<Ticket>> {
        GrantStore::new(
            Arc::new(InMemoryGrantRepository::new()),
            std::time::Duration::from_secs(60),
        )
        .unwrap()
        .with_clock(clock)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock.clone());

        let ticket = store.create_with(build).await.unwrap();
        assert_eq!(ticket.code.len(), 43);
        assert_eq!(ticket.expires_at.timestamp(), 1_060);

        let found = store.get_by_code(&ticket.code).await.unwrap();
        assert_eq!(found.id, ticket.id);
        assert_eq!(store.get_by_id(ticket.id).await.unwrap().code, ticket.code);
    }

    #[tokio::test]
    async fn test_expired_is_absent() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock.clone());
        let ticket = store.create_with(build).await.unwrap();

        clock.advance(Duration::seconds(60));
        assert_eq!(
            store.get_by_code(&ticket.code).await.unwrap_err(),
            GrantError::Expired
        );
        assert_eq!(store.redeem(&ticket.code).await.unwrap_err(), GrantError::Expired);
    }

    #[tokio::test]
    async fn test_redeem_is_single_use() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock);
        let ticket = store.create_with(build).await.unwrap();

        let redeemed = store.redeem(&ticket.code).await.unwrap();
        assert!(redeemed.redeemed_at.is_some());
        assert_eq!(
            store.redeem(&ticket.code).await.unwrap_err(),
            GrantError::AlreadyRedeemed
        );
        assert_eq!(
            store.get_by_code(&ticket.code).await.unwrap_err(),
            GrantError::NotFound
        );
        assert_eq!(store.redeem("unknown").await.unwrap_err(), GrantError::NotFound);
    }

    #[tokio::test]
    async fn test_redeem_if_refusal_leaves_grant_live() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock);
        let ticket = store.create_with(build).await.unwrap();

        let refused = store
            .redeem_if(&ticket.code, |_| true, |_| Err(GrantError::AuthorizationPending))
            .await;
        assert_eq!(refused.unwrap_err(), GrantError::AuthorizationPending);
        assert!(store.get_by_code(&ticket.code).await.is_ok());

        assert!(store.redeem_if(&ticket.code, |_| true, |_| Ok(())).await.is_ok());
        assert_eq!(
            store
                .redeem_if(&ticket.code, |_| true, |_| Ok(()))
                .await
                .unwrap_err(),
            GrantError::AlreadyRedeemed
        );
    }

    #[tokio::test]
    async fn test_hidden_grant_is_not_found_in_any_state() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock.clone());
        let redeemed = store.create_with(build).await.unwrap();
        let expired = store.create_with(build).await.unwrap();

        store.redeem(&redeemed.code).await.unwrap();
        assert_eq!(
            store
                .redeem_if(&redeemed.code, |_| false, |_| Ok(()))
                .await
                .unwrap_err(),
            GrantError::NotFound
        );

        clock.advance(Duration::seconds(60));
        assert_eq!(
            store
                .redeem_if(&expired.code, |_| false, |_| Ok(()))
                .await
                .unwrap_err(),
            GrantError::NotFound
        );
        assert_eq!(
            store
                .redeem_if(&expired.code, |_| true, |_| Ok(()))
                .await
                .unwrap_err(),
            GrantError::Expired
        );
    }

    #[tokio::test]
    async fn test_code_space_exhausted() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock);

        store
            .create_coded(|| "fixed".to_string(), build)
            .await
            .unwrap();
        assert_eq!(
            store
                .create_coded(|| "fixed".to_string(), build)
                .await
                .unwrap_err(),
            GrantError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS)
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result: Result<GrantStore<Ticket, InMemoryGrantRepository<Ticket>>, _> = GrantStore::new(
            Arc::new(InMemoryGrantRepository::new()),
            std::time::Duration::ZERO,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let clock = Arc::new(ManualClock::at_timestamp(1_000));
        let store = store(clock.clone());
        store.create_with(build).await.unwrap();
        store.create_with(build).await.unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 0);
        clock.advance(Duration::seconds(61));
        assert_eq!(store.sweep_expired().await.unwrap(), 2);
        assert_eq!(store.sweep_expired().await.unwrap(), 0);
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
