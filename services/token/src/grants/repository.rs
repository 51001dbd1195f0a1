//! Grant records and the repository collaborator they are persisted through.

use crate::grants::error::GrantError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository-assigned numeric id. `0` means "not yet saved".
pub type GrantId = u64;

/// A short-lived, single-use artifact with an absolute expiry.
pub trait Grant: Clone + Send + Sync + 'static {
    /// Metric and log label, e.g. `device_code`.
    const KIND: &'static str;

    /// Repository id; `0` until first saved.
    fn id(&self) -> GrantId;

    /// Called by the repository when it assigns an id.
    fn set_id(&mut self, id: GrantId);

    /// Primary natural key (device code, ticket, nonce key).
    fn code(&self) -> &str;

    /// Secondary natural key, such as a device flow user code.
    fn alternate_code(&self) -> Option<&str> {
        None
    }

    /// End of validity, inclusive.
    fn expires_at(&self) -> DateTime<Utc>;

    /// When the grant was consumed.
    fn redeemed_at(&self) -> Option<DateTime<Utc>>;

    /// Set the single-use mark.
    fn set_redeemed_at(&mut self, at: DateTime<Utc>);

    /// At or past its expiry. Swept records are exactly the expired ones.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    /// Already consumed.
    fn is_redeemed(&self) -> bool {
        self.redeemed_at().is_some()
    }

    /// Neither expired nor redeemed.
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_redeemed() && !self.is_expired(now)
    }
}

/// Natural key used to address a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKey<'a> {
    /// Primary code
    Code(&'a str),
    /// Secondary code, e.g. a device flow user code
    AlternateCode(&'a str),
}

/// Result of an atomic redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome<G> {
    /// This call redeemed the grant; carries the updated record.
    Redeemed(G),
    /// Redeemed by an earlier call.
    AlreadyRedeemed,
    /// Past `expires_at`; left untouched.
    Expired,
    /// No record under the code.
    NotFound,
}

/// Change applied by [`GrantRepository::modify`] inside its critical section.
pub type GrantUpdate<'a, G> = &'a (dyn Fn(&mut G) -> Result<(), GrantError> + Send + Sync);

/// Persistence collaborator for one grant kind.
///
/// `insert_if_absent`, `mark_redeemed` and `modify` must each be atomic with
/// respect to every other call on the same repository.
#[async_trait]
pub trait GrantRepository<G: Grant>: Send + Sync {
    /// Upsert by id, assigning one when the id is `0`.
    async fn save(&self, grant: G) -> Result<G, GrantError>;

    /// Insert unless an unexpired record already holds the grant's code or
    /// alternate code. Returns `None` on such a collision. Expired holders
    /// are replaced.
    async fn insert_if_absent(&self, grant: G, now: DateTime<Utc>) -> Result<Option<G>, GrantError>;

    /// Lookup by repository id.
    async fn get_by_id(&self, id: GrantId) -> Result<Option<G>, GrantError>;

    /// Lookup by natural key, whatever the record's state.
    async fn get_by_code(&self, key: GrantKey<'_>) -> Result<Option<G>, GrantError>;

    /// Returns whether a record was removed.
    async fn remove(&self, id: GrantId) -> Result<bool, GrantError>;

    /// Every record, whatever its state.
    async fn get_all(&self) -> Result<Vec<G>, GrantError>;

    /// Records with `expires_at <= now`.
    async fn get_all_expired(&self, now: DateTime<Utc>) -> Result<Vec<G>, GrantError>;

    /// Check-and-set of the single-use mark.
    async fn mark_redeemed(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome<G>, GrantError>;

    /// Apply `update` to the live record under `key` and persist the result.
    /// Errors from `update` leave the record untouched.
    async fn modify(
        &self,
        key: GrantKey<'_>,
        now: DateTime<Utc>,
        update: GrantUpdate<'_, G>,
    ) -> Result<G, GrantError>;
}
