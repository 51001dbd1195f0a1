//! Nonces: server-issued single-use values and replay protection for
//! client-supplied ones.

use crate::clock::Clock;
use crate::config::Config;
use crate::grants::error::GrantError;
use crate::grants::repository::{Grant, GrantId, GrantRepository};
use crate::grants::store::{GrantStore, NewGrant};
use crate::grants::sweeper::Sweepable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A nonce bound to one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    /// Repository id
    pub id: GrantId,
    /// Owning client
    pub client_id: String,
    /// Nonce as the client sees it
    pub value: String,
    /// Issue or first-seen time
    pub issued_at: DateTime<Utc>,
    /// End of the replay window, inclusive
    pub expires_at: DateTime<Utc>,
    /// When the nonce was consumed
    pub used_at: Option<DateTime<Utc>>,
    key: String,
}

impl Nonce {
    fn new(client_id: &str, value: String, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            key: nonce_key(client_id, &value),
            client_id: client_id.to_string(),
            value,
            issued_at,
            expires_at,
            used_at: None,
        }
    }
}

/// Nonce values are only unique per client.
fn nonce_key(client_id: &str, value: &str) -> String {
    format!("{}:{}:{}", client_id.len(), client_id, value)
}

impl Grant for Nonce {
    const KIND: &'static str = "nonce";

    fn id(&self) -> GrantId {
        self.id
    }

    fn set_id(&mut self, id: GrantId) {
        self.id = id;
    }

    fn code(&self) -> &str {
        &self.key
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    fn set_redeemed_at(&mut self, at: DateTime<Utc>) {
        self.used_at = Some(at);
    }
}

/// Issues nonces and rejects replays within the nonce lifetime.
pub struct NonceService<R> {
    store: GrantStore<Nonce, R>,
}

impl<R: GrantRepository<Nonce>> NonceService<R> {
    /// Service remembering nonces for `ttl`.
    pub fn new(repository: Arc<R>, ttl: Duration) -> Result<Self, GrantError> {
        Ok(Self {
            store: GrantStore::new(repository, ttl)?,
        })
    }

    /// Service using `config.nonce_ttl`.
    pub fn from_config(repository: Arc<R>, config: &Config) -> Result<Self, GrantError> {
        Self::new(repository, config.nonce_ttl)
    }

    /// Use `clock` for expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.store = self.store.with_clock(clock);
        self
    }

    /// Issue a fresh random nonce for `client_id`.
    pub async fn issue(&self, client_id: &str) -> Result<Nonce, GrantError> {
        self.store
            .create_with(|new: NewGrant| {
                Ok(Nonce::new(client_id, new.code, new.issued_at, new.expires_at))
            })
            .await
    }

    /// Unused, unexpired nonce.
    pub async fn get(&self, client_id: &str, value: &str) -> Result<Nonce, GrantError> {
        self.store.get_by_code(&nonce_key(client_id, value)).await
    }

    /// Consume an issued nonce, once.
    pub async fn redeem(&self, client_id: &str, value: &str) -> Result<Nonce, GrantError> {
        self.store.redeem(&nonce_key(client_id, value)).await
    }

    /// Record a client-supplied nonce as used.
    ///
    /// The first presentation within the nonce lifetime succeeds; any later
    /// one is `AlreadyRedeemed`. A value previously handed out by
    /// [`NonceService::issue`] is consumed.
    pub async fn check_and_record(&self, client_id: &str, value: &str) -> Result<Nonce, GrantError> {
        let now = self.store.now();
        let mut nonce = Nonce::new(client_id, value.to_string(), now, now + self.store.ttl());
        nonce.used_at = Some(now);

        if let Some(recorded) = self.store.insert(nonce).await? {
            return Ok(recorded);
        }

        self.store
            .redeem(&nonce_key(client_id, value))
            .await
            .map_err(|e| {
                if e == GrantError::AlreadyRedeemed {
                    warn!(client_id = %client_id, "Nonce replay detected");
                }
                e
            })
    }

    /// Delete the record; `false` if it was already gone.
    pub async fn remove(&self, nonce: &Nonce) -> Result<bool, GrantError> {
        self.store.remove(nonce).await
    }

    /// Delete expired records; returns how many were removed.
    pub async fn clear_expired(&self) -> Result<usize, GrantError> {
        self.store.sweep_expired().await
    }
}

#[async_trait]
impl<R: GrantRepository<Nonce>> Sweepable for NonceService<R> {
    fn kind(&self) -> &'static str {
        Nonce::KIND
    }

    async fn sweep_expired(&self) -> Result<usize, GrantError> {
        self.clear_expired().await
    }
}
