//! UMA permission tickets.

use crate::clock::Clock;
use crate::config::Config;
use crate::grants::error::GrantError;
use crate::grants::repository::{Grant, GrantId, GrantKey, GrantRepository};
use crate::grants::store::{GrantStore, NewGrant};
use crate::grants::sweeper::Sweepable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Resource set registered by a resource server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Resource set id
    pub id: String,
    /// Display name
    pub name: String,
    /// Scopes the resource set supports
    pub scopes: BTreeSet<String>,
}

/// Requested access: a resource set and a subset of its scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Resource set the access is requested on
    pub resource_set_id: String,
    /// Requested scopes
    pub scopes: BTreeSet<String>,
}

/// Claims pushed by the requesting party during claims gathering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsGathering {
    /// Gathered claims, merged across pushes
    pub claims: Map<String, Value>,
    /// Time of the last push
    pub updated_at: DateTime<Utc>,
}

/// A UMA permission ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionTicket {
    /// Repository id
    pub id: GrantId,
    /// Opaque ticket value
    pub ticket: String,
    /// Requested access
    pub permission: Permission,
    /// Claims gathered so far, if any
    pub claims_gathering: Option<ClaimsGathering>,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// End of validity, inclusive
    pub expires_at: DateTime<Utc>,
    /// Set once the ticket was exchanged
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Grant for PermissionTicket {
    const KIND: &'static str = "permission_ticket";

    fn id(&self) -> GrantId {
        self.id
    }

    fn set_id(&mut self, id: GrantId) {
        self.id = id;
    }

    fn code(&self) -> &str {
        &self.ticket
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

/// Issues permission tickets, gathers claims on them and redeems them once.
pub struct PermissionTicketService<R> {
    store: GrantStore<PermissionTicket, R>,
}

impl<R: GrantRepository<PermissionTicket>> PermissionTicketService<R> {
    /// Service issuing tickets valid for `ttl`.
    pub fn new(repository: Arc<R>, ttl: Duration) -> Result<Self, GrantError> {
        Ok(Self {
            store: GrantStore::new(repository, ttl)?,
        })
    }

    /// Service using `config.permission_ticket_ttl`.
    pub fn from_config(repository: Arc<R>, config: &Config) -> Result<Self, GrantError> {
        Self::new(repository, config.permission_ticket_ttl)
    }

    /// Use `clock` for expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.store = self.store.with_clock(clock);
        self
    }

    /// Underlying grant store.
    #[must_use]
    pub fn store(&self) -> &GrantStore<PermissionTicket, R> {
        &self.store
    }

    /// Register a permission request for `resource_set`.
    ///
    /// `scopes` must be non-empty and contained in the resource set's scopes.
    pub async fn create_ticket(
        &self,
        resource_set: &ResourceSet,
        scopes: BTreeSet<String>,
    ) -> Result<PermissionTicket, GrantError> {
        if scopes.is_empty() {
            return Err(GrantError::invalid_scope("no scopes requested"));
        }
        if let Some(unknown) = scopes.difference(&resource_set.scopes).next() {
            return Err(GrantError::invalid_scope(format!(
                "{} is not a scope of resource set {}",
                unknown, resource_set.id
            )));
        }

        let permission = Permission {
            resource_set_id: resource_set.id.clone(),
            scopes,
        };
        let ticket = self
            .store
            .create_with(|new: NewGrant| {
                Ok(PermissionTicket {
                    id: 0,
                    ticket: new.code,
                    permission: permission.clone(),
                    claims_gathering: None,
                    created_at: new.issued_at,
                    expires_at: new.expires_at,
                    redeemed_at: None,
                })
            })
            .await?;

        info!(
            resource_set_id = %resource_set.id,
            id = ticket.id,
            "Permission ticket created"
        );
        Ok(ticket)
    }

    /// Live ticket by value.
    pub async fn get_by_ticket(&self, ticket: &str) -> Result<PermissionTicket, GrantError> {
        self.store.get_by_code(ticket).await
    }

    /// Every stored ticket, for administrative export.
    pub async fn get_all(&self) -> Result<Vec<PermissionTicket>, GrantError> {
        self.store.get_all().await
    }

    /// Merge claims pushed during claims gathering; later values win.
    pub async fn supply_claims(
        &self,
        ticket: &str,
        claims: Map<String, Value>,
    ) -> Result<PermissionTicket, GrantError> {
        let now = self.store.now();
        let updated = self
            .store
            .modify(GrantKey::Code(ticket), &|t: &mut PermissionTicket| {
                let gathering = t.claims_gathering.get_or_insert_with(|| ClaimsGathering {
                    claims: Map::new(),
                    updated_at: now,
                });
                for (name, value) in &claims {
                    gathering.claims.insert(name.clone(), value.clone());
                }
                gathering.updated_at = now;
                Ok(())
            })
            .await?;

        debug!(id = updated.id, claims = claims.len(), "Claims supplied to ticket");
        Ok(updated)
    }

    /// Exchange the ticket, once.
    pub async fn redeem(&self, ticket: &str) -> Result<PermissionTicket, GrantError> {
        self.store.redeem(ticket).await
    }

    /// Delete the record; `false` if it was already gone.
    pub async fn remove(&self, ticket: &PermissionTicket) -> Result<bool, GrantError> {
        self.store.remove(ticket).await
    }

    /// Delete expired records; returns how many were removed.
    pub async fn clear_expired(&self) -> Result<usize, GrantError> {
        self.store.sweep_expired().await
    }
}

#[async_trait]
impl<R: GrantRepository<PermissionTicket>> Sweepable for PermissionTicketService<R> {
    fn kind(&self) -> &'static str {
        PermissionTicket::KIND
    }

    async fn sweep_expired(&self) -> Result<usize, GrantError> {
        self.clear_expired().await
    }
}
