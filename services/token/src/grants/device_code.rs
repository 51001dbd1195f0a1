//! Device authorization grant records (RFC 8628).

use crate::clock::Clock;
use crate::config::{Config, USER_CODE_LENGTH_RANGE};
use crate::grants::code::CodeGenerator;
use crate::grants::error::GrantError;
use crate::grants::repository::{Grant, GrantId, GrantKey, GrantRepository};
use crate::grants::store::{GrantStore, NewGrant};
use crate::grants::sweeper::Sweepable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Approval state of a device code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalState {
    /// Waiting for the user.
    Pending,
    /// The user approved the request.
    Approved {
        /// Authenticated user
        subject: String,
        /// Decision time
        approved_at: DateTime<Utc>,
    },
    /// The user denied the request.
    Denied {
        /// Decision time
        denied_at: DateTime<Utc>,
    },
}

/// An RFC 8628 device authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    /// Repository id
    pub id: GrantId,
    /// Opaque code held by the device
    pub device_code: String,
    /// Normalized user code, without separators
    pub user_code: String,
    /// Client that started the flow
    pub client_id: String,
    /// Requested scopes
    pub scopes: BTreeSet<String>,
    /// Extra authorization request parameters
    pub params: HashMap<String, String>,
    /// User decision
    pub state: ApprovalState,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// End of validity, inclusive
    pub expires_at: DateTime<Utc>,
    /// Set once the device exchanged the code
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl DeviceCode {
    /// User code as shown to the user, e.g. `WDJB-MJHT`.
    #[must_use]
    pub fn display_user_code(&self) -> String {
        CodeGenerator::format_user_code(&self.user_code)
    }

    /// True once the user approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self.state, ApprovalState::Approved { .. })
    }

    /// Subject that approved the request.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match &self.state {
            ApprovalState::Approved { subject, .. } => Some(subject),
            _ => None,
        }
    }
}

impl Grant for DeviceCode {
    const KIND: &'static str = "device_code";

    fn id(&self) -> GrantId {
        self.id
    }

    fn set_id(&mut self, id: GrantId) {
        self.id = id;
    }

    fn code(&self) -> &str {
        &self.device_code
    }

    fn alternate_code(&self) -> Option<&str> {
        Some(&self.user_code)
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

/// Device flow: issue codes, record the user's decision, redeem once.
pub struct DeviceCodeService<R> {
    store: GrantStore<DeviceCode, R>,
    user_code_length: usize,
}

impl<R: GrantRepository<DeviceCode>> DeviceCodeService<R> {
    /// Service issuing codes valid for `ttl` with user codes of `user_code_length` characters.
    pub fn new(repository: Arc<R>, ttl: Duration, user_code_length: usize) -> Result<Self, GrantError> {
        if !USER_CODE_LENGTH_RANGE.contains(&user_code_length) {
            return Err(GrantError::invalid_state(format!(
                "user code length {} outside {:?}",
                user_code_length, USER_CODE_LENGTH_RANGE
            )));
        }
        Ok(Self {
            store: GrantStore::new(repository, ttl)?,
            user_code_length,
        })
    }

    /// Service using the device flow settings of `config`.
    pub fn from_config(repository: Arc<R>, config: &Config) -> Result<Self, GrantError> {
        Self::new(repository, config.device_code_ttl, config.user_code_length)
    }

    /// Use `clock` for expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.store = self.store.with_clock(clock);
        self
    }

    /// Underlying grant store.
    #[must_use]
    pub fn store(&self) -> &GrantStore<DeviceCode, R> {
        &self.store
    }

    /// Start a device authorization. Device and user codes are both unique
    /// among unexpired records.
    pub async fn create(
        &self,
        client_id: &str,
        scopes: BTreeSet<String>,
        params: HashMap<String, String>,
    ) -> Result<DeviceCode, GrantError> {
        let length = self.user_code_length;
        let device_code = self
            .store
            .create_with(|new: NewGrant| {
                Ok(DeviceCode {
                    id: 0,
                    device_code: new.code,
                    user_code: CodeGenerator::user_code(length),
                    client_id: client_id.to_string(),
                    scopes: scopes.clone(),
                    params: params.clone(),
                    state: ApprovalState::Pending,
                    created_at: new.issued_at,
                    expires_at: new.expires_at,
                    redeemed_at: None,
                })
            })
            .await?;

        info!(
            client_id = %client_id,
            id = device_code.id,
            "Device authorization started"
        );
        Ok(device_code)
    }

    /// Find the pending request behind a typed user code.
    pub async fn lookup_by_user_code(&self, user_code: &str) -> Result<DeviceCode, GrantError> {
        self.store
            .get_by_alternate_code(&CodeGenerator::normalize_user_code(user_code))
            .await
    }

    /// Live record for the device code.
    pub async fn get_by_device_code(&self, device_code: &str) -> Result<DeviceCode, GrantError> {
        self.store.get_by_code(device_code).await
    }

    /// Record the user's approval. Only pending requests can be approved.
    pub async fn approve(&self, user_code: &str, subject: &str) -> Result<DeviceCode, GrantError> {
        let now = self.store.now();
        let normalized = CodeGenerator::normalize_user_code(user_code);
        let approved = self
            .store
            .modify(GrantKey::AlternateCode(&normalized), &|code: &mut DeviceCode| {
                ensure_pending(code)?;
                code.state = ApprovalState::Approved {
                    subject: subject.to_string(),
                    approved_at: now,
                };
                Ok(())
            })
            .await?;

        info!(client_id = %approved.client_id, id = approved.id, "Device authorization approved");
        Ok(approved)
    }

    /// Record the user's refusal. Only pending requests can be denied.
    pub async fn deny(&self, user_code: &str) -> Result<DeviceCode, GrantError> {
        let now = self.store.now();
        let normalized = CodeGenerator::normalize_user_code(user_code);
        let denied = self
            .store
            .modify(GrantKey::AlternateCode(&normalized), &|code: &mut DeviceCode| {
                ensure_pending(code)?;
                code.state = ApprovalState::Denied { denied_at: now };
                Ok(())
            })
            .await?;

        info!(client_id = %denied.client_id, id = denied.id, "Device authorization denied");
        Ok(denied)
    }

    /// Exchange a device code for its approval, once.
    ///
    /// A code presented by another client is reported as not found.
    pub async fn redeem(&self, device_code: &str, client_id: &str) -> Result<DeviceCode, GrantError> {
        self.store
            .redeem_if(
                device_code,
                |code| code.client_id == client_id,
                |code| match code.state {
                    ApprovalState::Pending => Err(GrantError::AuthorizationPending),
                    ApprovalState::Denied { .. } => Err(GrantError::AccessDenied),
                    ApprovalState::Approved { .. } => Ok(()),
                },
            )
            .await
    }

    /// Delete the record; `false` if it was already gone.
    pub async fn remove(&self, code: &DeviceCode) -> Result<bool, GrantError> {
        self.store.remove(code).await
    }

    /// Delete expired records; returns how many were removed.
    pub async fn clear_expired(&self) -> Result<usize, GrantError> {
        self.store.sweep_expired().await
    }
}

fn ensure_pending(code: &DeviceCode) -> Result<(), GrantError> {
    match code.state {
        ApprovalState::Pending => Ok(()),
        ApprovalState::Approved { .. } => Err(GrantError::invalid_state("already approved")),
        ApprovalState::Denied { .. } => Err(GrantError::invalid_state("already denied")),
    }
}

#[async_trait]
impl<R: GrantRepository<DeviceCode>> Sweepable for DeviceCodeService<R> {
    fn kind(&self) -> &'static str {
        DeviceCode::KIND
    }

    async fn sweep_expired(&self) -> Result<usize, GrantError> {
        self.clear_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::grants::memory::InMemoryGrantRepository;

    fn service(
        clock: Arc<ManualClock>,
    ) -> DeviceCodeService<InMemoryGrantRepository<DeviceCode>> {
        DeviceCodeService::new(
            Arc::new(InMemoryGrantRepository::new()),
            Duration::from_secs(600),
            8,
        )
        .unwrap()
        .with_clock(clock)
    }

    fn scopes() -> BTreeSet<String> {
        ["openid".to_string(), "profile".to_string()].into_iter().collect()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let service = service(Arc::new(ManualClock::at_timestamp(10_000)));
        let code = service
            .create("tv-app", scopes(), HashMap::new())
            .await
            .unwrap();

        assert_eq!(code.user_code.len(), 8);
        assert_eq!(code.state, ApprovalState::Pending);
        assert_eq!(code.expires_at.timestamp(), 10_600);

        let typed = code.display_user_code().to_lowercase();
        let found = service.lookup_by_user_code(&typed).await.unwrap();
        assert_eq!(found.device_code, code.device_code);
    }

    #[test]
    fn test_user_code_length_bounds() {
        let repo = Arc::new(InMemoryGrantRepository::<DeviceCode>::new());
        assert!(DeviceCodeService::new(repo.clone(), Duration::from_secs(60), 5).is_err());
        assert!(DeviceCodeService::new(repo, Duration::from_secs(60), 6).is_ok());
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let service = service(Arc::new(ManualClock::at_timestamp(10_000)));
        let code = service.create("tv-app", scopes(), HashMap::new()).await.unwrap();

        assert_eq!(
            service.redeem(&code.device_code, "tv-app").await.unwrap_err(),
            GrantError::AuthorizationPending
        );

        let approved = service.approve(&code.user_code, "alice").await.unwrap();
        assert_eq!(approved.subject(), Some("alice"));
        assert!(matches!(
            service.deny(&code.user_code).await,
            Err(GrantError::InvalidState(_))
        ));

        assert_eq!(
            service.redeem(&code.device_code, "other-app").await.unwrap_err(),
            GrantError::NotFound
        );

        let redeemed = service.redeem(&code.device_code, "tv-app").await.unwrap();
        assert!(redeemed.redeemed_at.is_some());
        assert_eq!(
            service.redeem(&code.device_code, "tv-app").await.unwrap_err(),
            GrantError::AlreadyRedeemed
        );
    }

    #[tokio::test]
    async fn test_denied_flow() {
        let service = service(Arc::new(ManualClock::at_timestamp(10_000)));
        let code = service.create("tv-app", scopes(), HashMap::new()).await.unwrap();

        service.deny(&code.user_code).await.unwrap();
        assert_eq!(
            service.redeem(&code.device_code, "tv-app").await.unwrap_err(),
            GrantError::AccessDenied
        );
        assert!(service.approve(&code.user_code, "alice").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_code_not_redeemable() {
        let clock = Arc::new(ManualClock::at_timestamp(10_000));
        let service = service(clock.clone());
        let code = service.create("tv-app", scopes(), HashMap::new()).await.unwrap();
        service.approve(&code.user_code, "alice").await.unwrap();

        clock.advance(chrono::Duration::seconds(601));
        let err = service.redeem(&code.device_code, "tv-app").await.unwrap_err();
        assert_eq!(err, GrantError::Expired);
        assert!(err.is_not_found());
        assert_eq!(
            service.lookup_by_user_code(&code.user_code).await.unwrap_err(),
            GrantError::Expired
        );
        assert_eq!(service.clear_expired().await.unwrap(), 1);
    }
}
