//! Integration tests for the generic grant store and the sweeper.

use chrono::{DateTime, Duration, Utc};
use oidc_token_core::grants::{
    DeviceCodeService, Grant, GrantError, GrantId, GrantStore, GrantSweeper,
    InMemoryGrantRepository, NonceService, PermissionTicketService, ResourceSet, Sweepable,
};
use oidc_token_core::ManualClock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Voucher {
    id: GrantId,
    code: String,
    expires_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl Voucher {
    fn new(code: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            code: code.to_string(),
            expires_at,
            redeemed_at: None,
        }
    }
}

impl Grant for Voucher {
    const KIND: &'static str = "voucher";

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

type VoucherStore = GrantStore<Voucher, InMemoryGrantRepository<Voucher>>;

fn voucher_store(clock: Arc<ManualClock>) -> VoucherStore {
    GrantStore::new(
        Arc::new(InMemoryGrantRepository::new()),
        std::time::Duration::from_secs(60),
    )
    .unwrap()
    .with_clock(clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemption_succeeds_once() {
    let clock = Arc::new(ManualClock::at_timestamp(1_000));
    let store = Arc::new(voucher_store(clock));
    let voucher = store
        .create_with(|new| Ok(Voucher::new(&new.code, new.expires_at)))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = store.clone();
        let code = voucher.code.clone();
        handles.push(tokio::spawn(async move { store.redeem(&code).await }));
    }

    let mut redeemed = 0;
    let mut replayed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => redeemed += 1,
            Err(GrantError::AlreadyRedeemed) => replayed += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(redeemed, 1);
    assert_eq!(replayed, 31);
}

#[tokio::test]
async fn test_sweep_removes_exactly_expired() {
    let clock = Arc::new(ManualClock::at_timestamp(10_000));
    let store = voucher_store(clock.clone());
    let now = store.now();

    for (code, offset) in [("past", -10), ("edge", -1), ("future", 10)] {
        store
            .insert(Voucher::new(code, now + Duration::seconds(offset)))
            .await
            .unwrap()
            .unwrap();
    }
    // Expiry is inclusive.
    store
        .insert(Voucher::new("now", now))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.sweep_expired().await.unwrap(), 3);
    assert_eq!(store.sweep_expired().await.unwrap(), 0);

    let remaining: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.code)
        .collect();
    assert_eq!(remaining, vec!["future".to_string()]);
    assert!(store.get_by_code("future").await.is_ok());
}

#[tokio::test]
async fn test_expired_code_can_be_reused() {
    let clock = Arc::new(ManualClock::at_timestamp(10_000));
    let store = voucher_store(clock.clone());
    let now = store.now();

    let first = store
        .insert(Voucher::new("shared", now + Duration::seconds(5)))
        .await
        .unwrap()
        .unwrap();
    assert!(store
        .insert(Voucher::new("shared", now + Duration::seconds(50)))
        .await
        .unwrap()
        .is_none());

    clock.advance(Duration::seconds(5));
    let second = store
        .insert(Voucher::new("shared", now + Duration::seconds(50)))
        .await
        .unwrap()
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(store.get_by_code("shared").await.unwrap().id, second.id);
}

#[tokio::test]
async fn test_generated_codes_are_unique() {
    let clock = Arc::new(ManualClock::at_timestamp(1_000));
    let store = voucher_store(clock);

    let mut codes = HashSet::new();
    for _ in 0..200 {
        let voucher = store
            .create_with(|new| Ok(Voucher::new(&new.code, new.expires_at)))
            .await
            .unwrap();
        assert!(codes.insert(voucher.code));
    }
}

#[tokio::test]
async fn test_sweeper_covers_every_grant_kind() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let ttl = std::time::Duration::from_secs(60);

    let devices = Arc::new(
        DeviceCodeService::new(Arc::new(InMemoryGrantRepository::new()), ttl, 8)
            .unwrap()
            .with_clock(clock.clone()),
    );
    let tickets = Arc::new(
        PermissionTicketService::new(Arc::new(InMemoryGrantRepository::new()), ttl)
            .unwrap()
            .with_clock(clock.clone()),
    );
    let nonces = Arc::new(
        NonceService::new(Arc::new(InMemoryGrantRepository::new()), ttl)
            .unwrap()
            .with_clock(clock.clone()),
    );

    let resource = ResourceSet {
        id: "photos".to_string(),
        name: "Photo album".to_string(),
        scopes: ["view".to_string()].into_iter().collect(),
    };
    for _ in 0..2 {
        devices
            .create("tv-app", BTreeSet::new(), HashMap::new())
            .await
            .unwrap();
        tickets
            .create_ticket(&resource, resource.scopes.clone())
            .await
            .unwrap();
    }
    nonces.issue("tv-app").await.unwrap();

    let sweeper = GrantSweeper::new(std::time::Duration::from_secs(30))
        .with_store(devices.clone() as Arc<dyn Sweepable>)
        .with_store(tickets.clone() as Arc<dyn Sweepable>)
        .with_store(nonces.clone() as Arc<dyn Sweepable>);

    assert!(sweeper.run_once().await.values().all(|count| *count == 0));

    clock.advance(Duration::seconds(60));
    let swept = sweeper.run_once().await;
    assert_eq!(swept.get("device_code"), Some(&2));
    assert_eq!(swept.get("permission_ticket"), Some(&2));
    assert_eq!(swept.get("nonce"), Some(&1));
    assert!(tickets.get_all().await.unwrap().is_empty());
}
