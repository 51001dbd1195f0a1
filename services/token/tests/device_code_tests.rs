//! Device authorization flow tests.

use chrono::Duration;
use oidc_token_core::grants::{
    ApprovalState, DeviceCode, DeviceCodeService, GrantError, InMemoryGrantRepository,
};
use oidc_token_core::{Config, ManualClock};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

type Service = DeviceCodeService<InMemoryGrantRepository<DeviceCode>>;

fn service(clock: Arc<ManualClock>) -> Service {
    let config = Config::builder()
        .with_device_code_ttl(std::time::Duration::from_secs(600))
        .with_user_code_length(8)
        .build()
        .unwrap();
    DeviceCodeService::from_config(Arc::new(InMemoryGrantRepository::new()), &config)
        .unwrap()
        .with_clock(clock)
}

fn scopes(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn start(service: &Service) -> DeviceCode {
    let mut params = HashMap::new();
    params.insert("acr_values".to_string(), "urn:mace:incommon:iap:silver".to_string());
    service
        .create("tv-app", scopes(&["openid", "profile"]), params)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_approved_flow() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock.clone());
    let code = start(&service).await;

    assert_eq!(code.user_code.len(), 8);
    assert_eq!(code.expires_at.timestamp(), 1_700_000_600);
    assert_eq!(code.state, ApprovalState::Pending);

    // Polling before the user acts.
    assert_eq!(
        service.redeem(&code.device_code, "tv-app").await,
        Err(GrantError::AuthorizationPending)
    );

    // The user types the code in lower case with the display dash.
    let typed = code.display_user_code().to_lowercase();
    let found = service.lookup_by_user_code(&typed).await.unwrap();
    assert_eq!(found.id, code.id);
    assert_eq!(found.params["acr_values"], "urn:mace:incommon:iap:silver");

    clock.advance(Duration::seconds(30));
    let approved = service.approve(&typed, "alice").await.unwrap();
    assert_eq!(approved.subject(), Some("alice"));

    let redeemed = service.redeem(&code.device_code, "tv-app").await.unwrap();
    assert!(redeemed.is_approved());
    assert_eq!(redeemed.scopes, scopes(&["openid", "profile"]));
    assert!(redeemed.redeemed_at.is_some());

    assert_eq!(
        service.redeem(&code.device_code, "tv-app").await,
        Err(GrantError::AlreadyRedeemed)
    );
    assert!(service
        .get_by_device_code(&code.device_code)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_denied_flow() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock);
    let code = start(&service).await;

    service.deny(&code.user_code).await.unwrap();
    assert_eq!(
        service.redeem(&code.device_code, "tv-app").await,
        Err(GrantError::AccessDenied)
    );
    assert!(matches!(
        service.approve(&code.user_code, "alice").await,
        Err(GrantError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_decision_is_final() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock);
    let code = start(&service).await;

    service.approve(&code.user_code, "alice").await.unwrap();
    assert!(matches!(
        service.approve(&code.user_code, "mallory").await,
        Err(GrantError::InvalidState(_))
    ));
    assert!(matches!(
        service.deny(&code.user_code).await,
        Err(GrantError::InvalidState(_))
    ));
    let current = service.get_by_device_code(&code.device_code).await.unwrap();
    assert_eq!(current.subject(), Some("alice"));
}

#[tokio::test]
async fn test_wrong_client_cannot_redeem() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock);
    let code = start(&service).await;
    service.approve(&code.user_code, "alice").await.unwrap();

    assert_eq!(
        service.redeem(&code.device_code, "other-app").await,
        Err(GrantError::NotFound)
    );
    assert!(service.redeem(&code.device_code, "tv-app").await.is_ok());
}

#[tokio::test]
async fn test_other_client_never_learns_code_state() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock.clone());

    let pending = start(&service).await;
    assert_eq!(
        service.redeem(&pending.device_code, "other-app").await,
        Err(GrantError::NotFound)
    );

    let denied = start(&service).await;
    service.deny(&denied.user_code).await.unwrap();
    assert_eq!(
        service.redeem(&denied.device_code, "other-app").await,
        Err(GrantError::NotFound)
    );

    let redeemed = start(&service).await;
    service.approve(&redeemed.user_code, "alice").await.unwrap();
    service.redeem(&redeemed.device_code, "tv-app").await.unwrap();
    assert_eq!(
        service.redeem(&redeemed.device_code, "other-app").await,
        Err(GrantError::NotFound)
    );
    assert_eq!(
        service.redeem(&redeemed.device_code, "tv-app").await,
        Err(GrantError::AlreadyRedeemed)
    );

    let expired = start(&service).await;
    service.approve(&expired.user_code, "alice").await.unwrap();
    clock.advance(Duration::seconds(600));
    assert_eq!(
        service.redeem(&expired.device_code, "other-app").await,
        Err(GrantError::NotFound)
    );
}

#[tokio::test]
async fn test_expired_code() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock.clone());
    let code = start(&service).await;
    service.approve(&code.user_code, "alice").await.unwrap();

    clock.advance(Duration::seconds(600));
    assert_eq!(
        service.redeem(&code.device_code, "tv-app").await,
        Err(GrantError::Expired)
    );
    assert!(service
        .lookup_by_user_code(&code.user_code)
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(service.clear_expired().await.unwrap(), 1);
    assert_eq!(
        service.redeem(&code.device_code, "tv-app").await,
        Err(GrantError::NotFound)
    );
}

#[tokio::test]
async fn test_unknown_codes() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock);

    assert_eq!(
        service.redeem("no-such-code", "tv-app").await,
        Err(GrantError::NotFound)
    );
    assert_eq!(
        service.approve("BCDF-GHJK", "alice").await,
        Err(GrantError::NotFound)
    );
}

#[tokio::test]
async fn test_remove() {
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let service = service(clock);
    let code = start(&service).await;

    assert!(service.remove(&code).await.unwrap());
    assert!(!service.remove(&code).await.unwrap());
    assert_eq!(
        service.lookup_by_user_code(&code.user_code).await,
        Err(GrantError::NotFound)
    );
}

#[test]
fn test_user_code_length_bounds() {
    let repo = Arc::new(InMemoryGrantRepository::<DeviceCode>::new());
    let ttl = std::time::Duration::from_secs(60);
    assert!(DeviceCodeService::new(repo.clone(), ttl, 5).is_err());
    assert!(DeviceCodeService::new(repo.clone(), ttl, 6).is_ok());
    assert!(DeviceCodeService::new(repo.clone(), ttl, 20).is_ok());
    assert!(DeviceCodeService::new(repo, ttl, 21).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Every formatting of a user code a person might type finds the request.
    #[test]
    fn prop_user_code_input_is_normalized(
        dashes in prop::collection::vec(any::<bool>(), 8),
        lower in prop::collection::vec(any::<bool>(), 8),
        pad in "[ ]{0,2}",
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
            let service = service(clock);
            let code = start(&service).await;

            let mut typed = pad.clone();
            for (i, c) in code.user_code.chars().enumerate() {
                typed.push(if lower[i] { c.to_ascii_lowercase() } else { c });
                if dashes[i] {
                    typed.push('-');
                }
            }
            typed.push_str(&pad);

            let found = service.lookup_by_user_code(&typed).await.unwrap();
            assert_eq!(found.id, code.id);
        });
    }
}
