use hermes_types::{Provider, ProviderStatus};

#[test]
fn provider_new_normalizes_trailing_slash_and_starts_pending() {
    let p = Provider::new("acme", "https://api.acme.test/v1/", "sk-test");
    assert_eq!(p.base_url, "https://api.acme.test/v1");
    assert_eq!(p.status, ProviderStatus::Pending);
    assert!(p.models.is_empty());
}

#[test]
fn provider_round_trips_through_json() {
    let p = Provider::new("acme", "https://api.acme.test", "sk-test");
    let json = serde_json::to_string(&p).expect("serialize");
    let back: Provider = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.id, p.id);
    assert_eq!(back.base_url, p.base_url);
}

#[test]
fn active_and_syncing_are_dispatchable_pending_and_error_are_not() {
    assert!(ProviderStatus::Active.is_dispatchable());
    assert!(ProviderStatus::Syncing.is_dispatchable());
    assert!(!ProviderStatus::Pending.is_dispatchable());
    assert!(!ProviderStatus::Error.is_dispatchable());
}
