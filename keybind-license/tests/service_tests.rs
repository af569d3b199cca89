mod common;

use common::{at, Fixture, FlakyStore, DAY_MS, T0};
use keybind_license::{ActivationEngine, VerificationService, VerifyOutcome};
use keybind_types::protocol::{VerifyRequest, VerifyStatus};
use keybind_types::{DurationTable, ManualClock};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn service(fx: &Fixture, clock: Arc<ManualClock>) -> VerificationService {
    let engine = ActivationEngine::new(Arc::clone(&fx.store), Arc::new(DurationTable::default()));
    VerificationService::new(Arc::new(engine), clock)
}

#[tokio::test]
async fn missing_fields_are_malformed() {
    let fx = Fixture::memory();
    fx.issue("K1", "24h").await;
    let svc = service(&fx, Arc::new(ManualClock::new(at(T0))));

    let cases = [
        (VerifyRequest::default(), "key is required"),
        (
            VerifyRequest { key: Some("K1".into()), device_id: None },
            "deviceId is required",
        ),
        (
            VerifyRequest { key: Some("   ".into()), device_id: Some("d".into()) },
            "key is required",
        ),
        (
            VerifyRequest { key: Some("K1".into()), device_id: Some(String::new()) },
            "deviceId is required",
        ),
    ];
    for (request, reason) in cases {
        assert_eq!(
            svc.verify(&request).await,
            VerifyOutcome::MalformedRequest(reason.to_string())
        );
    }

    // None of the malformed calls bound the key.
    let record = fx.store.get(&common::key("K1")).await.unwrap().unwrap();
    assert!(!record.is_bound());
}

#[tokio::test]
async fn uses_injected_clock() {
    let fx = Fixture::memory();
    fx.issue("K1", "24h").await;
    let clock = Arc::new(ManualClock::new(at(T0)));
    let svc = service(&fx, Arc::clone(&clock));

    let first = svc.verify(&VerifyRequest::new("K1", "dev-A")).await;
    assert_eq!(first, VerifyOutcome::Valid { expires_at: at(T0 + DAY_MS) });

    clock.advance(DAY_MS);
    assert_eq!(svc.verify(&VerifyRequest::new("K1", "dev-A")).await, first);

    clock.advance(1);
    assert_eq!(
        svc.verify(&VerifyRequest::new("K1", "dev-A")).await,
        VerifyOutcome::Expired
    );
    assert_eq!(
        svc.verify(&VerifyRequest::new("K1", "dev-A")).await,
        VerifyOutcome::Invalid
    );
}

#[tokio::test]
async fn storage_failure_becomes_server_error() {
    let flaky = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(flaky.clone());
    fx.issue("K1", "24h").await;
    let svc = service(&fx, Arc::new(ManualClock::new(at(T0))));

    flaky.fail_bind.store(true, Ordering::SeqCst);
    let outcome = svc.verify(&VerifyRequest::new("K1", "dev-A")).await;
    assert_eq!(outcome, VerifyOutcome::ServerError);
    assert!(!outcome.is_terminal());

    let response = outcome.to_response();
    assert_eq!(response.status, VerifyStatus::Error);
    assert_eq!(response.error.as_deref(), Some("server error"));
}

#[test]
fn terminal_outcomes() {
    assert!(VerifyOutcome::Invalid.is_terminal());
    assert!(VerifyOutcome::InvalidDevice.is_terminal());
    assert!(VerifyOutcome::Expired.is_terminal());
    assert!(!VerifyOutcome::Valid { expires_at: at(1) }.is_terminal());
    assert!(!VerifyOutcome::MalformedRequest("x".into()).is_terminal());
}

#[test]
fn responses_carry_expiry_only_when_valid() {
    let valid = VerifyOutcome::Valid { expires_at: at(42) }.to_response();
    assert_eq!(valid.status, VerifyStatus::Valid);
    assert_eq!(valid.expires_at, Some(42));

    for (outcome, status) in [
        (VerifyOutcome::Invalid, VerifyStatus::Invalid),
        (VerifyOutcome::InvalidDevice, VerifyStatus::InvalidDevice),
        (VerifyOutcome::Expired, VerifyStatus::Expired),
    ] {
        let r = outcome.to_response();
        assert_eq!(r.status, status);
        assert_eq!(r.expires_at, None);
        assert_eq!(r.error, None);
    }

    let malformed = VerifyOutcome::MalformedRequest("key is required".into()).to_response();
    assert_eq!(malformed.status, VerifyStatus::Error);
    assert_eq!(malformed.error.as_deref(), Some("key is required"));
}
