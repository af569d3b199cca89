mod common;

use common::{at, device, key, Fixture, FlakyStore, DAY_MS, T0};
use keybind_license::{LicenseError, Verdict};
use keybind_storage::{KeyStore, SqliteKeyStore};
use keybind_types::{DurationTable, LicenseType};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

// ── Unknown keys ─────────────────────────────────────────────────

#[tokio::test]
async fn never_issued_key_is_invalid_repeatedly() {
    let fx = Fixture::memory();
    for i in 0..3 {
        let v = fx.engine.verify(&key("nope"), &device("dev-A"), at(T0 + i)).await.unwrap();
        assert_eq!(v, Verdict::Invalid);
    }
    assert!(fx.store.list_all().await.unwrap().is_empty());
}

// ── First activation ─────────────────────────────────────────────

#[tokio::test]
async fn first_verify_binds_and_fixes_expiry() {
    let fx = Fixture::memory();
    fx.issue("K1", "24h").await;

    let v = fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();
    assert_eq!(v, Verdict::Valid { expires_at: at(T0 + DAY_MS) });

    let record = fx.store.get(&key("K1")).await.unwrap().unwrap();
    let binding = record.binding.unwrap();
    assert_eq!(binding.device_id, device("dev-A"));
    assert_eq!(binding.activated_at, at(T0));
    assert_eq!(binding.expires_at, at(T0 + DAY_MS));
}

#[tokio::test]
async fn other_device_after_binding_is_rejected_without_mutation() {
    let fx = Fixture::memory();
    fx.issue("K1", "7d").await;
    fx.engine.verify(&key("K1"), &device("d1"), at(T0)).await.unwrap();
    let before = fx.store.get(&key("K1")).await.unwrap();

    let v = fx.engine.verify(&key("K1"), &device("d2"), at(T0 + 5)).await.unwrap();
    assert_eq!(v, Verdict::InvalidDevice);
    assert_eq!(fx.store.get(&key("K1")).await.unwrap(), before);
}

#[tokio::test]
async fn reverification_is_idempotent() {
    let fx = Fixture::memory();
    fx.issue("K1", "30d").await;
    let first = fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();

    for offset in [1, 1_000, 60_000, 3_600_000] {
        let again = fx
            .engine
            .verify(&key("K1"), &device("dev-A"), at(T0 + offset))
            .await
            .unwrap();
        assert_eq!(again, first);
    }
}

// ── Expiry ───────────────────────────────────────────────────────

#[tokio::test]
async fn exactly_at_expiry_is_still_valid() {
    let fx = Fixture::memory();
    fx.issue("K1", "24h").await;
    fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();

    let v = fx
        .engine
        .verify(&key("K1"), &device("dev-A"), at(T0 + DAY_MS))
        .await
        .unwrap();
    assert_eq!(v, Verdict::Valid { expires_at: at(T0 + DAY_MS) });
}

#[tokio::test]
async fn expired_is_reported_once_then_invalid() {
    let fx = Fixture::memory();
    fx.issue("K1", "1m").await;
    fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();

    let late = at(T0 + 60_001);
    assert_eq!(
        fx.engine.verify(&key("K1"), &device("dev-A"), late).await.unwrap(),
        Verdict::Expired
    );
    assert!(fx.store.get(&key("K1")).await.unwrap().is_none());
    assert_eq!(
        fx.engine.verify(&key("K1"), &device("dev-A"), late).await.unwrap(),
        Verdict::Invalid
    );
}

#[tokio::test]
async fn foreign_device_never_learns_about_expiry() {
    let fx = Fixture::memory();
    fx.issue("K1", "1m").await;
    fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();

    let v = fx
        .engine
        .verify(&key("K1"), &device("dev-B"), at(T0 + 10 * 60_000))
        .await
        .unwrap();
    assert_eq!(v, Verdict::InvalidDevice);
    // And the expired record is left for its owner (or a sweep) to clear.
    assert!(fx.store.get(&key("K1")).await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_removes_only_expired_bindings() {
    let fx = Fixture::memory();
    fx.issue("short", "1m").await;
    fx.issue("long", "24h").await;
    fx.issue("fresh", "24h").await;
    fx.engine.verify(&key("short"), &device("a"), at(T0)).await.unwrap();
    fx.engine.verify(&key("long"), &device("b"), at(T0)).await.unwrap();

    let removed = fx.engine.sweep(at(T0 + 120_000)).await.unwrap();
    assert_eq!(removed, 1);

    let keys: Vec<String> = fx
        .store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.key.to_string())
        .collect();
    assert_eq!(keys, vec!["fresh".to_string(), "long".to_string()]);
}

// ── The end-to-end scenario ──────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_scenario() {
    let fx = Fixture::memory();
    fx.issue("K1", "24h").await;
    let valid = Verdict::Valid { expires_at: at(T0 + 86_400_000) };

    let e = &fx.engine;
    assert_eq!(e.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap(), valid);
    assert_eq!(e.verify(&key("K1"), &device("dev-A"), at(T0 + 10)).await.unwrap(), valid);
    assert_eq!(
        e.verify(&key("K1"), &device("dev-B"), at(T0 + 10)).await.unwrap(),
        Verdict::InvalidDevice
    );
    assert_eq!(
        e.verify(&key("K1"), &device("dev-A"), at(T0 + 86_400_001)).await.unwrap(),
        Verdict::Expired
    );
    assert_eq!(
        e.verify(&key("K1"), &device("dev-A"), at(T0 + 86_400_002)).await.unwrap(),
        Verdict::Invalid
    );
}

// ── Concurrency ──────────────────────────────────────────────────

async fn racing_first_activations(fx: Arc<Fixture>) {
    fx.issue("RACE", "24h").await;

    let mut handles = Vec::new();
    for i in 0..24u64 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            fx.engine
                .verify(&key("RACE"), &device(&format!("dev-{i}")), at(T0 + i))
                .await
                .unwrap()
        }));
    }

    let mut valid = Vec::new();
    let mut rejected = 0;
    for h in handles {
        match h.await.unwrap() {
            Verdict::Valid { expires_at } => valid.push(expires_at),
            Verdict::InvalidDevice => rejected += 1,
            other => panic!("unexpected verdict {other:?}"),
        }
    }
    assert_eq!(valid.len(), 1);
    assert_eq!(rejected, 23);

    let stored = fx.store.get(&key("RACE")).await.unwrap().unwrap();
    assert_eq!(stored.expires_at(), Some(valid[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_activation_memory() {
    racing_first_activations(Arc::new(Fixture::memory())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_activation_sqlite() {
    let store = Arc::new(SqliteKeyStore::open_in_memory().unwrap());
    racing_first_activations(Arc::new(Fixture::with_store(store))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_device_racing_itself_gets_one_expiry() {
    let fx = Arc::new(Fixture::memory());
    fx.issue("K1", "24h").await;

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move {
            fx.engine
                .verify(&key("K1"), &device("dev-A"), at(T0 + i))
                .await
                .unwrap()
        }));
    }
    let mut expiries = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Verdict::Valid { expires_at } => expiries.push(expires_at),
            other => panic!("unexpected verdict {other:?}"),
        }
    }
    expiries.dedup();
    assert_eq!(expiries.len(), 1);
}

// ── Failure semantics ────────────────────────────────────────────

#[tokio::test]
async fn failed_bind_leaves_record_unbound() {
    let flaky = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(flaky.clone());
    fx.issue("K1", "24h").await;

    flaky.fail_bind.store(true, Ordering::SeqCst);
    let err = fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap_err();
    assert!(err.is_transient());

    let record = fx.store.get(&key("K1")).await.unwrap().unwrap();
    assert!(record.binding.is_none());

    // Once the backend recovers the same call goes through.
    flaky.fail_bind.store(false, Ordering::SeqCst);
    let v = fx.engine.verify(&key("K1"), &device("dev-A"), at(T0 + 1)).await.unwrap();
    assert_eq!(v, Verdict::Valid { expires_at: at(T0 + 1 + DAY_MS) });
}

#[tokio::test]
async fn failed_lookup_is_not_a_verdict() {
    let flaky = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(flaky.clone());
    flaky.fail_get.store(true, Ordering::SeqCst);

    let err = fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap_err();
    assert!(matches!(err, LicenseError::Storage(_)));
}

#[tokio::test]
async fn failed_expiry_delete_keeps_record() {
    let flaky = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(flaky.clone());
    fx.issue("K1", "1m").await;
    fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();

    flaky.fail_delete.store(true, Ordering::SeqCst);
    let late = at(T0 + 120_000);
    assert!(fx.engine.verify(&key("K1"), &device("dev-A"), late).await.is_err());
    assert!(fx.store.get(&key("K1")).await.unwrap().is_some());

    flaky.fail_delete.store(false, Ordering::SeqCst);
    assert_eq!(
        fx.engine.verify(&key("K1"), &device("dev-A"), late).await.unwrap(),
        Verdict::Expired
    );
}

#[tokio::test]
async fn lost_expiry_delete_reply_never_reports_expired() {
    let flaky = Arc::new(FlakyStore::default());
    let fx = Fixture::with_store(flaky.clone());
    fx.issue("K1", "1m").await;
    fx.engine.verify(&key("K1"), &device("dev-A"), at(T0)).await.unwrap();

    flaky.lose_delete_reply.store(true, Ordering::SeqCst);
    let late = at(T0 + 120_000);
    let err = fx.engine.verify(&key("K1"), &device("dev-A"), late).await.unwrap_err();
    assert!(err.is_transient());
    assert!(fx.store.get(&key("K1")).await.unwrap().is_none());

    flaky.lose_delete_reply.store(false, Ordering::SeqCst);
    assert_eq!(
        fx.engine.verify(&key("K1"), &device("dev-A"), late).await.unwrap(),
        Verdict::Invalid
    );
}

#[tokio::test]
async fn record_with_unconfigured_type_is_not_activated() {
    let fx = Fixture::memory();
    // Bypass the registry's type check, as a record written under an older
    // configuration would.
    fx.store
        .create(&key("OLD"), &LicenseType::parse("lifetime").unwrap())
        .await
        .unwrap();

    let err = fx.engine.verify(&key("OLD"), &device("dev-A"), at(T0)).await.unwrap_err();
    assert!(matches!(err, LicenseError::UnknownLicenseType(t) if t == "lifetime"));
    let record = fx.store.get(&key("OLD")).await.unwrap().unwrap();
    assert!(!record.is_bound());
}

#[tokio::test]
async fn custom_duration_table_is_used() {
    let store: Arc<dyn KeyStore> = Arc::new(keybind_storage::MemoryKeyStore::new());
    let durations = Arc::new(DurationTable::new([(
        LicenseType::parse("test").unwrap(),
        Duration::from_secs(5),
    )]));
    let engine = keybind_license::ActivationEngine::new(Arc::clone(&store), durations);
    store
        .create(&key("T"), &LicenseType::parse("test").unwrap())
        .await
        .unwrap();

    let v = engine.verify(&key("T"), &device("d"), at(1_000)).await.unwrap();
    assert_eq!(v, Verdict::Valid { expires_at: at(6_000) });
    assert_eq!(engine.durations().len(), 1);
}
