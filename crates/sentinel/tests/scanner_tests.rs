//! End-to-end scan, alert and persist behavior against scripted fakes.

mod common;

use std::sync::Arc;

use common::{scanner, RecordingSink, ScriptedLedger, A, B, C};
use sentinel::{
    EntityRegistry, EntityStore, MemoryStore, RetryConfig, RetryExecutor, SentinelError,
    WindowScanner,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_window_is_capped_and_cursor_monotonic() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(1000, &[A]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger.clone(), store, sink, &[A], 100, 10_000, 50);

    let report = scanner.scan(1000).await.unwrap();
    assert_eq!(report.from, 100);
    assert_eq!(report.advanced_to, 150);
    assert_eq!(report.processed, 50);
    assert_eq!(report.backlog(), 850);
    assert_eq!(ledger.checked_units(), (101..=150).collect::<Vec<_>>());

    let report = scanner.scan(1000).await.unwrap();
    assert_eq!(report.advanced_to, 200);

    // a head behind the cursor is a no-op
    let report = scanner.scan(120).await.unwrap();
    assert_eq!(report.advanced_to, 200);
    assert_eq!(report.processed, 0);
    assert_eq!(scanner.cursor(), 200);
}

#[tokio::test]
async fn test_small_gap_catches_up_fully() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(130, &[A, B]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger.clone(), store.clone(), sink, &[A, B], 100, 10_000, 50);

    let report = scanner.scan(130).await.unwrap();
    assert_eq!(report.advanced_to, 130);
    assert_eq!(report.backlog(), 0);

    let persisted = store.get(B).await.unwrap().unwrap();
    assert_eq!(persisted.consecutive_eligible_units, 30);
    assert_eq!(persisted.last_checked_unit, Some(130));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_unit_is_skipped_without_observation() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(105, &[A]));
    ledger.fail_unit(103);
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger.clone(), store.clone(), sink, &[A], 100, 10_000, 100);

    let report = scanner.scan(105).await.unwrap();
    assert_eq!(report.skipped, vec![103]);
    assert_eq!(report.processed, 4);
    assert_eq!(report.advanced_to, 105);
    assert_eq!(ledger.checks_at(103), RetryConfig::default().max_attempts as usize);

    // the skipped unit neither reset nor extended the run
    let entity = scanner.registry().get(A).unwrap();
    assert_eq!(entity.consecutive_eligible_units, 4);
    assert_eq!(entity.last_checked_unit, Some(105));
}

#[tokio::test]
async fn test_fatal_check_resets_only_that_entity() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(104, &[A, B]));
    ledger.fail_fatally(B, 102);
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store, sink, &[A, B], 100, 10_000, 100);

    let report = scanner.scan(104).await.unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(scanner.registry().get(A).unwrap().consecutive_eligible_units, 4);
    assert_eq!(scanner.registry().get(B).unwrap().consecutive_eligible_units, 2);
}

#[tokio::test]
async fn test_alert_fires_once_per_threshold_span() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(2500, &[A]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store.clone(), sink.clone(), &[A], 0, 1000, 2500);

    let report = scanner.scan(2500).await.unwrap();
    assert_eq!(report.alerts, 2);
    assert_eq!(sink.alert_units(A), vec![1000, 2000]);

    let alerts = sink.alerts();
    assert_eq!(alerts[0].count, 1000);
    assert_eq!(alerts[0].threshold, 1000);
    assert_eq!(alerts[1].count, 2000);

    let persisted = store.get(A).await.unwrap().unwrap();
    assert_eq!(persisted.alerts_sent, 2);
    assert_eq!(persisted.last_alert_unit, Some(2000));
}

#[tokio::test]
async fn test_break_before_threshold_never_fires() {
    // eligible for 999 units, one miss at 1000, then eligible again
    let ledger = Arc::new(ScriptedLedger::new(2000, &[A], |_, unit| unit != 1000));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store, sink.clone(), &[A], 0, 1000, 2000);

    scanner.scan(1999).await.unwrap();
    assert!(sink.alerts().is_empty());
    assert_eq!(scanner.registry().get(A).unwrap().consecutive_eligible_units, 999);

    // the second run reaches 1000 at unit 2000
    scanner.scan(2000).await.unwrap();
    assert_eq!(sink.alert_units(A), vec![2000]);
}

#[tokio::test]
async fn test_ended_run_confirms_action() {
    let ledger = Arc::new(ScriptedLedger::new(6, &[A, B], |_, unit| unit < 4));
    ledger.record_action(A, 4);
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store.clone(), sink, &[A, B], 0, 10, 10);

    scanner.scan(6).await.unwrap();
    assert_eq!(store.get(A).await.unwrap().unwrap().last_acted_unit, Some(4));
    assert_eq!(store.get(B).await.unwrap().unwrap().last_acted_unit, None);
}

#[tokio::test]
async fn test_confirmation_errors_are_swallowed() {
    let ledger = Arc::new(
        ScriptedLedger::new(6, &[A], |_, unit| unit < 4).with_failing_confirmations(),
    );
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store, sink, &[A], 0, 10, 10);

    let report = scanner.scan(6).await.unwrap();
    assert_eq!(report.advanced_to, 6);
    assert!(report.skipped.is_empty());
    assert_eq!(scanner.registry().get(A).unwrap().last_acted_unit, None);
}

#[tokio::test]
async fn test_persistence_failure_aborts_then_reloads() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(5, &[A, B]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store.clone(), sink, &[A, B], 0, 100, 100);

    store.fail_writes_for(A).await;
    let err = scanner.scan(5).await.unwrap_err();
    assert!(matches!(
        err,
        SentinelError::Persistence {
            unit: 1,
            failed: 1,
            ..
        }
    ));
    assert_eq!(scanner.cursor(), 0);
    // the other write at unit 1 still went through
    assert_eq!(store.get(B).await.unwrap().unwrap().last_checked_unit, Some(1));

    store.heal().await;
    let report = scanner.scan(5).await.unwrap();
    assert_eq!(report.advanced_to, 5);

    // same counters as a run that never failed
    for id in [A, B] {
        let persisted = store.get(id).await.unwrap().unwrap();
        assert_eq!(persisted.consecutive_eligible_units, 5, "{id}");
        assert_eq!(persisted.last_checked_unit, Some(5));
    }
}

#[tokio::test]
async fn test_alert_not_resent_while_persistence_keeps_failing() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(10, &[A]));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());
    let mut scanner = scanner(ledger, store.clone(), sink.clone(), &[A], 0, 1, 10);

    store.fail_writes_for(A).await;
    for _ in 0..5 {
        assert!(scanner.scan(10).await.is_err());
    }
    assert_eq!(sink.alert_units(A), vec![1]);
    assert_eq!(scanner.registry().get(A).unwrap().last_alert_unit, Some(1));

    store.heal().await;
    scanner.scan(3).await.unwrap();
    // unit 1 is replayed without a second alert
    assert_eq!(sink.alert_units(A), vec![1, 2, 3]);
    let persisted = store.get(A).await.unwrap().unwrap();
    assert_eq!(persisted.last_alert_unit, Some(3));
    assert_eq!(persisted.alerts_sent, 3);
}

fn pattern(id: &str, unit: u64) -> bool {
    let salt = id.len() as u64 + u64::from(id.as_bytes()[id.len() - 1]);
    (unit / 7 + salt) % 3 != 0 || unit % 11 == 0
}

#[tokio::test]
async fn test_restart_from_store_matches_uninterrupted_run() {
    let entities = [A, B, C];

    let uninterrupted_store = Arc::new(MemoryStore::new());
    let mut uninterrupted = scanner(
        Arc::new(ScriptedLedger::new(300, &entities, pattern)),
        uninterrupted_store.clone(),
        Arc::new(RecordingSink::default()),
        &entities,
        0,
        20,
        40,
    );
    while uninterrupted.cursor() < 300 {
        uninterrupted.scan(300).await.unwrap();
    }

    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(ScriptedLedger::new(300, &entities, pattern));
    let sink = Arc::new(RecordingSink::default());
    let mut first = scanner(ledger.clone(), store.clone(), sink.clone(), &entities, 0, 20, 40);
    while first.cursor() < 150 {
        first.scan(150).await.unwrap();
    }
    drop(first);

    // restart: rebuild the registry and cursor from persisted records
    let mut registry = EntityRegistry::new();
    registry.add_discovered(entities.iter().map(ToString::to_string));
    registry.merge_persisted(store.list().await.unwrap());
    let cursor = registry.max_last_checked().unwrap();
    assert_eq!(cursor, 150);

    let mut resumed = WindowScanner::new(
        registry,
        cursor,
        40,
        ledger,
        store.clone(),
        sentinel::AlertPolicy::new(20, sink),
        RetryExecutor::new(RetryConfig::default(), CancellationToken::new()),
        CancellationToken::new(),
    );
    while resumed.cursor() < 300 {
        resumed.scan(300).await.unwrap();
    }

    assert_eq!(
        store.list().await.unwrap(),
        uninterrupted_store.list().await.unwrap()
    );
}

#[tokio::test]
async fn test_cancelled_scan_stops_at_unit_boundary() {
    let ledger = Arc::new(ScriptedLedger::always_eligible(50, &[A]));
    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();
    let mut registry = EntityRegistry::new();
    registry.add_discovered([A.to_string()]);
    let mut scanner = WindowScanner::new(
        registry,
        10,
        100,
        ledger,
        store,
        sentinel::AlertPolicy::new(100, Arc::new(RecordingSink::default())),
        RetryExecutor::new(RetryConfig::default(), cancel.clone()),
        cancel.clone(),
    );

    cancel.cancel();
    let report = scanner.scan(50).await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.advanced_to, 10);
}
