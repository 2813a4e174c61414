use regex::Regex;
use reqlayer_core::db::migrations::{apply_migrations_to, ROW_COUNT_SCHEMA_VERSION};
use reqlayer_core::db::{open_db, open_db_with};
use reqlayer_core::refid::{CoordinationError, Coordinator};
use reqlayer_core::{
    AllocPath, Allocator, FallbackReason, FamilyRegistry, FamilyTag, RecordRepository,
    SqliteRecordRepository, StoreConfig,
};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::{Duration, Instant};

fn legacy_store(path: &std::path::Path) {
    let mut conn = Connection::open(path).unwrap();
    apply_migrations_to(&mut conn, ROW_COUNT_SCHEMA_VERSION).unwrap();
}

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn contended_lock_falls_back_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contended.db");
    legacy_store(&path);

    let holder = Connection::open(&path).unwrap();
    let waiter = Connection::open(&path).unwrap();
    let config = StoreConfig {
        lock_budget_ms: 50,
        ..StoreConfig::default()
    };
    let allocator = Allocator::from_probe(&waiter, &config).unwrap();
    assert_eq!(allocator.store_kind(), "row_count");

    let held = Transaction::new_unchecked(&holder, TransactionBehavior::Immediate).unwrap();
    let started_at = Instant::now();
    let tx = Transaction::new_unchecked(&waiter, TransactionBehavior::Deferred).unwrap();
    let allocation = allocator.allocate_traced("REQ", &tx).unwrap();
    let elapsed = started_at.elapsed();
    tx.rollback().unwrap();
    held.rollback().unwrap();

    assert!(Regex::new(r"^REQ-[a-f0-9]{8}$")
        .unwrap()
        .is_match(&allocation.reference_id));
    assert_eq!(
        allocation.path,
        AllocPath::Fallback(FallbackReason::CoordinationTimeout)
    );
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    assert_eq!(row_count(&waiter, "requirements"), 0);
}

#[test]
fn busy_timeout_is_restored_after_lock_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restore.db");
    legacy_store(&path);

    let holder = Connection::open(&path).unwrap();
    let waiter = Connection::open(&path).unwrap();
    waiter.busy_timeout(Duration::from_millis(300)).unwrap();
    let coordinator = Coordinator::new(&StoreConfig {
        lock_budget_ms: 20,
        ..StoreConfig::default()
    });
    let family = FamilyRegistry::global().family(FamilyTag::Epic).unwrap();

    let held = Transaction::new_unchecked(&holder, TransactionBehavior::Immediate).unwrap();
    let tx = Transaction::new_unchecked(&waiter, TransactionBehavior::Deferred).unwrap();
    let err = coordinator
        .with_lock(&tx, family.coord_key, || ())
        .unwrap_err();
    assert!(matches!(err, CoordinationError::Timeout { .. }));

    let restored: i64 = tx
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(restored, 300);
    drop(tx);
    held.rollback().unwrap();
}

#[test]
fn lock_on_one_family_blocks_another_family_on_shared_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cross-family.db");
    legacy_store(&path);

    let first = Connection::open(&path).unwrap();
    let second = Connection::open(&path).unwrap();
    let config = StoreConfig {
        lock_budget_ms: 30,
        ..StoreConfig::default()
    };
    let first_allocator = Allocator::from_probe(&first, &config).unwrap();
    let second_allocator = Allocator::from_probe(&second, &config).unwrap();

    let epic_tx = Transaction::new_unchecked(&first, TransactionBehavior::Deferred).unwrap();
    let epic = first_allocator.allocate_traced("EP", &epic_tx).unwrap();
    assert_eq!(epic.reference_id, "EP-001");
    assert_eq!(epic.path, AllocPath::Coordinated);

    // SQLite admits one writer per store, so distinct keys still serialize.
    let story_tx = Transaction::new_unchecked(&second, TransactionBehavior::Deferred).unwrap();
    let story = second_allocator.allocate_traced("US", &story_tx).unwrap();
    assert_eq!(
        story.path,
        AllocPath::Fallback(FallbackReason::CoordinationTimeout)
    );
    story_tx.rollback().unwrap();
    epic_tx.rollback().unwrap();

    let story_tx = Transaction::new_unchecked(&second, TransactionBehavior::Deferred).unwrap();
    let story = second_allocator.allocate_traced("US", &story_tx).unwrap();
    assert_eq!(story.reference_id, "US-001");
    assert_eq!(story.path, AllocPath::Coordinated);
}

#[test]
fn busy_sequence_store_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.db");
    let holder = open_db(&path).unwrap();
    let config = StoreConfig {
        busy_timeout_ms: 50,
        ..StoreConfig::default()
    };
    let waiter = open_db_with(&path, &config).unwrap();
    let allocator = Allocator::from_probe(&waiter, &config).unwrap();
    assert_eq!(allocator.store_kind(), "sequence");

    let held = Transaction::new_unchecked(&holder, TransactionBehavior::Immediate).unwrap();
    let tx = Transaction::new_unchecked(&waiter, TransactionBehavior::Deferred).unwrap();
    let allocation = allocator.allocate_traced("AC", &tx).unwrap();
    tx.rollback().unwrap();
    held.rollback().unwrap();

    assert!(Regex::new(r"^AC-[a-f0-9]{8}$")
        .unwrap()
        .is_match(&allocation.reference_id));
    assert_eq!(
        allocation.path,
        AllocPath::Fallback(FallbackReason::CounterUnavailable)
    );
}

#[test]
fn fallback_id_is_persisted_like_any_other() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist-fallback.db");
    legacy_store(&path);

    let holder = Connection::open(&path).unwrap();
    let waiter = Connection::open(&path).unwrap();
    let config = StoreConfig {
        lock_budget_ms: 10,
        ..StoreConfig::default()
    };
    let allocator = Allocator::from_probe(&waiter, &config).unwrap();
    let repo = SqliteRecordRepository::try_new(&waiter, &allocator).unwrap();

    let held = Transaction::new_unchecked(&holder, TransactionBehavior::Immediate).unwrap();
    let tx = Transaction::new_unchecked(&waiter, TransactionBehavior::Deferred).unwrap();
    let mut record = reqlayer_core::ReferenceRecord::new(FamilyTag::Prompt, "timed out");
    let allocation = allocator.allocate_traced("PROMPT", &tx).unwrap();
    assert!(matches!(allocation.path, AllocPath::Fallback(_)));
    record.reference_id = Some(allocation.reference_id.clone());
    tx.rollback().unwrap();
    held.rollback().unwrap();

    let stored = repo.create_record(&mut record).unwrap();
    assert_eq!(stored, allocation.reference_id);
    let loaded = repo
        .get_by_reference_id(FamilyTag::Prompt, &stored)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.uuid, record.uuid);
}
