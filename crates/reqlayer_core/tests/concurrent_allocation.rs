use regex::Regex;
use reqlayer_core::db::migrations::{apply_migrations_to, ROW_COUNT_SCHEMA_VERSION};
use reqlayer_core::db::open_db;
use reqlayer_core::{
    Allocator, FamilyTag, RecordRepository, ReferenceId, ReferenceRecord, SqliteRecordRepository,
    StoreConfig,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 10;
const PER_THREAD: usize = 5;

/// Spawns `THREADS` workers, each opening its own connection with `open`
/// and creating `PER_THREAD` records of `family`.
fn create_concurrently<F>(path: &Path, family: FamilyTag, open: F) -> Vec<String>
where
    F: Fn(&Path) -> Connection + Send + Sync + 'static,
{
    let open = Arc::new(open);
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let path: PathBuf = path.to_path_buf();
            let open = Arc::clone(&open);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open(&path);
                let allocator = Allocator::from_probe(&conn, &StoreConfig::default()).unwrap();
                let repo = SqliteRecordRepository::try_new(&conn, &allocator).unwrap();
                barrier.wait();

                (0..PER_THREAD)
                    .map(|_| {
                        let mut record = ReferenceRecord::new(family, "concurrent");
                        repo.create_record(&mut record).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect()
}

#[test]
fn parallel_creators_receive_distinct_sequential_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parallel.db");
    drop(open_db(&path).unwrap());

    let ids = create_concurrently(&path, FamilyTag::UserStory, |path| open_db(path).unwrap());

    let pattern = Regex::new(r"^US-\d{3,}$").unwrap();
    assert_eq!(ids.len(), THREADS * PER_THREAD);
    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), ids.len(), "duplicate ids issued: {ids:?}");

    let mut numbers = Vec::with_capacity(ids.len());
    for id in &ids {
        assert!(pattern.is_match(id), "unexpected id shape: {id}");
        numbers.push(ReferenceId::parse(id).unwrap().sequence_number().unwrap());
    }
    numbers.sort_unstable();
    assert_eq!(numbers.first(), Some(&1));
    assert!(*numbers.last().unwrap() <= (THREADS * PER_THREAD) as u64);

    let conn = open_db(&path).unwrap();
    let allocator = Allocator::from_probe(&conn, &StoreConfig::default()).unwrap();
    let repo = SqliteRecordRepository::try_new(&conn, &allocator).unwrap();
    assert_eq!(
        repo.count_records(FamilyTag::UserStory).unwrap(),
        (THREADS * PER_THREAD) as i64
    );
}

#[test]
fn parallel_creators_in_separate_families_keep_own_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.db");
    drop(open_db(&path).unwrap());

    let epics_path = path.clone();
    let epics = thread::spawn(move || {
        create_concurrently(&epics_path, FamilyTag::Epic, |path| open_db(path).unwrap())
    });
    let requirements =
        create_concurrently(&path, FamilyTag::Requirement, |path| open_db(path).unwrap());
    let epics = epics.join().unwrap();

    for (ids, prefix) in [(&epics, "EP-"), (&requirements, "REQ-")] {
        let distinct: HashSet<&String> = ids.iter().collect();
        assert_eq!(distinct.len(), THREADS * PER_THREAD);
        assert!(ids.iter().all(|id| id.starts_with(prefix)));
        assert!(ids.iter().all(|id| ReferenceId::parse(id)
            .unwrap()
            .sequence_number()
            .is_some()));
    }
}

#[test]
fn legacy_row_count_store_stays_unique_under_contention() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    {
        let mut conn = Connection::open(&path).unwrap();
        apply_migrations_to(&mut conn, ROW_COUNT_SCHEMA_VERSION).unwrap();
    }

    let ids = create_concurrently(&path, FamilyTag::AcceptanceCriteria, |path| {
        Connection::open(path).unwrap()
    });

    let distinct: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct.len(), THREADS * PER_THREAD, "duplicates: {ids:?}");
    let mut numbers: Vec<u64> = ids
        .iter()
        .map(|id| ReferenceId::parse(id).unwrap().sequence_number().unwrap())
        .collect();
    numbers.sort_unstable();
    let expected: Vec<u64> = (1..=(THREADS * PER_THREAD) as u64).collect();
    assert_eq!(numbers, expected);
}
