//! Reference-tagged record repository and SQLite implementation.
//!
//! # Responsibility
//! - Insert family records with reference ids assigned by the creation hook.
//! - Look records up by reference id.
//!
//! # Invariants
//! - Reference ids are assigned and the row inserted in the same transaction.
//! - A failed insert leaves no committed row and no committed counter change.
//! - Duplicate reference ids are rejected by the store, never overwritten.

use crate::db::DbError;
use crate::model::family::{Family, FamilyTag};
use crate::model::record::{RecordId, ReferenceRecord};
use crate::refid::{before_create, table_exists, AllocError, Allocator, FamilyRegistry, HookOutcome};
use log::{debug, error};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RecordRepoResult<T> = Result<T, RecordRepoError>;

/// Allocated ids skipped per insert before giving up on a colliding family.
const MAX_ALLOCATED_COLLISIONS: u32 = 64;

/// Errors from record persistence.
#[derive(Debug)]
pub enum RecordRepoError {
    Db(DbError),
    Alloc(AllocError),
    /// Another record of the family already carries this reference id.
    DuplicateReferenceId(String),
    /// A family table is missing from the connected store.
    MissingRequiredTable(&'static str),
    InvalidData(String),
}

impl Display for RecordRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Alloc(err) => write!(f, "{err}"),
            Self::DuplicateReferenceId(value) => {
                write!(f, "reference id already in use: {value}")
            }
            Self::MissingRequiredTable(table) => {
                write!(f, "record repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for RecordRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Alloc(err) => Some(err),
            Self::DuplicateReferenceId(_) => None,
            Self::MissingRequiredTable(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RecordRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<AllocError> for RecordRepoError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

impl From<rusqlite::Error> for RecordRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for reference-tagged records.
pub trait RecordRepository {
    /// Persists `record` in its own transaction and returns its reference id.
    fn create_record(&self, record: &mut ReferenceRecord) -> RecordRepoResult<String>;
    /// Loads one record by family and reference id.
    fn get_by_reference_id(
        &self,
        family: FamilyTag,
        reference_id: &str,
    ) -> RecordRepoResult<Option<ReferenceRecord>>;
    /// Lists a family's records in insertion order.
    fn list_records(&self, family: FamilyTag) -> RecordRepoResult<Vec<ReferenceRecord>>;
    /// Counts a family's records.
    fn count_records(&self, family: FamilyTag) -> RecordRepoResult<i64>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
    allocator: &'conn Allocator,
}

impl<'conn> SqliteRecordRepository<'conn> {
    /// Creates a repository after checking every family table exists.
    pub fn try_new(conn: &'conn Connection, allocator: &'conn Allocator) -> RecordRepoResult<Self> {
        for family in FamilyRegistry::global().families() {
            if !table_exists(conn, family.table)? {
                return Err(RecordRepoError::MissingRequiredTable(family.table));
            }
        }
        Ok(Self { conn, allocator })
    }

    /// Persists `record` inside a transaction owned by the caller.
    ///
    /// The record's reference id is installed even if the caller later rolls
    /// back, so a retry re-inserts the same id. A supplied id that is already
    /// taken fails with `DuplicateReferenceId`; an allocated one that collides
    /// with an imported id is replaced by the family's next id.
    pub fn create_record_in_tx(
        &self,
        tx: &Transaction<'_>,
        record: &mut ReferenceRecord,
    ) -> RecordRepoResult<String> {
        let family = FamilyRegistry::global().family(record.family)?;
        let mut outcome = before_create(self.allocator, tx, record.family, record)?;
        let mut skipped = 0;

        let reference_id = loop {
            let reference_id = record
                .reference_id
                .clone()
                .ok_or_else(|| RecordRepoError::InvalidData("hook left reference id unset".into()))?;

            let inserted = tx.execute(
                &format!(
                    "INSERT INTO {} (uuid, reference_id, title) VALUES (?1, ?2, ?3);",
                    family.table
                ),
                params![record.uuid.to_string(), reference_id, record.title],
            );
            match inserted {
                Ok(_) => break reference_id,
                // An allocated id can land on a manually imported one; take the next.
                Err(err)
                    if is_unique_violation(&err)
                        && outcome != HookOutcome::Preserved
                        && skipped < MAX_ALLOCATED_COLLISIONS =>
                {
                    skipped += 1;
                    record.reference_id = None;
                    outcome = before_create(self.allocator, tx, record.family, record)?;
                }
                Err(err) if is_unique_violation(&err) => {
                    error!(
                        "event=record_create module=repo status=error family={} error_code=duplicate_reference_id skipped={}",
                        family.prefix, skipped
                    );
                    return Err(RecordRepoError::DuplicateReferenceId(reference_id));
                }
                Err(err) => return Err(err.into()),
            }
        };

        record.created_at = tx
            .query_row(
                &format!("SELECT created_at FROM {} WHERE uuid = ?1;", family.table),
                [record.uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        debug!(
            "event=record_create module=repo status=ok family={} skipped={}",
            family.prefix, skipped
        );
        Ok(reference_id)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn create_record(&self, record: &mut ReferenceRecord) -> RecordRepoResult<String> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let reference_id = self.create_record_in_tx(&tx, record)?;
        tx.commit()?;
        Ok(reference_id)
    }

    fn get_by_reference_id(
        &self,
        family: FamilyTag,
        reference_id: &str,
    ) -> RecordRepoResult<Option<ReferenceRecord>> {
        let family = FamilyRegistry::global().family(family)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT uuid, reference_id, title, created_at
             FROM {}
             WHERE reference_id = ?1;",
            family.table
        ))?;

        let mut rows = stmt.query([reference_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_record_row(family, row)?));
        }
        Ok(None)
    }

    fn list_records(&self, family: FamilyTag) -> RecordRepoResult<Vec<ReferenceRecord>> {
        let family = FamilyRegistry::global().family(family)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT uuid, reference_id, title, created_at
             FROM {}
             ORDER BY rowid ASC;",
            family.table
        ))?;

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(family, row)?);
        }
        Ok(records)
    }

    fn count_records(&self, family: FamilyTag) -> RecordRepoResult<i64> {
        let family = FamilyRegistry::global().family(family)?;
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {};", family.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_record_row(family: &Family, row: &Row<'_>) -> RecordRepoResult<ReferenceRecord> {
    let uuid_text: String = row.get("uuid")?;
    let uuid: RecordId = Uuid::parse_str(&uuid_text).map_err(|_| {
        RecordRepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in {}.uuid",
            family.table
        ))
    })?;

    Ok(ReferenceRecord {
        uuid,
        family: family.tag,
        reference_id: Some(row.get("reference_id")?),
        title: row.get("title")?,
        created_at: Some(row.get("created_at")?),
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}
