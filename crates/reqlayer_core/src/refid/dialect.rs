//! Store dialect probe.
//!
//! Decides which counter strategy a connection can support by inspecting
//! the schema and the linked SQLite library.

use crate::db::DbResult;
use crate::model::family::BUILTIN_FAMILIES;
use rusqlite::Connection;

/// First SQLite release supporting `RETURNING`.
const RETURNING_MIN_VERSION: i32 = 3_035_000;

/// Counter capability of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `ref_sequences` is present and can be advanced in one statement.
    Sequences,
    /// Only record tables exist; numbers derive from row counts.
    RowCount,
    /// Neither; every allocation falls back.
    Unknown,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequences => "sequences",
            Self::RowCount => "row_count",
            Self::Unknown => "unknown",
        }
    }
}

/// Probes `conn` for the strongest supported counter strategy.
pub fn probe_dialect(conn: &Connection) -> DbResult<Dialect> {
    if rusqlite::version_number() >= RETURNING_MIN_VERSION
        && table_exists(conn, "ref_sequences")?
    {
        return Ok(Dialect::Sequences);
    }

    for family in &BUILTIN_FAMILIES {
        if !table_exists(conn, family.table)? {
            return Ok(Dialect::Unknown);
        }
    }
    Ok(Dialect::RowCount)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{probe_dialect, Dialect};
    use crate::db::migrations::{apply_migrations_to, ROW_COUNT_SCHEMA_VERSION};
    use crate::db::open_db_in_memory;
    use rusqlite::Connection;

    #[test]
    fn migrated_store_supports_sequences() {
        let conn = open_db_in_memory().unwrap();
        assert_eq!(probe_dialect(&conn).unwrap(), Dialect::Sequences);
    }

    #[test]
    fn legacy_store_uses_row_counts() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations_to(&mut conn, ROW_COUNT_SCHEMA_VERSION).unwrap();
        assert_eq!(probe_dialect(&conn).unwrap(), Dialect::RowCount);
    }

    #[test]
    fn empty_store_is_unknown() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(probe_dialect(&conn).unwrap(), Dialect::Unknown);
    }
}
