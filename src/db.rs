use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use crate::dimensions::{DIMENSIONS, FACT_TABLE};
use crate::error::{EtlError, Result};

/// Handle on the relational store holding the star schema.
///
/// The pipeline assumes exclusive write ownership of the schema for the
/// duration of a run; there is no application-level locking.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Applies the fixed star-schema DDL. This is the external provisioning
    /// step made invocable; the pipeline itself never creates tables.
    pub fn run_migrations(&self) -> Result<()> {
        info!("Applying star-schema DDL");
        self.conn
            .execute_batch(include_str!("../migrations/001_create_star_schema.sql"))?;
        Ok(())
    }

    /// Verifies that every table of the star schema exists. Called before
    /// any write; an absent table is a configuration error, not something
    /// the pipeline repairs on the fly.
    pub fn ensure_provisioned(&self) -> Result<()> {
        for table in DIMENSIONS.iter().map(|d| d.table).chain([FACT_TABLE]) {
            let present: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table],
                |row| row.get(0),
            )?;
            if !present {
                return Err(EtlError::SchemaMissing(table.to_string()));
            }
        }
        Ok(())
    }

    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub(crate) fn transaction(&mut self) -> rusqlite::Result<rusqlite::Transaction<'_>> {
        self.conn.transaction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprovisioned_store_is_detected() {
        let store = Store::open_in_memory().unwrap();
        let err = store.ensure_provisioned().unwrap_err();
        assert!(matches!(err, EtlError::SchemaMissing(_)));
    }

    #[test]
    fn migrations_provision_the_full_schema() {
        let store = Store::open_in_memory().unwrap();
        store.run_migrations().unwrap();
        store.ensure_provisioned().unwrap();
        assert_eq!(store.count_rows(FACT_TABLE).unwrap(), 0);
    }

    #[test]
    fn migrations_are_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.run_migrations().unwrap();
        store.run_migrations().unwrap();
        store.ensure_provisioned().unwrap();
    }
}
