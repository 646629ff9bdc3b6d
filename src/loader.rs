//! Dimension materialization and fact loading.
//!
//! Both writers speak the same upsert dialect: `INSERT ... ON CONFLICT DO
//! UPDATE SET col = excluded.col`, keyed on the natural key for dimensions
//! and on the deterministic `fact_id` for facts. Re-running a load against
//! unchanged input therefore leaves the store unchanged apart from the
//! refreshed audit timestamps.

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::debug;

use crate::cleanse::CleanFact;
use crate::db::Store;
use crate::dimensions::{
    DimensionSpec, DIMENSIONS, DIMENSION_COUNT, FACT_TABLE, INGESTED_AT_COLUMN, MEASURE_COLUMNS,
    MEASURE_COUNT,
};
use crate::error::{EtlError, Result};
use crate::idempotency::compute_fact_id;

fn upsert_sql(table: &str, columns: &[&str], conflict: &str, update_columns: &[&str]) -> String {
    let cols = columns.join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = update_columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({cols}) VALUES ({placeholders}) \
         ON CONFLICT({conflict}) DO UPDATE SET {updates}"
    )
}

fn fact_upsert_sql() -> String {
    let mut columns: Vec<&str> = Vec::with_capacity(2 + DIMENSION_COUNT + MEASURE_COUNT);
    columns.push("fact_id");
    columns.extend(DIMENSIONS.iter().map(|spec| spec.fk_column));
    columns.extend(MEASURE_COLUMNS);
    columns.push(INGESTED_AT_COLUMN);

    let mut update_columns: Vec<&str> = MEASURE_COLUMNS.to_vec();
    update_columns.push(INGESTED_AT_COLUMN);

    upsert_sql(FACT_TABLE, &columns, "fact_id", &update_columns)
}

/// Upserts extracted dimension records into their tables.
///
/// Must run to completion for every dimension before any fact referencing
/// them is loaded; a failure here aborts the pipeline before fact loading.
pub struct DimensionMaterializer<'a> {
    store: &'a mut Store,
}

impl<'a> DimensionMaterializer<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Upserts one dimension's record set inside a single transaction.
    /// A known key is refreshed in place; a new key is inserted; duplicate
    /// keys cannot arise.
    pub fn materialize(
        &mut self,
        spec: &DimensionSpec,
        records: &[crate::dimensions::DimensionRecord],
        ingested_at: &str,
    ) -> Result<usize> {
        let sql = upsert_sql(
            spec.table,
            &["key", "title", "description", INGESTED_AT_COLUMN],
            "key",
            &["title", "description", INGESTED_AT_COLUMN],
        );

        let tx = self.store.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                stmt.execute(rusqlite::params![
                    record.key,
                    record.title,
                    record.description,
                    ingested_at
                ])?;
            }
        }
        tx.commit()?;

        debug!(table = spec.table, rows = records.len(), "dimension materialized");
        Ok(records.len())
    }
}

/// Upserts cleansed facts in fixed-size batches.
pub struct FactLoader<'a> {
    store: &'a mut Store,
    sql: String,
}

impl<'a> FactLoader<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self {
            store,
            sql: fact_upsert_sql(),
        }
    }

    /// Upserts one batch inside its own transaction.
    ///
    /// `start_row` is the ordinal of the batch's first cleansed row, used
    /// to identify the offending range when the batch fails. A failed
    /// batch rolls back in full; commits from earlier batches stand.
    pub fn load_batch(
        &mut self,
        batch: &[CleanFact],
        start_row: u64,
        ingested_at: &str,
    ) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let end_row = start_row + batch.len() as u64 - 1;

        let FactLoader { store, sql } = self;
        let committed: rusqlite::Result<()> = (|| {
            let tx = store.transaction()?;
            {
                let mut stmt = tx.prepare(sql)?;
                for fact in batch {
                    stmt.execute(params_from_iter(fact_values(fact, ingested_at)))?;
                }
            }
            tx.commit()
        })();
        committed.map_err(|source| EtlError::BatchLoad {
            start_row,
            end_row,
            source,
        })?;

        debug!(start_row, end_row, rows = batch.len(), "fact batch committed");
        Ok(batch.len())
    }
}

fn fact_values(fact: &CleanFact, ingested_at: &str) -> Vec<Value> {
    let mut values = Vec::with_capacity(2 + DIMENSION_COUNT + MEASURE_COUNT);
    values.push(Value::Text(compute_fact_id(&fact.keys)));
    for key in &fact.keys {
        values.push(Value::Text(key.clone()));
    }
    for measure in &fact.measures {
        values.push(measure.map(Value::Real).unwrap_or(Value::Null));
    }
    values.push(Value::Text(ingested_at.to_string()));
    values
}
