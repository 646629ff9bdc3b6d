//! Pipeline orchestration.
//!
//! Sequences extraction, materialization, cleansing and loading inside one
//! logical unit of work and folds the outcome into a single pass/fail
//! result with aggregate counts. Partial progress from earlier successful
//! runs is never rolled back; the idempotent upserts of the next invocation
//! are the recovery mechanism.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::cleanse::{DimensionKeyView, FactCleanser};
use crate::config::SourceConfig;
use crate::db::Store;
use crate::dimensions::DIMENSIONS;
use crate::error::{EtlError, Result};
use crate::loader::{DimensionMaterializer, FactLoader};
use crate::metadata::MetadataExtractor;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Overall timeout budget supplied by the caller. Checked between phases
/// and between batches; never interrupts a batch mid-transaction, so an
/// exceeded budget aborts without flushing a partial batch.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn check(&self, phase: &'static str) -> Result<()> {
        match self.0 {
            Some(at) if Instant::now() >= at => Err(EtlError::Timeout(phase)),
            _ => Ok(()),
        }
    }
}

/// Aggregate counts reported to the invoking process after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rows_read: u64,
    pub rows_rejected: u64,
    pub rows_dropped_empty: u64,
    pub rows_loaded: u64,
    pub dimensions_loaded: BTreeMap<String, usize>,
}

/// The ETL pipeline: metadata extraction, dimension materialization, fact
/// cleansing and fact loading, in referential-integrity order.
pub struct Pipeline {
    source: SourceConfig,
    batch_size: usize,
}

impl Pipeline {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs the pipeline to completion against an already-provisioned
    /// store. Every dimension is committed before the first fact batch is
    /// loaded, so no fact can reference a key the store does not hold.
    pub fn run(&self, store: &mut Store, deadline: &Deadline) -> Result<RunSummary> {
        info!("ODiN mobility ETL - starting");
        store.ensure_provisioned()?;
        let ingested_at = Utc::now().to_rfc3339();

        // Extract
        let extractor = MetadataExtractor::new(self.source.separator);
        let dimensions = extractor.extract(&self.source.metadata_path)?;
        info!(sections = dimensions.len(), "metadata extracted");
        deadline.check("dimension materialization")?;

        // Materialize all dimensions before any fact load
        let mut dimensions_loaded = BTreeMap::new();
        {
            let mut materializer = DimensionMaterializer::new(store);
            for spec in &DIMENSIONS {
                let records = &dimensions[spec.section];
                let rows = materializer.materialize(spec, records, &ingested_at)?;
                info!(dimension = spec.table, rows, "dimension loaded");
                dimensions_loaded.insert(spec.table.to_string(), rows);
                deadline.check("dimension materialization")?;
            }
        }

        // Cleanse and load facts in fixed-size batches
        let key_view = DimensionKeyView::from_records(&dimensions);
        let cleanser = FactCleanser::new(&self.source.data_path, self.source.separator, &key_view);
        let mut rows = cleanser.rows()?;

        let mut loader = FactLoader::new(store);
        let mut rows_loaded = 0u64;
        let mut next_row = 1u64;
        loop {
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                match rows.next() {
                    Some(fact) => batch.push(fact),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            deadline.check("fact loading")?;
            rows_loaded += loader.load_batch(&batch, next_row, &ingested_at)? as u64;
            next_row += batch.len() as u64;
        }

        let stats = rows.stats();
        let summary = RunSummary {
            rows_read: stats.rows_read,
            rows_rejected: stats.rows_rejected,
            rows_dropped_empty: stats.rows_dropped_empty,
            rows_loaded,
            dimensions_loaded,
        };
        info!(
            rows_read = summary.rows_read,
            rows_rejected = summary.rows_rejected,
            rows_dropped_empty = summary.rows_dropped_empty,
            rows_loaded = summary.rows_loaded,
            "ODiN mobility ETL - completed"
        );
        Ok(summary)
    }
}
