//! ETL pipeline materializing the ODiN mobility extract into a relational
//! star schema with idempotent re-ingestion semantics.

pub mod cleanse;
pub mod config;
pub mod db;
pub mod dimensions;
pub mod error;
pub mod idempotency;
pub mod loader;
pub mod logging;
pub mod metadata;
pub mod pipeline;
