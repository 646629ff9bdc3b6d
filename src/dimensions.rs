//! Declarative catalog of the star schema.
//!
//! Every dimension is described by a [`DimensionSpec`] entry rather than by
//! per-dimension code paths, so adding a dimension to the schema is a new
//! catalog row plus a DDL change, not new logic.

use serde::{Deserialize, Serialize};

/// One row of a dimension reference set, as extracted from the metadata
/// source. Upserted by `key`; re-extraction may refresh title/description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub key: String,
    pub title: String,
    pub description: Option<String>,
}

/// Where one dimension comes from and where it lands.
///
/// `section` doubles as the metadata section name and the fact source's
/// key column header; `fk_column` is the fact table's foreign-key column.
#[derive(Debug, Clone, Copy)]
pub struct DimensionSpec {
    pub section: &'static str,
    pub table: &'static str,
    pub fk_column: &'static str,
}

/// Number of dimensions a fact references.
pub const DIMENSION_COUNT: usize = 6;

/// Number of measurement columns per fact.
pub const MEASURE_COUNT: usize = 6;

/// The six dimensions, in canonical order. This order is load-bearing: it
/// fixes the foreign-key column order in the fact table and the key order
/// fed to the fact identity hash.
pub const DIMENSIONS: [DimensionSpec; DIMENSION_COUNT] = [
    DimensionSpec {
        section: "TravelMotives",
        table: "dim_travel_motives",
        fk_column: "travel_motive_key",
    },
    DimensionSpec {
        section: "Population",
        table: "dim_population",
        fk_column: "population_key",
    },
    DimensionSpec {
        section: "TravelModes",
        table: "dim_travel_modes",
        fk_column: "travel_mode_key",
    },
    DimensionSpec {
        section: "Margins",
        table: "dim_margins",
        fk_column: "margin_key",
    },
    DimensionSpec {
        section: "RegionCharacteristics",
        table: "dim_regions",
        fk_column: "region_key",
    },
    DimensionSpec {
        section: "Periods",
        table: "dim_periods",
        fk_column: "period_key",
    },
];

/// Fact table name.
pub const FACT_TABLE: &str = "fact_mobility";

/// Measurement column headers in the fact source file, in the order they
/// map onto [`MEASURE_COLUMNS`].
pub const MEASURE_SOURCE_COLUMNS: [&str; MEASURE_COUNT] = [
    "Trips_1",
    "DistanceTravelled_2",
    "TimeTravelled_3",
    "Trips_4",
    "DistanceTravelled_5",
    "TimeTravelled_6",
];

/// Measurement columns in the fact table. Daily and yearly variants are
/// independent columns; the source reports both in original units.
pub const MEASURE_COLUMNS: [&str; MEASURE_COUNT] = [
    "trips_daily",
    "distance_daily",
    "time_daily",
    "trips_yearly",
    "distance_yearly",
    "time_yearly",
];

/// Shared audit column on every dimension and fact row.
pub const INGESTED_AT_COLUMN: &str = "ingested_at";
