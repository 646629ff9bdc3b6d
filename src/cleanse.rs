//! Fact cleansing.
//!
//! Raw observation rows are validated against the in-memory view of the
//! dimension keys and their measurement cells coerced to numbers before
//! anything touches the store. Rejections are data-quality defects, not
//! fatal errors: each one is logged and counted and the pass continues.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecordsIntoIter};
use tracing::{debug, warn};

use crate::dimensions::{
    DimensionRecord, DIMENSIONS, DIMENSION_COUNT, MEASURE_COUNT, MEASURE_SOURCE_COLUMNS,
};
use crate::error::{EtlError, Result};

/// Valid keys per dimension, built from the extracted metadata after the
/// dimensions have been materialized. Lets the cleanser reject rows that
/// would fail the store's foreign-key constraints before they are written.
pub struct DimensionKeyView {
    sets: HashMap<&'static str, HashSet<String>>,
}

impl DimensionKeyView {
    pub fn from_records(dimensions: &HashMap<&'static str, Vec<DimensionRecord>>) -> Self {
        let mut sets = HashMap::with_capacity(DIMENSION_COUNT);
        for spec in &DIMENSIONS {
            let keys = dimensions
                .get(spec.section)
                .map(|records| records.iter().map(|r| r.key.clone()).collect())
                .unwrap_or_default();
            sets.insert(spec.section, keys);
        }
        Self { sets }
    }

    pub fn resolves(&self, section: &str, key: &str) -> bool {
        self.sets.get(section).map_or(false, |keys| keys.contains(key))
    }
}

/// A validated observation, ready for the loader. Never mutated after the
/// cleanser emits it.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanFact {
    /// Dimension keys in the canonical [`DIMENSIONS`] order.
    pub keys: [String; DIMENSION_COUNT],
    /// Measurements in [`crate::dimensions::MEASURE_COLUMNS`] order.
    pub measures: [Option<f64>; MEASURE_COUNT],
}

/// Counts accumulated over one cleansing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanseStats {
    pub rows_read: u64,
    pub rows_rejected: u64,
    pub rows_dropped_empty: u64,
}

/// Lazy cleanser over the raw fact source.
///
/// [`FactCleanser::rows`] opens a fresh pass each time it is called, so
/// cleansing is restartable: re-reading the source is always safe and
/// yields the same records.
pub struct FactCleanser<'a> {
    path: PathBuf,
    separator: u8,
    keys: &'a DimensionKeyView,
}

impl<'a> FactCleanser<'a> {
    pub fn new<P: AsRef<Path>>(path: P, separator: u8, keys: &'a DimensionKeyView) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            separator,
            keys,
        }
    }

    /// Opens the fact source and returns a lazy pass over its rows.
    ///
    /// Fails only on configuration-level problems: an unreadable file or a
    /// header that lacks one of the expected columns. Row-level defects are
    /// handled during iteration.
    pub fn rows(&self) -> Result<CleanseRows<'a>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.separator)
            .flexible(true)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        let find = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                EtlError::Config(format!("fact source is missing column '{name}'"))
            })
        };

        let mut key_columns = [0usize; DIMENSION_COUNT];
        for (i, spec) in DIMENSIONS.iter().enumerate() {
            key_columns[i] = find(spec.section)?;
        }
        let mut measure_columns = [0usize; MEASURE_COUNT];
        for (i, name) in MEASURE_SOURCE_COLUMNS.iter().enumerate() {
            measure_columns[i] = find(name)?;
        }

        Ok(CleanseRows {
            records: reader.into_records(),
            key_columns,
            measure_columns,
            keys: self.keys,
            stats: CleanseStats::default(),
            row: 0,
        })
    }
}

/// One lazy pass over the fact source. Yields cleansed facts; rejected and
/// empty rows are counted in [`CleanseRows::stats`] as they are skipped.
pub struct CleanseRows<'a> {
    records: StringRecordsIntoIter<File>,
    key_columns: [usize; DIMENSION_COUNT],
    measure_columns: [usize; MEASURE_COUNT],
    keys: &'a DimensionKeyView,
    stats: CleanseStats,
    row: u64,
}

impl std::fmt::Debug for CleanseRows<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanseRows")
            .field("key_columns", &self.key_columns)
            .field("measure_columns", &self.measure_columns)
            .field("stats", &self.stats)
            .field("row", &self.row)
            .finish_non_exhaustive()
    }
}

impl CleanseRows<'_> {
    pub fn stats(&self) -> CleanseStats {
        self.stats
    }
}

impl Iterator for CleanseRows<'_> {
    type Item = CleanFact;

    fn next(&mut self) -> Option<CleanFact> {
        loop {
            let record = self.records.next()?;
            self.row += 1;
            self.stats.rows_read += 1;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.stats.rows_rejected += 1;
                    warn!(row = self.row, error = %e, "rejecting fact row: malformed record");
                    continue;
                }
            };

            let mut keys: [String; DIMENSION_COUNT] = Default::default();
            let mut resolved = true;
            for (i, spec) in DIMENSIONS.iter().enumerate() {
                let raw = record.get(self.key_columns[i]).unwrap_or("").trim();
                if raw.is_empty() {
                    warn!(
                        row = self.row,
                        column = spec.section,
                        "rejecting fact row: missing dimension key"
                    );
                    resolved = false;
                    break;
                }
                if !self.keys.resolves(spec.section, raw) {
                    warn!(
                        row = self.row,
                        column = spec.section,
                        key = raw,
                        "rejecting fact row: unknown dimension key"
                    );
                    resolved = false;
                    break;
                }
                keys[i] = raw.to_string();
            }
            if !resolved {
                self.stats.rows_rejected += 1;
                continue;
            }

            let mut measures = [None; MEASURE_COUNT];
            let mut any_present = false;
            for (i, column) in self.measure_columns.iter().enumerate() {
                let value = parse_measure(record.get(*column).unwrap_or(""));
                any_present |= value.is_some();
                measures[i] = value;
            }
            if !any_present {
                self.stats.rows_dropped_empty += 1;
                debug!(row = self.row, "dropping fact row: all measurements missing");
                continue;
            }

            return Some(CleanFact { keys, measures });
        }
    }
}

/// Coerces one raw measurement cell. Blank cells and the source's `.`
/// missing-value token are missing; unparseable or negative values are
/// likewise treated as missing rather than rejecting the row, since partial
/// measurements are valid under the source's sampling conventions.
fn parse_measure(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn key_view() -> DimensionKeyView {
        let mut dimensions = HashMap::new();
        let record = |key: &str| DimensionRecord {
            key: key.to_string(),
            title: key.to_string(),
            description: None,
        };
        dimensions.insert("TravelMotives", vec![record("T001")]);
        dimensions.insert("Population", vec![record("P1")]);
        dimensions.insert("TravelModes", vec![record("B"), record("C")]);
        dimensions.insert("Margins", vec![record("MW")]);
        dimensions.insert("RegionCharacteristics", vec![record("NL01")]);
        dimensions.insert("Periods", vec![record("2022JJ00")]);
        DimensionKeyView::from_records(&dimensions)
    }

    fn fact_source(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "TravelMotives;Population;TravelModes;Margins;RegionCharacteristics;Periods;\
             Trips_1;DistanceTravelled_2;TimeTravelled_3;Trips_4;DistanceTravelled_5;TimeTravelled_6"
        )
        .unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn valid_row_is_cleansed() {
        let view = key_view();
        let source = fact_source(&["T001;P1;B;MW;NL01;2022JJ00;0.8;2.5;10.1;292;912.5;3686.5"]);
        let cleanser = FactCleanser::new(source.path(), b';', &view);

        let mut rows = cleanser.rows().unwrap();
        let fact = rows.next().unwrap();
        assert_eq!(fact.keys[0], "T001");
        assert_eq!(fact.keys[5], "2022JJ00");
        assert_eq!(fact.measures[0], Some(0.8));
        assert_eq!(fact.measures[3], Some(292.0));
        assert!(rows.next().is_none());

        let stats = rows.stats();
        assert_eq!(stats.rows_read, 1);
        assert_eq!(stats.rows_rejected, 0);
    }

    #[test]
    fn unknown_key_rejects_the_row() {
        let view = key_view();
        let source = fact_source(&[
            "W001;P1;B;MW;NL01;2022JJ00;0.8;2.5;10.1;292;912.5;3686.5",
            "T001;P1;C;MW;NL01;2022JJ00;0.1;;;36;;",
        ]);
        let cleanser = FactCleanser::new(source.path(), b';', &view);

        let mut rows = cleanser.rows().unwrap();
        let facts: Vec<_> = (&mut rows).collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].keys[2], "C");

        let stats = rows.stats();
        assert_eq!(stats.rows_read, 2);
        assert_eq!(stats.rows_rejected, 1);
    }

    #[test]
    fn missing_value_tokens_become_none() {
        let view = key_view();
        let source = fact_source(&["T001;P1;B;MW;NL01;2022JJ00;.;;x9;-1;912.5;"]);
        let cleanser = FactCleanser::new(source.path(), b';', &view);

        let fact = cleanser.rows().unwrap().next().unwrap();
        assert_eq!(
            fact.measures,
            [None, None, None, None, Some(912.5), None]
        );
    }

    #[test]
    fn all_null_measurements_drop_the_row() {
        let view = key_view();
        let source = fact_source(&["T001;P1;B;MW;NL01;2022JJ00;.;.;.;;;"]);
        let cleanser = FactCleanser::new(source.path(), b';', &view);

        let mut rows = cleanser.rows().unwrap();
        assert!(rows.next().is_none());

        let stats = rows.stats();
        assert_eq!(stats.rows_read, 1);
        assert_eq!(stats.rows_dropped_empty, 1);
        assert_eq!(stats.rows_rejected, 0);
    }

    #[test]
    fn passes_are_restartable_and_deterministic() {
        let view = key_view();
        let source = fact_source(&[
            "T001;P1;B;MW;NL01;2022JJ00;0.8;2.5;10.1;292;912.5;3686.5",
            "T001;P1;C;MW;NL01;2022JJ00;0.1;;;36;;",
        ]);
        let cleanser = FactCleanser::new(source.path(), b';', &view);

        let first: Vec<_> = cleanser.rows().unwrap().collect();
        let second: Vec<_> = cleanser.rows().unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn missing_header_column_is_a_config_error() {
        let view = key_view();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "TravelMotives;Population").unwrap();
        let cleanser = FactCleanser::new(file.path(), b';', &view);
        let err = cleanser.rows().unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
