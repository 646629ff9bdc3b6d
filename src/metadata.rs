//! Metadata extraction.
//!
//! The metadata source is a single semi-structured file holding several
//! dimension tables. Each table sits under a section header: a line that
//! carries nothing but the quoted section name, followed by a regular
//! delimited block with `Key`/`Title`/`Description` columns. Extraction is
//! a pure parse; it performs no I/O beyond reading the source.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::dimensions::{DimensionRecord, DIMENSIONS};
use crate::error::{EtlError, Result};

// A section header is a line holding a single quoted name, tolerating a
// UTF-8 BOM on the first line and stray surrounding whitespace.
static SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*\x{FEFF}?"([^"]+)"\s*$"#).unwrap());

#[derive(Debug, Deserialize)]
struct MetadataRow {
    #[serde(rename = "Key")]
    key: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
}

/// Parses the sectioned metadata source into one record set per declared
/// dimension.
pub struct MetadataExtractor {
    separator: u8,
}

impl MetadataExtractor {
    pub fn new(separator: u8) -> Self {
        Self { separator }
    }

    /// Reads and parses the metadata file.
    ///
    /// A dimension that is declared in the catalog but yields zero records
    /// is a fatal configuration error: without it there is no target for
    /// the fact table's foreign keys. Sections the catalog does not declare
    /// are ignored.
    pub fn extract(&self, path: &Path) -> Result<HashMap<&'static str, Vec<DimensionRecord>>> {
        let content = fs::read_to_string(path)?;
        self.extract_from_str(&content)
    }

    pub fn extract_from_str(
        &self,
        content: &str,
    ) -> Result<HashMap<&'static str, Vec<DimensionRecord>>> {
        // Section name plus the byte range of its header line.
        let sections: Vec<(&str, usize, usize)> = SECTION_RE
            .captures_iter(content)
            .map(|caps| {
                let whole = caps.get(0).unwrap();
                (caps.get(1).unwrap().as_str(), whole.start(), whole.end())
            })
            .collect();

        let mut extracted = HashMap::with_capacity(DIMENSIONS.len());
        for spec in &DIMENSIONS {
            let position = sections
                .iter()
                .position(|(name, _, _)| *name == spec.section)
                .ok_or(EtlError::EmptyDimension(spec.section))?;

            let body_start = sections[position].2;
            let body_end = sections
                .get(position + 1)
                .map(|(_, start, _)| *start)
                .unwrap_or(content.len());

            let records = self.parse_section(&content[body_start..body_end])?;
            if records.is_empty() {
                return Err(EtlError::EmptyDimension(spec.section));
            }
            debug!(
                dimension = spec.section,
                records = records.len(),
                "extracted dimension section"
            );
            extracted.insert(spec.section, records);
        }

        Ok(extracted)
    }

    fn parse_section(&self, body: &str) -> Result<Vec<DimensionRecord>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.separator)
            .flexible(true)
            .from_reader(body.trim().as_bytes());

        let mut records = Vec::new();
        for row in reader.deserialize::<MetadataRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "skipping malformed metadata row");
                    continue;
                }
            };
            let Some(key) = normalize(row.key) else {
                continue;
            };
            let Some(title) = normalize(row.title) else {
                warn!(key = %key, "skipping metadata row without a title");
                continue;
            };
            records.push(DimensionRecord {
                key,
                title,
                description: normalize(row.description),
            });
        }
        Ok(records)
    }
}

/// Trims a raw metadata cell; blank cells count as absent.
fn normalize(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, rows: &[(&str, &str, &str)]) -> String {
        let mut out = format!("\"{name}\"\n\"Key\";\"Title\";\"Description\"\n");
        for (key, title, description) in rows {
            out.push_str(&format!("\"{key}\";\"{title}\";\"{description}\"\n"));
        }
        out
    }

    fn sample_metadata() -> String {
        let mut content = String::from("\u{feff}");
        content.push_str(&section(
            "TravelMotives",
            &[("T001", "Total", "All motives"), ("W001", "Work", "")],
        ));
        content.push_str(&section("Population", &[("P1", "All persons", "")]));
        content.push_str(&section(
            "TravelModes",
            &[("B", "Bike", "Pedal cycles"), ("C", "Car", "")],
        ));
        content.push_str(&section("Margins", &[("MW", "Value", "")]));
        content.push_str(&section("RegionCharacteristics", &[("NL01", "Nederland", "")]));
        content.push_str(&section("Periods", &[("2022JJ00", "2022", "")]));
        content
    }

    #[test]
    fn extracts_all_declared_dimensions() {
        let extractor = MetadataExtractor::new(b';');
        let dimensions = extractor.extract_from_str(&sample_metadata()).unwrap();

        assert_eq!(dimensions.len(), DIMENSIONS.len());
        let motives = &dimensions["TravelMotives"];
        assert_eq!(motives.len(), 2);
        assert_eq!(motives[0].key, "T001");
        assert_eq!(motives[0].title, "Total");
        assert_eq!(motives[0].description.as_deref(), Some("All motives"));
    }

    #[test]
    fn blank_description_becomes_none() {
        let extractor = MetadataExtractor::new(b';');
        let dimensions = extractor.extract_from_str(&sample_metadata()).unwrap();
        assert_eq!(dimensions["TravelMotives"][1].description, None);
    }

    #[test]
    fn missing_section_is_fatal() {
        let content = sample_metadata().replace("\"Periods\"", "\"SomethingElse\"");
        let extractor = MetadataExtractor::new(b';');
        let err = extractor.extract_from_str(&content).unwrap_err();
        assert!(matches!(err, EtlError::EmptyDimension("Periods")));
    }

    #[test]
    fn section_with_no_rows_is_fatal() {
        let content = sample_metadata().replace(
            &section("Margins", &[("MW", "Value", "")]),
            "\"Margins\"\n\"Key\";\"Title\";\"Description\"\n",
        );
        let extractor = MetadataExtractor::new(b';');
        let err = extractor.extract_from_str(&content).unwrap_err();
        assert!(matches!(err, EtlError::EmptyDimension("Margins")));
    }

    #[test]
    fn undeclared_sections_are_ignored() {
        let mut content = sample_metadata();
        content.push_str(&section("DataProperties", &[("X", "Irrelevant", "")]));
        let extractor = MetadataExtractor::new(b';');
        let dimensions = extractor.extract_from_str(&content).unwrap();
        assert_eq!(dimensions.len(), DIMENSIONS.len());
        assert!(!dimensions.contains_key("DataProperties"));
    }

    #[test]
    fn rows_without_keys_are_skipped() {
        let content = sample_metadata().replace(
            "\"W001\";\"Work\";\"\"",
            "\"\";\"Orphan title\";\"\"",
        );
        let extractor = MetadataExtractor::new(b';');
        let dimensions = extractor.extract_from_str(&content).unwrap();
        assert_eq!(dimensions["TravelMotives"].len(), 1);
    }
}
