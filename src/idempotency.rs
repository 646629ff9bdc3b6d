use sha2::{Digest, Sha256};

use crate::dimensions::DIMENSION_COUNT;

/// Computes the deterministic fact identity.
///
/// The identity is the lowercase hex SHA-256 of the six dimension keys
/// joined with `|` in canonical column order. It is a pure function of the
/// keys: measurement values never participate, so re-ingesting a source
/// where only measurements changed overwrites the same row in place.
pub fn compute_fact_id(keys: &[String; DIMENSION_COUNT]) -> String {
    // Simple canonical string; the key order is fixed by the catalog
    let canonical = keys.join("|");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
