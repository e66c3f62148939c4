//! Deterministic identifiers for text positions and annotation spans.
//!
//! An [`AnchorGenerator`] belongs to one document-processing run. It is
//! [`reset`](AnchorGenerator::reset) at the start of the run with a seed (the
//! document name) and the number of ids the run expects to create, which
//! sizes the ids so collisions stay rare while ids stay short. The same seed
//! and count always give the same id sequence.
//!
//! A generator that was never reset uses [`DEFAULT_ID_LENGTH`] digits. That
//! length is not sized for the document, so large documents must reset first.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Hex digits per id before the first reset.
pub const DEFAULT_ID_LENGTH: usize = 10;

// Ids are drawn from one u64
const MAX_ID_LENGTH: usize = 16;

#[derive(Debug, Clone)]
pub struct AnchorGenerator {
    rng: StdRng,
    length: usize,
}

impl AnchorGenerator {
    /// A generator already reset for `seed` and `expected_count`.
    pub fn seeded(seed: &str, expected_count: usize) -> Self {
        let mut generator = Self::default();
        generator.reset(seed, expected_count);
        generator
    }

    /// Restart the id sequence for a new run.
    ///
    /// With `expected_count > 0` the id length becomes
    /// `int(log16(expected_count) + 1.5)` hex digits; `0` keeps the default.
    pub fn reset(&mut self, seed: &str, expected_count: usize) {
        self.length = id_length(expected_count);
        self.rng = rng_for(seed);
    }

    /// Number of hex digits in generated ids (excluding the prefix).
    pub fn id_length(&self) -> usize {
        self.length
    }

    /// Draw `prefix` + random hex digits until the result is not in `existing`.
    ///
    /// The new id is not added to `existing`.
    pub fn next_id(&mut self, prefix: &str, existing: &FxHashSet<String>) -> Result<String> {
        if self.is_exhausted(prefix, existing) {
            return Err(StoreError::IdSpaceExhausted {
                prefix: prefix.to_string(),
                length: self.length,
            });
        }
        loop {
            let id = self.draw(prefix);
            if !existing.contains(&id) {
                return Ok(id);
            }
        }
    }

    /// `count` distinct ids, one per span of an annotation.
    pub fn ids(&mut self, prefix: &str, count: usize) -> Result<Vec<String>> {
        let mut used = FxHashSet::default();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.next_id(prefix, &used)?;
            used.insert(id.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    fn draw(&mut self, prefix: &str) -> String {
        let bits = self.length * 4;
        let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let n = self.rng.next_u64() & mask;
        format!("{}{:0width$x}", prefix, n, width = self.length)
    }

    fn is_exhausted(&self, prefix: &str, existing: &FxHashSet<String>) -> bool {
        let space = 1u128 << (self.length * 4);
        if (existing.len() as u128) < space {
            return false;
        }
        let taken = existing
            .iter()
            .filter(|id| {
                id.len() == prefix.len() + self.length
                    && id.starts_with(prefix)
                    && id[prefix.len()..].bytes().all(|b| b.is_ascii_hexdigit())
            })
            .count();
        taken as u128 >= space
    }
}

impl Default for AnchorGenerator {
    fn default() -> Self {
        Self {
            rng: rng_for(""),
            length: DEFAULT_ID_LENGTH,
        }
    }
}

/// One id per document, each seeded by the document name.
///
/// Documents are processed in sorted order and ids of documents listed in
/// `keep` are reused, so adding documents to a corpus does not renumber the
/// old ones. Returns `(document, id)` pairs in sorted document order.
pub fn document_ids(
    documents: &[String],
    prefix: &str,
    keep: &[(String, String)],
) -> Result<Vec<(String, String)>> {
    let mut sorted: Vec<&String> = documents.iter().collect();
    sorted.sort();
    let expected = documents.len() * 2;
    let mut used: FxHashSet<String> = keep.iter().map(|(_, id)| id.clone()).collect();
    let mut assigned = Vec::with_capacity(sorted.len());
    for document in sorted {
        if let Some((_, id)) = keep.iter().find(|(doc, _)| doc == document) {
            assigned.push((document.clone(), id.clone()));
            continue;
        }
        let mut generator = AnchorGenerator::seeded(document, expected);
        let id = generator.next_id(prefix, &used)?;
        used.insert(id.clone());
        assigned.push((document.clone(), id));
    }
    Ok(assigned)
}

fn id_length(expected_count: usize) -> usize {
    if expected_count == 0 {
        return DEFAULT_ID_LENGTH;
    }
    let digits = (expected_count as f64).log(16.0) + 1.5;
    (digits as usize).clamp(1, MAX_ID_LENGTH)
}

fn rng_for(seed: &str) -> StdRng {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_length() {
        assert_eq!(id_length(0), DEFAULT_ID_LENGTH);
        assert_eq!(id_length(1), 1);
        assert_eq!(id_length(16), 2);
        assert_eq!(id_length(1000), 3);
        assert_eq!(id_length(1_000_000), 6);
        assert_eq!(id_length(usize::MAX), MAX_ID_LENGTH);
    }

    #[test]
    fn test_deterministic_sequence() {
        let a = AnchorGenerator::seeded("doc1", 100).ids("w", 100).unwrap();
        let b = AnchorGenerator::seeded("doc1", 100).ids("w", 100).unwrap();
        assert_eq!(a, b);
        let c = AnchorGenerator::seeded("doc2", 100).ids("w", 100).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut generator = AnchorGenerator::seeded("doc1", 50);
        let first = generator.ids("", 5).unwrap();
        generator.reset("doc1", 50);
        assert_eq!(generator.ids("", 5).unwrap(), first);
    }

    #[test]
    fn test_ids_unique_and_shaped() {
        let ids = AnchorGenerator::seeded("doc", 256).ids("s", 256).unwrap();
        let distinct: FxHashSet<&String> = ids.iter().collect();
        assert_eq!(distinct.len(), 256);
        for id in &ids {
            assert!(id.starts_with('s'));
            assert_eq!(id.len(), 1 + 3);
            assert!(id[1..].bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_next_id_avoids_existing() {
        // One hex digit: 16 possible ids, 15 already taken
        let mut generator = AnchorGenerator::seeded("doc", 1);
        let existing: FxHashSet<String> = (0..15).map(|n| format!("{:x}", n)).collect();
        assert_eq!(generator.next_id("", &existing).unwrap(), "f");
    }

    #[test]
    fn test_exhausted_space_fails() {
        let mut generator = AnchorGenerator::seeded("doc", 1);
        let existing: FxHashSet<String> = (0..16).map(|n| format!("p{:x}", n)).collect();
        assert!(matches!(
            generator.next_id("p", &existing),
            Err(StoreError::IdSpaceExhausted { length: 1, .. })
        ));
        // Ids with another prefix do not count against the space
        assert!(generator.next_id("q", &existing).is_ok());
    }

    #[test]
    fn test_default_length_before_reset() {
        let mut generator = AnchorGenerator::default();
        assert_eq!(generator.id_length(), DEFAULT_ID_LENGTH);
        let id = generator.next_id("", &FxHashSet::default()).unwrap();
        assert_eq!(id.len(), DEFAULT_ID_LENGTH);
    }

    #[test]
    fn test_document_ids() {
        let docs = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let ids = document_ids(&docs, "d", &[]).unwrap();
        assert_eq!(ids.iter().map(|(d, _)| d.as_str()).collect::<Vec<_>>(), ["a", "b", "c"]);
        let distinct: FxHashSet<&String> = ids.iter().map(|(_, id)| id).collect();
        assert_eq!(distinct.len(), 3);

        // Existing ids survive and the rest are unchanged
        let keep = vec![("b".to_string(), "dfixed".to_string())];
        let again = document_ids(&docs, "d", &keep).unwrap();
        assert_eq!(again[1].1, "dfixed");
        assert_eq!(again[0], ids[0]);
    }
}
