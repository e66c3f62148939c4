//! Several annotations treated as one stream
//!
//! Some logical annotations are stored as several element streams (a token
//! layer assembled from different source elements, say). A [`CombinedName`]
//! lists them; reading merges the per-name span files in document order,
//! `(start, -end)`, with ties broken by the position of the name in the list.
//! The merge holds one head span per name, so it runs in O(n log k) time
//! for n spans over k names.
//!
//! Writing a combined attribute first runs the same merge to learn where
//! each value belongs, then writes one file per underlying name.

use rustc_hash::FxHashSet;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::iter::FusedIterator;

use crate::error::{Result, StoreError};
use crate::key::{AnnotationKey, CombinedName};
use crate::reader::{SpanReader, ValueReader};
use crate::span::{Position, Span};
use crate::store::{
    AttributeValue, StagedFile, Store, WriteOptions, attribute_lines, check_attribute,
};

/// A record of a combined stream, tagged with the index of the underlying
/// name it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<T> {
    pub origin: usize,
    pub value: T,
}

#[derive(Debug, PartialEq, Eq)]
struct Head {
    order: (Position, Reverse<Position>),
    origin: usize,
    span: Span,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.order, self.origin).cmp(&(other.order, other.origin))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Spans of several annotations merged into document order.
#[derive(Debug)]
pub struct MergedSpans {
    readers: Vec<SpanReader>,
    heap: BinaryHeap<Reverse<Head>>,
    pending: Option<StoreError>,
    done: bool,
}

impl MergedSpans {
    fn new(readers: Vec<SpanReader>) -> Result<Self> {
        let mut merged = Self {
            heap: BinaryHeap::with_capacity(readers.len()),
            readers,
            pending: None,
            done: false,
        };
        for origin in 0..merged.readers.len() {
            merged.advance(origin, None)?;
        }
        Ok(merged)
    }

    // Refill the head of one underlying reader. Each file must already be in
    // document order; equal starts with growing ends would leave the merge
    // out of order.
    fn advance(&mut self, origin: usize, previous: Option<Span>) -> Result<()> {
        let reader = &mut self.readers[origin];
        match reader.next() {
            None => Ok(()),
            Some(Err(e)) => Err(e),
            Some(Ok(None)) => Err(StoreError::schema_mismatch(format!(
                "{}:{}: absent span cannot be merged",
                reader.path().display(),
                reader.line_num()
            ))),
            Some(Ok(Some(span))) => {
                if let Some(previous) = previous
                    && span.doc_order(&previous).is_lt()
                {
                    return Err(StoreError::schema_mismatch(format!(
                        "{}:{}: span {} is out of document order after {}",
                        reader.path().display(),
                        reader.line_num(),
                        span,
                        previous
                    )));
                }
                self.heap.push(Reverse(Head {
                    order: span.doc_order_key(),
                    origin,
                    span,
                }));
                Ok(())
            }
        }
    }
}

impl Iterator for MergedSpans {
    type Item = Result<Tagged<Span>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            self.done = true;
            return Some(Err(e));
        }
        if self.done {
            return None;
        }
        let Some(Reverse(head)) = self.heap.pop() else {
            self.done = true;
            return None;
        };
        if let Err(e) = self.advance(head.origin, Some(head.span)) {
            self.pending = Some(e);
        }
        Some(Ok(Tagged {
            origin: head.origin,
            value: head.span,
        }))
    }
}

impl FusedIterator for MergedSpans {}

/// Attribute values of several annotations, in the merged order of their
/// elements' spans.
pub struct MergedValues {
    spans: MergedSpans,
    values: Vec<ValueReader>,
    keys: Vec<AnnotationKey>,
    done: bool,
}

impl MergedValues {
    fn finish(&mut self) -> Option<Result<Tagged<String>>> {
        self.done = true;
        for (reader, key) in self.values.iter_mut().zip(&self.keys) {
            if let Some(extra) = reader.next() {
                return Some(extra.and_then(|_| {
                    Err(StoreError::schema_mismatch(format!(
                        "{} has more values than spans",
                        key
                    )))
                }));
            }
        }
        None
    }
}

impl Iterator for MergedValues {
    type Item = Result<Tagged<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tagged = match self.spans.next() {
            None => return self.finish(),
            Some(Err(e)) => {
                self.done = true;
                return Some(Err(e));
            }
            Some(Ok(tagged)) => tagged,
        };
        match self.values[tagged.origin].next() {
            Some(Ok(value)) => Some(Ok(Tagged {
                origin: tagged.origin,
                value,
            })),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                Some(Err(StoreError::schema_mismatch(format!(
                    "{} has fewer values than spans",
                    self.keys[tagged.origin]
                ))))
            }
        }
    }
}

impl FusedIterator for MergedValues {}

/// Rows of several attributes of the same element, read in parallel.
pub struct AttributeRows {
    readers: Vec<ValueReader>,
    keys: Vec<AnnotationKey>,
    done: bool,
}

impl Iterator for AttributeRows {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut row = Vec::with_capacity(self.readers.len());
        let mut ended = Vec::new();
        for (reader, key) in self.readers.iter_mut().zip(&self.keys) {
            match reader.next() {
                Some(Ok(value)) => row.push(value),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => ended.push(key.to_string()),
            }
        }
        if ended.is_empty() {
            return Some(Ok(row));
        }
        self.done = true;
        if row.is_empty() {
            None
        } else {
            Some(Err(StoreError::schema_mismatch(format!(
                "attributes end at different lengths: {} ended first",
                ended.join(", ")
            ))))
        }
    }
}

impl FusedIterator for AttributeRows {}

impl Store {
    /// Merge the spans of every name in `name` into document order.
    pub fn read_combined_spans(
        &self,
        name: &CombinedName,
        want_subpositions: bool,
    ) -> Result<MergedSpans> {
        check_combinable(name)?;
        let readers = name
            .keys()
            .iter()
            .map(|key| self.read_span_annotation(key, want_subpositions))
            .collect::<Result<Vec<_>>>()?;
        MergedSpans::new(readers)
    }

    /// Read attribute values of several elements as one stream.
    pub fn read_combined(&self, name: &CombinedName, allow_newlines: bool) -> Result<MergedValues> {
        check_combinable(name)?;
        if name.keys()[0].is_span() {
            return Err(StoreError::schema_mismatch(format!(
                "{} names spans, not attributes",
                name
            )));
        }
        let values = name
            .keys()
            .iter()
            .map(|key| self.read_annotation(key, allow_newlines))
            .collect::<Result<Vec<_>>>()?;
        Ok(MergedValues {
            spans: self.read_combined_spans(name, true)?,
            values,
            keys: name.keys().to_vec(),
            done: false,
        })
    }

    /// Write attribute values given in merged order back to the underlying
    /// attributes. Returns the number of values written per name.
    ///
    /// Every file is staged before any is replaced, so a failed write leaves
    /// all underlying attributes as they were.
    pub fn write_combined<I>(
        &self,
        name: &CombinedName,
        values: I,
        options: WriteOptions,
    ) -> Result<Vec<usize>>
    where
        I: IntoIterator,
        I::Item: AttributeValue,
    {
        check_combinable(name)?;
        if name.keys()[0].is_span() {
            return Err(StoreError::schema_mismatch(format!(
                "span annotations cannot be written as one: {}",
                name
            )));
        }
        if name.is_single() {
            let count = self.write_annotation(&name.keys()[0], values, options)?;
            return Ok(vec![count]);
        }

        let mut buckets: Vec<Vec<Option<String>>> = vec![Vec::new(); name.len()];
        let mut values = values.into_iter();
        for tagged in self.read_combined_spans(name, true)? {
            let tagged = tagged?;
            let Some(value) = values.next() else {
                return Err(StoreError::schema_mismatch(format!(
                    "fewer values than spans for {}",
                    name
                )));
            };
            buckets[tagged.origin].push(value.as_value().map(str::to_string));
        }
        if values.next().is_some() {
            return Err(StoreError::schema_mismatch(format!(
                "more values than spans for {}",
                name
            )));
        }

        let staged = name
            .keys()
            .iter()
            .zip(&buckets)
            .map(|(key, bucket)| {
                self.stage_lines(key, attribute_lines(bucket, options), options.append)
            })
            .collect::<Result<Vec<_>>>()?;
        let counts = staged
            .into_iter()
            .map(StagedFile::commit)
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("Wrote {} items: {}", counts.iter().sum::<usize>(), name);
        Ok(counts)
    }

    /// Read several attributes of the same element side by side.
    pub fn read_annotation_attributes(
        &self,
        keys: &[AnnotationKey],
        allow_newlines: bool,
    ) -> Result<AttributeRows> {
        let Some(first) = keys.first() else {
            return Err(StoreError::schema_mismatch("no attributes to read"));
        };
        for key in keys {
            check_attribute(key)?;
            if key.span_key() != first.span_key() {
                return Err(StoreError::schema_mismatch(format!(
                    "{} and {} belong to different elements",
                    first, key
                )));
            }
        }
        let readers = keys
            .iter()
            .map(|key| self.read_annotation(key, allow_newlines))
            .collect::<Result<Vec<_>>>()?;
        Ok(AttributeRows {
            readers,
            keys: keys.to_vec(),
            done: false,
        })
    }
}

fn check_combinable(name: &CombinedName) -> Result<()> {
    let keys = name.keys();
    let Some(first) = keys.first() else {
        return Err(StoreError::schema_mismatch("empty combined name"));
    };
    let mut elements = FxHashSet::default();
    for key in keys {
        if key.is_data() {
            return Err(StoreError::schema_mismatch(format!(
                "{} is data and cannot be combined",
                key
            )));
        }
        if key.is_span() != first.is_span() {
            return Err(StoreError::schema_mismatch(format!(
                "{} mixes spans and attributes",
                name
            )));
        }
        if key.document() != first.document() || key.chunk() != first.chunk() {
            return Err(StoreError::schema_mismatch(format!(
                "{} spans more than one document",
                name
            )));
        }
        if !elements.insert(key.element()) {
            return Err(StoreError::schema_mismatch(format!(
                "{} lists element {} twice",
                name,
                key.element()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::{TempDir, tempdir};

    fn test_store() -> (TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::new(StoreConfig::default().with_work_dir(dir.path()));
        (dir, store)
    }

    /// Two token layers: `w` from running text, `num` from numeral markup
    fn two_layers(store: &Store) {
        let w = AnnotationKey::span("doc", "w").unwrap();
        let num = AnnotationKey::span("doc", "num").unwrap();
        store
            .write_span_annotation(
                &w,
                vec![Span::at(0, 3), Span::at(4, 9), Span::at(14, 16)],
                false,
            )
            .unwrap();
        store
            .write_span_annotation(&num, vec![Span::at(4, 4), Span::at(10, 13)], false)
            .unwrap();
        let w_pos = AnnotationKey::attribute("doc", "w", "pos").unwrap();
        let num_pos = AnnotationKey::attribute("doc", "num", "pos").unwrap();
        store
            .write_annotation(&w_pos, ["DT", "NN", "VB"], WriteOptions::default())
            .unwrap();
        store
            .write_annotation(&num_pos, ["MID", "RG"], WriteOptions::default())
            .unwrap();
    }

    #[test]
    fn test_merged_spans_order() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let name = CombinedName::parse("doc", None, "w num").unwrap();
        let merged: Vec<_> = store
            .read_combined_spans(&name, false)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let order: Vec<(usize, Span)> = merged.into_iter().map(|t| (t.origin, t.value)).collect();
        assert_eq!(
            order,
            vec![
                (0, Span::at(0, 3)),
                (0, Span::at(4, 9)),
                (1, Span::at(4, 4)),
                (1, Span::at(10, 13)),
                (0, Span::at(14, 16)),
            ]
        );
    }

    #[test]
    fn test_ties_follow_name_order() {
        let (_dir, store) = test_store();
        let a = AnnotationKey::span("doc", "a").unwrap();
        let b = AnnotationKey::span("doc", "b").unwrap();
        store.write_span_annotation(&a, vec![Span::at(1, 2)], false).unwrap();
        store.write_span_annotation(&b, vec![Span::at(1, 2)], false).unwrap();

        let name = CombinedName::parse("doc", None, "b a").unwrap();
        let origins: Vec<usize> = store
            .read_combined_spans(&name, false)
            .unwrap()
            .map(|t| t.unwrap().origin)
            .collect();
        assert_eq!(origins, vec![0, 1]);
    }

    #[test]
    fn test_read_combined_values() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let name = CombinedName::parse("doc", None, "w:pos num:pos").unwrap();
        let values: Vec<String> = store
            .read_combined(&name, false)
            .unwrap()
            .map(|t| t.map(|t| t.value))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(values, vec!["DT", "NN", "MID", "RG", "VB"]);
    }

    #[test]
    fn test_write_combined_redistributes() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let name = CombinedName::parse("doc", None, "w:lemma num:lemma").unwrap();
        let counts = store
            .write_combined(&name, ["the", "dog", "-", "42", "ran"], WriteOptions::default())
            .unwrap();
        assert_eq!(counts, vec![3, 2]);

        let w_lemma = AnnotationKey::attribute("doc", "w", "lemma").unwrap();
        let read: Vec<String> = store
            .read_annotation(&w_lemma, false)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, vec!["the", "dog", "ran"]);

        let back: Vec<String> = store
            .read_combined(&name, false)
            .unwrap()
            .map(|t| t.map(|t| t.value))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(back, vec!["the", "dog", "-", "42", "ran"]);
    }

    #[test]
    fn test_write_combined_length_mismatch() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let name = CombinedName::parse("doc", None, "w:lemma num:lemma").unwrap();
        assert!(matches!(
            store.write_combined(&name, ["a", "b"], WriteOptions::default()),
            Err(StoreError::SchemaMismatch(_))
        ));
        assert!(matches!(
            store.write_combined(&name, ["a"; 6], WriteOptions::default()),
            Err(StoreError::SchemaMismatch(_))
        ));
        let w_lemma = AnnotationKey::attribute("doc", "w", "lemma").unwrap();
        assert!(!store.exists(&w_lemma));
    }

    #[test]
    fn test_schema_mismatches() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let mixed = CombinedName::parse("doc", None, "w num:pos").unwrap();
        assert!(matches!(
            store.read_combined_spans(&mixed, false),
            Err(StoreError::SchemaMismatch(_))
        ));
        let twice = CombinedName::parse("doc", None, "w:pos w:lemma").unwrap();
        assert!(store.read_combined(&twice, false).is_err());
        let with_data = CombinedName::from_keys(vec![
            AnnotationKey::span("doc", "w").unwrap(),
            AnnotationKey::data("doc", "docid").unwrap(),
        ])
        .unwrap();
        assert!(store.read_combined_spans(&with_data, false).is_err());
        let spans = CombinedName::parse("doc", None, "w num").unwrap();
        assert!(store.write_combined(&spans, ["x"], WriteOptions::default()).is_err());
        let other_doc = CombinedName::from_keys(vec![
            AnnotationKey::span("doc", "w").unwrap(),
            AnnotationKey::span("doc2", "num").unwrap(),
        ])
        .unwrap();
        assert!(store.read_combined_spans(&other_doc, false).is_err());
    }

    #[test]
    fn test_file_out_of_document_order() {
        let (_dir, store) = test_store();
        let a = AnnotationKey::span("doc", "a").unwrap();
        let b = AnnotationKey::span("doc", "b").unwrap();
        // Accepted on write: starts never decrease
        store
            .write_span_annotation(&a, vec![Span::at(0, 3), Span::at(0, 10)], false)
            .unwrap();
        store.write_span_annotation(&b, vec![Span::at(0, 5)], false).unwrap();

        let name = CombinedName::parse("doc", None, "a b").unwrap();
        let results: Vec<_> = store.read_combined_spans(&name, false).unwrap().collect();
        assert!(matches!(
            results.last(),
            Some(Err(StoreError::SchemaMismatch(_)))
        ));
        let spans: Vec<Span> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|t| t.value))
            .collect();
        assert!(spans.windows(2).all(|w| w[0].doc_order(&w[1]).is_le()));
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_combined_write_changes_nothing() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let w_lemma = AnnotationKey::attribute("doc", "w", "lemma").unwrap();
        store
            .write_annotation(&w_lemma, ["a", "b", "c"], WriteOptions::default())
            .unwrap();
        // A directory where num:lemma belongs cannot be read for appending
        let num_lemma = AnnotationKey::attribute("doc", "num", "lemma").unwrap();
        std::fs::create_dir(store.path(&num_lemma)).unwrap();

        let name = CombinedName::parse("doc", None, "w:lemma num:lemma").unwrap();
        let values = ["the", "dog", "-", "42", "ran"];
        assert!(store
            .write_combined(&name, values, WriteOptions::default().append())
            .is_err());
        assert_eq!(
            std::fs::read_to_string(store.path(&w_lemma)).unwrap(),
            "a\nb\nc\n"
        );
    }

    #[test]
    fn test_write_combined_append() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let name = CombinedName::parse("doc", None, "w:lemma num:lemma").unwrap();
        let values = ["the", "dog", "-", "42", "ran"];
        store
            .write_combined(&name, values, WriteOptions::default())
            .unwrap();
        let counts = store
            .write_combined(&name, values, WriteOptions::default().append())
            .unwrap();
        assert_eq!(counts, vec![3, 2]);
        let num_lemma = AnnotationKey::attribute("doc", "num", "lemma").unwrap();
        assert_eq!(
            std::fs::read_to_string(store.path(&num_lemma)).unwrap(),
            "-\n42\n-\n42\n"
        );
    }

    #[test]
    fn test_missing_underlying_file() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let name = CombinedName::parse("doc", None, "w punct").unwrap();
        assert!(store.read_combined_spans(&name, false).unwrap_err().is_missing());
    }

    #[test]
    fn test_absent_span_cannot_merge() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let gap = AnnotationKey::span("doc", "gap").unwrap();
        store
            .write_span_annotation(&gap, vec![Some(Span::at(0, 1)), None], false)
            .unwrap();
        let name = CombinedName::parse("doc", None, "w gap").unwrap();
        let results: Vec<_> = store.read_combined_spans(&name, false).unwrap().collect();
        assert!(results.last().unwrap().is_err());
    }

    #[test]
    fn test_read_annotation_attributes() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let w_lemma = AnnotationKey::attribute("doc", "w", "lemma").unwrap();
        store
            .write_annotation(&w_lemma, ["the", "dog", "run"], WriteOptions::default())
            .unwrap();
        let keys = vec![
            AnnotationKey::attribute("doc", "w", "pos").unwrap(),
            w_lemma.clone(),
        ];
        let rows: Vec<Vec<String>> = store
            .read_annotation_attributes(&keys, false)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[1], vec!["NN", "dog"]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_read_annotation_attributes_rejects_other_elements() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let keys = vec![
            AnnotationKey::attribute("doc", "w", "pos").unwrap(),
            AnnotationKey::attribute("doc", "num", "pos").unwrap(),
        ];
        assert!(matches!(
            store.read_annotation_attributes(&keys, false),
            Err(StoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_read_annotation_attributes_length_mismatch() {
        let (_dir, store) = test_store();
        two_layers(&store);
        let short = AnnotationKey::attribute("doc", "w", "short").unwrap();
        store.write_annotation(&short, ["x"], WriteOptions::default()).unwrap();
        let keys = vec![AnnotationKey::attribute("doc", "w", "pos").unwrap(), short];
        let rows: Vec<_> = store.read_annotation_attributes(&keys, false).unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].is_err());
    }
}
