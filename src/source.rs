//! Inputs that are either stored annotations or values already in memory.

use crate::error::Result;
use crate::key::AnnotationKey;
use crate::span::Span;
use crate::store::Store;

/// An annotation to read through the store, or one the caller already holds.
#[derive(Debug, Clone)]
pub enum Source<T> {
    /// Read the annotation stored under this key.
    Reference(AnnotationKey),
    /// Use these values as they are.
    Loaded(Vec<T>),
}

/// Spans given by key or by value; `None` entries are absent spans.
pub type SpanSource = Source<Option<Span>>;

impl SpanSource {
    /// Materialize the spans, reading through `store` for references.
    pub fn load(self, store: &Store, want_subpositions: bool) -> Result<Vec<Option<Span>>> {
        match self {
            Source::Reference(key) => {
                store.read_span_annotation(&key, want_subpositions)?.collect()
            }
            Source::Loaded(spans) if want_subpositions => Ok(spans),
            Source::Loaded(spans) => Ok(spans
                .into_iter()
                .map(|span| span.map(Span::without_subpositions))
                .collect()),
        }
    }
}

impl<T> From<AnnotationKey> for Source<T> {
    fn from(key: AnnotationKey) -> Self {
        Source::Reference(key)
    }
}

impl<T> From<&AnnotationKey> for Source<T> {
    fn from(key: &AnnotationKey) -> Self {
        Source::Reference(key.clone())
    }
}

impl From<Vec<Option<Span>>> for SpanSource {
    fn from(spans: Vec<Option<Span>>) -> Self {
        Source::Loaded(spans)
    }
}

impl From<Vec<Span>> for SpanSource {
    fn from(spans: Vec<Span>) -> Self {
        Source::Loaded(spans.into_iter().map(Some).collect())
    }
}

impl From<&[Span]> for SpanSource {
    fn from(spans: &[Span]) -> Self {
        Source::Loaded(spans.iter().copied().map(Some).collect())
    }
}
