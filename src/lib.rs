//! Corpusstore: span annotation storage for corpus pipelines
//!
//! Stores positional annotations (spans over a document's text, attribute
//! values aligned with them, opaque data blobs) as plain line-oriented files
//! and resolves parent/child relations between span layers.

pub mod anchor; // Deterministic anchor ids
pub mod bytes; // Byte-level parsing helpers
pub mod combined; // Several annotations read and written as one
pub mod config;
pub mod error;
pub mod hierarchy; // Parent/child resolution between span layers
pub mod key; // Annotation names and on-disk paths
pub mod reader; // Lazy annotation file readers
pub mod source; // Stored or in-memory inputs
pub mod span; // Span model and line codec
pub mod store; // Annotation file I/O

// Python bindings
#[cfg(feature = "python")]
pub mod python;

// Re-exports for convenience
pub use anchor::{AnchorGenerator, document_ids};
pub use combined::{AttributeRows, MergedSpans, MergedValues, Tagged};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use hierarchy::{
    ChildParents, HierarchyOptions, Orphan, ParentChildMap, get_children, get_parents,
};
pub use key::{AnnotationKey, Binding, CombinedName, Field};
pub use reader::{SpanReader, ValueReader};
pub use source::{Source, SpanSource};
pub use span::{Position, Span};
pub use store::{AttributeValue, Store, WriteOptions};
