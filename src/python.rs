//! Python bindings for corpusstore
//!
//! Lets external analyzers written in Python read and write annotations
//! through the same store. Keys are given as a document name, an optional
//! chunk and an `"element[:attribute]"` name.

use pyo3::exceptions::{PyFileNotFoundError, PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::hierarchy::HierarchyOptions;
use crate::key::{AnnotationKey, CombinedName, Field};
use crate::span::{Position, Span};
use crate::store::{Store as RustStore, WriteOptions};

/// Convert StoreError to Python exception
impl From<StoreError> for PyErr {
    fn from(err: StoreError) -> PyErr {
        match err {
            StoreError::Io(e) => PyIOError::new_err(e.to_string()),
            e @ StoreError::MissingFile { .. } => PyFileNotFoundError::new_err(e.to_string()),
            e => PyValueError::new_err(e.to_string()),
        }
    }
}

type PySpan = ((i64, Option<u32>), (i64, Option<u32>));

fn to_py(span: Option<Span>) -> Option<PySpan> {
    span.map(|s| ((s.start.pos, s.start.sub), (s.end.pos, s.end.sub)))
}

fn from_py(span: Option<PySpan>) -> Option<Span> {
    span.map(|((s, ss), (e, es))| {
        Span::new(Position { pos: s, sub: ss }, Position { pos: e, sub: es })
    })
}

/// An annotation store rooted at a work directory.
#[pyclass(name = "Store")]
pub struct PyStore {
    inner: RustStore,
}

#[pymethods]
impl PyStore {
    /// Open a store.
    ///
    /// Args:
    ///     work_dir: Root directory; defaults to $CORPUSSTORE_WORK_DIR or "work"
    #[new]
    #[pyo3(signature = (work_dir=None))]
    fn new(work_dir: Option<&str>) -> Self {
        let config = match work_dir {
            Some(dir) => StoreConfig::default().with_work_dir(dir),
            None => StoreConfig::from_env(),
        };
        PyStore {
            inner: RustStore::new(config),
        }
    }

    /// Whether the annotation (every one of a space-separated list) exists.
    #[pyo3(signature = (document, name, chunk=None))]
    fn exists(&self, document: &str, name: &str, chunk: Option<&str>) -> PyResult<bool> {
        let name = CombinedName::parse(document, chunk, name)?;
        Ok(name.keys().iter().all(|key| self.inner.exists(key)))
    }

    /// Read spans as ((start, sub), (end, sub)) tuples; None for absent spans.
    ///
    /// A space-separated name reads several annotations merged into
    /// document order.
    #[pyo3(signature = (document, name, chunk=None, subpositions=false))]
    fn read_spans(
        &self,
        document: &str,
        name: &str,
        chunk: Option<&str>,
        subpositions: bool,
    ) -> PyResult<Vec<Option<PySpan>>> {
        let spans = read_spans(&self.inner, document, chunk, name, subpositions)?;
        Ok(spans.into_iter().map(to_py).collect())
    }

    #[pyo3(signature = (document, name, spans, chunk=None, append=false))]
    fn write_spans(
        &self,
        document: &str,
        name: &str,
        spans: Vec<Option<PySpan>>,
        chunk: Option<&str>,
        append: bool,
    ) -> PyResult<usize> {
        let key = AnnotationKey::parse(document, chunk, name)?;
        let spans = spans.into_iter().map(from_py);
        Ok(self.inner.write_span_annotation(&key, spans, append)?)
    }

    /// Read attribute values. A space-separated name such as
    /// "w:pos num:pos" reads several attributes in merged span order.
    #[pyo3(signature = (document, name, chunk=None, allow_newlines=false))]
    fn read_annotation(
        &self,
        document: &str,
        name: &str,
        chunk: Option<&str>,
        allow_newlines: bool,
    ) -> PyResult<Vec<String>> {
        Ok(read_values(&self.inner, document, chunk, name, allow_newlines)?)
    }

    /// Write attribute values. With a space-separated name the values are
    /// given in merged span order and split between the attributes.
    #[pyo3(signature = (document, name, values, chunk=None, append=false, allow_newlines=false))]
    fn write_annotation(
        &self,
        document: &str,
        name: &str,
        values: Vec<Option<String>>,
        chunk: Option<&str>,
        append: bool,
        allow_newlines: bool,
    ) -> PyResult<usize> {
        let options = WriteOptions {
            append,
            allow_newlines,
        };
        Ok(write_values(&self.inner, document, chunk, name, values, options)?)
    }

    /// Read several attributes of one element as rows.
    ///
    /// Example:
    ///     >>> store.read_attributes("doc", "w", ["pos", "lemma"])
    ///     [["DT", "the"], ["NN", "dog"]]
    #[pyo3(signature = (document, element, attributes, chunk=None, allow_newlines=false))]
    fn read_attributes(
        &self,
        document: &str,
        element: &str,
        attributes: Vec<String>,
        chunk: Option<&str>,
        allow_newlines: bool,
    ) -> PyResult<Vec<Vec<String>>> {
        let rows = read_attributes(
            &self.inner,
            document,
            chunk,
            element,
            &attributes,
            allow_newlines,
        )?;
        Ok(rows)
    }

    /// Read a per-document data file, or a common one when document is None.
    #[pyo3(signature = (name, document=None))]
    fn read_data(&self, name: &str, document: Option<&str>) -> PyResult<String> {
        let key = data_key(document, name)?;
        Ok(self.inner.read_data(&key)?)
    }

    #[pyo3(signature = (name, value, document=None, append=false))]
    fn write_data(
        &self,
        name: &str,
        value: &str,
        document: Option<&str>,
        append: bool,
    ) -> PyResult<()> {
        let key = data_key(document, name)?;
        Ok(self.inner.write_data(&key, value, append)?)
    }

    /// Children of each parent span, as lists of child indices.
    ///
    /// Returns:
    ///     (children, orphans)
    #[pyo3(signature = (document, parent, child, chunk=None, orphan_alert=false))]
    fn get_children(
        &self,
        document: &str,
        parent: &str,
        child: &str,
        chunk: Option<&str>,
        orphan_alert: bool,
    ) -> PyResult<(Vec<Vec<usize>>, Vec<usize>)> {
        let parent = AnnotationKey::parse(document, chunk, parent)?;
        let child = AnnotationKey::parse(document, chunk, child)?;
        let map = self
            .inner
            .get_children(parent, child, HierarchyOptions { orphan_alert })?;
        Ok((map.children, map.orphans))
    }

    /// Parent index of each child span; None for orphans.
    #[pyo3(signature = (document, parent, child, chunk=None, orphan_alert=false))]
    fn get_parents(
        &self,
        document: &str,
        parent: &str,
        child: &str,
        chunk: Option<&str>,
        orphan_alert: bool,
    ) -> PyResult<Vec<Option<usize>>> {
        let parent = AnnotationKey::parse(document, chunk, parent)?;
        let child = AnnotationKey::parse(document, chunk, child)?;
        let links = self
            .inner
            .get_parents(parent, child, HierarchyOptions { orphan_alert })?;
        Ok(links.parents)
    }

    fn __repr__(&self) -> String {
        format!("<Store work_dir='{}'>", self.inner.work_dir().display())
    }
}

fn data_key(document: Option<&str>, name: &str) -> Result<AnnotationKey, StoreError> {
    match document {
        Some(document) => AnnotationKey::data(document, name),
        None => AnnotationKey::common(name),
    }
}

// Several whitespace-separated names make a combined annotation
fn is_combined(name: &str) -> bool {
    name.split_whitespace().nth(1).is_some()
}

fn read_spans(
    store: &RustStore,
    document: &str,
    chunk: Option<&str>,
    name: &str,
    subpositions: bool,
) -> Result<Vec<Option<Span>>, StoreError> {
    if is_combined(name) {
        let name = CombinedName::parse(document, chunk, name)?;
        store
            .read_combined_spans(&name, subpositions)?
            .map(|tagged| tagged.map(|t| Some(t.value)))
            .collect()
    } else {
        let key = AnnotationKey::parse(document, chunk, name.trim())?;
        store.read_span_annotation(&key, subpositions)?.collect()
    }
}

fn read_values(
    store: &RustStore,
    document: &str,
    chunk: Option<&str>,
    name: &str,
    allow_newlines: bool,
) -> Result<Vec<String>, StoreError> {
    if is_combined(name) {
        let name = CombinedName::parse(document, chunk, name)?;
        store
            .read_combined(&name, allow_newlines)?
            .map(|tagged| tagged.map(|t| t.value))
            .collect()
    } else {
        let key = AnnotationKey::parse(document, chunk, name.trim())?;
        store.read_annotation(&key, allow_newlines)?.collect()
    }
}

fn write_values(
    store: &RustStore,
    document: &str,
    chunk: Option<&str>,
    name: &str,
    values: Vec<Option<String>>,
    options: WriteOptions,
) -> Result<usize, StoreError> {
    if is_combined(name) {
        let name = CombinedName::parse(document, chunk, name)?;
        let counts = store.write_combined(&name, values, options)?;
        Ok(counts.into_iter().sum())
    } else {
        let key = AnnotationKey::parse(document, chunk, name.trim())?;
        store.write_annotation(&key, values, options)
    }
}

fn read_attributes(
    store: &RustStore,
    document: &str,
    chunk: Option<&str>,
    element: &str,
    attributes: &[String],
    allow_newlines: bool,
) -> Result<Vec<Vec<String>>, StoreError> {
    let keys = attributes
        .iter()
        .map(|attribute| {
            AnnotationKey::new(document, chunk, element, Field::Attribute(attribute.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    store.read_annotation_attributes(&keys, allow_newlines)?.collect()
}

#[pyfunction]
fn __version__() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[pymodule]
fn corpusstore(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStore>()?;
    m.add_function(wrap_pyfunction!(__version__, m)?)?;
    Ok(())
}
