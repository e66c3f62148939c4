//! Annotation keys and their storage paths.
//!
//! A key names one annotation file. Span and attribute files live at
//! `{root}/{document}/{chunk}/{element}/{field}`, per-document data at
//! `{root}/{document}/{chunk}/{element}` and corpus-wide data at
//! `{root}/{element}`. Every segment a caller supplies is validated, and
//! segments starting with `@` are reserved for the store, so no attribute can
//! shadow the `@span` sentinel and path derivation stays injective.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// File name of the bare element span.
pub const SPAN_SENTINEL: &str = "@span";
/// Chunk segment used when a document is not split into chunks.
pub const WHOLE_DOCUMENT: &str = "@doc";
/// Plain text of a document.
pub const TEXT_FILE: &str = "@text";
/// Source markup structure of a document.
pub const STRUCTURE_FILE: &str = "@structure";
/// Source headers of a document.
pub const HEADERS_FILE: &str = "@headers";

const RESERVED_PREFIX: char = '@';
const ELEM_ATTR_DELIM: char = ':';

/// Which documents an annotation belongs to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum Binding {
    /// Produced for, and read from, a single document.
    #[default]
    PerDocument,
    /// One value for the whole corpus.
    Common,
    /// Must exist for every document before the consumer runs.
    AllDocuments,
}

/// The record kind and, for spans, the attribute addressed by a key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Field {
    /// The element's own spans.
    Span,
    /// Values aligned 1:1 with the element's spans.
    Attribute(String),
    /// A single opaque value.
    Data,
}

impl Field {
    pub fn is_data(&self) -> bool {
        matches!(self, Field::Data)
    }

    pub fn attribute(&self) -> Option<&str> {
        match self {
            Field::Attribute(name) => Some(name),
            _ => None,
        }
    }
}

/// Structured address of one annotation file.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AnnotationKey {
    document: Option<String>,
    chunk: String,
    element: String,
    field: Field,
    binding: Binding,
}

impl AnnotationKey {
    /// Key for the spans of `element` in an unchunked document.
    pub fn span(document: &str, element: &str) -> Result<Self> {
        Self::new(document, None, element, Field::Span)
    }

    /// Key for an attribute of `element` in an unchunked document.
    pub fn attribute(document: &str, element: &str, attribute: &str) -> Result<Self> {
        validate("attribute", attribute)?;
        Self::new(document, None, element, Field::Attribute(attribute.to_string()))
    }

    /// Key for per-document data.
    pub fn data(document: &str, name: &str) -> Result<Self> {
        Self::new(document, None, name, Field::Data)
    }

    /// Key for corpus-wide data.
    pub fn common(name: &str) -> Result<Self> {
        validate("data name", name)?;
        Ok(Self {
            document: None,
            chunk: WHOLE_DOCUMENT.to_string(),
            element: name.to_string(),
            field: Field::Data,
            binding: Binding::Common,
        })
    }

    /// General constructor for document-bound keys.
    pub fn new(document: &str, chunk: Option<&str>, element: &str, field: Field) -> Result<Self> {
        validate("document", document)?;
        if let Some(chunk) = chunk {
            validate("chunk", chunk)?;
        }
        validate("element", element)?;
        if let Field::Attribute(attribute) = &field {
            validate("attribute", attribute)?;
        }
        Ok(Self {
            document: Some(document.to_string()),
            chunk: chunk.unwrap_or(WHOLE_DOCUMENT).to_string(),
            element: element.to_string(),
            field,
            binding: Binding::PerDocument,
        })
    }

    /// Parse `element` or `element:attribute` for a document.
    pub fn parse(document: &str, chunk: Option<&str>, name: &str) -> Result<Self> {
        let field = match name.split_once(ELEM_ATTR_DELIM) {
            Some((_, attribute)) => Field::Attribute(attribute.to_string()),
            None => Field::Span,
        };
        let element = name.split(ELEM_ATTR_DELIM).next().unwrap_or_default();
        Self::new(document, chunk, element, field)
    }

    /// The plain text of a document.
    pub fn text(document: &str, chunk: Option<&str>) -> Result<Self> {
        Self::reserved_data(document, chunk, TEXT_FILE)
    }

    /// The source markup structure of a document.
    pub fn structure(document: &str, chunk: Option<&str>) -> Result<Self> {
        Self::reserved_data(document, chunk, STRUCTURE_FILE)
    }

    /// The source headers of a document.
    pub fn headers(document: &str, chunk: Option<&str>) -> Result<Self> {
        Self::reserved_data(document, chunk, HEADERS_FILE)
    }

    fn reserved_data(document: &str, chunk: Option<&str>, file: &str) -> Result<Self> {
        validate("document", document)?;
        if let Some(chunk) = chunk {
            validate("chunk", chunk)?;
        }
        Ok(Self {
            document: Some(document.to_string()),
            chunk: chunk.unwrap_or(WHOLE_DOCUMENT).to_string(),
            element: file.to_string(),
            field: Field::Data,
            binding: Binding::PerDocument,
        })
    }

    /// Mark the key as required for every document.
    pub fn for_all_documents(mut self) -> Self {
        if self.binding == Binding::PerDocument {
            self.binding = Binding::AllDocuments;
        }
        self
    }

    /// The same location in another document.
    pub fn in_document(&self, document: &str) -> Result<Self> {
        if self.binding == Binding::Common {
            return Err(StoreError::invalid_key(format!(
                "{} is corpus-wide and has no document",
                self
            )));
        }
        validate("document", document)?;
        let mut key = self.clone();
        key.document = Some(document.to_string());
        Ok(key)
    }

    /// The span key of the same element.
    pub fn span_key(&self) -> Self {
        let mut key = self.clone();
        if !key.field.is_data() {
            key.field = Field::Span;
        }
        key
    }

    /// The same element with another field.
    pub fn with_field(&self, field: Field) -> Result<Self> {
        if let Field::Attribute(attribute) = &field {
            validate("attribute", attribute)?;
        }
        if self.binding == Binding::Common && !field.is_data() {
            return Err(StoreError::invalid_key(format!(
                "{} is corpus-wide and can only hold data",
                self
            )));
        }
        let mut key = self.clone();
        key.field = field;
        Ok(key)
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    pub fn is_span(&self) -> bool {
        self.field == Field::Span
    }

    pub fn is_data(&self) -> bool {
        self.field.is_data()
    }

    /// `element` or `element:attribute`.
    pub fn name(&self) -> String {
        match &self.field {
            Field::Attribute(attribute) => {
                format!("{}{}{}", self.element, ELEM_ATTR_DELIM, attribute)
            }
            _ => self.element.clone(),
        }
    }

    /// Storage path below `root`.
    pub fn path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        if let Some(document) = &self.document {
            path.push(document);
            path.push(&self.chunk);
        }
        path.push(&self.element);
        match &self.field {
            Field::Span => path.push(SPAN_SENTINEL),
            Field::Attribute(attribute) => path.push(attribute),
            Field::Data => {}
        }
        path
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.document {
            Some(document) if self.chunk == WHOLE_DOCUMENT => {
                write!(f, "{}/{}", document, self.name())
            }
            Some(document) => write!(f, "{}:{}/{}", document, self.chunk, self.name()),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// Several annotation names read or written as one stream.
///
/// Written as a whitespace-separated list, e.g. `"w token"` for spans or
/// `"w:pos token:pos"` for attributes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CombinedName {
    keys: Vec<AnnotationKey>,
}

impl CombinedName {
    pub fn parse(document: &str, chunk: Option<&str>, names: &str) -> Result<Self> {
        let keys = names
            .split_whitespace()
            .map(|name| AnnotationKey::parse(document, chunk, name))
            .collect::<Result<Vec<_>>>()?;
        Self::from_keys(keys)
    }

    pub fn from_keys(keys: Vec<AnnotationKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(StoreError::invalid_key("empty annotation name"));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[AnnotationKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.keys.len() == 1
    }
}

impl From<AnnotationKey> for CombinedName {
    fn from(key: AnnotationKey) -> Self {
        Self { keys: vec![key] }
    }
}

impl fmt::Display for CombinedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.keys.iter().map(AnnotationKey::to_string).collect();
        write!(f, "{}", names.join(" "))
    }
}

fn validate(what: &str, name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("is empty")
    } else if name == "." || name == ".." {
        Some("is a relative path component")
    } else if name.starts_with(RESERVED_PREFIX) {
        Some("starts with the reserved '@' prefix")
    } else if name.contains(['/', '\\', ELEM_ATTR_DELIM]) {
        Some("contains a path or attribute separator")
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("contains whitespace")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(StoreError::invalid_key(format!("{} {:?} {}", what, name, problem))),
        None => Ok(()),
    }
}
