//! Lazy readers over annotation files
//!
//! Readers are forward-only and single-pass: they own the open file and are
//! consumed by iteration. Once a reader has returned `None` (or an error) it
//! keeps returning `None`; reading the annotation again means asking the
//! store for a new reader.
//!
//! ```compile_fail
//! # use corpusstore::{AnnotationKey, Store, StoreConfig};
//! # let store = Store::new(StoreConfig::default());
//! # let key = AnnotationKey::span("doc", "w").unwrap();
//! let spans = store.read_span_annotation(&key, false).unwrap();
//! for span in spans {}
//! for span in spans {} // moved by the first loop
//! ```

use bstr::ByteSlice;
use bstr::io::{BufReadExt, ByteLines};
use std::fs::File;
use std::io::BufReader;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use crate::bytes::unescape_newlines;
use crate::error::{Result, StoreError};
use crate::span::Span;

/// Line source shared by the span and value readers.
#[derive(Debug)]
struct LineSource {
    lines: ByteLines<BufReader<File>>,
    path: PathBuf,
    label: String,
    line_num: usize,
    done: bool,
}

impl LineSource {
    fn new(file: File, path: &Path, label: String) -> Self {
        Self {
            lines: BufReader::new(file).byte_lines(),
            path: path.to_path_buf(),
            label,
            line_num: 0,
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<Result<Vec<u8>>> {
        if self.done {
            return None;
        }
        match self.lines.next() {
            None => {
                self.done = true;
                tracing::debug!("Read {} items: {}", self.line_num, self.label);
                None
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e.into()))
            }
            Some(Ok(line)) => {
                self.line_num += 1;
                Some(Ok(line))
            }
        }
    }

    fn malformed(&mut self, message: String) -> StoreError {
        self.done = true;
        StoreError::Malformed {
            path: self.path.clone(),
            line: self.line_num,
            message,
        }
    }
}

/// Spans of one annotation, in stored order.
///
/// Empty lines are absent spans and come back as `None`.
#[derive(Debug)]
pub struct SpanReader {
    source: LineSource,
    want_subpositions: bool,
}

impl SpanReader {
    pub(crate) fn new(file: File, path: &Path, label: String, want_subpositions: bool) -> Self {
        Self {
            source: LineSource::new(file, path, label),
            want_subpositions,
        }
    }

    /// 1-based number of the last line read.
    pub fn line_num(&self) -> usize {
        self.source.line_num
    }

    pub fn path(&self) -> &Path {
        &self.source.path
    }
}

impl Iterator for SpanReader {
    type Item = Result<Option<Span>>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.source.next_line()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        let line = line.trim_end_with(|c| c == '\r');
        if line.is_empty() {
            return Some(Ok(None));
        }
        match Span::decode(line) {
            Some(span) if span.is_inverted() => {
                let message = format!("span ends before it starts: {}", span);
                Some(Err(self.source.malformed(message)))
            }
            Some(span) if self.want_subpositions => Some(Ok(Some(span))),
            Some(span) => Some(Ok(Some(span.without_subpositions()))),
            None => {
                let message = format!("not a span: {:?}", line.as_bstr());
                Some(Err(self.source.malformed(message)))
            }
        }
    }
}

impl FusedIterator for SpanReader {}

/// Attribute values of one annotation, in stored order.
pub struct ValueReader {
    source: LineSource,
    allow_newlines: bool,
}

impl ValueReader {
    pub(crate) fn new(file: File, path: &Path, label: String, allow_newlines: bool) -> Self {
        Self {
            source: LineSource::new(file, path, label),
            allow_newlines,
        }
    }

    /// 1-based number of the last line read.
    pub fn line_num(&self) -> usize {
        self.source.line_num
    }
}

impl Iterator for ValueReader {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.source.next_line()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        let value = match String::from_utf8(line) {
            Ok(value) => value,
            Err(e) => {
                let message = format!("value is not UTF-8: {}", e);
                return Some(Err(self.source.malformed(message)));
            }
        };
        if self.allow_newlines {
            Some(Ok(unescape_newlines(&value)))
        } else {
            Some(Ok(value))
        }
    }
}

impl FusedIterator for ValueReader {}
