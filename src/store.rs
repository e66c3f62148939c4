//! Reading and writing annotation files
//!
//! Every annotation is one file under the work directory (see
//! [`AnnotationKey::path`]). Span and attribute files hold one value per
//! line; data files hold a single opaque value.
//!
//! Writes replace the target atomically (temp file + rename) unless
//! appending, and always bump the file's modification time, even when
//! nothing was written, because a build scheduler uses it to tell that the
//! producing step ran.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

use crate::bytes::{escape_newlines, strip_newlines};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::key::AnnotationKey;
use crate::reader::{SpanReader, ValueReader};
use crate::source::{Source, SpanSource};
use crate::span::{Span, encode_span};

/// Options for attribute writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Add to the end of the file instead of replacing it.
    pub append: bool,
    /// Keep line breaks as `\n` escapes instead of removing them.
    pub allow_newlines: bool,
}

impl WriteOptions {
    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn allow_newlines(mut self) -> Self {
        self.allow_newlines = true;
        self
    }
}

/// A value of an attribute annotation; `None` is written as an empty line.
pub trait AttributeValue {
    fn as_value(&self) -> Option<&str>;
}

impl AttributeValue for String {
    fn as_value(&self) -> Option<&str> {
        Some(self)
    }
}

impl AttributeValue for &String {
    fn as_value(&self) -> Option<&str> {
        Some(self)
    }
}

impl AttributeValue for &str {
    fn as_value(&self) -> Option<&str> {
        Some(self)
    }
}

impl AttributeValue for Option<String> {
    fn as_value(&self) -> Option<&str> {
        self.as_deref()
    }
}

impl AttributeValue for &Option<String> {
    fn as_value(&self) -> Option<&str> {
        self.as_deref()
    }
}

impl AttributeValue for Option<&str> {
    fn as_value(&self) -> Option<&str> {
        *self
    }
}

/// Annotation files below one work directory.
#[derive(Debug, Clone)]
pub struct Store {
    config: StoreConfig,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Storage path of `key`.
    pub fn path(&self, key: &AnnotationKey) -> PathBuf {
        key.path(&self.config.work_dir)
    }

    /// Whether `key` has been written. Never fails.
    pub fn exists(&self, key: &AnnotationKey) -> bool {
        self.path(key).is_file()
    }

    /// Write the spans of an element.
    ///
    /// Spans must not start before the span preceding them, and none may end
    /// before it starts. Absent spans (`None`) are written as empty lines and
    /// skipped by both checks. When appending, the last span already stored
    /// counts as the preceding one. Returns the number of lines written.
    pub fn write_span_annotation<I>(
        &self,
        key: &AnnotationKey,
        values: I,
        append: bool,
    ) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Into<Option<Span>>,
    {
        if !key.is_span() {
            return Err(StoreError::schema_mismatch(format!(
                "{} is not a span annotation",
                key
            )));
        }
        let values: Vec<Option<Span>> = values.into_iter().map(Into::into).collect();
        let stored = if append {
            self.last_stored_span(key)?
        } else {
            None
        };
        check_order(key, stored, &values)?;
        let lines = values.iter().map(|v| encode_span(v.as_ref()));
        let count = self.write_lines(key, lines, append)?;
        tracing::info!("Wrote {} items: {}", count, key);
        Ok(count)
    }

    /// Write values of an attribute, aligned with the element's spans.
    pub fn write_annotation<I>(
        &self,
        key: &AnnotationKey,
        values: I,
        options: WriteOptions,
    ) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: AttributeValue,
    {
        check_attribute(key)?;
        let count = self.write_lines(key, attribute_lines(values, options), options.append)?;
        tracing::info!("Wrote {} items: {}", count, key);
        Ok(count)
    }

    /// Open the spans of an element for reading.
    ///
    /// An attribute key reads the spans of its element. Sub-positions are
    /// dropped unless `want_subpositions` is set.
    pub fn read_span_annotation(
        &self,
        key: &AnnotationKey,
        want_subpositions: bool,
    ) -> Result<SpanReader> {
        if key.is_data() {
            return Err(StoreError::schema_mismatch(format!(
                "{} is data, not a span annotation",
                key
            )));
        }
        let key = key.span_key();
        let (file, path) = self.open(&key)?;
        Ok(SpanReader::new(file, &path, key.to_string(), want_subpositions))
    }

    /// Open the values of an attribute for reading.
    pub fn read_annotation(
        &self,
        key: &AnnotationKey,
        allow_newlines: bool,
    ) -> Result<ValueReader> {
        check_attribute(key)?;
        let (file, path) = self.open(key)?;
        Ok(ValueReader::new(file, &path, key.to_string(), allow_newlines))
    }

    /// Write a data value, replacing or extending the stored one.
    pub fn write_data(&self, key: &AnnotationKey, value: &str, append: bool) -> Result<()> {
        if !key.is_data() {
            return Err(StoreError::schema_mismatch(format!("{} is not data", key)));
        }
        let path = self.path(key);
        let dir = parent_dir(&path);
        fs::create_dir_all(dir)?;
        if append {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(value.as_bytes())?;
        } else {
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.persist(&path).map_err(|e| e.error)?;
        }
        touch(&path)?;
        tracing::info!("Wrote {} bytes: {}", value.len(), key);
        Ok(())
    }

    /// Read a data value.
    pub fn read_data(&self, key: &AnnotationKey) -> Result<String> {
        if !key.is_data() {
            return Err(StoreError::schema_mismatch(format!("{} is not data", key)));
        }
        let path = self.path(key);
        let data = fs::read_to_string(&path).map_err(|e| missing_or_io(key, &path, e))?;
        tracing::debug!("Read {} bytes: {}", data.len(), key);
        Ok(data)
    }

    /// One `None` per span of `source`, ready to be filled in and written
    /// as a new attribute.
    pub fn empty_attribute(
        &self,
        source: impl Into<SpanSource>,
    ) -> Result<Vec<Option<String>>> {
        let count = match source.into() {
            Source::Reference(key) => self
                .read_span_annotation(&key, false)?
                .try_fold(0, |n, span| span.map(|_| n + 1))?,
            Source::Loaded(spans) => spans.len(),
        };
        Ok(vec![None; count])
    }

    fn open(&self, key: &AnnotationKey) -> Result<(File, PathBuf)> {
        let path = self.path(key);
        let file = File::open(&path).map_err(|e| missing_or_io(key, &path, e))?;
        Ok((file, path))
    }

    // Last present span already in the file, if any
    fn last_stored_span(&self, key: &AnnotationKey) -> Result<Option<Span>> {
        let mut reader = match self.read_span_annotation(key, true) {
            Ok(reader) => reader,
            Err(e) if e.is_missing() => return Ok(None),
            Err(e) => return Err(e),
        };
        reader.try_fold(None, |last, span| span.map(|span| span.or(last)))
    }

    fn write_lines<I>(&self, key: &AnnotationKey, lines: I, append: bool) -> Result<usize>
    where
        I: IntoIterator<Item = String>,
    {
        if !append {
            return self.stage_lines(key, lines, false)?.commit();
        }
        let path = self.path(key);
        fs::create_dir_all(parent_dir(&path))?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut out = BufWriter::new(file);
        let count = write_each(&mut out, lines)?;
        out.flush()?;
        touch(&path)?;
        Ok(count)
    }

    /// Write the new content of `key` to a temporary file next to it.
    ///
    /// Nothing is visible at the key's path until the result is committed.
    /// With `append` the staged file starts with the current content.
    pub(crate) fn stage_lines<I>(
        &self,
        key: &AnnotationKey,
        lines: I,
        append: bool,
    ) -> Result<StagedFile>
    where
        I: IntoIterator<Item = String>,
    {
        let path = self.path(key);
        let dir = parent_dir(&path);
        fs::create_dir_all(dir)?;
        let mut out = BufWriter::new(NamedTempFile::new_in(dir)?);
        if append {
            match File::open(&path) {
                Ok(mut current) => {
                    io::copy(&mut current, &mut out)?;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let count = write_each(&mut out, lines)?;
        let tmp = out.into_inner().map_err(|e| e.into_error())?;
        Ok(StagedFile { tmp, path, count })
    }
}

/// New content for one annotation file, not yet in place.
pub(crate) struct StagedFile {
    tmp: NamedTempFile,
    path: PathBuf,
    count: usize,
}

impl StagedFile {
    /// Move the content into place and bump its modification time.
    /// Returns the number of lines written.
    pub(crate) fn commit(self) -> Result<usize> {
        self.tmp.persist(&self.path).map_err(|e| e.error)?;
        touch(&self.path)?;
        Ok(self.count)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::from_env())
    }
}

pub(crate) fn check_attribute(key: &AnnotationKey) -> Result<()> {
    if key.field().attribute().is_none() {
        return Err(StoreError::schema_mismatch(format!(
            "{} is not an attribute annotation",
            key
        )));
    }
    Ok(())
}

/// Lines of an attribute file, with line breaks removed or escaped.
pub(crate) fn attribute_lines<I>(values: I, options: WriteOptions) -> impl Iterator<Item = String>
where
    I: IntoIterator,
    I::Item: AttributeValue,
{
    values.into_iter().map(move |value| match value.as_value() {
        None => String::new(),
        Some(value) if options.allow_newlines => escape_newlines(value),
        Some(value) => strip_newlines(value),
    })
}

fn check_order(key: &AnnotationKey, stored: Option<Span>, values: &[Option<Span>]) -> Result<()> {
    let mut previous = stored;
    for (index, value) in values.iter().enumerate() {
        let Some(current) = *value else { continue };
        if current.is_inverted() {
            return Err(StoreError::InvertedSpan {
                key: key.to_string(),
                index,
                span: current,
            });
        }
        if let Some(previous) = previous
            && current.start < previous.start
        {
            return Err(StoreError::OrderingViolation {
                key: key.to_string(),
                index,
                previous,
                current,
            });
        }
        previous = Some(current);
    }
    Ok(())
}

fn write_each<W: Write>(
    out: &mut W,
    lines: impl IntoIterator<Item = String>,
) -> io::Result<usize> {
    let mut count = 0;
    for line in lines {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        count += 1;
    }
    Ok(count)
}

// Bump the modification time even if nothing was written
fn touch(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn missing_or_io(key: &AnnotationKey, path: &Path, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::MissingFile {
            key: key.to_string(),
            path: path.to_path_buf(),
        }
    } else {
        e.into()
    }
}
