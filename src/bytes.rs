//! Byte-level helpers for the line codecs.

use atoi::{FromRadix10Checked, FromRadix10SignedChecked};
use memchr::memchr;

// Divide a bytestring into two at delim
#[inline]
pub fn bs_split_once(bytes: &[u8], delim: u8) -> Option<(&[u8], &[u8])> {
    let at = memchr(delim, bytes)?;
    Some((&bytes[..at], &bytes[at + 1..]))
}

// Like bs_split_once, but the first byte never counts as the delimiter, so a
// leading minus sign stays with the left half ("-5--1" -> "-5", "-1").
#[inline]
pub fn bs_split_signed(bytes: &[u8], delim: u8) -> Option<(&[u8], &[u8])> {
    if bytes.is_empty() {
        return None;
    }
    let at = memchr(delim, &bytes[1..])? + 1;
    Some((&bytes[..at], &bytes[at + 1..]))
}

/// Parse a whole slice as an unsigned decimal; rejects signs, blanks,
/// trailing garbage and overflow.
#[inline]
pub fn bs_atou(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    match u32::from_radix_10_checked(bytes) {
        (Some(n), used) if used == bytes.len() => Some(n),
        _ => None,
    }
}

/// Parse a whole slice as a signed decimal.
#[inline]
pub fn bs_atoi(bytes: &[u8]) -> Option<i64> {
    // A lone sign consumes a byte without producing digits
    if !bytes.last()?.is_ascii_digit() {
        return None;
    }
    match i64::from_radix_10_signed_checked(bytes) {
        (Some(n), used) if used == bytes.len() => Some(n),
        _ => None,
    }
}

/// Make a value fit on one line, keeping line breaks as `\n` escapes.
pub fn escape_newlines(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_newlines`].
///
/// Only an unescaped backslash followed by `n` becomes a line break; `\\`
/// becomes a single backslash and any other escape is kept verbatim.
pub fn unescape_newlines(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Drop line breaks so a value cannot spill onto the next line.
pub fn strip_newlines(value: &str) -> String {
    value.chars().filter(|&c| c != '\n' && c != '\r').collect()
}
