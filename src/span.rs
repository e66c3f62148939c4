//! Text positions and spans, and their one-line encoding.
//!
//! A span is written as `start[.sub]-end[.sub]`, e.g. `12-15` or `12.1-12.2`.
//! Positions are signed so that synthetic data can sit before the first
//! anchor; sub-positions break ties between spans sharing a position.

use std::cmp::{Ordering, Reverse};
use std::fmt;

use crate::bytes::{bs_atoi, bs_atou, bs_split_once, bs_split_signed};

/// One side of a span.
///
/// Ordered by position, then sub-position, with a missing sub-position
/// sorting before any present one.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct Position {
    pub pos: i64,
    pub sub: Option<u32>,
}

impl Position {
    #[inline]
    pub const fn new(pos: i64) -> Self {
        Self { pos, sub: None }
    }

    #[inline]
    pub const fn with_sub(pos: i64, sub: u32) -> Self {
        Self {
            pos,
            sub: Some(sub),
        }
    }

    /// The same position with its sub-position dropped.
    #[inline]
    pub const fn without_sub(self) -> Self {
        Self::new(self.pos)
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        match bs_split_once(bytes, b'.') {
            Some((pos, sub)) => Some(Self::with_sub(bs_atoi(pos)?, bs_atou(sub)?)),
            None => Some(Self::new(bs_atoi(bytes)?)),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.pos, sub),
            None => write!(f, "{}", self.pos),
        }
    }
}

impl From<i64> for Position {
    fn from(pos: i64) -> Self {
        Self::new(pos)
    }
}

impl From<(i64, u32)> for Position {
    fn from((pos, sub): (i64, u32)) -> Self {
        Self::with_sub(pos, sub)
    }
}

/// A possibly zero-width range between two positions.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Shorthand for a span without sub-positions.
    #[inline]
    pub const fn at(start: i64, end: i64) -> Self {
        Self::new(Position::new(start), Position::new(end))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn has_subpositions(&self) -> bool {
        self.start.sub.is_some() && self.end.sub.is_some()
    }

    #[inline]
    pub const fn without_subpositions(self) -> Self {
        Self::new(self.start.without_sub(), self.end.without_sub())
    }

    /// True if the span ends before it starts.
    #[inline]
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// True if `other` lies within this span (boundaries inclusive).
    #[inline]
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Sort key for document order: start ascending, then end descending, so
    /// an enclosing span precedes the spans it encloses.
    #[inline]
    pub fn doc_order_key(&self) -> (Position, Reverse<Position>) {
        (self.start, Reverse(self.end))
    }

    /// Compare two spans in document order.
    #[inline]
    pub fn doc_order(&self, other: &Span) -> Ordering {
        self.doc_order_key().cmp(&other.doc_order_key())
    }

    /// Decode one stored line; `None` if it is not a span.
    pub fn decode(line: &[u8]) -> Option<Self> {
        let (start, end) = bs_split_signed(line, b'-')?;
        Some(Self::new(Position::parse(start)?, Position::parse(end)?))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl From<(i64, i64)> for Span {
    fn from((start, end): (i64, i64)) -> Self {
        Self::at(start, end)
    }
}

/// Encode an optional span as a stored line (without the newline).
pub fn encode_span(value: Option<&Span>) -> String {
    value.map(Span::to_string).unwrap_or_default()
}
