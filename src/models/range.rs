//! `Range` header parsing for single `bytes=` ranges.
//!
//! Accepted grammar: `bytes=<start>-<end>?` with ASCII digits only. Suffix
//! ranges, multiple ranges and other units are rejected rather than ignored,
//! so a client bug surfaces as a 416 instead of a silent full download.

use std::ops::Range;
use thiserror::Error;

const BYTES_UNIT: &str = "bytes=";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header `{0}`")]
    Malformed(String),
    #[error("range {start}-{end} not satisfiable for object of {size} bytes")]
    Unsatisfiable { start: u64, end: u64, size: u64 },
}

/// What part of an object a GET asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    Full,
    /// Inclusive on both ends; `start <= end < size`.
    Partial { start: u64, end: u64 },
}

/// The interval actually served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub start: u64,
    pub len: u64,
}

impl ByteSpan {
    /// Inclusive last offset. Meaningless for an empty span.
    pub fn end(&self) -> u64 {
        self.start + self.len.saturating_sub(1)
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.start + self.len
    }
}

impl RangeSpec {
    /// Parse an optional `Range` header value against a known object size.
    pub fn parse(header: Option<&str>, size: u64) -> Result<Self, RangeError> {
        let Some(raw) = header else {
            return Ok(RangeSpec::Full);
        };

        let (start, end) = parse_bounds(raw)?;
        let end = end.unwrap_or(size.saturating_sub(1));

        if size == 0 || start >= size || end >= size || start > end {
            return Err(RangeError::Unsatisfiable { start, end, size });
        }

        if start == 0 && end == size - 1 {
            return Ok(RangeSpec::Full);
        }

        Ok(RangeSpec::Partial { start, end })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, RangeSpec::Partial { .. })
    }

    /// Resolve to the concrete interval for an object of `size` bytes.
    pub fn span(&self, size: u64) -> ByteSpan {
        match *self {
            RangeSpec::Full => ByteSpan { start: 0, len: size },
            RangeSpec::Partial { start, end } => ByteSpan {
                start,
                len: end - start + 1,
            },
        }
    }
}

/// Split `bytes=<start>-<end>?` into its numeric bounds.
fn parse_bounds(raw: &str) -> Result<(u64, Option<u64>), RangeError> {
    let malformed = || RangeError::Malformed(raw.to_string());

    let spec = raw.trim().strip_prefix(BYTES_UNIT).ok_or_else(malformed)?;
    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;

    let start = parse_offset(start.trim()).ok_or_else(malformed)?;
    let end = match end.trim() {
        "" => None,
        digits => Some(parse_offset(digits).ok_or_else(malformed)?),
    };

    Ok((start, end))
}

/// Digits only; `u64::from_str` alone would also accept a leading `+`.
fn parse_offset(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
