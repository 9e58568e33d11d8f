//! Byte-pool span resolution and array shape inference.
//!
//! An array field declares only a pool offset and an element count; the
//! element width is not stored anywhere. Byte lengths are recovered from
//! adjacency: arrays are packed back to back in the pool, so each span
//! runs from its offset to the next array's offset (the last runs to the
//! end of the pool).
//!
//! The shape of a span is then inferred from how its byte length relates
//! to the declared count. This drives the XML mirror; semantic consumers
//! like the mesh layer know their element types and read spans directly.

use std::ops::Range;

use crate::cursor::ByteReader;
use crate::error::{Error, Result};

/// One array's resolved location in the byte pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpan {
    pub offset: u32,
    pub count: u32,
    pub range: Range<usize>,
}

/// Resolve declared `(offset, count)` pairs to pool byte ranges.
///
/// Returned spans are sorted by offset. Offsets past the end of the pool
/// are rejected; duplicate offsets yield zero-length spans for all but
/// the last duplicate, which is as close to faithful as adjacency allows.
pub fn resolve_spans(declared: &[(u32, u32)], pool_len: usize) -> Result<Vec<ResolvedSpan>> {
    let mut sorted = declared.to_vec();
    sorted.sort_by_key(|&(offset, _)| offset);

    let mut spans = Vec::with_capacity(sorted.len());
    for (i, &(offset, count)) in sorted.iter().enumerate() {
        let start = offset as usize;
        let end = match sorted.get(i + 1) {
            Some(&(next_offset, _)) => next_offset as usize,
            None => pool_len,
        };
        if end > pool_len || start > end {
            return Err(Error::OutOfBounds);
        }
        spans.push(ResolvedSpan { offset, count, range: start..end });
    }
    Ok(spans)
}

/// Inferred interpretation of one array span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayShape {
    /// One byte per declared element.
    Raw(Vec<u8>),
    /// `count` length-prefixed UTF-8 strings consuming the span exactly.
    Strings(Vec<String>),
    /// `count` fixed-stride records.
    Records(Vec<Vec<u8>>),
}

/// Infer the shape of a span, trying raw bytes, then a string list, then
/// fixed-stride records.
///
/// `file_offset` is the span's absolute file offset, used only in the
/// [`Error::AmbiguousArray`] report.
pub fn classify(bytes: &[u8], count: u32, file_offset: usize) -> Result<ArrayShape> {
    let count = count as usize;
    if bytes.len() == count {
        return Ok(ArrayShape::Raw(bytes.to_vec()));
    }
    if let Some(strings) = try_strings(bytes, count) {
        return Ok(ArrayShape::Strings(strings));
    }
    if count > 0 && !bytes.is_empty() && bytes.len() % count == 0 {
        let stride = bytes.len() / count;
        let records = bytes.chunks(stride).map(<[u8]>::to_vec).collect();
        return Ok(ArrayShape::Records(records));
    }
    Err(Error::AmbiguousArray { offset: file_offset })
}

/// A span is a string list only if `count` length-prefixed strings
/// consume it exactly.
fn try_strings(bytes: &[u8], count: usize) -> Option<Vec<String>> {
    let mut reader = ByteReader::new(bytes);
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u32().ok()? as usize;
        strings.push(reader.read_str(len).ok()?.to_owned());
    }
    reader.is_finished().then_some(strings)
}
