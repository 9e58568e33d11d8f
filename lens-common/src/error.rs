//! Error type shared by the document, archive, and XML codecs.

use thiserror::Error;

/// Errors surfaced by the lens codecs.
///
/// Everything here is fatal for the file being decoded. Degradations that
/// should not abort a whole import (a missing asset file, an unsupported
/// provider) are reported by the semantic layer instead of raised here.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource header declared a version other than 1 or 2.
    #[error("resource version {0} not supported")]
    UnsupportedVersion(u32),

    /// A read or seek ran past the end of the buffer.
    #[error("read past end of buffer")]
    OutOfBounds,

    /// The value stream contained a field tag outside the known set.
    #[error("unknown field tag 0x{0:02x}")]
    UnknownTag(u16),

    /// A string-table reference pointed outside the table.
    #[error("string table index {0} out of range")]
    BadStringRef(u32),

    /// An inline or pooled string was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidString,

    /// The `.lns` container magic did not match.
    #[error("not a lens archive (bad magic)")]
    InvalidArchive,

    /// The archive blob failed to decompress.
    #[error("archive decompression failed")]
    CorruptArchive(#[source] std::io::Error),

    /// A byte-pool array matched neither the raw-bytes, string-list, nor
    /// fixed-stride record interpretation.
    #[error("failed to infer array structure at offset {offset}")]
    AmbiguousArray { offset: usize },

    /// The XML mirror input was structurally invalid.
    #[error("malformed xml: {0}")]
    MalformedXml(String),

    /// A decoded document did not have the shape a consumer required.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for shape violations found while interpreting a document.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedDocument(msg.into())
    }
}
