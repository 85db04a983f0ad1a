//! Error types for the watermarking engine.
//!
//! All errors surfaced across the crate boundary carry the `pdfcpu:` prefix
//! (see spec §6/§7) so callers can pattern-match on the message the way the
//! originating tool's own callers do.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the watermarking engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed configuration string: out-of-range value, ambiguous or
    /// unknown parameter prefix, conflicting rotation+diagonal, etc.
    #[error("pdfcpu: {0}")]
    Parse(String),

    /// Font name not in the base-font metrics catalog
    /// (Helvetica, Times-Roman, Courier).
    #[error("pdfcpu: unsupported font: {0}")]
    UnsupportedFont(String),

    /// A content stream's `Filter` entry names a filter we don't implement.
    /// Fatal when ingesting a donor PDF's content stream; logged and the
    /// page skipped when encountered while removing watermarks.
    #[error("pdfcpu: unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Donor PDF page has an empty content stream.
    #[error("pdfcpu: donor page has no content")]
    NoContent,

    /// Donor page number out of range.
    #[error("pdfcpu: unknown page: {0}")]
    UnknownPage(i64),

    /// Encountered during removal when the expected `OCGs` array cannot be
    /// dereferenced.
    #[error("pdfcpu: corrupt resource dictionary: {0}")]
    CorruptResourceDict(String),

    /// Sentinel returned by remove when no matching OCG exists or no page
    /// yielded an excision.
    #[error("pdfcpu: no watermarks found")]
    NoWatermarksFound,

    /// Page index supplied by the caller does not exist in the document.
    #[error("pdfcpu: page not found: {0}")]
    PageNotFound(u32),

    /// Underlying PDF object-table error.
    #[error("pdfcpu: {0}")]
    Pdf(#[from] lopdf::Error),

    /// File I/O error.
    #[error("pdfcpu: {0}")]
    Io(#[from] std::io::Error),

    /// Raster image could not be decoded.
    #[error("pdfcpu: image decode error: {0}")]
    Image(String),
}
