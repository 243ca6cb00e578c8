//! Error types for the ocr2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Ocr2MdError`] is **fatal**: the request or a single document cannot
//!   proceed (no usable files, OCR provider unreachable, output directory
//!   not writable, archive failed). Inside a batch a fatal error aborts only
//!   the document it belongs to; the orchestrator records it and moves on.
//!
//! * [`ImageError`] is **non-fatal**: one embedded image could not be decoded
//!   or written. The page and the document continue; the error is logged and
//!   kept in [`crate::output::DocumentResult::warnings`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr2md library.
///
/// Image-level failures use [`ImageError`] and are never propagated here.
#[derive(Debug, Error)]
pub enum Ocr2MdError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The batch carried nothing that can be processed.
    #[error("{0}")]
    InvalidInput(String),

    // ── OCR gateway errors ────────────────────────────────────────────────
    /// Network, TLS or authentication failure talking to the OCR provider.
    #[error("OCR transport error: {message}")]
    Transport { message: String },

    /// The provider accepted the request but reported a processing failure.
    #[error("{message}")]
    Processing { message: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// Could not create an output directory or write the final Markdown.
    #[error("Failed to write '{path}': {source}")]
    DocumentIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bundling the document output directory failed.
    #[error("Failed to archive '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    // ── Delivery errors ───────────────────────────────────────────────────
    /// A requested path would leave its expected directory.
    #[error("Invalid path")]
    PathTraversal { requested: String },

    /// The requested file does not exist.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Ocr2MdError {
    /// Wrap an I/O failure on `path` as a document-fatal error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DocumentIo {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by the client rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::PathTraversal { .. } | Self::NotFound { .. }
        )
    }
}

/// A non-fatal error for a single embedded image.
///
/// The image is skipped; every other image of the page and the page's
/// Markdown are still produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The payload was a `data:` URI without a `,` separator.
    #[error("Page {page}: image '{id}' is a data URI without payload separator")]
    MissingSeparator { page: usize, id: String },

    /// Base64 decoding failed.
    #[error("Page {page}: base64 decode error for image '{id}': {detail}")]
    Decode {
        page: usize,
        id: String,
        detail: String,
    },

    /// The decoded bytes could not be written to the images directory.
    #[error("Page {page}: could not write image file '{path}': {detail}")]
    Write {
        page: usize,
        path: String,
        detail: String,
    },
}
