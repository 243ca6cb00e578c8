//! Result types produced by the pipeline and returned by `/process`.

use crate::error::ImageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One image written to a document's `images/` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// Provider identifier the image was referenced by in the page Markdown.
    pub original_id: String,
    /// Generated name: `{base}_p{page}_img{n}{ext}`.
    pub filename: String,
    /// 1-indexed page the image came from.
    pub page_num: usize,
    /// Full path of the written file.
    pub path: PathBuf,
}

/// Outcome of running extraction + rewrite over one OCR response.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    /// Rewritten pages joined with [`crate::config::PAGE_SEPARATOR`].
    pub markdown: String,
    /// Images in extraction order.
    pub images: Vec<ExtractedImage>,
    /// Skipped images.
    pub warnings: Vec<ImageError>,
    /// Number of OCR pages seen.
    pub page_count: usize,
}

impl ExtractedDocument {
    /// Generated image filenames in extraction order.
    pub fn image_filenames(&self) -> Vec<String> {
        self.images.iter().map(|i| i.filename.clone()).collect()
    }
}

/// Everything produced for one successfully processed PDF.
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub original_filename: String,
    /// Sanitised document base, the namespace of every output name.
    pub pdf_base: String,
    pub markdown: String,
    pub image_filenames: Vec<String>,
    pub markdown_path: PathBuf,
    pub images_dir: PathBuf,
    pub archive_path: PathBuf,
    pub archive_filename: String,
    pub warnings: Vec<ImageError>,
}

/// Preview payload shown by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub markdown: String,
    pub images: Vec<String>,
    pub pdf_base: String,
}

/// One entry of the `results` array of a `/process` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub original_filename: String,
    pub zip_filename: String,
    pub download_url: String,
    pub preview: Preview,
}

impl ProcessedFile {
    /// Build the response entry; `download_url` is supplied by the HTTP layer.
    pub fn from_result(result: &DocumentResult, download_url: String) -> Self {
        Self {
            original_filename: result.original_filename.clone(),
            zip_filename: result.archive_filename.clone(),
            download_url,
            preview: Preview {
                markdown: result.markdown.clone(),
                images: result.image_filenames.clone(),
                pdf_base: result.pdf_base.clone(),
            },
        }
    }
}

/// Aggregate of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub session_id: String,
    pub results: Vec<DocumentResult>,
    /// Non-PDF names that were filtered out.
    pub skipped: Vec<String>,
    /// One message per failed document, prefixed with the skip summary
    /// when files were skipped.
    pub errors: Vec<String>,
}

impl BatchOutcome {
    /// A batch fails only when nothing succeeded.
    pub fn is_success(&self) -> bool {
        !self.results.is_empty()
    }
}

/// Successful `/process` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub session_id: String,
    pub results: Vec<ProcessedFile>,
    pub errors: Vec<String>,
}

/// JSON error body for `/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details),
        }
    }
}
