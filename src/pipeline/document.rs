//! One PDF through the OCR gateway and the extractor.
//!
//! ```text
//! mkdir out/ + images/ ─▶ upload ─▶ signed_url ─▶ process ─▶ delete remote
//!                                                     │
//!             ocr_response.json ◀─────────────────────┤
//!                                                     ▼
//!                               extract images + rewrite ─▶ {base}_output.md
//! ```
//!
//! The remote copy is deleted whether `signed_url`/`process` succeeded or
//! not; a failed delete is logged and otherwise ignored.

use crate::error::Ocr2MdError;
use crate::gateway::{FileHandle, OcrGateway, OcrResult};
use crate::output::ExtractedDocument;
use crate::pipeline::extract;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the optional raw OCR snapshot inside a document directory.
pub const RAW_RESPONSE_FILENAME: &str = "ocr_response.json";

/// Name of the images subdirectory inside a document directory.
pub const IMAGES_DIRNAME: &str = "images";

/// Paths and names for one accepted PDF of a session.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    pub original_filename: String,
    /// Sanitised document base.
    pub pdf_base: String,
    /// Temporary copy of the upload.
    pub input_path: PathBuf,
    /// `{session_output}/{base}/`
    pub output_dir: PathBuf,
    /// `{session_output}/{base}/images/`
    pub images_dir: PathBuf,
}

impl DocumentJob {
    pub fn new(
        original_filename: impl Into<String>,
        pdf_base: impl Into<String>,
        input_path: impl Into<PathBuf>,
        session_output_dir: &Path,
    ) -> Self {
        let pdf_base = pdf_base.into();
        let output_dir = session_output_dir.join(&pdf_base);
        let images_dir = output_dir.join(IMAGES_DIRNAME);
        Self {
            original_filename: original_filename.into(),
            pdf_base,
            input_path: input_path.into(),
            output_dir,
            images_dir,
        }
    }

    /// `{base}_output.md` inside the document directory.
    pub fn markdown_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_output.md", self.pdf_base))
    }

    /// `{base}_output.zip`, stored next to (not inside) the document directory.
    pub fn archive_filename(&self) -> String {
        format!("{}_output.zip", self.pdf_base)
    }
}

/// Knobs for [`process_document`].
#[derive(Debug, Clone, Copy)]
pub struct DocumentOptions {
    pub signed_url_expiry: u32,
    pub save_raw_response: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            signed_url_expiry: 60,
            save_raw_response: true,
        }
    }
}

/// Output of a successful [`process_document`].
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub extracted: ExtractedDocument,
    pub markdown_path: PathBuf,
}

/// Run the full OCR round-trip and local extraction for one document.
///
/// # Errors
/// - [`Ocr2MdError::DocumentIo`] if the output directories cannot be
///   created, the upload cannot be read, or the Markdown cannot be written
/// - gateway errors from `upload`, `signed_url` and `process` as returned
pub async fn process_document(
    gateway: &dyn OcrGateway,
    job: &DocumentJob,
    options: DocumentOptions,
) -> Result<ProcessedDocument, Ocr2MdError> {
    info!("Processing {}...", job.original_filename);

    // ── Step 1: Output layout ────────────────────────────────────────────
    tokio::fs::create_dir_all(&job.images_dir)
        .await
        .map_err(|e| Ocr2MdError::io(&job.images_dir, e))?;

    // ── Step 2: OCR round-trip ───────────────────────────────────────────
    let bytes = tokio::fs::read(&job.input_path)
        .await
        .map_err(|e| Ocr2MdError::io(&job.input_path, e))?;
    let upload_name = job
        .input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.pdf", job.pdf_base));

    info!("  Uploading {} to OCR provider...", upload_name);
    let handle = gateway.upload(bytes, &upload_name).await?;
    debug!("  File uploaded (ID: {})", handle.id);

    let ocr = run_ocr(gateway, &handle, options.signed_url_expiry).await;
    delete_remote(gateway, &handle).await;
    let ocr = ocr?;
    info!(
        "  OCR processing complete for {} ({} pages).",
        job.original_filename,
        ocr.pages.len()
    );

    // ── Step 3: Raw snapshot (optional) ──────────────────────────────────
    if options.save_raw_response {
        save_snapshot(&ocr, &job.output_dir.join(RAW_RESPONSE_FILENAME)).await;
    }

    // ── Step 4: Extract images + rewrite Markdown ────────────────────────
    let images_dir = job.images_dir.clone();
    let base = job.pdf_base.clone();
    let extracted =
        tokio::task::spawn_blocking(move || extract::extract_document(&ocr, &images_dir, &base))
            .await
            .map_err(|e| Ocr2MdError::Internal(format!("Extraction task panicked: {}", e)))?;

    // ── Step 5: Final Markdown ───────────────────────────────────────────
    let markdown_path = job.markdown_path();
    tokio::fs::write(&markdown_path, &extracted.markdown)
        .await
        .map_err(|e| Ocr2MdError::io(&markdown_path, e))?;
    info!("  Markdown generated at {}", markdown_path.display());

    Ok(ProcessedDocument {
        extracted,
        markdown_path,
    })
}

async fn run_ocr(
    gateway: &dyn OcrGateway,
    handle: &FileHandle,
    expiry: u32,
) -> Result<OcrResult, Ocr2MdError> {
    // The signed URL is short-lived: request it right before processing.
    let url = gateway.signed_url(handle, expiry).await?;
    gateway.process(&url).await
}

async fn delete_remote(gateway: &dyn OcrGateway, handle: &FileHandle) {
    match gateway.delete(handle).await {
        Ok(()) => debug!("  Deleted remote file {}", handle.id),
        Err(e) => warn!("  Could not delete remote file {}: {}", handle.id, e),
    }
}

async fn save_snapshot(ocr: &OcrResult, path: &Path) {
    let json = match serde_json::to_string_pretty(ocr) {
        Ok(json) => json,
        Err(e) => {
            warn!("  Could not serialise raw OCR response: {}", e);
            return;
        }
    };
    match tokio::fs::write(path, json).await {
        Ok(()) => debug!("  Raw OCR response saved to {}", path.display()),
        Err(e) => warn!("  Could not save raw OCR response {}: {}", path.display(), e),
    }
}
