//! Session orchestration: one batch upload, start to finish.
//!
//! A batch gets a fresh [`UploadSession`] with two directories:
//!
//! ```text
//! {upload_root}/{session_id}/            temp copies, removed at the end
//! {output_root}/{session_id}/{base}/     markdown, images/, ocr_response.json
//! {output_root}/{session_id}/{base}_output.zip
//! ```
//!
//! Files are processed strictly one after another. A document that fails
//! adds one line to [`BatchOutcome::errors`] and the loop moves on; the batch
//! is only a failure when no document succeeded.

use crate::config::{allowed_file, ServerConfig};
use crate::error::Ocr2MdError;
use crate::gateway::{provider_message, OcrGateway};
use crate::output::{BatchOutcome, DocumentResult};
use crate::pipeline::archive;
use crate::pipeline::document::{process_document, DocumentJob, DocumentOptions};
use crate::sanitize::{document_base, secure_filename, upload_filename};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// A file received in a batch request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename as sent by the client (not sanitised).
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Directories owned by one batch request.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl UploadSession {
    /// New session with a random UUID id.
    pub fn new(upload_root: &Path, output_root: &Path) -> Self {
        Self::with_id(&Uuid::new_v4().to_string(), upload_root, output_root)
    }

    /// Session with a caller-chosen id; the id is sanitised before use.
    pub fn with_id(id: &str, upload_root: &Path, output_root: &Path) -> Self {
        let id = secure_filename(id);
        Self {
            upload_dir: upload_root.join(&id),
            output_dir: output_root.join(&id),
            id,
        }
    }

    async fn create_dirs(&self) -> Result<(), Ocr2MdError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Ocr2MdError::io(dir, e))?;
        }
        Ok(())
    }

    async fn remove_upload_dir(&self) {
        match tokio::fs::remove_dir_all(&self.upload_dir).await {
            Ok(()) => info!(
                "Cleaned up session upload directory: {}",
                self.upload_dir.display()
            ),
            Err(e) => warn!(
                "Could not delete session upload directory {}: {}",
                self.upload_dir.display(),
                e
            ),
        }
    }
}

/// Runs batches against the configured directory roots.
#[derive(Debug, Clone)]
pub struct SessionOrchestrator {
    upload_root: PathBuf,
    output_root: PathBuf,
    options: DocumentOptions,
}

impl SessionOrchestrator {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
            options: DocumentOptions::default(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            upload_root: config.upload_dir.clone(),
            output_root: config.output_dir.clone(),
            options: DocumentOptions {
                signed_url_expiry: config.signed_url_expiry,
                save_raw_response: config.save_raw_response,
            },
        }
    }

    pub fn with_options(mut self, options: DocumentOptions) -> Self {
        self.options = options;
        self
    }

    /// Process a batch in a new session.
    ///
    /// # Errors
    /// - [`Ocr2MdError::InvalidInput`] when no file was selected or none is a PDF
    /// - [`Ocr2MdError::DocumentIo`] when the session directories cannot be created
    ///
    /// Per-document failures are not errors here; they are listed in
    /// [`BatchOutcome::errors`].
    pub async fn run(
        &self,
        gateway: &dyn OcrGateway,
        files: Vec<UploadedFile>,
    ) -> Result<BatchOutcome, Ocr2MdError> {
        let session = UploadSession::new(&self.upload_root, &self.output_root);
        self.run_in(&session, gateway, files).await
    }

    /// Process a batch in an explicit session.
    pub async fn run_in(
        &self,
        session: &UploadSession,
        gateway: &dyn OcrGateway,
        files: Vec<UploadedFile>,
    ) -> Result<BatchOutcome, Ocr2MdError> {
        // ── Step 1: Filter ───────────────────────────────────────────────
        if files.iter().all(|f| f.filename.is_empty()) {
            return Err(Ocr2MdError::InvalidInput("No selected PDF files".into()));
        }

        let (valid, invalid): (Vec<UploadedFile>, Vec<UploadedFile>) = files
            .into_iter()
            .filter(|f| !f.filename.is_empty())
            .partition(|f| allowed_file(&f.filename));
        let skipped: Vec<String> = invalid.into_iter().map(|f| f.filename).collect();

        if valid.is_empty() {
            let mut msg = String::from("No valid PDF files found.");
            if !skipped.is_empty() {
                msg.push_str(&format!(" Invalid files skipped: {}", skipped.join(", ")));
            }
            return Err(Ocr2MdError::InvalidInput(msg));
        }

        // ── Step 2: Session directories ──────────────────────────────────
        session.create_dirs().await?;
        info!(
            "Session {}: {} PDF(s) accepted, {} skipped",
            session.id,
            valid.len(),
            skipped.len()
        );

        let mut outcome = BatchOutcome {
            session_id: session.id.clone(),
            skipped: skipped.clone(),
            ..Default::default()
        };
        if !skipped.is_empty() {
            outcome
                .errors
                .push(format!("Skipped non-PDF files: {}", skipped.join(", ")));
        }

        // ── Step 3: Documents, one at a time ─────────────────────────────
        let mut used_bases = HashSet::new();
        for file in valid {
            let base = unique_base(document_base(&file.filename), &mut used_bases);
            let temp_path = session
                .upload_dir
                .join(upload_filename(&file.filename, &base));
            let job = DocumentJob::new(&file.filename, base, &temp_path, &session.output_dir);

            match self.process_one(session, gateway, &job, &file.bytes).await {
                Ok(result) => {
                    info!("Successfully processed and zipped: {}", file.filename);
                    outcome.results.push(result);
                }
                Err(e) => {
                    let msg = provider_message(&e.to_string());
                    warn!("Failed processing {}: {}", file.filename, msg);
                    outcome
                        .errors
                        .push(format!("{}: Processing Error - {}", file.filename, msg));
                }
            }

            remove_temp_file(&temp_path).await;
        }

        // ── Step 4: Cleanup ──────────────────────────────────────────────
        session.remove_upload_dir().await;

        Ok(outcome)
    }

    async fn process_one(
        &self,
        session: &UploadSession,
        gateway: &dyn OcrGateway,
        job: &DocumentJob,
        bytes: &[u8],
    ) -> Result<DocumentResult, Ocr2MdError> {
        tokio::fs::write(&job.input_path, bytes)
            .await
            .map_err(|e| Ocr2MdError::io(&job.input_path, e))?;

        let processed = process_document(gateway, job, self.options).await?;

        let archive_filename = job.archive_filename();
        let archive_path = session.output_dir.join(&archive_filename);
        let source = job.output_dir.clone();
        let dest = archive_path.clone();
        tokio::task::spawn_blocking(move || archive::create_zip_archive(&source, &dest))
            .await
            .map_err(|e| Ocr2MdError::Internal(format!("Archive task panicked: {}", e)))??;

        let image_filenames = processed.extracted.image_filenames();
        Ok(DocumentResult {
            original_filename: job.original_filename.clone(),
            pdf_base: job.pdf_base.clone(),
            markdown: processed.extracted.markdown,
            image_filenames,
            markdown_path: processed.markdown_path,
            images_dir: job.images_dir.clone(),
            archive_path,
            archive_filename,
            warnings: processed.extracted.warnings,
        })
    }
}

/// Suffix `_2`, `_3`, … so two uploads with the same stem never share a directory.
fn unique_base(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not delete temp file {}: {}", path.display(), e),
    }
}
