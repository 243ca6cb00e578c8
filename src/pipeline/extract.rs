//! Image extraction and Markdown rewriting: the heart of the pipeline.
//!
//! For every page, in order, each embedded image record is decoded and saved
//! as `{base}_p{page}_img{n}{ext}` under the document's `images/` directory,
//! then every `![id](id)` reference on that page is replaced by an inline
//! `data:image/png;base64,…` URI of the saved bytes. Pages are joined with
//! [`PAGE_SEPARATOR`].
//!
//! `n` comes from an [`ImageCounter`] owned by one document run and passed
//! down explicitly, so it keeps increasing across page boundaries and two
//! documents never share it.
//!
//! Failures on a single image (bad base64, write error) skip that image and
//! are reported as [`ImageError`]; they never abort the page.

use crate::config::PAGE_SEPARATOR;
use crate::error::ImageError;
use crate::gateway::{OcrPage, OcrResult};
use crate::output::{ExtractedDocument, ExtractedImage};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::{debug, warn};

/// Extension used when the image identifier has none.
pub const DEFAULT_IMAGE_EXT: &str = ".png";

/// Per-document image sequence number, starting at 1.
///
/// A number is consumed as soon as a payload decodes, even if writing the
/// file then fails; numbers are never reused.
#[derive(Debug)]
pub struct ImageCounter {
    next: usize,
}

impl ImageCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Return the current value and advance.
    pub fn take(&mut self) -> usize {
        let n = self.next;
        self.next += 1;
        n
    }
}

impl Default for ImageCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Run extraction + rewrite over a whole OCR response.
///
/// `images_dir` must already exist. Files are written with plain overwrite
/// semantics, so re-running with the same input reproduces the same names
/// and contents without prior cleanup.
pub fn extract_document(result: &OcrResult, images_dir: &Path, base: &str) -> ExtractedDocument {
    let mut counter = ImageCounter::new();
    let mut doc = ExtractedDocument {
        page_count: result.pages.len(),
        ..Default::default()
    };
    let mut pages = Vec::with_capacity(result.pages.len());

    for (idx, page) in result.pages.iter().enumerate() {
        let page_num = idx + 1;
        let rewritten = extract_page(page, page_num, images_dir, base, &mut counter, &mut doc);
        pages.push(rewritten);
    }

    doc.markdown = pages.join(PAGE_SEPARATOR);
    debug!(
        "Extracted {} images from {} pages ({} skipped)",
        doc.images.len(),
        doc.page_count,
        doc.warnings.len()
    );
    doc
}

/// Extract one page's images into `doc` and return its rewritten Markdown.
fn extract_page(
    page: &OcrPage,
    page_num: usize,
    images_dir: &Path,
    base: &str,
    counter: &mut ImageCounter,
    doc: &mut ExtractedDocument,
) -> String {
    // id → saved bytes, in first-seen order; a repeated id keeps the latest bytes.
    let mut mapping: Vec<(String, Vec<u8>)> = Vec::new();

    for image in &page.images {
        let payload = match image.image_base64.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => continue,
        };

        let bytes = match decode_payload(payload) {
            Ok(bytes) => bytes,
            Err(PayloadError::MissingSeparator) => {
                debug!("Page {}: data URI for '{}' has no payload", page_num, image.id);
                doc.warnings.push(ImageError::MissingSeparator {
                    page: page_num,
                    id: image.id.clone(),
                });
                continue;
            }
            Err(PayloadError::Decode(detail)) => {
                let err = ImageError::Decode {
                    page: page_num,
                    id: image.id.clone(),
                    detail,
                };
                warn!("{}", err);
                doc.warnings.push(err);
                continue;
            }
        };

        let n = counter.take();
        let filename = format!(
            "{}_p{}_img{}{}",
            base,
            page_num,
            n,
            image_extension(&image.id)
        );
        let path = images_dir.join(&filename);

        if let Err(e) = std::fs::write(&path, &bytes) {
            let err = ImageError::Write {
                page: page_num,
                path: path.display().to_string(),
                detail: e.to_string(),
            };
            warn!("{}", err);
            doc.warnings.push(err);
            continue;
        }

        match mapping.iter_mut().find(|(id, _)| *id == image.id) {
            Some(entry) => entry.1 = bytes,
            None => mapping.push((image.id.clone(), bytes)),
        }
        doc.images.push(ExtractedImage {
            original_id: image.id.clone(),
            filename,
            page_num,
            path,
        });
    }

    rewrite_markdown(&page.markdown, &mapping)
}

enum PayloadError {
    MissingSeparator,
    Decode(String),
}

/// Strip an optional `data:…,` prefix and base64-decode the rest.
fn decode_payload(payload: &str) -> Result<Vec<u8>, PayloadError> {
    let data = if payload.starts_with("data:") {
        match payload.split_once(',') {
            Some((_, data)) => data,
            None => return Err(PayloadError::MissingSeparator),
        }
    } else {
        payload
    };

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| PayloadError::Decode(e.to_string()))
}

/// File extension (with dot) of an image identifier, `.png` when absent.
///
/// Only ASCII alphanumerics of the suffix are kept so a provider id can never
/// inject separators into the generated name.
pub fn image_extension(id: &str) -> String {
    let ext: String = Path::new(id)
        .extension()
        .map(|e| e.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if ext.is_empty() {
        DEFAULT_IMAGE_EXT.to_string()
    } else {
        format!(".{ext}")
    }
}

/// Replace every literal `![id](id)` with an inline PNG data URI.
///
/// Identifiers without a successfully saved image are left untouched.
pub fn rewrite_markdown(markdown: &str, mapping: &[(String, Vec<u8>)]) -> String {
    let mut out = markdown.to_string();
    for (id, bytes) in mapping {
        let pattern = format!("![{id}]({id})");
        if !out.contains(&pattern) {
            continue;
        }
        let replacement = format!("![Image](data:image/png;base64,{})", STANDARD.encode(bytes));
        out = out.replace(&pattern, &replacement);
    }
    out
}
