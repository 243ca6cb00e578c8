//! Resolve request path segments to files under the output root.
//!
//! Two kinds of files are served:
//!
//! ```text
//! image:   {output_root}/{session}/{base}/images/{filename}
//! archive: {output_root}/{session}/{filename}
//! ```
//!
//! Each segment must already be a sanitised name (see
//! [`checked_segment`]); anything else is rejected as
//! [`Ocr2MdError::PathTraversal`] before the filesystem is touched. The
//! joined path is then canonicalised and must stay inside the canonical
//! expected directory, which also catches symlinks pointing elsewhere.

use crate::error::Ocr2MdError;
use crate::pipeline::document::IMAGES_DIRNAME;
use crate::sanitize::checked_segment;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Locate an extracted image for `/view_image/{session}/{base}/{filename}`.
pub fn resolve_image(
    output_root: &Path,
    session_id: &str,
    pdf_base: &str,
    filename: &str,
) -> Result<PathBuf, Ocr2MdError> {
    let session = segment(session_id)?;
    let base = segment(pdf_base)?;
    let file = segment(filename)?;
    let dir = output_root.join(session).join(base).join(IMAGES_DIRNAME);
    contained_file(&dir, &file, "Image")
}

/// Locate a session archive for `/download/{session}/{filename}`.
pub fn resolve_archive(
    output_root: &Path,
    session_id: &str,
    filename: &str,
) -> Result<PathBuf, Ocr2MdError> {
    let session = segment(session_id)?;
    let file = segment(filename)?;
    contained_file(&output_root.join(session), &file, "File")
}

/// Content type for a resolved file, by extension.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn segment(raw: &str) -> Result<String, Ocr2MdError> {
    checked_segment(raw).ok_or_else(|| {
        warn!("Rejected unsafe path segment: {:?}", raw);
        Ocr2MdError::PathTraversal {
            requested: raw.to_string(),
        }
    })
}

fn contained_file(dir: &Path, name: &str, what: &'static str) -> Result<PathBuf, Ocr2MdError> {
    let not_found = || Ocr2MdError::NotFound { what };

    let canonical_dir = dir.canonicalize().map_err(|_| not_found())?;
    let canonical_file = canonical_dir
        .join(name)
        .canonicalize()
        .map_err(|_| not_found())?;

    if !canonical_file.starts_with(&canonical_dir) {
        warn!(
            "Path {} escapes {}",
            canonical_file.display(),
            canonical_dir.display()
        );
        return Err(Ocr2MdError::PathTraversal {
            requested: name.to_string(),
        });
    }
    if !canonical_file.is_file() {
        return Err(not_found());
    }
    Ok(canonical_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("sid/doc/images");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::write(images.join("doc_p1_img1.png"), b"png").unwrap();
        std::fs::write(tmp.path().join("sid/doc_output.zip"), b"zip").unwrap();
        std::fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();
        tmp
    }

    #[test]
    fn resolves_existing_files() {
        let tmp = layout();
        let img = resolve_image(tmp.path(), "sid", "doc", "doc_p1_img1.png").unwrap();
        assert_eq!(std::fs::read(img).unwrap(), b"png");
        let zip = resolve_archive(tmp.path(), "sid", "doc_output.zip").unwrap();
        assert_eq!(std::fs::read(zip).unwrap(), b"zip");
    }

    #[test]
    fn traversal_segments_are_rejected() {
        let tmp = layout();
        for bad in ["../../secret.txt", "..", "a/b", "a\\b", ".hidden", "x y"] {
            let err = resolve_archive(tmp.path(), "sid", bad).unwrap_err();
            assert!(
                matches!(err, Ocr2MdError::PathTraversal { .. }),
                "{bad}: {err:?}"
            );
        }
        let err = resolve_image(tmp.path(), "..", "doc", "doc_p1_img1.png").unwrap_err();
        assert!(matches!(err, Ocr2MdError::PathTraversal { .. }));
        let err = resolve_image(tmp.path(), "sid", "../sid", "doc_p1_img1.png").unwrap_err();
        assert!(matches!(err, Ocr2MdError::PathTraversal { .. }));
    }

    #[test]
    fn missing_files_are_not_found() {
        let tmp = layout();
        let err = resolve_archive(tmp.path(), "sid", "other_output.zip").unwrap_err();
        assert_eq!(err.to_string(), "File not found");
        let err = resolve_image(tmp.path(), "nosession", "doc", "a.png").unwrap_err();
        assert_eq!(err.to_string(), "Image not found");
    }

    #[test]
    fn directories_are_not_served() {
        let tmp = layout();
        let err = resolve_archive(tmp.path(), "sid", "doc").unwrap_err();
        assert!(matches!(err, Ocr2MdError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_tree_is_rejected() {
        let tmp = layout();
        std::os::unix::fs::symlink(
            tmp.path().join("secret.txt"),
            tmp.path().join("sid/leak.zip"),
        )
        .unwrap();
        let err = resolve_archive(tmp.path(), "sid", "leak.zip").unwrap_err();
        assert!(matches!(err, Ocr2MdError::PathTraversal { .. }));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type(Path::new("a.png")), "image/png");
        assert_eq!(content_type(Path::new("a.zip")), "application/zip");
        assert_eq!(content_type(Path::new("a.unknownext")), "application/octet-stream");
    }
}
