//! Archiver: bundle a document output directory into one ZIP file.
//!
//! Entry names are paths relative to the source directory with `/`
//! separators (`doc_output.md`, `images/doc_p1_img1.png`, …). Directories
//! themselves get no entries.
//!
//! The archive is written to a temp file next to the destination and only
//! renamed into place once `finish()` succeeded, so a failed run never
//! leaves a truncated `.zip` behind.

use crate::error::Ocr2MdError;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Create `zip_path` containing every file under `source_dir`.
///
/// Returns the archive entry names in the order they were written.
pub fn create_zip_archive(source_dir: &Path, zip_path: &Path) -> Result<Vec<String>, Ocr2MdError> {
    info!(
        "Creating ZIP archive: {} from {}",
        zip_path.display(),
        source_dir.display()
    );

    if !source_dir.is_dir() {
        return Err(archive_err(source_dir, "source directory does not exist"));
    }

    let mut files = Vec::new();
    collect_files(source_dir, &mut files).map_err(|e| archive_err(source_dir, e))?;
    files.sort();

    let parent = zip_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(parent).map_err(|e| archive_err(zip_path, e))?;

    let entries = write_entries(source_dir, &files, tmp.as_file())
        .map_err(|e| archive_err(zip_path, e))?;

    tmp.persist(zip_path)
        .map_err(|e| archive_err(zip_path, e.error))?;

    debug!("Wrote {} entries to {}", entries.len(), zip_path.display());
    Ok(entries)
}

fn write_entries(source_dir: &Path, files: &[PathBuf], out: &File) -> Result<Vec<String>, String> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut zip = ZipWriter::new(out);
    let mut entries = Vec::with_capacity(files.len());

    for path in files {
        let name = entry_name(source_dir, path)?;
        zip.start_file(name.as_str(), options)
            .map_err(|e| format!("{name}: {e}"))?;
        let mut input = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
        io::copy(&mut input, &mut zip).map_err(|e| format!("{}: {e}", path.display()))?;
        entries.push(name);
    }

    let mut file = zip.finish().map_err(|e| e.to_string())?;
    file.flush().map_err(|e| e.to_string())?;
    Ok(entries)
}

/// Relative, `/`-separated entry name for `path` under `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String, String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| format!("{} escapes {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn archive_err(path: &Path, detail: impl ToString) -> Ocr2MdError {
    Ocr2MdError::Archive {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}
