//! Filename sanitisation: every path segment built from user input or from
//! provider data goes through [`secure_filename`] before it touches the disk.
//!
//! The rules:
//! 1. Unicode NFKD normalisation, then drop every non-ASCII code point
//!    (`é` → `e`, `日本` → ``).
//! 2. Path separators (`/`, `\`) become spaces.
//! 3. Runs of whitespace collapse to a single `_`.
//! 4. Anything outside `[A-Za-z0-9_.-]` is removed (null bytes included).
//! 5. Leading and trailing `.` / `_` are stripped, so `..` can never survive.
//!
//! The output only contains characters that rule 4 keeps and never starts or
//! ends with `.`/`_`, so running it twice changes nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Base name used when sanitising a document name leaves nothing behind.
pub const FALLBACK_DOCUMENT_BASE: &str = "document";

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").unwrap());

/// Return a filesystem-safe version of `name`.
///
/// The result may be empty (e.g. for `".."` or a purely non-Latin name);
/// callers decide whether that is an error or needs a fallback.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let stripped = RE_UNSAFE.replace_all(&joined, "");
    stripped.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Sanitised stem of an uploaded filename: `"My Report.pdf"` → `"My_Report"`.
///
/// Falls back to [`FALLBACK_DOCUMENT_BASE`] when nothing safe remains.
pub fn document_base(original_filename: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = secure_filename(&stem);
    if base.is_empty() {
        FALLBACK_DOCUMENT_BASE.to_string()
    } else {
        base
    }
}

/// Sanitised full filename for the temporary upload copy.
///
/// Falls back to `{base}.pdf` when the sanitised name is empty.
pub fn upload_filename(original_filename: &str, base: &str) -> String {
    let name = secure_filename(original_filename);
    if name.is_empty() {
        format!("{base}.pdf")
    } else {
        name
    }
}

/// Sanitise a request path segment, accepting it only if it was already safe.
///
/// Returns `None` when sanitising would change the segment or leave it empty,
/// i.e. when the caller sent something that is not a plain file name.
pub fn checked_segment(segment: &str) -> Option<String> {
    let safe = secure_filename(segment);
    (!safe.is_empty() && safe == segment).then_some(safe)
}
