//! Configuration for the ocr2md server and processing pipeline.
//!
//! All runtime knobs live in [`ServerConfig`], built via its
//! [`ServerConfigBuilder`]. The binary fills the builder from CLI flags and
//! environment variables; tests build one directly against a temp dir.

use crate::error::Ocr2MdError;
use std::fmt;
use std::path::PathBuf;

/// Maximum accepted request body for `/process`: 50 MiB.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// File extensions accepted for upload (lower-case, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// Separator inserted between pages of the consolidated Markdown.
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Default base URL of the Mistral API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mistral.ai";

/// Default OCR model identifier.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";

/// Configuration for the ocr2md server.
///
/// # Example
/// ```rust
/// use ocr2md::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .upload_dir("/tmp/ocr2md/uploads")
///     .output_dir("/tmp/ocr2md/output")
///     .port(8080)
///     .build()
///     .unwrap();
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Root for per-session upload directories. Default: `uploads`.
    ///
    /// Each batch gets `{upload_dir}/{session_id}/`, removed when the
    /// request finishes.
    pub upload_dir: PathBuf,

    /// Root for per-session output directories. Default: `output`.
    ///
    /// Nothing under it is deleted by the server; purge externally.
    pub output_dir: PathBuf,

    /// Provider API credential. A non-empty `api_key` form field overrides it
    /// per batch.
    pub api_key: Option<String>,

    /// Base URL of the OCR provider. Default: [`DEFAULT_API_BASE_URL`].
    pub api_base_url: String,

    /// OCR model identifier. Default: [`DEFAULT_OCR_MODEL`].
    pub ocr_model: String,

    /// Validity window requested for signed document URLs. Default: 60.
    ///
    /// Forwarded verbatim as the provider's `expiry` parameter. The URL is
    /// consumed immediately after issuance and never reused.
    pub signed_url_expiry: u32,

    /// Per-HTTP-call timeout towards the provider, in seconds. Default: 300.
    pub request_timeout_secs: u64,

    /// Write `ocr_response.json` next to each document's Markdown. Default: true.
    pub save_raw_response: bool,

    /// Bind address. Default: `127.0.0.1`.
    pub host: String,

    /// Bind port. Default: 5000.
    pub port: u16,

    /// Verbose logging. Default: false.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            signed_url_expiry: 60,
            request_timeout_secs: 300,
            save_raw_response: true,
            host: "127.0.0.1".to_string(),
            port: 5000,
            debug: false,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("ocr_model", &self.ocr_model)
            .field("signed_url_expiry", &self.signed_url_expiry)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("save_raw_response", &self.save_raw_response)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// `host:port` for display; IPv6 literals are bracketed.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Create the upload and output roots. Safe to call repeatedly.
    pub fn ensure_dirs(&self) -> Result<(), Ocr2MdError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Ocr2MdError::io(dir, e))?;
        }
        Ok(())
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn signed_url_expiry(mut self, expiry: u32) -> Self {
        self.config.signed_url_expiry = expiry;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn save_raw_response(mut self, v: bool) -> Self {
        self.config.save_raw_response = v;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.config.debug = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, Ocr2MdError> {
        let c = &self.config;
        if c.host.trim().is_empty() {
            return Err(Ocr2MdError::InvalidConfig("host must not be empty".into()));
        }
        if c.port == 0 {
            return Err(Ocr2MdError::InvalidConfig("port must be ≥ 1".into()));
        }
        if c.signed_url_expiry == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "signed URL expiry must be ≥ 1".into(),
            ));
        }
        if c.api_base_url.is_empty() {
            return Err(Ocr2MdError::InvalidConfig(
                "API base URL must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// True if `filename` carries one of [`ALLOWED_EXTENSIONS`] (case-insensitive).
///
/// Only the part after the last `.` is inspected; the file content is not.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ServerConfig::default();
        assert_eq!(c.port, 5000);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.signed_url_expiry, 60);
        assert!(c.save_raw_response);
        assert_eq!(c.bind_addr(), "127.0.0.1:5000");
    }

    #[test]
    fn bind_addr_brackets_ipv6() {
        let c = ServerConfig::builder().host("::1").port(8080).build().unwrap();
        assert_eq!(c.bind_addr(), "[::1]:8080");
        let c = ServerConfig::builder().host("localhost").build().unwrap();
        assert_eq!(c.bind_addr(), "localhost:5000");
    }

    #[test]
    fn builder_rejects_zero_port() {
        let err = ServerConfig::builder().port(0).build().unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn builder_rejects_empty_host() {
        assert!(ServerConfig::builder().host("  ").build().is_err());
    }

    #[test]
    fn blank_api_key_is_none() {
        let c = ServerConfig::builder().api_key("   ").build().unwrap();
        assert!(c.api_key.is_none());
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = ServerConfig::builder()
            .api_base_url("http://localhost:1234/")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://localhost:1234");
    }

    #[test]
    fn debug_redacts_key() {
        let c = ServerConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn allowed_file_by_extension_only() {
        assert!(allowed_file("report.pdf"));
        assert!(allowed_file("REPORT.PDF"));
        assert!(allowed_file("archive.tar.pdf"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("pdf"));
        assert!(!allowed_file(""));
        assert!(!allowed_file("report.pdf.exe"));
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let c = ServerConfig::builder()
            .upload_dir(tmp.path().join("u"))
            .output_dir(tmp.path().join("o"))
            .build()
            .unwrap();
        c.ensure_dirs().unwrap();
        c.ensure_dirs().unwrap();
        assert!(tmp.path().join("u").is_dir());
        assert!(tmp.path().join("o").is_dir());
    }
}
