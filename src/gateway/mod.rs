//! OCR gateway: the narrow seam between the pipeline and the OCR provider.
//!
//! The pipeline only needs four remote operations, in this order:
//!
//! ```text
//! upload ──▶ signed_url ──▶ process ──▶ delete (always, best effort)
//! ```
//!
//! [`OcrGateway`] captures exactly those so the extraction and session code
//! can run against [`mistral::MistralGateway`] in production and against a
//! scripted fake in tests. A [`GatewayFactory`] builds one gateway per batch,
//! which is where a per-request API key override is applied.

pub mod mistral;

use crate::error::Ocr2MdError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use mistral::{MistralFactory, MistralGateway};

/// Handle to a document uploaded to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: String,
}

/// Full OCR response for one document.
///
/// Unknown provider fields are kept in `extra` so the raw snapshot written to
/// `ocr_response.json` round-trips what the provider actually returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    #[serde(default)]
    pub pages: Vec<OcrPage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of an OCR response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    /// Raw page Markdown. Embedded images appear as `![id](id)`.
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<OcrImage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An embedded image record of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrImage {
    /// Provider identifier, e.g. `img-0.jpeg`. Also the Markdown reference.
    pub id: String,
    /// Base64 payload, optionally wrapped in a `data:` URI. May be absent.
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OcrPage {
    pub fn new(markdown: impl Into<String>, images: Vec<OcrImage>) -> Self {
        Self {
            markdown: markdown.into(),
            images,
            extra: Map::new(),
        }
    }
}

impl OcrImage {
    pub fn new(id: impl Into<String>, image_base64: Option<String>) -> Self {
        Self {
            id: id.into(),
            image_base64,
            extra: Map::new(),
        }
    }
}

/// Remote OCR operations required by the pipeline.
///
/// Implementations return the provider's raw error text inside the error;
/// [`provider_message`] turns it into something presentable.
#[async_trait]
pub trait OcrGateway: Send + Sync {
    /// Upload a PDF. Network and auth failures are [`Ocr2MdError::Transport`].
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<FileHandle, Ocr2MdError>;

    /// Short-lived URL the provider can fetch the uploaded file from.
    async fn signed_url(&self, file: &FileHandle, expiry: u32) -> Result<String, Ocr2MdError>;

    /// Run OCR on the document behind `url`, images included.
    /// Provider-side failures are [`Ocr2MdError::Processing`].
    async fn process(&self, url: &str) -> Result<OcrResult, Ocr2MdError>;

    /// Delete the uploaded file. Callers treat failure as a warning.
    async fn delete(&self, file: &FileHandle) -> Result<(), Ocr2MdError>;
}

/// Builds the gateway used for one batch.
pub trait GatewayFactory: Send + Sync {
    /// `api_key` is the per-request override; `None` means "use the
    /// configured credential".
    fn create(&self, api_key: Option<&str>) -> Arc<dyn OcrGateway>;
}

/// Extract a human-readable message from a provider error string.
///
/// If the text contains a JSON object (starting at the first `{`), its
/// `message` field is used, then `detail`. Anything else returns the input
/// unchanged.
pub fn provider_message(raw: &str) -> String {
    let Some(start) = raw.find('{') else {
        return raw.to_string();
    };
    match serde_json::from_str::<Value>(&raw[start..]) {
        Ok(Value::Object(map)) => match map.get("message").or_else(|| map.get("detail")) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}
