//! [`OcrGateway`] backed by the Mistral HTTP API.
//!
//! | Operation    | Request                                   |
//! |--------------|-------------------------------------------|
//! | `upload`     | `POST /v1/files` (multipart, `purpose=ocr`) |
//! | `signed_url` | `GET /v1/files/{id}/url?expiry=N`          |
//! | `process`    | `POST /v1/ocr` with a `document_url` chunk |
//! | `delete`     | `DELETE /v1/files/{id}`                    |
//!
//! Non-2xx responses keep the provider's JSON body in the error text so
//! [`super::provider_message`] can pull out its `message`.

use super::{FileHandle, GatewayFactory, OcrGateway, OcrResult};
use crate::config::ServerConfig;
use crate::error::Ocr2MdError;
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

/// Gateway talking to one Mistral endpoint with one credential.
#[derive(Clone)]
pub struct MistralGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl MistralGateway {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder, Ocr2MdError> {
        match self.api_key.as_deref() {
            Some(key) => Ok(req.bearer_auth(key)),
            None => Err(Ocr2MdError::Transport {
                message: "no API key configured (set MISTRAL_API_KEY or send api_key)".into(),
            }),
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, Ocr2MdError> {
        self.authed(req)?
            .send()
            .await
            .map_err(|e| Ocr2MdError::Transport {
                message: e.to_string(),
            })
    }
}

/// Read a non-success response into `"HTTP <status>: <body>"`.
async fn error_text(resp: Response) -> (StatusCode, String) {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    (status, format!("HTTP {status}: {body}"))
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl OcrGateway for MistralGateway {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<FileHandle, Ocr2MdError> {
        debug!("Uploading {} ({} bytes)", filename, bytes.len());
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| Ocr2MdError::Internal(e.to_string()))?;
        let form = multipart::Form::new().text("purpose", "ocr").part("file", part);

        let resp = self
            .send(self.client.post(self.url("/v1/files")).multipart(form))
            .await?;
        if !resp.status().is_success() {
            let (_, message) = error_text(resp).await;
            return Err(Ocr2MdError::Transport { message });
        }
        let file: UploadedFile = resp.json().await.map_err(|e| Ocr2MdError::Transport {
            message: format!("invalid upload response: {e}"),
        })?;
        Ok(FileHandle { id: file.id })
    }

    async fn signed_url(&self, file: &FileHandle, expiry: u32) -> Result<String, Ocr2MdError> {
        let req = self
            .client
            .get(self.url(&format!("/v1/files/{}/url", file.id)))
            .query(&[("expiry", expiry)]);
        let resp = self.send(req).await?;
        if !resp.status().is_success() {
            let (_, message) = error_text(resp).await;
            return Err(Ocr2MdError::Transport { message });
        }
        let signed: SignedUrl = resp.json().await.map_err(|e| Ocr2MdError::Transport {
            message: format!("invalid signed URL response: {e}"),
        })?;
        Ok(signed.url)
    }

    async fn process(&self, url: &str) -> Result<OcrResult, Ocr2MdError> {
        let body = json!({
            "model": self.model,
            "document": { "type": "document_url", "document_url": url },
            "include_image_base64": true,
        });
        let resp = self
            .send(self.client.post(self.url("/v1/ocr")).json(&body))
            .await?;
        if !resp.status().is_success() {
            let (status, message) = error_text(resp).await;
            return Err(if is_auth_failure(status) {
                Ocr2MdError::Transport { message }
            } else {
                Ocr2MdError::Processing { message }
            });
        }
        resp.json().await.map_err(|e| Ocr2MdError::Processing {
            message: format!("invalid OCR response: {e}"),
        })
    }

    async fn delete(&self, file: &FileHandle) -> Result<(), Ocr2MdError> {
        let resp = self
            .send(self.client.delete(self.url(&format!("/v1/files/{}", file.id))))
            .await?;
        if !resp.status().is_success() {
            let (_, message) = error_text(resp).await;
            return Err(Ocr2MdError::Transport { message });
        }
        Ok(())
    }
}

/// Creates [`MistralGateway`]s sharing one HTTP client.
pub struct MistralFactory {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl MistralFactory {
    pub fn from_config(config: &ServerConfig) -> Result<Self, Ocr2MdError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Ocr2MdError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            model: config.ocr_model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// A non-blank request key wins over the configured one.
    fn resolve_key(&self, api_key: Option<&str>) -> Option<String> {
        api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.api_key.clone())
    }
}

impl GatewayFactory for MistralFactory {
    fn create(&self, api_key: Option<&str>) -> Arc<dyn OcrGateway> {
        Arc::new(MistralGateway::new(
            self.client.clone(),
            self.base_url.clone(),
            self.model.clone(),
            self.resolve_key(api_key),
        ))
    }
}
