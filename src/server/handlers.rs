//! Request handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};

use super::AppState;
use crate::delivery;
use crate::error::Ocr2MdError;
use crate::output::{ErrorResponse, ProcessResponse, ProcessedFile};
use crate::session::UploadedFile;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Multipart field carrying the PDFs.
const FILES_FIELD: &str = "pdf_files";
/// Optional multipart field overriding the configured API key.
const API_KEY_FIELD: &str = "api_key";

/// Serve the upload page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Fields of a `/process` request.
#[derive(Default)]
struct ProcessForm {
    files: Vec<UploadedFile>,
    saw_files_field: bool,
    api_key: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> Result<ProcessForm, Response> {
    let mut form = ProcessForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read multipart field: {}", e);
                return Err((
                    e.status(),
                    Json(ErrorResponse::with_details(
                        "Failed to read upload",
                        vec![e.body_text()],
                    )),
                )
                    .into_response());
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILES_FIELD => {
                form.saw_files_field = true;
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    (
                        e.status(),
                        Json(ErrorResponse::with_details(
                            "Failed to read file data",
                            vec![e.body_text()],
                        )),
                    )
                        .into_response()
                })?;
                tracing::debug!("Received {} ({} bytes)", filename, bytes.len());
                form.files.push(UploadedFile::new(filename, bytes.to_vec()));
            }
            API_KEY_FIELD => {
                let key = field.text().await.map_err(|e| {
                    (
                        e.status(),
                        Json(ErrorResponse::with_details(
                            "Failed to read API key",
                            vec![e.body_text()],
                        )),
                    )
                        .into_response()
                })?;
                let key = key.trim();
                if !key.is_empty() {
                    form.api_key = Some(key.to_string());
                }
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

/// Run a batch and return per-file results.
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let form = match read_form(&mut multipart).await {
        Ok(form) => form,
        Err(resp) => return resp,
    };
    if !form.saw_files_field {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("No PDF files part in the request")),
        )
            .into_response();
    }

    let gateway = state.factory.create(form.api_key.as_deref());
    let outcome = match state.orchestrator.run(gateway.as_ref(), form.files).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_client_error() => {
            return (status_for(&e), Json(ErrorResponse::new(e.to_string()))).into_response();
        }
        Err(e) => {
            tracing::error!("Batch failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::with_details(
                    "An unexpected server error occurred.",
                    vec![e.to_string()],
                )),
            )
                .into_response();
        }
    };

    if !outcome.is_success() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::with_details(
                "All PDF processing attempts failed.",
                outcome.errors,
            )),
        )
            .into_response();
    }

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let scheme = request_scheme(&headers);
    let results = outcome
        .results
        .iter()
        .map(|r| {
            let url = download_url(scheme, host, &outcome.session_id, &r.archive_filename);
            ProcessedFile::from_result(r, url)
        })
        .collect();

    Json(ProcessResponse {
        success: true,
        session_id: outcome.session_id,
        results,
        errors: outcome.errors,
    })
    .into_response()
}

/// Serve an extracted image.
pub async fn view_image(
    State(state): State<AppState>,
    Path((session_id, pdf_base, filename)): Path<(String, String, String)>,
) -> Response {
    match delivery::resolve_image(&state.config.output_dir, &session_id, &pdf_base, &filename) {
        Ok(path) => send_file(&path, None).await,
        Err(e) => error_text(&e),
    }
}

/// Serve a session archive as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path((session_id, filename)): Path<(String, String)>,
) -> Response {
    match delivery::resolve_archive(&state.config.output_dir, &session_id, &filename) {
        Ok(path) => send_file(&path, Some(&filename)).await,
        Err(e) => error_text(&e),
    }
}

async fn send_file(path: &std::path::Path, attachment: Option<&str>) -> Response {
    let content = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to read {}: {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response();
        }
    };
    let mime = delivery::content_type(path);

    match attachment {
        Some(name) => (
            [
                (header::CONTENT_TYPE, mime),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", name),
                ),
            ],
            content,
        )
            .into_response(),
        None => ([(header::CONTENT_TYPE, mime)], content).into_response(),
    }
}

/// `https` when a fronting proxy reports it via `X-Forwarded-Proto`, else `http`.
fn request_scheme(headers: &HeaderMap) -> &'static str {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    match forwarded {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    }
}

fn download_url(scheme: &str, host: Option<&str>, session_id: &str, zip_filename: &str) -> String {
    let path = format!("/download/{}/{}", session_id, zip_filename);
    match host {
        Some(host) if !host.is_empty() => format!("{}://{}{}", scheme, host, path),
        _ => path,
    }
}

fn status_for(e: &Ocr2MdError) -> StatusCode {
    match e {
        Ocr2MdError::InvalidInput(_) | Ocr2MdError::PathTraversal { .. } => {
            StatusCode::BAD_REQUEST
        }
        Ocr2MdError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_text(e: &Ocr2MdError) -> Response {
    (status_for(e), e.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::gateway::{
        FileHandle, GatewayFactory, OcrGateway, OcrImage, OcrPage, OcrResult,
    };
    use crate::server::create_router;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    const BOUNDARY: &str = "ocr2mdTestBoundary";

    /// One-page OCR for everything except uploads named `fail*.pdf`.
    struct FakeGateway;

    #[async_trait]
    impl OcrGateway for FakeGateway {
        async fn upload(&self, _bytes: Vec<u8>, filename: &str) -> Result<FileHandle, Ocr2MdError> {
            Ok(FileHandle {
                id: filename.to_string(),
            })
        }

        async fn signed_url(&self, file: &FileHandle, _expiry: u32) -> Result<String, Ocr2MdError> {
            Ok(format!("https://signed/{}", file.id))
        }

        async fn process(&self, url: &str) -> Result<OcrResult, Ocr2MdError> {
            if url.contains("fail") {
                return Err(Ocr2MdError::Processing {
                    message: r#"Status 500 {"message":"Provider exploded"}"#.into(),
                });
            }
            Ok(OcrResult {
                pages: vec![OcrPage::new(
                    "# Title\n![img-0.jpeg](img-0.jpeg)",
                    vec![OcrImage::new("img-0.jpeg", Some(STANDARD.encode(b"jpegdata")))],
                )],
                ..Default::default()
            })
        }

        async fn delete(&self, _file: &FileHandle) -> Result<(), Ocr2MdError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        keys: Mutex<Vec<Option<String>>>,
    }

    impl GatewayFactory for FakeFactory {
        fn create(&self, api_key: Option<&str>) -> Arc<dyn OcrGateway> {
            self.keys.lock().unwrap().push(api_key.map(str::to_string));
            Arc::new(FakeGateway)
        }
    }

    fn state(root: &std::path::Path, factory: Arc<FakeFactory>) -> AppState {
        let config = ServerConfig::builder()
            .upload_dir(root.join("uploads"))
            .output_dir(root.join("output"))
            .build()
            .unwrap();
        AppState::new(config, factory)
    }

    /// `(field name, filename, content)`; `None` filename means a text field.
    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/process")
            .header(header::HOST, "localhost:5000")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn index_serves_upload_page() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_router(state(tmp.path(), Arc::default()));
        let resp = app.oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(text_body(resp).await.contains("pdf_files"));
    }

    #[tokio::test]
    async fn process_then_fetch_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let st = state(tmp.path(), Arc::default());

        let resp = create_router(st.clone())
            .oneshot(multipart(&[
                ("pdf_files", Some("My Doc.pdf"), b"%PDF-1.4"),
                ("pdf_files", Some("notes.txt"), b"hello"),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["success"], true);
        let sid = json["session_id"].as_str().unwrap().to_string();
        assert_eq!(json["errors"][0], "Skipped non-PDF files: notes.txt");

        let file = &json["results"][0];
        assert_eq!(file["original_filename"], "My Doc.pdf");
        assert_eq!(file["zip_filename"], "My_Doc_output.zip");
        assert_eq!(
            file["download_url"],
            format!("http://localhost:5000/download/{sid}/My_Doc_output.zip")
        );
        assert_eq!(file["preview"]["pdf_base"], "My_Doc");
        assert_eq!(file["preview"]["images"][0], "My_Doc_p1_img1.jpeg");
        let markdown = file["preview"]["markdown"].as_str().unwrap();
        assert!(markdown.starts_with("# Title\n![Image](data:image/png;base64,"));

        let resp = create_router(st.clone())
            .oneshot(get(&format!(
                "/view_image/{sid}/My_Doc/My_Doc_p1_img1.jpeg"
            )))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(text_body(resp).await, "jpegdata");

        let resp = create_router(st)
            .oneshot(get(&format!("/download/{sid}/My_Doc_output.zip")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"My_Doc_output.zip\""
        );
    }

    #[tokio::test]
    async fn missing_files_field_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = create_router(state(tmp.path(), Arc::default()))
            .oneshot(multipart(&[("other", None, b"x")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "No PDF files part in the request");
    }

    #[tokio::test]
    async fn non_pdf_only_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = create_router(state(tmp.path(), Arc::default()))
            .oneshot(multipart(&[("pdf_files", Some("a.txt"), b"x")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = json_body(resp).await;
        assert_eq!(
            json["error"],
            "No valid PDF files found. Invalid files skipped: a.txt"
        );
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn empty_selection_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = create_router(state(tmp.path(), Arc::default()))
            .oneshot(multipart(&[("pdf_files", Some(""), b"")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "No selected PDF files");
    }

    #[tokio::test]
    async fn all_failed_is_server_error_with_details() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = create_router(state(tmp.path(), Arc::default()))
            .oneshot(multipart(&[("pdf_files", Some("fail.pdf"), b"%PDF")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(resp).await;
        assert_eq!(json["error"], "All PDF processing attempts failed.");
        assert_eq!(
            json["details"][0],
            "fail.pdf: Processing Error - Provider exploded"
        );
    }

    #[tokio::test]
    async fn truncated_api_key_field_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"api_key\"\r\n\r\nsk-cut-off"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/process")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let resp = create_router(state(tmp.path(), factory.clone()))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "Failed to read API key");
        assert!(factory.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn api_key_field_reaches_factory() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = Arc::new(FakeFactory::default());
        let app = create_router(state(tmp.path(), factory.clone()));
        app.oneshot(multipart(&[
            ("api_key", None, b"  sk-request  "),
            ("pdf_files", Some("a.pdf"), b"%PDF"),
        ]))
        .await
        .unwrap();

        let app = create_router(state(tmp.path(), factory.clone()));
        app.oneshot(multipart(&[
            ("api_key", None, b""),
            ("pdf_files", Some("a.pdf"), b"%PDF"),
        ]))
        .await
        .unwrap();

        assert_eq!(
            *factory.keys.lock().unwrap(),
            vec![Some("sk-request".to_string()), None]
        );
    }

    #[tokio::test]
    async fn traversal_requests_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("secret"), b"secret").unwrap();
        let st = state(tmp.path(), Arc::default());

        for uri in [
            "/view_image/sid/base/..%2F..%2Fsecret",
            "/view_image/..%2F..%2F/base/x.png",
            "/download/sid/..",
            "/download/..%2F..%2Fsecret/x.zip",
        ] {
            let resp = create_router(st.clone()).oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(text_body(resp).await, "Invalid path");
        }
    }

    #[tokio::test]
    async fn unknown_files_are_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = create_router(state(tmp.path(), Arc::default()))
            .oneshot(get("/download/sid/doc_output.zip"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(text_body(resp).await, "File not found");
    }

    #[test]
    fn download_url_falls_back_to_relative() {
        assert_eq!(
            download_url("http", None, "s", "d_output.zip"),
            "/download/s/d_output.zip"
        );
        assert_eq!(
            download_url("http", Some("example.com:8080"), "s", "d_output.zip"),
            "http://example.com:8080/download/s/d_output.zip"
        );
    }

    #[test]
    fn forwarded_proto_selects_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_scheme(&headers), "http");
        headers.insert("x-forwarded-proto", "HTTPS, http".parse().unwrap());
        assert_eq!(request_scheme(&headers), "https");
        headers.insert("x-forwarded-proto", "gopher".parse().unwrap());
        assert_eq!(request_scheme(&headers), "http");
    }

    #[tokio::test]
    async fn download_url_behind_tls_proxy() {
        let tmp = tempfile::tempdir().unwrap();
        let mut req = multipart(&[("pdf_files", Some("a.pdf"), b"%PDF")]);
        req.headers_mut()
            .insert("x-forwarded-proto", "https".parse().unwrap());
        let resp = create_router(state(tmp.path(), Arc::default()))
            .oneshot(req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        let sid = json["session_id"].as_str().unwrap();
        assert_eq!(
            json["results"][0]["download_url"],
            format!("https://localhost:5000/download/{sid}/a_output.zip")
        );
    }
}
