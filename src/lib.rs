//! # ocr2md
//!
//! Web front-end that turns uploaded PDFs into Markdown via a remote OCR
//! service, with the embedded images saved next to the Markdown and the
//! whole result zipped for download.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /process (multipart pdf_files)
//!  │
//!  ├─ 1. Filter    keep *.pdf, report the rest as skipped
//!  ├─ 2. Session   uploads/{sid}/ + output/{sid}/
//!  ├─ 3. OCR       upload → signed URL → process → delete remote copy
//!  ├─ 4. Extract   decode images to images/, inline them as data URIs
//!  ├─ 5. Write     {base}_output.md (+ ocr_response.json)
//!  ├─ 6. Archive   {base}_output.zip
//!  └─ 7. Respond   per-file preview + download URL, per-file errors
//! ```
//!
//! Documents of a batch are processed one after another; one failing
//! document never stops the others.
//!
//! ## Library use
//!
//! ```rust,no_run
//! use ocr2md::{MistralFactory, GatewayFactory, ServerConfig, SessionOrchestrator, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().api_key("sk-...").build()?;
//!     let gateway = MistralFactory::from_config(&config)?.create(None);
//!     let pdf = std::fs::read("report.pdf")?;
//!     let outcome = SessionOrchestrator::from_config(&config)
//!         .run(gateway.as_ref(), vec![UploadedFile::new("report.pdf", pdf)])
//!         .await?;
//!     for doc in &outcome.results {
//!         println!("{} → {}", doc.original_filename, doc.archive_path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2md` server binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod output;
pub mod pipeline;
pub mod sanitize;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ImageError, Ocr2MdError};
pub use gateway::{GatewayFactory, MistralFactory, MistralGateway, OcrGateway, OcrResult};
pub use output::{BatchOutcome, DocumentResult, ErrorResponse, ProcessResponse, ProcessedFile};
pub use server::{bind, create_router, serve, serve_on, AppState};
pub use session::{SessionOrchestrator, UploadSession, UploadedFile};
