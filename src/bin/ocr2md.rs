//! Server binary for ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServerConfig` and runs the web server.

use anyhow::{Context, Result};
use clap::Parser;
use ocr2md::{serve, AppState, MistralFactory, ServerConfig};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on http://127.0.0.1:5000 using MISTRAL_API_KEY from the environment or .env
  ocr2md

  # Listen on all interfaces, custom directories
  ocr2md --host 0.0.0.0 --port 8080 --upload-dir /tmp/ocr2md/uploads --output-dir /srv/ocr2md

  # Keep only Markdown and images, no raw OCR snapshot
  ocr2md --no-raw-response

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         API key for the OCR service (the form's api_key field overrides it)
  MISTRAL_API_BASE_URL    Override the API base URL
  MISTRAL_OCR_MODEL       OCR model ID
  UPLOAD_FOLDER           Temporary upload root
  OUTPUT_FOLDER           Output root (Markdown, images, archives)
  OCR2MD_HOST / OCR2MD_PORT / OCR2MD_DEBUG
  RUST_LOG                Log filter, e.g. ocr2md=debug,tower_http=debug

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Upload PDFs in the browser, get Markdown with extracted images back.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Web front-end converting PDFs to Markdown through an OCR service",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "OCR2MD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "OCR2MD_PORT", default_value_t = 5000)]
    port: u16,

    /// Root directory for temporary uploads.
    #[arg(long, env = "UPLOAD_FOLDER", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Root directory for generated Markdown, images and archives.
    #[arg(long, env = "OUTPUT_FOLDER", default_value = "output")]
    output_dir: PathBuf,

    /// OCR service API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OCR service base URL.
    #[arg(long, env = "MISTRAL_API_BASE_URL")]
    api_base_url: Option<String>,

    /// OCR model ID.
    #[arg(long, env = "MISTRAL_OCR_MODEL")]
    model: Option<String>,

    /// Lifetime of the signed document URL handed to the OCR service.
    #[arg(long, default_value_t = 60)]
    signed_url_expiry: u32,

    /// Timeout in seconds for each OCR API call.
    #[arg(long, env = "OCR2MD_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Do not write ocr_response.json next to each document.
    #[arg(long)]
    no_raw_response: bool,

    /// Debug mode: verbose logs.
    #[arg(long, env = "OCR2MD_DEBUG")]
    debug: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn to_config(&self) -> Result<ServerConfig> {
        let mut builder = ServerConfig::builder()
            .host(&self.host)
            .port(self.port)
            .upload_dir(self.upload_dir.clone())
            .output_dir(self.output_dir.clone())
            .signed_url_expiry(self.signed_url_expiry)
            .request_timeout_secs(self.api_timeout)
            .save_raw_response(!self.no_raw_response)
            .debug(self.debug);
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = &self.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(model) = &self.model {
            builder = builder.ocr_model(model);
        }
        builder.build().context("invalid server configuration")
    }

    /// Default log filter when `RUST_LOG` is unset.
    fn log_filter(&self, config: &ServerConfig) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose || config.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; flags and the real environment still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = cli.to_config()?;

    // ── Logging setup ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_filter(&config))),
        )
        .with_writer(io::stderr)
        .init();

    // ── Directories and OCR client ───────────────────────────────────────
    config
        .ensure_dirs()
        .context("failed to create upload/output directories")?;
    if config.api_key.is_none() {
        eprintln!(
            "{} no MISTRAL_API_KEY configured; requests must send an api_key field",
            yellow("⚠")
        );
    }

    let factory = MistralFactory::from_config(&config).context("failed to build OCR client")?;

    eprintln!(
        "{} {} on {}",
        cyan("◆"),
        bold("ocr2md"),
        bold(&format!("http://{}", config.bind_addr()))
    );
    tracing::debug!("{:?}", config);

    serve(AppState::new(config, Arc::new(factory)))
        .await
        .context("server error")?;
    Ok(())
}
