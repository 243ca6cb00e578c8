//! Web front-end: one upload page, one processing endpoint, two download
//! routes.
//!
//! ```text
//! GET  /                                      embedded HTML page
//! POST /process                               multipart `pdf_files` (+ `api_key`)
//! GET  /view_image/:session/:base/:filename   extracted image
//! GET  /download/:session/:filename           `{base}_output.zip`
//! ```

mod handlers;
mod routes;

pub use routes::create_router;

use crate::config::ServerConfig;
use crate::error::Ocr2MdError;
use crate::gateway::GatewayFactory;
use crate::session::SessionOrchestrator;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Builds the OCR gateway for each batch.
    pub factory: Arc<dyn GatewayFactory>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    pub fn new(config: ServerConfig, factory: Arc<dyn GatewayFactory>) -> Self {
        let orchestrator = SessionOrchestrator::from_config(&config);
        Self {
            config: Arc::new(config),
            factory,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Bind the configured host and port. Host names are resolved, so
/// `localhost` and bare IPv6 literals work as well as IPv4 addresses.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, Ocr2MdError> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| Ocr2MdError::InvalidConfig(format!("bind {}: {}", config.bind_addr(), e)))
}

/// Bind to the configured address and serve until the process exits.
pub async fn serve(state: AppState) -> Result<(), Ocr2MdError> {
    let listener = bind(&state.config).await?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<(), Ocr2MdError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Starting server at http://{}", addr);
    }
    let app = create_router(state);
    axum::serve(listener, app)
        .await
        .map_err(|e| Ocr2MdError::Internal(format!("server: {}", e)))?;

    Ok(())
}
