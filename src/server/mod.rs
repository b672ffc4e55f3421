//! HTTP server construction and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::convert::{Converter, Tools};

pub mod error;
pub mod routes;

pub use error::ApiError;

/// Headroom on top of the upload cap for multipart framing and other form
/// fields. The per-file cap itself is enforced while streaming to disk.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared application context.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub converter: Converter,
}

impl AppContext {
    pub fn new(config: Config, tools: Tools) -> Self {
        let converter = Converter::new(config.limits.clone(), Arc::new(tools));
        Self {
            config: Arc::new(config),
            converter,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health,
        routes::convert_form,
        routes::convert_path,
    ),
    components(schemas(
        crate::mapping::TargetFormat,
        crate::mapping::ConversionMode,
        crate::convert::ToolInfo,
    ))
)]
struct ApiDoc;

/// Create the Axum router with all routes.
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let body_limit = ctx.config.limits.max_upload_bytes() as usize + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(routes::index).post(routes::convert_form))
        .route("/health", get(routes::health))
        .route(
            "/convert/{target_format}/{mode}/{setting}",
            post(routes::convert_path),
        )
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let tools = Tools::discover(&config.tools);
    let ctx = AppContext::new(config, tools);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
