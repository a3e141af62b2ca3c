//! Local stand-in for the M-Pesa STK push API. No money moves.

pub mod routes;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use routes::{callback_handler, index_handler, stk_push_handler};

pub const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
pub const CALLBACK_PATH: &str = "/callback";

pub fn router() -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route(STK_PUSH_PATH, post(stk_push_handler))
        .route(CALLBACK_PATH, post(callback_handler))
        .layer(CorsLayer::permissive())
}

/// Serves the mock API on `port` until Ctrl+C or SIGTERM
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!("M-Pesa mock server running on http://localhost:{port}");
    warn!("This is a mock server for testing purposes only.");

    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("M-Pesa mock server failed")?;

    info!("M-Pesa mock server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
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
}
