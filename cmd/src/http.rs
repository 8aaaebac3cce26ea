use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use color_eyre::eyre::{Result, WrapErr};
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use super::{api, AppState};

pub fn router(state: Arc<AppState>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(api::metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub async fn server(addr: SocketAddr, metrics_path: &str, state: Arc<AppState>) -> Result<()> {
    let app = router(state, metrics_path);

    tracing::info!(%addr, metrics_path, "start http server");
    axum::Server::try_bind(&addr)
        .wrap_err_with(|| format!("failed to bind {addr}"))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("http server error")?;
    tracing::info!("http server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
