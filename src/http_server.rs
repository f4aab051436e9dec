//! Minimal HTTP exposition for operators: `/metrics` for Prometheus scraping
//! and `/healthz` for liveness probes. Trimmed from the codebase's wider
//! HTTP server down to the two routes this dispatcher actually needs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::metrics::NotifyMetrics;

pub struct HttpServer {
    metrics: Arc<NotifyMetrics>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(metrics: Arc<NotifyMetrics>, bind_addr: SocketAddr) -> Self {
        Self { metrics, bind_addr }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let app = Router::new()
            .route("/metrics", get(prometheus_metrics))
            .route("/healthz", get(healthz))
            .with_state(self.metrics)
            .layer(CorsLayer::permissive());

        info!("starting metrics HTTP server on {}", self.bind_addr);
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        axum::serve(listener, app).await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn prometheus_metrics(
    axum::extract::State(metrics): axum::extract::State<Arc<NotifyMetrics>>,
) -> impl IntoResponse {
    match metrics.export() {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("failed to export metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                "failed to export metrics".to_string(),
            )
        }
    }
}
