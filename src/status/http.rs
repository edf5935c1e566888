//! Readiness endpoint.
//!
//! | Route         | Body                                      | Status                         |
//! |---------------|-------------------------------------------|--------------------------------|
//! | `GET /health` | `{"status": "...", "services": {...}}`    | 200 healthy/degraded, else 503 |
//! | `GET /status` | full [`StatusReport`]                     | 200                            |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::Supervisor;
use crate::error::RuntimeError;

use super::StatusReport;

pub fn router(sup: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(sup)
}

/// Binds `addr` and serves until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    sup: Arc<Supervisor>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    let listener = TcpListener::bind(addr).await.map_err(|source| RuntimeError::Io {
        context: format!("bind status endpoint {addr}"),
        source,
    })?;
    serve_on(listener, sup, cancel).await
}

/// Serves on an already bound listener until `cancel` fires.
pub async fn serve_on(
    listener: TcpListener,
    sup: Arc<Supervisor>,
    cancel: CancellationToken,
) -> Result<(), RuntimeError> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "status endpoint listening");
    }
    axum::serve(listener, router(sup))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|source| RuntimeError::Io {
            context: "status endpoint".to_owned(),
            source,
        })
}

async fn health(State(sup): State<Arc<Supervisor>>) -> impl IntoResponse {
    let report = sup.report().await;
    let code = if report.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(serde_json::json!({
            "status": report.health,
            "services": report.service_states(),
        })),
    )
}

async fn status(State(sup): State<Arc<Supervisor>>) -> Json<StatusReport> {
    Json(sup.report().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SupervisorConfig;
    use crate::deployment::{Deployment, Network};
    use crate::graph::DependencyGraph;
    use crate::services::ServiceSpec;

    #[tokio::test]
    async fn health_is_unavailable_until_services_are_up() {
        let graph = DependencyGraph::build([ServiceSpec::builder("execution")
            .command("reth", Vec::<String>::new())
            .build()])
        .unwrap();
        let sup = Supervisor::builder(SupervisorConfig::default())
            .build(Deployment::new("eth-node", Network::Holesky, graph));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_on(listener, Arc::clone(&sup), cancel.clone()));

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 503);
        let body: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
        assert_eq!(body["status"], "starting");
        assert_eq!(body["services"]["execution"], "pending");

        let resp = client
            .get(format!("http://{addr}/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let report: StatusReport = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
        assert_eq!(report.deployment, "eth-node");

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
