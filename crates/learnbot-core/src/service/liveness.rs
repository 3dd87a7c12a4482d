//! HTTP liveness endpoint for the hosting platform's health checks.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// `GET /health` answers; every other path or method is a bare 404.
pub fn router() -> Router {
    Router::new()
        .route(
            "/health",
            get(handle_health).head(not_found).fallback(not_found),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Serve on `listener` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "Liveness endpoint listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Liveness endpoint stopped");
    Ok(())
}

/// Bind `addr` and serve in a background task.
///
/// Bind and serve failures are logged; the task then ends on its own.
pub fn spawn(addr: SocketAddr, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(address = %addr, "Failed to bind liveness endpoint: {}", e);
                return;
            }
        };
        if let Err(e) = serve(listener, shutdown).await {
            error!(address = %addr, "Liveness endpoint failed: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    async fn call(method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = router().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_ok() {
        let (status, body) = call(Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (status, body) = call(Method::GET, "/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_post_health_is_404() {
        let (status, body) = call(Method::POST, "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_head_health_is_404() {
        let (status, body) = call(Method::HEAD, "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, token.clone()));

        let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
