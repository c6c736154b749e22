//! HTTP side of the gateway: serves stored media under `/files`.

use std::path::Path;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

/// Build the axum router serving `file_dir` under `/files`.
pub fn build_router(file_dir: impl AsRef<Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest_service("/files", ServeDir::new(file_dir.as_ref()))
        .layer(cors)
}

/// Serve `router` on `bind_addr` until `cancel` fires.
pub async fn serve(
    bind_addr: &str,
    router: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("file server started on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("file server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_serves_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.jpg"), b"\xFF\xD8\xFFjpeg").unwrap();
        let router = build_router(dir.path());

        let response = router
            .clone()
            .oneshot(Request::get("/files/abc.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");

        let response = router
            .oneshot(Request::get("/files/missing.png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
