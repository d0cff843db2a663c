//! HTTP surface: `POST /upload` and `GET /health`.

use crate::pipeline::{RequestPipeline, UploadStatus};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the probe image.
pub const IMAGE_FIELD: &str = "image";

pub fn create_app(pipeline: Arc<RequestPipeline>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Bind `bind` and serve until Ctrl-C or SIGTERM.
pub async fn serve(app: Router, bind: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn upload_handler(
    State(pipeline): State<Arc<RequestPipeline>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let image = match multipart {
        Ok(multipart) => match image_field(multipart).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "malformed multipart body");
                None
            }
        },
        Err(rejection) => {
            tracing::debug!(error = %rejection, "upload is not multipart");
            None
        }
    };

    let outcome = pipeline.handle_upload(image).await;
    let status = match outcome.status {
        UploadStatus::Ok => StatusCode::OK,
        UploadStatus::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome.body)).into_response()
}

/// Bytes of the first `image` field; other fields are ignored.
async fn image_field(mut multipart: Multipart) -> Result<Option<Vec<u8>>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return Ok(Some(field.bytes().await?.to_vec()));
        }
    }
    Ok(None)
}

async fn health_handler(State(pipeline): State<Arc<RequestPipeline>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "knownFaces": pipeline.index().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::test_support::{png, record, FakeExtractor};
    use axum::body::Body;
    use axum::http::{header, Request};
    use facematch_core::{Embedding, KnownFaceIndexBuilder, MatchPolicy};
    use facematch_store::SqliteDocumentStore;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "facematch-test-boundary";
    const LIMIT: usize = 64 * 1024;

    async fn app() -> Router {
        let engine = spawn_engine(FakeExtractor::new([(1, vec![0.12, 0.16])]), 4).unwrap();
        let mut builder = KnownFaceIndexBuilder::new();
        builder.append("alice", Embedding::new(vec![0.0, 0.0]));
        let records = SqliteDocumentStore::open_in_memory().await.unwrap();
        records.put("alice", record("Alice Smith")).await.unwrap();

        let pipeline = RequestPipeline::new(
            builder.freeze(),
            engine,
            Arc::new(records),
            MatchPolicy::default(),
        );
        create_app(Arc::new(pipeline), LIMIT)
    }

    /// Multipart body with one part per `(field name, bytes)`.
    fn multipart_body(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.bin\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_match() {
        let image = png(1);
        let request = upload_request(multipart_body(&[("note", &b"hi"[..]), ("image", image.as_slice())]));

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["matches"][0]["label"], "Alice Smith");
        assert_eq!(body["matches"][0]["imgUrl"], "https://example.org/Alice Smith.jpg");
        assert_eq!(body["matches"][0]["distance"], 0.2);
    }

    #[tokio::test]
    async fn test_upload_without_image_field() {
        let request = upload_request(multipart_body(&[("photo", &b"ignored"[..])]));

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "matches": [] }));
    }

    #[tokio::test]
    async fn test_upload_not_multipart() {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "matches": [] }));
    }

    #[tokio::test]
    async fn test_upload_undecodable_image() {
        let request = upload_request(multipart_body(&[("image", &b"not an image"[..])]));

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({ "matches": [] }));
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let oversized = vec![0u8; LIMIT + 1];
        let request = upload_request(multipart_body(&[("image", oversized.as_slice())]));

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["knownFaces"], 1);
    }
}
