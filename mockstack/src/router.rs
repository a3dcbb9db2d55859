//! HTTP router for MockStack

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use mockstack_sqs::SqsState;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(sqs: Arc<SqsState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .route("/_localstack/health", get(health_check)) // LocalStack compatibility
        .merge(mockstack_sqs::router(sqs))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status": "running", "services": {"sqs": "running"}}"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use mockstack_sqs::SqsConfig;
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(Arc::new(SqsState::new(SqsConfig::default())))
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        for path in ["/health", "/_localstack/health"] {
            let request = Request::builder().uri(path).body(Body::empty()).unwrap();
            let response = app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert!(String::from_utf8_lossy(&body).contains("\"sqs\""));
        }
    }

    #[tokio::test]
    async fn test_sqs_routes_mounted() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("x-amz-target", "AmazonSQS.ListQueues")
            .header("content-type", "application/x-amz-json-1.0")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
