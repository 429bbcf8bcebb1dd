//! Read API HTTP server.
//!
//! Serves the current aggregate for a key. Domain outcomes are always HTTP
//! 200 with a JSON envelope; the `status` field carries success or failure.

use axum::{
    extract::{Query, State},
    http::Method,
    response::Json,
    routing::{any, get},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::domain::errors::DomainError;
use crate::domain::models::{HttpConfig, Observation};
use crate::domain::ports::AggregateReader;

pub const GET_VALUE_ROUTE: &str = "/getValueForId";
pub const SUCCESS_MESSAGE: &str = "Data fetched successfully.";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";
pub const MISSING_ID_MESSAGE: &str = "Missing required query parameter: id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Envelope returned by every read API call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub status: ResponseStatus,
    pub message: String,
    pub data: Option<Observation>,
}

impl ReadResponse {
    pub fn success(data: Observation) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: SUCCESS_MESSAGE.to_string(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            message: message.into(),
            data: None,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Shared state for the read API.
pub struct ReadApiState {
    pub reader: Arc<dyn AggregateReader>,
    pub service_name: String,
}

/// Read API server.
pub struct ReadApiServer {
    state: Arc<ReadApiState>,
}

impl ReadApiServer {
    pub fn new(reader: Arc<dyn AggregateReader>, service_name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(ReadApiState {
                reader,
                service_name: service_name.into(),
            }),
        }
    }

    /// Bind the configured listen address.
    pub async fn bind(config: &HttpConfig) -> std::io::Result<TcpListener> {
        TcpListener::bind((config.host.as_str(), config.port)).await
    }

    /// Build the router with all endpoints.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route(GET_VALUE_ROUTE, any(get_value_for_id))
            .route("/health", get(health_check))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight
    /// requests.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        let router = self.build_router();

        info!(%addr, "read API listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("read API stopped");
        Ok(())
    }
}

async fn get_value_for_id(
    State(state): State<Arc<ReadApiState>>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Json<ReadResponse> {
    if method != Method::GET {
        return Json(ReadResponse::failure(METHOD_NOT_ALLOWED_MESSAGE));
    }

    let id = params.get("id").map(String::as_str).unwrap_or_default();
    debug!(id, "read request");
    if id.is_empty() {
        return Json(ReadResponse::failure(MISSING_ID_MESSAGE));
    }

    let response = match state.reader.read(id).await {
        Ok(record) => ReadResponse::success(record),
        Err(err @ DomainError::NotFound(_)) => {
            debug!(id, "no aggregate for key");
            ReadResponse::failure(err.to_string())
        }
        Err(err) => {
            error!(id, error = %err, "read failed");
            ReadResponse::failure(err.to_string())
        }
    };
    Json(response)
}

async fn health_check(State(state): State<Arc<ReadApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.service_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct FixedReader;

    #[async_trait]
    impl AggregateReader for FixedReader {
        async fn read(&self, id: &str) -> DomainResult<Observation> {
            match id {
                "42" => Ok(Observation::new("42", 15.75)),
                "broken" => Err(DomainError::Storage("disk I/O error".to_string())),
                other => Err(DomainError::NotFound(other.to_string())),
            }
        }
    }

    fn router() -> Router {
        ReadApiServer::new(Arc::new(FixedReader), "tally-test").build_router()
    }

    async fn call(method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let (status, body) = call(Method::GET, "/getValueForId?id=42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "status": "Success",
                "message": "Data fetched successfully.",
                "data": {"id": "42", "value": 15.75}
            })
        );
    }

    #[tokio::test]
    async fn test_not_found_is_failure_with_null_data() {
        let (status, body) = call(Method::GET, "/getValueForId?id=99").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Failure");
        assert_eq!(body["message"], "Key not found: 99");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_storage_error_is_failure_with_description() {
        let (status, body) = call(Method::GET, "/getValueForId?id=broken").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Failure");
        assert_eq!(body["message"], "Storage error: disk I/O error");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_missing_or_empty_id_is_user_error() {
        for uri in ["/getValueForId", "/getValueForId?id=", "/getValueForId?other=1"] {
            let (status, body) = call(Method::GET, uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "Failure");
            assert_eq!(body["message"], MISSING_ID_MESSAGE);
            assert!(body["data"].is_null());
        }
    }

    #[tokio::test]
    async fn test_non_get_is_method_not_allowed_envelope() {
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let (status, body) = call(method, "/getValueForId?id=42").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "Failure");
            assert_eq!(body["message"], METHOD_NOT_ALLOWED_MESSAGE);
            assert!(body["data"].is_null());
        }
    }

    #[tokio::test]
    async fn test_response_is_json() {
        let response = router()
            .oneshot(Request::builder().uri("/getValueForId?id=42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "tally-test");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
