use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::admission::AdmissionController;
use crate::gateway::{GatewayManager, TestGateway};
use crate::handlers;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admission: AdmissionController,
    pub gateways: GatewayManager,
    /// Present when the test gateway is enabled.
    pub test_gateway: Option<TestGateway>,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let test_routes = Router::new()
        .route("/message", post(handlers::test_gateway::send_message))
        .route(
            "/messages/{conversation_id}",
            get(handlers::test_gateway::get_messages)
                .delete(handlers::test_gateway::clear_messages),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024)); // 1 MB

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .route("/health/concurrency", get(handlers::concurrency))
        .nest("/test", test_routes)
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ))
}
