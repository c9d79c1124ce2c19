//! HTTP routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::handlers;
use crate::middleware::auth::AuthLayer;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/notifications", post(handlers::notifications))
        .with_state(state);

    if settings.auth.enabled {
        router = router.layer(AuthLayer::new(settings.auth.tokens.clone()));
    }

    router
        .layer(TimeoutLayer::new(Duration::from_secs(settings.server.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}
