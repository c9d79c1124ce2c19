//! Shared-token authentication for notification delivery

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;

/// Alternative header for delivery channels that cannot set `Authorization`
pub const TOKEN_HEADER: &str = "x-failover-token";

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    tokens: Arc<HashSet<String>>,
}

impl AuthLayer {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: Arc::new(tokens.into_iter().filter(|t| !t.is_empty()).collect()),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    tokens: Arc<HashSet<String>>,
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        return Some(value.strip_prefix("Bearer ").unwrap_or(value).trim());
    }
    headers
        .get(TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Liveness probes never carry a token
        if request.uri().path() == "/health" || self.tokens.is_empty() {
            return Box::pin(self.inner.call(request));
        }

        let rejection = match presented_token(request.headers()) {
            Some(token) if self.tokens.contains(token) => None,
            Some(_) => Some("invalid token"),
            None => Some("token required via 'Authorization: Bearer <token>' or x-failover-token"),
        };

        match rejection {
            None => Box::pin(self.inner.call(request)),
            Some(reason) => {
                warn!(path = %request.uri().path(), reason = reason, "Rejected unauthenticated notification");
                let response = AppError::Unauthorized(reason.to_string()).into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
