//! Readiness aggregation and the fixed health responses.
//!
//! # Responsibilities
//! - Hold the ordered list of checkers registered at composition time
//! - AND them together, stopping at the first failure
//! - Render the `ok` / `unhealthy` plain-text responses

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::any,
    Router,
};

use crate::health::{HealthChecker, HealthError};
use crate::observability::metrics;

const HEALTHY_BODY: &str = "ok";
const UNHEALTHY_BODY: &str = "unhealthy";

/// Readiness handler combining any number of checkers.
///
/// Register cheap checkers first: evaluation stops at the first failure.
#[derive(Default)]
pub struct HealthHandler {
    checkers: Vec<Arc<dyn HealthChecker>>,
}

impl HealthHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a checker. Meant for composition time, before serving starts.
    pub fn add(&mut self, checker: Arc<dyn HealthChecker>) {
        self.checkers.push(checker);
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Evaluate checkers in order and return the first failure.
    pub fn check(&self) -> Result<(), HealthError> {
        for checker in &self.checkers {
            checker.check_health()?;
        }
        Ok(())
    }

    /// Produce the readiness response for the current state.
    pub fn respond(&self) -> Response {
        match self.check() {
            Ok(()) => healthy_response(),
            Err(e) => {
                tracing::debug!(error = %e, transient = e.is_transient(), "Readiness check failed");
                metrics::record_readiness_failure();
                unhealthy_response()
            }
        }
    }
}

/// Liveness handler: the process is up, whatever its dependencies say.
pub async fn liveness() -> Response {
    healthy_response()
}

/// Readiness handler backed by a shared [`HealthHandler`].
pub async fn readiness(State(handler): State<Arc<HealthHandler>>) -> Response {
    handler.respond()
}

/// Build the `<prefix>liveness` and `<prefix>readiness` routes.
///
/// `prefix` must start and end with `/`, e.g. `/healthz/`.
pub fn routes(prefix: &str, handler: Arc<HealthHandler>) -> Router {
    Router::new()
        .route(&format!("{prefix}liveness"), any(liveness))
        .route(
            &format!("{prefix}readiness"),
            any(readiness).with_state(handler),
        )
}

pub fn healthy_response() -> Response {
    plain_text(StatusCode::OK, HEALTHY_BODY)
}

pub fn unhealthy_response() -> Response {
    plain_text(StatusCode::INTERNAL_SERVER_ERROR, UNHEALTHY_BODY)
}

fn plain_text(status: StatusCode, body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
