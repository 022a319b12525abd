//! HTTP trigger for the daily maintenance sweep
//!
//! A thin adapter: authenticate, run the shared [`MaintenanceSweep`], map
//! the outcome onto the response contract.

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cadence_api::{ErrorBody, HealthResponse, SweepResponse};
use cadence_core::{MaintenanceSweep, SweepError, SweepTrigger};
use cadence_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, warn, Level};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub sweep: Arc<MaintenanceSweep>,
    pub store: Arc<dyn Store>,
    /// `None` leaves the trigger open
    pub cron_secret: Option<Arc<str>>,
}

/// Handler errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Sweep(#[from] SweepError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorBody::new("Unauthorized")),
            AppError::Sweep(SweepError::AlreadyRunning) => (
                StatusCode::CONFLICT,
                ErrorBody::new("Maintenance sweep already running"),
            ),
            AppError::Sweep(SweepError::Configuration(details)) => {
                error!(error = %details, "Sweep configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Configuration error").with_details(details.clone()),
                )
            }
            AppError::Sweep(SweepError::Materialization { details }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Materialization failed").with_details(details.clone()),
            ),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Build the router with its middleware stack
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/maintenance/daily", get(daily_maintenance))
        .route("/health", get(health))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Request timeout leaving room for every sweep phase to hit its own timeout
pub fn request_timeout(phase_timeout: Duration) -> Duration {
    phase_timeout
        .saturating_mul(4)
        .saturating_add(Duration::from_secs(5))
}

fn authorize(headers: &HeaderMap, secret: Option<&str>) -> AppResult<()> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == secret => Ok(()),
        _ => {
            warn!("Maintenance trigger rejected: bad or missing bearer secret");
            Err(AppError::Unauthorized)
        }
    }
}

/// GET /api/maintenance/daily
async fn daily_maintenance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<SweepResponse>> {
    authorize(&headers, state.cron_secret.as_deref())?;

    let report = state
        .sweep
        .run(cadence_util::now(), SweepTrigger::Http)
        .await?;
    Ok(Json(report.to_response()))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.store.clone();
    let store_healthy = tokio::task::spawn_blocking(move || store.is_healthy())
        .await
        .unwrap_or(false);
    Json(HealthResponse {
        status: if store_healthy { "ok" } else { "degraded" }.to_string(),
        store_healthy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn request_timeout_covers_all_phases() {
        assert_eq!(request_timeout(Duration::from_secs(30)), Duration::from_secs(125));
        assert_eq!(request_timeout(Duration::from_secs(u64::MAX)), Duration::MAX);
    }

    #[test]
    fn open_when_no_secret_configured() {
        assert!(authorize(&HeaderMap::new(), None).is_ok());
        assert!(authorize(&bearer("anything"), None).is_ok());
    }

    #[test]
    fn secret_must_match_exactly() {
        assert!(authorize(&bearer("s3cret"), Some("s3cret")).is_ok());
        assert!(matches!(
            authorize(&bearer("wrong"), Some("s3cret")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authorize(&HeaderMap::new(), Some("s3cret")),
            Err(AppError::Unauthorized)
        ));

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("s3cret"));
        assert!(authorize(&basic, Some("s3cret")).is_err());
    }
}
