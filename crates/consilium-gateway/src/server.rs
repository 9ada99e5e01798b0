use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use consilium_core::{ConsiliumError, DecisionBody, Language, Query};
use consilium_orchestrator::Orchestrator;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// The HTTP gateway: a thin adapter translating external calls into core
/// operations. No business logic lives here.
pub struct GatewayServer;

impl GatewayServer {
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        let state = Arc::new(AppState { orchestrator });
        Router::new()
            .route("/query", post(query_handler))
            .route("/validation/:id", post(submit_decision_handler))
            .route("/validation/:id/response", get(validated_response_handler))
            .route("/validations", get(queue_handler))
            .route("/validations/statistics", get(statistics_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

/// Error envelope: taxonomy code plus a caller-safe message, never an
/// internal trace.
struct ApiError(ConsiliumError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConsiliumError::InputInvalid(_) => StatusCode::BAD_REQUEST,
            ConsiliumError::NotFound(_) => StatusCode::NOT_FOUND,
            ConsiliumError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
            _ => self.0.to_string(),
        };
        let body = Json(serde_json::json!({
            "error": self.0.kind(),
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<ConsiliumError> for ApiError {
    fn from(e: ConsiliumError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    target_language: Option<String>,
    enable_human_loop: Option<bool>,
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = match req.target_language.as_deref() {
        None => None,
        Some(code) => Some(Language::parse(code).ok_or_else(|| {
            ConsiliumError::InputInvalid(format!("unsupported language code: {code}"))
        })?),
    };

    let mut query = Query::new(req.query);
    query.target_language = target;
    query.enable_human_loop = req
        .enable_human_loop
        .unwrap_or(state.orchestrator.config().enable_human_loop_default);

    info!(request_id = %query.request_id, "Query received");
    let response = state.orchestrator.process_query(query).await?;
    Ok(Json(response))
}

async fn submit_decision_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.orchestrator.submit_human_decision(id, body).await?;
    Ok(Json(updated))
}

async fn validated_response_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.orchestrator.fetch_validated(id).await {
        Some(response) => Ok(Json(response)),
        None => Err(ApiError(ConsiliumError::NotFound(format!(
            "no finalized response for validation {id}"
        )))),
    }
}

async fn queue_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.get_validation_queue().await)
}

async fn statistics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.get_validation_statistics().await)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.health().await)
}
