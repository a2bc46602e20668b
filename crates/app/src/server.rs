use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use medrag_core::{AnswerMode, PipelineError, RagPipeline};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const STATUS_MESSAGE: &str = "MedQuickConsult API is running.";
const INTERNAL_ERROR_DETAIL: &str = "An internal server error occurred.";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query_text: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    AnswerMode::Doctor.to_string()
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: String,
}

/// Errors surfaced to HTTP clients. Internal failures carry no detail.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            // Blank queries are refused here instead of being searched.
            PipelineError::EmptyQuery => Self::BadRequest("query_text must not be empty"),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
            }
            Self::Internal(cause) => {
                tracing::error!(%cause, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": INTERNAL_ERROR_DETAIL })),
                )
                    .into_response()
            }
        }
    }
}

pub fn router(pipeline: Arc<RagPipeline>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/generate_report", post(generate_report))
        .route("/api/v1/generate_report", post(generate_report))
        .layer(CorsLayer::permissive())
        .with_state(AppState { pipeline })
}

async fn status() -> Json<Value> {
    Json(json!({ "status": STATUS_MESSAGE }))
}

async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let mode = AnswerMode::from_label(&request.mode);
    let generated = state.pipeline.answer(&request.query_text, mode).await?;

    Ok(Json(QueryResponse {
        answer: generated.answer,
        sources: generated.sources,
    }))
}
