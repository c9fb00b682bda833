use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use xmon_service::{ComposeError, ComposeRequest, ComposeResponse, JobStatusView, JobTicket};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/query/compose", post(compose))
		.route("/v1/query/compose/jobs", post(submit_job))
		.route("/v1/query/compose/jobs/{job_id}", get(poll_job))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn compose(
	State(state): State<AppState>,
	Json(payload): Json<ComposeRequest>,
) -> Result<Json<ComposeResponse>, ApiError> {
	let response = state.service.compose(&payload).await?;
	Ok(Json(response))
}

async fn submit_job(
	State(state): State<AppState>,
	Json(payload): Json<ComposeRequest>,
) -> Result<Json<JobTicket>, ApiError> {
	let ticket = state.service.submit_job(&payload).await?;
	Ok(Json(ticket))
}

async fn poll_job(
	State(state): State<AppState>,
	Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>, ApiError> {
	let view = state.service.poll_job(job_id).await?.ok_or_else(|| {
		json_error(StatusCode::NOT_FOUND, "not_found", format!("Unknown job {job_id}."))
	})?;
	Ok(Json(view))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	retry_after_ms: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	retry_after_ms: Option<u64>,
}

impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), retry_after_ms: None }
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
) -> ApiError {
	ApiError::new(status, code, message)
}

impl From<ComposeError> for ApiError {
	fn from(err: ComposeError) -> Self {
		let code = err.code();
		let message = err.to_string();

		match err {
			ComposeError::Validation { .. } => {
				json_error(StatusCode::BAD_REQUEST, code, message)
			},
			ComposeError::Configuration { .. } => {
				json_error(StatusCode::SERVICE_UNAVAILABLE, code, message)
			},
			ComposeError::Upstream { .. } => {
				json_error(StatusCode::SERVICE_UNAVAILABLE, code, message)
			},
			ComposeError::UpstreamTimeout { .. } => {
				json_error(StatusCode::GATEWAY_TIMEOUT, code, message)
			},
			ComposeError::CostCeiling { .. } => {
				json_error(StatusCode::UNPROCESSABLE_ENTITY, code, message)
			},
			ComposeError::RateLimited { retry_after_ms } => ApiError {
				status: StatusCode::TOO_MANY_REQUESTS,
				error_code: code.to_string(),
				message,
				retry_after_ms: Some(retry_after_ms),
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			retry_after_ms: self.retry_after_ms,
		};
		(self.status, Json(body)).into_response()
	}
}
