use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use xmon_storage::{jobs as job_store, models::ComposeJobRow};

use crate::{ComposeError, QueryService, compose, compose::ComposeResponse};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTicket {
	pub job_id: Uuid,
	pub status: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub expires_at: OffsetDateTime,
	pub poll_after_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
	pub code: String,
	pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
	pub job_id: Uuid,
	pub status: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub completed_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde")]
	pub expires_at: OffsetDateTime,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub poll_after_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<JobError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<ComposeResponse>,
}

impl QueryService {
	/// Validates eagerly and enqueues; the submitter gets a ticket, never a
	/// synchronous pipeline failure.
	pub async fn submit_job(
		&self,
		request: &compose::ComposeRequest,
	) -> Result<JobTicket, ComposeError> {
		compose::normalize_request(&self.cfg.query, request)?;

		let job_id = Uuid::new_v4();
		let now = OffsetDateTime::now_utc();
		let expires_at = now + Duration::seconds(self.cfg.jobs.ttl_seconds);
		let request_json = serde_json::to_value(request).map_err(|err| {
			ComposeError::Upstream { message: format!("Failed to encode job request: {err}.") }
		})?;

		job_store::insert_job(&self.db.pool, job_id, &request_json, now, expires_at).await?;

		tracing::info!(job_id = %job_id, expires_at = %expires_at, "Compose job queued.");

		Ok(JobTicket {
			job_id,
			status: job_store::STATUS_QUEUED.to_string(),
			created_at: now,
			expires_at,
			poll_after_ms: self.cfg.jobs.poll_after_ms,
		})
	}

	pub async fn poll_job(&self, job_id: Uuid) -> Result<Option<JobStatusView>, ComposeError> {
		let Some(row) = job_store::fetch_job(&self.db.pool, job_id).await? else {
			return Ok(None);
		};

		Ok(Some(present_job(&row, OffsetDateTime::now_utc(), self.cfg.jobs.poll_after_ms)))
	}
}

/// Maps a stored row to the polling contract. A job past its TTL is always
/// presented as expired, whatever status the row still carries.
pub fn present_job(row: &ComposeJobRow, now: OffsetDateTime, poll_after_ms: u64) -> JobStatusView {
	let expired = now > row.expires_at;
	let status = if expired {
		job_store::STATUS_EXPIRED.to_string()
	} else {
		row.status.clone()
	};
	let terminal = matches!(
		status.as_str(),
		job_store::STATUS_SUCCEEDED | job_store::STATUS_FAILED | job_store::STATUS_EXPIRED
	);
	let result = if expired {
		None
	} else {
		row.result.clone().and_then(|value| serde_json::from_value(value).ok())
	};
	let error = match (&row.error_code, &row.error_message) {
		(Some(code), Some(message)) if !expired && status == job_store::STATUS_FAILED => {
			Some(JobError { code: code.clone(), message: message.clone() })
		},
		_ => None,
	};

	JobStatusView {
		job_id: row.job_id,
		status,
		created_at: row.created_at,
		started_at: row.started_at,
		completed_at: row.completed_at,
		expires_at: row.expires_at,
		poll_after_ms: if terminal { None } else { Some(poll_after_ms) },
		error,
		result,
	}
}
