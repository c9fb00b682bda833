use serde_json::Value;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, models::ComposeJobRow};

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_EXPIRED: &str = "expired";

pub async fn insert_job(
	pool: &PgPool,
	job_id: Uuid,
	request: &Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO compose_jobs (
	job_id,
	status,
	request,
	attempts,
	available_at,
	created_at,
	expires_at,
	updated_at
)
VALUES ($1, 'queued', $2, 0, $3, $3, $4, $3)",
	)
	.bind(job_id)
	.bind(request)
	.bind(now)
	.bind(expires_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn fetch_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ComposeJobRow>> {
	let row = sqlx::query_as::<_, ComposeJobRow>("SELECT * FROM compose_jobs WHERE job_id = $1")
		.bind(job_id)
		.fetch_optional(pool)
		.await?;

	Ok(row)
}

/// Claims the next deliverable job under a lease. The claim bumps `attempts`,
/// so a crashed worker's job comes back after lease expiry with its delivery
/// count intact (at-least-once).
pub async fn claim_next(
	pool: &PgPool,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<ComposeJobRow>> {
	let mut tx = pool.begin().await?;
	let row = sqlx::query_as::<_, ComposeJobRow>(
		"\
SELECT *
FROM compose_jobs
WHERE status IN ('queued', 'running') AND available_at <= $1 AND expires_at > $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;

	let job = if let Some(mut job) = row {
		let lease_until = now + Duration::seconds(lease_seconds);

		sqlx::query(
			"\
UPDATE compose_jobs
SET available_at = $1, attempts = attempts + 1, updated_at = $2
WHERE job_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.job_id)
		.execute(&mut *tx)
		.await?;

		job.available_at = lease_until;
		job.attempts += 1;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

/// Conditional `queued|running -> running` transition. Returns false when a
/// duplicate delivery lost the race to a terminal write.
pub async fn mark_running(pool: &PgPool, job_id: Uuid, now: OffsetDateTime) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE compose_jobs
SET status = 'running', started_at = COALESCE(started_at, $1), updated_at = $1
WHERE job_id = $2 AND status IN ('queued', 'running')",
	)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn mark_succeeded(
	pool: &PgPool,
	job_id: Uuid,
	result_json: &Value,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE compose_jobs
SET status = 'succeeded', result = $1, completed_at = $2, updated_at = $2
WHERE job_id = $3 AND status = 'running'",
	)
	.bind(result_json)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn mark_failed(
	pool: &PgPool,
	job_id: Uuid,
	error_code: &str,
	error_message: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE compose_jobs
SET status = 'failed', error_code = $1, error_message = $2, completed_at = $3, updated_at = $3
WHERE job_id = $4 AND status IN ('queued', 'running')",
	)
	.bind(error_code)
	.bind(error_message)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Returns a retryable job to the queue with a delayed redelivery.
pub async fn mark_retry(
	pool: &PgPool,
	job_id: Uuid,
	error_code: &str,
	error_message: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE compose_jobs
SET status = 'queued', error_code = $1, error_message = $2, available_at = $3, updated_at = $4
WHERE job_id = $5 AND status IN ('queued', 'running')",
	)
	.bind(error_code)
	.bind(error_message)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.execute(pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Stamps still-live jobs past their TTL as expired. Terminal rows keep their
/// stored status; polling overlays the expired presentation regardless.
pub async fn mark_expired_sweep(pool: &PgPool, now: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE compose_jobs
SET status = 'expired', completed_at = COALESCE(completed_at, $1), updated_at = $1
WHERE status IN ('queued', 'running') AND expires_at <= $1",
	)
	.bind(now)
	.execute(pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn purge_expired(pool: &PgPool, cutoff: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query("DELETE FROM compose_jobs WHERE expires_at <= $1")
		.bind(cutoff)
		.execute(pool)
		.await?;

	Ok(result.rows_affected())
}
