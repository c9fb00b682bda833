use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use xmon_service::{ComposeError, ComposeRequest, QueryService};
use xmon_storage::{jobs as job_store, models::ComposeJobRow};

const POLL_INTERVAL_MS: i64 = 500;
const SWEEP_INTERVAL_SECONDS: i64 = 60;
const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_JOB_ERROR_CHARS: usize = 1_024;

pub async fn run_worker(service: QueryService) -> color_eyre::Result<()> {
	let mut last_sweep = OffsetDateTime::now_utc();

	loop {
		if let Err(err) = process_next_job(&service).await {
			tracing::error!(error = %err, "Compose job processing failed.");
		}

		let now = OffsetDateTime::now_utc();

		if now - last_sweep >= Duration::seconds(SWEEP_INTERVAL_SECONDS) {
			if let Err(err) = sweep_expired(&service, now).await {
				tracing::error!(error = %err, "Job expiry sweep failed.");
			} else {
				last_sweep = now;
			}
		}

		tokio_time::sleep(to_std_duration(Duration::milliseconds(POLL_INTERVAL_MS))).await;
	}
}

async fn process_next_job(service: &QueryService) -> color_eyre::Result<()> {
	let now = OffsetDateTime::now_utc();
	let job = job_store::claim_next(
		&service.db.pool,
		now,
		service.cfg.jobs.lease_seconds,
	)
	.await?;
	let Some(job) = job else {
		return Ok(());
	};

	if job.attempts > service.cfg.jobs.max_attempts {
		// Dead letter: redelivery budget spent. Pollers see a plain failure.
		let message = job
			.error_message
			.clone()
			.unwrap_or_else(|| "Exceeded the delivery attempt budget.".to_string());

		job_store::mark_failed(
			&service.db.pool,
			job.job_id,
			job.error_code.as_deref().unwrap_or("upstream"),
			&truncate_error(&message),
			now,
		)
		.await?;
		tracing::warn!(job_id = %job.job_id, attempts = job.attempts, "Job dead-lettered.");

		return Ok(());
	}

	let request: ComposeRequest = match serde_json::from_value(job.request.clone()) {
		Ok(request) => request,
		Err(err) => {
			job_store::mark_failed(
				&service.db.pool,
				job.job_id,
				"validation",
				&truncate_error(&format!("Stored request did not decode: {err}.")),
				now,
			)
			.await?;

			return Ok(());
		},
	};

	if !job_store::mark_running(&service.db.pool, job.job_id, now).await? {
		tracing::info!(job_id = %job.job_id, "Job already terminal; skipping duplicate delivery.");

		return Ok(());
	}

	tracing::info!(job_id = %job.job_id, attempt = job.attempts, "Running compose job.");

	match service.compose_with_id(job.job_id, &request).await {
		Ok(response) => {
			let result_json = serde_json::to_value(&response)?;
			let done = OffsetDateTime::now_utc();

			if !job_store::mark_succeeded(&service.db.pool, job.job_id, &result_json, done).await? {
				tracing::info!(job_id = %job.job_id, "Success write lost to a terminal race.");
			}
		},
		Err(err) => handle_job_error(service, &job, err).await?,
	}

	Ok(())
}

async fn handle_job_error(
	service: &QueryService,
	job: &ComposeJobRow,
	err: ComposeError,
) -> color_eyre::Result<()> {
	let now = OffsetDateTime::now_utc();
	let message = truncate_error(&err.to_string());

	if err.is_retryable() && job.attempts < service.cfg.jobs.max_attempts {
		let backoff = backoff_for_attempt(job.attempts);

		job_store::mark_retry(
			&service.db.pool,
			job.job_id,
			err.code(),
			&message,
			now + backoff,
			now,
		)
		.await?;
		tracing::warn!(
			job_id = %job.job_id,
			attempt = job.attempts,
			error_code = err.code(),
			"Job failed; scheduled for redelivery."
		);
	} else {
		job_store::mark_failed(&service.db.pool, job.job_id, err.code(), &message, now).await?;
		tracing::error!(job_id = %job.job_id, error_code = err.code(), error = %err, "Job failed.");
	}

	Ok(())
}

async fn sweep_expired(service: &QueryService, now: OffsetDateTime) -> color_eyre::Result<()> {
	let expired = job_store::mark_expired_sweep(&service.db.pool, now).await?;

	if expired > 0 {
		tracing::info!(count = expired, "Marked live jobs past TTL as expired.");
	}

	let cutoff = now - Duration::seconds(service.cfg.jobs.purge_after_seconds);
	let purged = job_store::purge_expired(&service.db.pool, cutoff).await?;

	if purged > 0 {
		tracing::info!(count = purged, "Purged long-expired compose jobs.");
	}

	Ok(())
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);
	let capped = base.min(MAX_BACKOFF_MS);

	Duration::milliseconds(capped)
}

fn truncate_error(text: &str) -> String {
	if text.chars().count() <= MAX_JOB_ERROR_CHARS {
		return text.to_string();
	}

	let mut out: String = text.chars().take(MAX_JOB_ERROR_CHARS).collect();

	out.push_str("...");

	out
}

fn to_std_duration(duration: Duration) -> StdDuration {
	let millis = duration.whole_milliseconds();

	if millis <= 0 {
		return StdDuration::from_millis(0);
	}

	StdDuration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_then_caps() {
		assert_eq!(backoff_for_attempt(1), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(2), Duration::milliseconds(1_000));
		assert_eq!(backoff_for_attempt(4), Duration::milliseconds(4_000));
		assert_eq!(backoff_for_attempt(20), Duration::milliseconds(30_000));
	}

	#[test]
	fn long_errors_are_truncated_for_storage() {
		let long = "e".repeat(5_000);
		let out = truncate_error(&long);

		assert_eq!(out.chars().count(), MAX_JOB_ERROR_CHARS + 3);
		assert!(out.ends_with("..."));
	}
}
