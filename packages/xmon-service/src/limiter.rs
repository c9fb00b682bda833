use std::{
	sync::Mutex,
	time::{Duration, Instant},
};

use crate::ComposeError;

const WINDOW_MS: u64 = 60_000;

/// Instance-scoped, best-effort limiter: one sliding 60-second request
/// window plus an always-live concurrency counter, both behind a single
/// mutex so the check-and-increment is atomic. State is lost on restart.
pub struct RateLimiter {
	requests_per_minute: u32,
	max_concurrent: u32,
	state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
	window_start: Instant,
	count_in_window: u32,
	active_concurrent: u32,
}

/// Holds one concurrency slot; dropping it releases the slot whether the
/// execution succeeded or failed.
pub struct Permit<'a> {
	limiter: &'a RateLimiter,
}
impl Drop for Permit<'_> {
	fn drop(&mut self) {
		let mut state = self.limiter.state.lock().unwrap_or_else(|err| err.into_inner());

		state.active_concurrent = state.active_concurrent.saturating_sub(1);
	}
}

impl RateLimiter {
	pub fn new(cfg: &xmon_config::Limits) -> Self {
		Self {
			requests_per_minute: cfg.requests_per_minute,
			max_concurrent: cfg.max_concurrent,
			state: Mutex::new(WindowState {
				window_start: Instant::now(),
				count_in_window: 0,
				active_concurrent: 0,
			}),
		}
	}

	pub fn acquire(&self) -> Result<Permit<'_>, ComposeError> {
		self.acquire_at(Instant::now())
	}

	fn acquire_at(&self, now: Instant) -> Result<Permit<'_>, ComposeError> {
		let window = Duration::from_millis(WINDOW_MS);
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		if now.duration_since(state.window_start) >= window {
			state.window_start = now;
			state.count_in_window = 0;
		}

		if state.count_in_window >= self.requests_per_minute {
			let elapsed = now.duration_since(state.window_start);
			let retry_after_ms = window.saturating_sub(elapsed).as_millis() as u64;

			return Err(ComposeError::RateLimited { retry_after_ms: retry_after_ms.max(1) });
		}
		if state.active_concurrent >= self.max_concurrent {
			return Err(ComposeError::RateLimited { retry_after_ms: 1_000 });
		}

		state.count_in_window += 1;
		state.active_concurrent += 1;

		Ok(Permit { limiter: self })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limits(requests_per_minute: u32, max_concurrent: u32) -> xmon_config::Limits {
		xmon_config::Limits { requests_per_minute, max_concurrent }
	}

	#[test]
	fn rejects_request_over_window_ceiling() {
		let limiter = RateLimiter::new(&limits(2, 10));
		let now = Instant::now();
		let first = limiter.acquire_at(now).expect("First request must pass.");
		let second = limiter.acquire_at(now).expect("Second request must pass.");

		drop(first);
		drop(second);

		let rejected = limiter.acquire_at(now);

		assert!(matches!(rejected, Err(ComposeError::RateLimited { .. })));
	}

	#[test]
	fn window_rollover_admits_requests_again() {
		let limiter = RateLimiter::new(&limits(1, 10));
		let now = Instant::now();

		drop(limiter.acquire_at(now).expect("First request must pass."));
		assert!(limiter.acquire_at(now).is_err());

		let later = now + Duration::from_millis(WINDOW_MS + 1);

		assert!(limiter.acquire_at(later).is_ok());
	}

	#[test]
	fn concurrency_slots_release_on_drop() {
		let limiter = RateLimiter::new(&limits(100, 1));
		let now = Instant::now();
		let permit = limiter.acquire_at(now).expect("First permit must pass.");

		assert!(limiter.acquire_at(now).is_err());

		drop(permit);

		assert!(limiter.acquire_at(now).is_ok());
	}

	#[test]
	fn rejection_reports_remaining_window() {
		let limiter = RateLimiter::new(&limits(1, 10));
		let now = Instant::now();

		drop(limiter.acquire_at(now).expect("First request must pass."));

		let later = now + Duration::from_millis(45_000);
		let Err(ComposeError::RateLimited { retry_after_ms }) = limiter.acquire_at(later) else {
			panic!("Expected a rate limited rejection.");
		};

		assert!(retry_after_ms <= 15_000);
		assert!(retry_after_ms > 0);
	}
}
