/// The request-level failure taxonomy. Parse and guardrail problems never
/// appear here; they degrade to a grounded fallback answer instead.
#[derive(Debug)]
pub enum ComposeError {
	/// Caller error; never retried.
	Validation { message: String },
	/// Operator-fixable deployment problem (missing key, bad URL).
	Configuration { message: String },
	/// Embedding/model/datastore failure after local retries.
	Upstream { message: String },
	/// Upstream failure specifically due to exhausting the latency budget.
	UpstreamTimeout { message: String },
	/// Pre-spend rejection; the model was never called.
	CostCeiling { projected_usd: f64, ceiling_usd: f64 },
	/// Sliding-window or concurrency rejection; the caller should back off.
	RateLimited { retry_after_ms: u64 },
}

impl std::fmt::Display for ComposeError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Validation { message } => write!(f, "Invalid request: {message}"),
			Self::Configuration { message } => write!(f, "Configuration error: {message}"),
			Self::Upstream { message } => write!(f, "Upstream error: {message}"),
			Self::UpstreamTimeout { message } => write!(f, "Upstream timeout: {message}"),
			Self::CostCeiling { projected_usd, ceiling_usd } => write!(
				f,
				"Projected cost ${projected_usd:.4} exceeds the ${ceiling_usd:.4} ceiling."
			),
			Self::RateLimited { retry_after_ms } => {
				write!(f, "Rate limited; retry after {retry_after_ms}ms.")
			},
		}
	}
}

impl std::error::Error for ComposeError {}

impl ComposeError {
	/// Stable machine-readable code, used for job error records and HTTP
	/// bodies.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Validation { .. } => "validation",
			Self::Configuration { .. } => "configuration",
			Self::Upstream { .. } => "upstream",
			Self::UpstreamTimeout { .. } => "upstream_timeout",
			Self::CostCeiling { .. } => "cost_ceiling",
			Self::RateLimited { .. } => "rate_limited",
		}
	}

	/// Whether a redelivered async job could plausibly succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Upstream { .. } | Self::UpstreamTimeout { .. } | Self::RateLimited { .. }
		)
	}
}

impl From<sqlx::Error> for ComposeError {
	fn from(err: sqlx::Error) -> Self {
		Self::Upstream { message: format!("Datastore error: {err}") }
	}
}

impl From<xmon_storage::Error> for ComposeError {
	fn from(err: xmon_storage::Error) -> Self {
		match err {
			xmon_storage::Error::Sqlx(inner) => {
				Self::Upstream { message: format!("Datastore error: {inner}") }
			},
			xmon_storage::Error::InvalidArgument(message) => Self::Validation { message },
			xmon_storage::Error::NotFound(message) => Self::Upstream { message },
		}
	}
}

impl From<xmon_providers::Error> for ComposeError {
	fn from(err: xmon_providers::Error) -> Self {
		if err.is_timeout() {
			return Self::UpstreamTimeout { message: err.to_string() };
		}

		Self::Upstream { message: err.to_string() }
	}
}
