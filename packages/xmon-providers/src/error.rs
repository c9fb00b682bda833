pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Upstream returned status {status}: {body}")]
	UpstreamStatus { status: u16, body: String },
	#[error("Request timed out after {attempts} attempt(s) within the {budget_ms}ms budget.")]
	Timeout { attempts: u32, budget_ms: u64 },
}

impl Error {
	/// Timeouts map to 504 at the HTTP boundary; everything else here is 503.
	pub fn is_timeout(&self) -> bool {
		match self {
			Self::Timeout { .. } => true,
			Self::Reqwest(err) => err.is_timeout(),
			_ => false,
		}
	}
}
