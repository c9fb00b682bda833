use std::time::Instant;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use xmon_domain::{evidence::EvidenceItem, handle};
use xmon_providers::chat::{ChatCall, estimate_cost};
use xmon_storage::posts::PostFilters;

use crate::{
	ComposeError, Providers, QueryService, guardrails,
	parse::{self, ParsedReply, ReplyFields},
	prompt,
	retrieval::RetrievalOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
	#[default]
	All,
	Priority,
	Watch,
}
impl Tier {
	fn as_filter(self) -> Option<String> {
		match self {
			Self::All => None,
			Self::Priority => Some("priority".to_string()),
			Self::Watch => Some("watch".to_string()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStyle {
	Brief,
	#[default]
	Balanced,
	Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftFormat {
	#[default]
	None,
	XPost,
	Thread,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeRequest {
	pub task_text: String,
	#[serde(default)]
	pub since: Option<String>,
	#[serde(default)]
	pub until: Option<String>,
	#[serde(default)]
	pub tier: Tier,
	#[serde(default)]
	pub handle: Option<String>,
	#[serde(default)]
	pub significant: bool,
	#[serde(default)]
	pub retrieval_limit: Option<u32>,
	#[serde(default)]
	pub context_limit: Option<u32>,
	#[serde(default)]
	pub answer_style: AnswerStyle,
	#[serde(default)]
	pub draft_format: DraftFormat,
}

#[derive(Debug, Clone)]
pub struct NormalizedRequest {
	pub task_text: String,
	pub filters: PostFilters,
	pub retrieval_limit: u32,
	pub context_limit: u32,
	pub answer_style: AnswerStyle,
	pub draft_format: DraftFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalStats {
	pub retrieved_count: u32,
	pub used_count: u32,
	pub model: String,
	pub latency_ms: u64,
	pub coverage_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeResponse {
	pub answer_text: String,
	pub draft_text: Option<String>,
	pub key_points: Vec<String>,
	pub citations: Vec<EvidenceItem>,
	pub retrieval_stats: RetrievalStats,
}

pub fn normalize_request(
	cfg: &xmon_config::Query,
	request: &ComposeRequest,
) -> Result<NormalizedRequest, ComposeError> {
	let task_text = request.task_text.trim().to_string();

	if task_text.is_empty() {
		return Err(ComposeError::Validation {
			message: "task_text must be non-empty.".to_string(),
		});
	}

	let since = parse_timestamp(request.since.as_deref(), "since")?;
	let until = parse_timestamp(request.until.as_deref(), "until")?;

	if let Some(since) = since
		&& let Some(until) = until
		&& since > until
	{
		return Err(ComposeError::Validation {
			message: "since must not be later than until.".to_string(),
		});
	}

	let retrieval_limit = request
		.retrieval_limit
		.unwrap_or(cfg.retrieval_limit_default)
		.clamp(1, cfg.retrieval_limit_max);
	let context_limit = request
		.context_limit
		.unwrap_or(cfg.context_limit_default)
		.clamp(1, cfg.context_limit_max)
		.min(retrieval_limit);
	let handles =
		request.handle.as_deref().map(handle::normalize_handles).unwrap_or_default();

	Ok(NormalizedRequest {
		task_text,
		filters: PostFilters {
			since,
			until,
			tier: request.tier.as_filter(),
			handles,
			significant_only: request.significant,
		},
		retrieval_limit,
		context_limit,
		answer_style: request.answer_style,
		draft_format: request.draft_format,
	})
}

fn parse_timestamp(
	raw: Option<&str>,
	field: &str,
) -> Result<Option<OffsetDateTime>, ComposeError> {
	let Some(raw) = raw else {
		return Ok(None);
	};
	let trimmed = raw.trim();

	if trimmed.is_empty() {
		return Ok(None);
	}

	OffsetDateTime::parse(trimmed, &Rfc3339).map(Some).map_err(|_| {
		ComposeError::Validation { message: format!("{field} must be an RFC3339 timestamp.") }
	})
}

impl QueryService {
	pub async fn compose(
		&self,
		request: &ComposeRequest,
	) -> Result<ComposeResponse, ComposeError> {
		self.compose_with_id(Uuid::new_v4(), request).await
	}

	pub async fn compose_with_id(
		&self,
		request_id: Uuid,
		request: &ComposeRequest,
	) -> Result<ComposeResponse, ComposeError> {
		let started = Instant::now();
		let normalized = normalize_request(&self.cfg.query, request)?;
		// Both ceilings are checked before the first network call; the permit
		// is held until the pipeline finishes either way.
		let _permit = self.limiter.acquire()?;
		let result = self.run_pipeline(request_id, &normalized, started).await;

		match &result {
			Ok(response) => {
				tracing::info!(
					request_id = %request_id,
					latency_ms = response.retrieval_stats.latency_ms,
					retrieved = response.retrieval_stats.retrieved_count,
					used = response.retrieval_stats.used_count,
					citations = response.citations.len(),
					"Compose finished."
				);
			},
			Err(err) => {
				tracing::warn!(
					request_id = %request_id,
					latency_ms = started.elapsed().as_millis() as u64,
					error_code = err.code(),
					error = %err,
					"Compose failed."
				);
			},
		}

		result
	}

	async fn run_pipeline(
		&self,
		request_id: Uuid,
		normalized: &NormalizedRequest,
		started: Instant,
	) -> Result<ComposeResponse, ComposeError> {
		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &[normalized.task_text.clone()])
			.await
			.map_err(ComposeError::from)?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(ComposeError::Upstream {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};
		let retrieval =
			crate::retrieval::retrieve(&self.db, &self.cfg, normalized, &vector).await?;

		generate_answer(&self.cfg, &self.providers, request_id, normalized, retrieval, started)
			.await
	}
}

/// The generation stage: everything after retrieval. Split out so the
/// cost-gate, parsing, and guardrail behavior is drivable without a
/// database.
pub async fn generate_answer(
	cfg: &xmon_config::Config,
	providers: &Providers,
	request_id: Uuid,
	normalized: &NormalizedRequest,
	retrieval: RetrievalOutcome,
	started: Instant,
) -> Result<ComposeResponse, ComposeError> {
	let RetrievalOutcome { evidence, retrieved_count } = retrieval;
	let stats = |latency_ms: u64, used: usize| RetrievalStats {
		retrieved_count: retrieved_count as u32,
		used_count: used as u32,
		model: cfg.providers.chat.model.clone(),
		latency_ms,
		coverage_score: coverage_score(used, normalized.context_limit),
	};

	if evidence.is_empty() {
		tracing::info!(request_id = %request_id, "No evidence retrieved; returning fallback.");

		return Ok(guardrails::no_evidence_fallback(stats(
			started.elapsed().as_millis() as u64,
			0,
		)));
	}

	let built = prompt::build_prompt(
		&normalized.task_text,
		&evidence,
		normalized.answer_style,
		normalized.draft_format,
		cfg.query.drafts.enabled,
	);
	let projected = prompt::projected_max_cost_usd(
		built.estimated_input_tokens,
		cfg.providers.chat.max_output_tokens,
		&cfg.query.cost,
	);

	if projected > cfg.query.cost.ceiling_usd {
		return Err(ComposeError::CostCeiling {
			projected_usd: projected,
			ceiling_usd: cfg.query.cost.ceiling_usd,
		});
	}

	let call = ChatCall { system_prompt: built.system_prompt, user_prompt: built.user_prompt };
	let reply = providers
		.chat
		.complete(&cfg.providers.chat, &call)
		.await
		.map_err(ComposeError::from)?;

	if let Some(usage) = reply.usage.as_ref() {
		let actual = estimate_cost(
			usage,
			cfg.query.cost.input_usd_per_1k,
			cfg.query.cost.output_usd_per_1k,
		);

		tracing::debug!(
			request_id = %request_id,
			prompt_tokens = usage.prompt_tokens,
			completion_tokens = usage.completion_tokens,
			cost_usd = actual,
			attempts = reply.attempts,
			"Model usage recorded."
		);
	}

	let fields = match parse::parse_reply(&reply.text) {
		ParsedReply::Strict(fields) | ParsedReply::Recovered(fields) => fields,
		ParsedReply::PlainText(answer_text) => {
			ReplyFields { answer_text, ..ReplyFields::default() }
		},
		ParsedReply::Unparseable => {
			tracing::warn!(request_id = %request_id, "Model reply unparseable; degrading.");

			let used = evidence.len();

			return Ok(guardrails::no_synthesis_fallback(
				&cfg.query,
				evidence,
				stats(started.elapsed().as_millis() as u64, used),
			));
		},
	};
	let used = evidence.len();

	Ok(guardrails::enforce(
		&cfg.query,
		evidence,
		fields,
		normalized.draft_format,
		stats(started.elapsed().as_millis() as u64, used),
	))
}

fn coverage_score(used: usize, context_limit: u32) -> f32 {
	if context_limit == 0 {
		return 0.0;
	}

	(used as f32 / context_limit as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn query_config() -> xmon_config::Query {
		xmon_config::Query {
			retrieval_limit_default: 24,
			retrieval_limit_max: 50,
			context_limit_default: 12,
			context_limit_max: 25,
			candidate_multiplier: 3,
			max_candidate_k: 200,
			min_score: 0.15,
			max_lexical_tokens: 12,
			max_citations: 8,
			max_key_points: 8,
			cost: xmon_config::Cost {
				ceiling_usd: 0.25,
				input_usd_per_1k: 0.000_15,
				output_usd_per_1k: 0.000_6,
			},
			drafts: xmon_config::Drafts {
				enabled: true,
				x_post_max_chars: 280,
				thread_max_chars: 2_200,
			},
		}
	}

	fn request(task: &str) -> ComposeRequest {
		ComposeRequest {
			task_text: task.to_string(),
			since: None,
			until: None,
			tier: Tier::All,
			handle: None,
			significant: false,
			retrieval_limit: None,
			context_limit: None,
			answer_style: AnswerStyle::Balanced,
			draft_format: DraftFormat::None,
		}
	}

	#[test]
	fn empty_task_is_a_validation_error() {
		let err = normalize_request(&query_config(), &request("  "))
			.expect_err("Expected validation error.");

		assert!(matches!(err, ComposeError::Validation { .. }));
	}

	#[test]
	fn context_limit_never_exceeds_retrieval_limit() {
		let mut req = request("task");

		req.retrieval_limit = Some(5);
		req.context_limit = Some(20);

		let normalized = normalize_request(&query_config(), &req).expect("Must normalize.");

		assert_eq!(normalized.retrieval_limit, 5);
		assert_eq!(normalized.context_limit, 5);
	}

	#[test]
	fn limits_are_clamped_to_configured_maxima() {
		let mut req = request("task");

		req.retrieval_limit = Some(500);
		req.context_limit = Some(500);

		let normalized = normalize_request(&query_config(), &req).expect("Must normalize.");

		assert_eq!(normalized.retrieval_limit, 50);
		assert_eq!(normalized.context_limit, 25);
	}

	#[test]
	fn handles_are_normalized_into_the_filters() {
		let mut req = request("task");

		req.handle = Some("@Alice, @BOB".to_string());
		req.tier = Tier::Priority;
		req.significant = true;

		let normalized = normalize_request(&query_config(), &req).expect("Must normalize.");

		assert_eq!(normalized.filters.handles, vec!["alice", "bob"]);
		assert_eq!(normalized.filters.tier.as_deref(), Some("priority"));
		assert!(normalized.filters.significant_only);
	}

	#[test]
	fn bad_timestamps_are_rejected() {
		let mut req = request("task");

		req.since = Some("yesterday".to_string());

		let err = normalize_request(&query_config(), &req).expect_err("Expected error.");

		assert!(matches!(err, ComposeError::Validation { .. }));
	}

	#[test]
	fn inverted_time_range_is_rejected() {
		let mut req = request("task");

		req.since = Some("2026-02-01T00:00:00Z".to_string());
		req.until = Some("2026-01-01T00:00:00Z".to_string());

		assert!(normalize_request(&query_config(), &req).is_err());
	}

	#[test]
	fn coverage_is_used_over_context_limit() {
		assert_eq!(coverage_score(6, 12), 0.5);
		assert_eq!(coverage_score(0, 12), 0.0);
		assert_eq!(coverage_score(15, 12), 1.0);
	}
}
