use xmon_domain::{draft, evidence::EvidenceItem};

use crate::{
	compose::{ComposeResponse, DraftFormat, RetrievalStats},
	parse::ReplyFields,
};

const NO_EVIDENCE_ANSWER: &str = "No stored posts matched this task within the requested \
	filters, so there is nothing to ground an answer on. Try widening the time range or \
	relaxing the handle and tier filters.";
const NO_SYNTHESIS_ANSWER: &str = "The language model did not return a usable synthesis for \
	this task. The retrieved posts below are the strongest matches; their key excerpts are \
	listed in place of a composed answer.";

/// Applies the citation and draft guardrails to a parsed reply. Every
/// non-fallback answer must cite at least one evidence item; zero citations
/// after selection forces the no-synthesis fallback.
pub fn enforce(
	cfg: &xmon_config::Query,
	evidence: Vec<EvidenceItem>,
	fields: ReplyFields,
	draft_format: DraftFormat,
	stats: RetrievalStats,
) -> ComposeResponse {
	let citations =
		select_citations(&evidence, &fields.citation_status_ids, cfg.max_citations as usize);

	if citations.is_empty() {
		return no_synthesis_fallback(cfg, evidence, stats);
	}

	let mut key_points = fields.key_points;

	key_points.truncate(cfg.max_key_points as usize);

	ComposeResponse {
		answer_text: fields.answer_text,
		draft_text: enforce_draft(&cfg.drafts, fields.draft_text, draft_format),
		key_points,
		citations,
		retrieval_stats: stats,
	}
}

/// Keeps evidence items named by the model, preserving evidence order; when
/// the model cited nothing recognizable, falls back to the first
/// `max_citations` items.
pub fn select_citations(
	evidence: &[EvidenceItem],
	cited_ids: &[String],
	max_citations: usize,
) -> Vec<EvidenceItem> {
	let mut selected: Vec<EvidenceItem> = evidence
		.iter()
		.filter(|item| cited_ids.iter().any(|id| id == &item.status_id))
		.take(max_citations)
		.cloned()
		.collect();

	if selected.is_empty() {
		selected = evidence.iter().take(max_citations).cloned().collect();
	}

	selected
}

/// Null unless the request asked for a draft and drafts are enabled;
/// otherwise capped to the format's character budget.
pub fn enforce_draft(
	cfg: &xmon_config::Drafts,
	draft_text: Option<String>,
	draft_format: DraftFormat,
) -> Option<String> {
	if !cfg.enabled || draft_format == DraftFormat::None {
		return None;
	}

	let text = draft_text?;
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return None;
	}

	let max_chars = match draft_format {
		DraftFormat::XPost => cfg.x_post_max_chars,
		DraftFormat::Thread => cfg.thread_max_chars,
		DraftFormat::None => unreachable!("Handled above."),
	};

	Some(draft::truncate_draft(trimmed, max_chars as usize))
}

pub fn no_evidence_fallback(stats: RetrievalStats) -> ComposeResponse {
	ComposeResponse {
		answer_text: NO_EVIDENCE_ANSWER.to_string(),
		draft_text: None,
		key_points: Vec::new(),
		citations: Vec::new(),
		retrieval_stats: stats,
	}
}

/// Evidence-grounded degradation for unparseable or citation-free replies.
pub fn no_synthesis_fallback(
	cfg: &xmon_config::Query,
	evidence: Vec<EvidenceItem>,
	stats: RetrievalStats,
) -> ComposeResponse {
	let key_points = evidence
		.iter()
		.take(cfg.max_key_points as usize)
		.map(|item| format!("@{}: {}", item.author_handle, item.excerpt))
		.collect();
	let citations: Vec<EvidenceItem> =
		evidence.into_iter().take(cfg.max_citations as usize).collect();

	ComposeResponse {
		answer_text: NO_SYNTHESIS_ANSWER.to_string(),
		draft_text: None,
		key_points,
		citations,
		retrieval_stats: stats,
	}
}
