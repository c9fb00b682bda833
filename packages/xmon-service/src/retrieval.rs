use std::collections::HashSet;

use xmon_domain::{evidence::EvidenceItem, task};
use xmon_storage::{db::Db, models::ScoredPost, posts};

use crate::{ComposeError, compose::NormalizedRequest};

#[derive(Debug)]
pub struct RetrievalOutcome {
	/// Final grounding set: first `context_limit` of the semantic-then-
	/// lexical merge.
	pub evidence: Vec<EvidenceItem>,
	/// Candidates that survived retrieval before the context truncation.
	pub retrieved_count: usize,
}

pub async fn retrieve(
	db: &Db,
	cfg: &xmon_config::Config,
	request: &NormalizedRequest,
	vector: &[f32],
) -> Result<RetrievalOutcome, ComposeError> {
	if vector.len() != cfg.storage.vector.dim as usize {
		return Err(ComposeError::Upstream {
			message: format!(
				"Embedding dimension {} does not match configured dim {}.",
				vector.len(),
				cfg.storage.vector.dim,
			),
		});
	}

	let candidate_k = request
		.retrieval_limit
		.saturating_mul(cfg.query.candidate_multiplier)
		.min(cfg.query.max_candidate_k)
		.max(request.retrieval_limit);
	let rows = posts::nearest_posts(&db.pool, vector, &request.filters, candidate_k).await?;
	let mut merged =
		select_semantic(rows, cfg.query.min_score, request.retrieval_limit as usize);

	if merged.len() < request.context_limit as usize {
		let tokens =
			task::lexical_tokens(&request.task_text, cfg.query.max_lexical_tokens as usize);
		let exclude: Vec<String> =
			merged.iter().map(|row| row.status_id.clone()).collect();
		let needed = request.context_limit as usize - merged.len();
		let lexical = posts::lexical_posts(
			&db.pool,
			&tokens,
			&request.filters,
			&exclude,
			needed as u32,
		)
		.await?;

		merged.extend(lexical);
	}

	let retrieved_count = merged.len();
	let evidence = merged
		.into_iter()
		.take(request.context_limit as usize)
		.map(|row| {
			EvidenceItem::new(
				row.status_id,
				row.url,
				row.author_handle,
				&row.text,
				row.similarity,
			)
		})
		.collect();

	Ok(RetrievalOutcome { evidence, retrieved_count })
}

/// Drops rows below the similarity floor, dedups by status_id keeping the
/// best-ranked occurrence, and truncates to the retrieval limit. Rows arrive
/// ordered best-first from the nearest-neighbor query.
fn select_semantic(rows: Vec<ScoredPost>, min_score: f32, retrieval_limit: usize) -> Vec<ScoredPost> {
	let mut seen = HashSet::new();
	let mut selected = Vec::new();

	for row in rows {
		if selected.len() >= retrieval_limit {
			break;
		}
		if row.similarity.unwrap_or(0.0) < min_score {
			continue;
		}
		if seen.insert(row.status_id.clone()) {
			selected.push(row);
		}
	}

	selected
}
