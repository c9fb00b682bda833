use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;

use crate::{Result, models::ScoredPost};

/// Metadata filters pushed down into both retrieval queries.
#[derive(Debug, Clone, Default)]
pub struct PostFilters {
	pub since: Option<OffsetDateTime>,
	pub until: Option<OffsetDateTime>,
	/// `None` means every tier.
	pub tier: Option<String>,
	pub handles: Vec<String>,
	pub significant_only: bool,
}

pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

/// Top-K posts by cosine similarity against the stored embeddings.
pub async fn nearest_posts(
	pool: &PgPool,
	query_vec: &[f32],
	filters: &PostFilters,
	limit: u32,
) -> Result<Vec<ScoredPost>> {
	let vec_text = vector_to_pg(query_vec);
	let mut builder = QueryBuilder::new(
		"\
SELECT
	p.status_id,
	p.author_handle,
	p.text,
	p.url,
	p.created_at,
	(1 - (e.vec <=> ",
	);

	builder.push_bind(vec_text.clone());
	builder.push(
		"::text::vector))::real AS similarity
FROM post_embeddings e
JOIN posts p ON p.status_id = e.status_id
WHERE TRUE",
	);
	push_filters(&mut builder, filters);
	builder.push(" ORDER BY e.vec <=> ");
	builder.push_bind(vec_text);
	builder.push("::text::vector ASC LIMIT ");
	builder.push_bind(limit as i64);

	let rows = builder.build_query_as::<ScoredPost>().fetch_all(pool).await?;

	Ok(rows)
}

/// Recency-ordered lexical fallback: OR-matches whole-word tokens against the
/// post body and author handle, excluding ids already selected semantically.
pub async fn lexical_posts(
	pool: &PgPool,
	tokens: &[String],
	filters: &PostFilters,
	exclude_ids: &[String],
	limit: u32,
) -> Result<Vec<ScoredPost>> {
	if tokens.is_empty() || limit == 0 {
		return Ok(Vec::new());
	}

	let mut builder = QueryBuilder::new(
		"\
SELECT
	p.status_id,
	p.author_handle,
	p.text,
	p.url,
	p.created_at,
	NULL::real AS similarity
FROM posts p
WHERE TRUE",
	);

	push_filters(&mut builder, filters);

	builder.push(" AND (");

	for (index, token) in tokens.iter().enumerate() {
		let pattern = format!("%{token}%");

		if index > 0 {
			builder.push(" OR ");
		}

		builder.push("p.text ILIKE ");
		builder.push_bind(pattern.clone());
		builder.push(" OR p.author_handle ILIKE ");
		builder.push_bind(pattern);
	}

	builder.push(")");

	if !exclude_ids.is_empty() {
		builder.push(" AND NOT (p.status_id = ANY(");
		builder.push_bind(exclude_ids.to_vec());
		builder.push("))");
	}

	builder.push(" ORDER BY p.created_at DESC LIMIT ");
	builder.push_bind(limit as i64);

	let rows = builder.build_query_as::<ScoredPost>().fetch_all(pool).await?;

	Ok(rows)
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filters: &PostFilters) {
	if let Some(since) = filters.since {
		builder.push(" AND p.created_at >= ");
		builder.push_bind(since);
	}
	if let Some(until) = filters.until {
		builder.push(" AND p.created_at <= ");
		builder.push_bind(until);
	}
	if let Some(tier) = filters.tier.as_ref() {
		builder.push(" AND p.tier = ");
		builder.push_bind(tier.clone());
	}
	if !filters.handles.is_empty() {
		builder.push(" AND p.author_handle = ANY(");
		builder.push_bind(filters.handles.clone());
		builder.push(")");
	}
	if filters.significant_only {
		builder.push(" AND p.significant");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_text_is_bracketed_and_comma_separated() {
		assert_eq!(vector_to_pg(&[0.25, -1.0, 2.0]), "[0.25,-1,2]");
	}

	#[test]
	fn empty_vector_renders_empty_brackets() {
		assert_eq!(vector_to_pg(&[]), "[]");
	}
}
