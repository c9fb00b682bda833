use serde::{Deserialize, Serialize};

pub const MAX_EXCERPT_CHARS: usize = 220;
pub const EMPTY_EXCERPT_PLACEHOLDER: &str = "(no text)";

/// A retrieved post shaped for grounding and citation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
	pub status_id: String,
	pub url: String,
	pub author_handle: String,
	pub excerpt: String,
	pub score: Option<f32>,
}

impl EvidenceItem {
	pub fn new(
		status_id: impl Into<String>,
		url: impl Into<String>,
		author_handle: impl Into<String>,
		body: &str,
		score: Option<f32>,
	) -> Self {
		Self {
			status_id: status_id.into(),
			url: url.into(),
			author_handle: author_handle.into(),
			excerpt: shape_excerpt(body),
			score: score.map(|value| value.clamp(0.0, 1.0)),
		}
	}
}

/// Collapses runs of whitespace to single spaces and caps the result at
/// [`MAX_EXCERPT_CHARS`] characters.
pub fn shape_excerpt(body: &str) -> String {
	let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");

	if collapsed.is_empty() {
		return EMPTY_EXCERPT_PLACEHOLDER.to_string();
	}

	if collapsed.chars().count() <= MAX_EXCERPT_CHARS {
		return collapsed;
	}

	let mut out: String = collapsed.chars().take(MAX_EXCERPT_CHARS - 3).collect();

	out.push_str("...");

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collapses_internal_whitespace() {
		assert_eq!(shape_excerpt("a\n\n b\t c"), "a b c");
	}

	#[test]
	fn empty_body_gets_placeholder() {
		assert_eq!(shape_excerpt("   \n "), EMPTY_EXCERPT_PLACEHOLDER);
	}

	#[test]
	fn long_body_is_capped_with_ellipsis() {
		let body = "word ".repeat(100);
		let excerpt = shape_excerpt(&body);

		assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS);
		assert!(excerpt.ends_with("..."));
	}

	#[test]
	fn score_is_clamped_to_unit_interval() {
		let item = EvidenceItem::new("1", "https://x.com/a/status/1", "a", "text", Some(1.7));

		assert_eq!(item.score, Some(1.0));
	}
}
