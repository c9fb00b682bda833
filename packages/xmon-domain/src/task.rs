use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

const MIN_TOKEN_CHARS: usize = 3;

fn word_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();

	PATTERN.get_or_init(|| Regex::new(r"[A-Za-z0-9]+").expect("Word pattern must compile."))
}

/// Extracts whole-word lexical tokens from a task description for the
/// fallback text search: lowercase, at least [`MIN_TOKEN_CHARS`] characters,
/// deduplicated in first-seen order, capped at `max_tokens`.
pub fn lexical_tokens(task: &str, max_tokens: usize) -> Vec<String> {
	if max_tokens == 0 {
		return Vec::new();
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for found in word_pattern().find_iter(task) {
		let token = found.as_str().to_lowercase();

		if token.chars().count() < MIN_TOKEN_CHARS {
			continue;
		}
		if seen.insert(token.clone()) {
			out.push(token);
		}
		if out.len() >= max_tokens {
			break;
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_lowercased_whole_words() {
		assert_eq!(
			lexical_tokens("What did SEC say about ETF approval?", 8),
			vec!["what", "did", "sec", "say", "about", "etf", "approval"]
		);
	}

	#[test]
	fn drops_short_tokens() {
		assert_eq!(lexical_tokens("is AI ok today", 8), vec!["today"]);
	}

	#[test]
	fn caps_token_count() {
		assert_eq!(lexical_tokens("alpha beta gamma delta", 2), vec!["alpha", "beta"]);
	}

	#[test]
	fn dedups_repeated_words() {
		assert_eq!(lexical_tokens("risk Risk RISK report", 8), vec!["risk", "report"]);
	}
}
