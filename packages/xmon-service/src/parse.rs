//! Defensive parsing of model replies. Three tiers, first match wins:
//! strict JSON, tolerant key scanning for truncated streams, then plain
//! text. Each tier is a pure function so the heuristics test independently.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplyFields {
	pub answer_text: String,
	pub draft_text: Option<String>,
	pub key_points: Vec<String>,
	pub citation_status_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
	Strict(ReplyFields),
	Recovered(ReplyFields),
	PlainText(String),
	Unparseable,
}

pub fn parse_reply(raw: &str) -> ParsedReply {
	if let Some(fields) = strict_parse(raw) {
		return ParsedReply::Strict(fields);
	}
	if let Some(fields) = scan_recover(raw) {
		return ParsedReply::Recovered(fields);
	}
	if let Some(text) = plain_text(raw) {
		return ParsedReply::PlainText(text);
	}

	ParsedReply::Unparseable
}

/// Tier 1: locate a balanced JSON object (fences and surrounding prose are
/// ignored), parse it, and require a usable non-empty `answer_text`.
fn strict_parse(raw: &str) -> Option<ReplyFields> {
	let candidate = extract_balanced_object(raw)?;
	let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
	let object = value.as_object()?;
	let answer_text = object.get("answer_text")?.as_str()?.trim().to_string();

	if answer_text.is_empty() || is_unterminated_fragment(&answer_text) {
		return None;
	}

	let draft_text = object
		.get("draft_text")
		.and_then(|v| v.as_str())
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.map(str::to_string);
	let key_points = string_array(object.get("key_points"));
	let citation_status_ids = string_array(object.get("citation_status_ids"));

	Some(ReplyFields { answer_text, draft_text, key_points, citation_status_ids })
}

/// Tier 2: the reply mentions `"answer_text"` but did not parse (typically a
/// truncated stream). Extract the fields by quote/escape-aware scanning.
fn scan_recover(raw: &str) -> Option<ReplyFields> {
	if !raw.contains("\"answer_text\"") {
		return None;
	}

	let (mut answer_text, terminated) = scan_string_field(raw, "answer_text")?;

	if answer_text.trim().is_empty() || is_unterminated_fragment(&answer_text) {
		return None;
	}
	if !terminated {
		answer_text.push_str("...");
	}

	let draft_text = scan_string_field(raw, "draft_text").and_then(|(mut text, terminated)| {
		if text.trim().is_empty() {
			return None;
		}
		if !terminated {
			text.push_str("...");
		}

		Some(text)
	});

	Some(ReplyFields {
		answer_text,
		draft_text,
		key_points: scan_string_array(raw, "key_points"),
		citation_status_ids: scan_string_array(raw, "citation_status_ids"),
	})
}

/// Tier 3: the whole reply as the answer, unless it is a bare malformed
/// JSON prefix or contains nothing readable.
fn plain_text(raw: &str) -> Option<String> {
	let trimmed = raw.trim();

	if trimmed.is_empty() || !trimmed.chars().any(char::is_alphanumeric) {
		return None;
	}
	if trimmed.starts_with('{') || trimmed.starts_with("```") {
		return None;
	}

	Some(trimmed.to_string())
}

/// Finds the first balanced `{...}` object, respecting strings and escapes.
fn extract_balanced_object(raw: &str) -> Option<&str> {
	let start = raw.find('{')?;
	let bytes = raw.as_bytes();
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escaped = false;

	for (offset, byte) in bytes[start..].iter().enumerate() {
		if escaped {
			escaped = false;

			continue;
		}

		match byte {
			b'\\' if in_string => escaped = true,
			b'"' => in_string = !in_string,
			b'{' if !in_string => depth += 1,
			b'}' if !in_string => {
				depth -= 1;

				if depth == 0 {
					return Some(&raw[start..=start + offset]);
				}
			},
			_ => {},
		}
	}

	None
}

/// True when text that was supposed to be prose is itself the beginning of a
/// structured value that never closed.
fn is_unterminated_fragment(text: &str) -> bool {
	let trimmed = text.trim();
	let Some(first) = trimmed.chars().next() else {
		return false;
	};

	if first != '{' && first != '[' {
		return false;
	}

	let mut depth = 0_i64;
	let mut in_string = false;
	let mut escaped = false;

	for byte in trimmed.bytes() {
		if escaped {
			escaped = false;

			continue;
		}

		match byte {
			b'\\' if in_string => escaped = true,
			b'"' => in_string = !in_string,
			b'{' | b'[' if !in_string => depth += 1,
			b'}' | b']' if !in_string => depth -= 1,
			_ => {},
		}
	}

	depth != 0 || in_string
}

/// Scans `"key": "value"` out of possibly-truncated JSON text. Returns the
/// decoded value and whether the closing quote was present.
fn scan_string_field(raw: &str, key: &str) -> Option<(String, bool)> {
	let needle = format!("\"{key}\"");
	let key_at = raw.find(&needle)?;
	let rest = &raw[key_at + needle.len()..];
	let colon = rest.find(':')?;
	let mut chars = rest[colon + 1..].chars().peekable();

	while matches!(chars.peek(), Some(ch) if ch.is_whitespace()) {
		chars.next();
	}

	if chars.next() != Some('"') {
		return None;
	}

	let mut out = String::new();

	while let Some(ch) = chars.next() {
		match ch {
			'"' => return Some((out, true)),
			'\\' => match chars.next() {
				Some('n') => out.push('\n'),
				Some('t') => out.push('\t'),
				Some('r') => out.push('\r'),
				Some('"') => out.push('"'),
				Some('\\') => out.push('\\'),
				Some('/') => out.push('/'),
				Some('u') => {
					let mut code = String::new();

					for _ in 0..4 {
						match chars.next() {
							Some(hex) => code.push(hex),
							// A truncated escape ends the scan.
							None => return Some((out, false)),
						}
					}

					if let Some(decoded) =
						u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
					{
						out.push(decoded);
					}
				},
				Some(other) => out.push(other),
				None => return Some((out, false)),
			},
			_ => out.push(ch),
		}
	}

	Some((out, false))
}

/// Scans a `"key": [...]` array of strings, keeping only elements whose
/// closing quote survived the truncation.
fn scan_string_array(raw: &str, key: &str) -> Vec<String> {
	let needle = format!("\"{key}\"");
	let Some(key_at) = raw.find(&needle) else {
		return Vec::new();
	};
	let rest = &raw[key_at + needle.len()..];
	let Some(colon) = rest.find(':') else {
		return Vec::new();
	};
	let mut chars = rest[colon + 1..].chars().peekable();

	while matches!(chars.peek(), Some(ch) if ch.is_whitespace()) {
		chars.next();
	}

	if chars.next() != Some('[') {
		return Vec::new();
	}

	let mut out = Vec::new();
	let mut current = String::new();
	let mut in_string = false;
	let mut escaped = false;

	for ch in chars {
		if escaped {
			current.push(ch);

			escaped = false;

			continue;
		}

		match ch {
			'\\' if in_string => escaped = true,
			'"' if in_string => {
				in_string = false;

				if !current.trim().is_empty() {
					out.push(current.clone());
				}

				current.clear();
			},
			'"' => in_string = true,
			']' if !in_string => return out,
			_ if in_string => current.push(ch),
			_ => {},
		}
	}

	out
}

fn string_array(value: Option<&serde_json::Value>) -> Vec<String> {
	value
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| match item {
					serde_json::Value::String(text) if !text.trim().is_empty() => {
						Some(text.clone())
					},
					serde_json::Value::Number(number) => Some(number.to_string()),
					_ => None,
				})
				.collect()
		})
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strict_parses_well_formed_reply() {
		let raw = r#"{"answer_text":"X","citation_status_ids":["a"]}"#;
		let ParsedReply::Strict(fields) = parse_reply(raw) else {
			panic!("Expected strict parse.");
		};

		assert_eq!(fields.answer_text, "X");
		assert_eq!(fields.citation_status_ids, vec!["a"]);
	}

	#[test]
	fn strict_tolerates_code_fences_and_prose() {
		let raw = "Here you go:\n```json\n{\"answer_text\": \"Fine.\", \"key_points\": [\"one\"]}\n```";
		let ParsedReply::Strict(fields) = parse_reply(raw) else {
			panic!("Expected strict parse.");
		};

		assert_eq!(fields.answer_text, "Fine.");
		assert_eq!(fields.key_points, vec!["one"]);
	}

	#[test]
	fn strict_rejects_empty_answer() {
		let raw = r#"{"answer_text": "   "}"#;

		assert_eq!(parse_reply(raw), ParsedReply::Unparseable);
	}

	#[test]
	fn strict_rejects_unterminated_nested_fragment() {
		let raw = r#"{"answer_text": "{\"inner\": \"never closed"}"#;
		let parsed = parse_reply(raw);

		assert!(
			!matches!(parsed, ParsedReply::Strict(_)),
			"Fragment answers must not pass the strict tier: {parsed:?}"
		);
	}

	#[test]
	fn truncated_reply_recovers_with_ellipsis() {
		let raw = r#"{"answer_text": "Hello wor"#;
		let ParsedReply::Recovered(fields) = parse_reply(raw) else {
			panic!("Expected tier-2 recovery.");
		};

		assert_eq!(fields.answer_text, "Hello wor...");
	}

	#[test]
	fn truncated_reply_keeps_complete_citations() {
		let raw = r#"{"answer_text": "Done.", "citation_status_ids": ["1", "2"], "key_points": ["first", "sec"#;
		let ParsedReply::Recovered(fields) = parse_reply(raw) else {
			panic!("Expected tier-2 recovery.");
		};

		assert_eq!(fields.answer_text, "Done.");
		assert_eq!(fields.citation_status_ids, vec!["1", "2"]);
		// The truncated trailing element is kept only through its last
		// complete quote pair; scanning never invents a closing quote.
		assert_eq!(fields.key_points.first().map(String::as_str), Some("first"));
	}

	#[test]
	fn recovery_decodes_json_escapes() {
		let raw = r#"{"answer_text": "Line one\nLine \"two\" and more"#;
		let ParsedReply::Recovered(fields) = parse_reply(raw) else {
			panic!("Expected tier-2 recovery.");
		};

		assert_eq!(fields.answer_text, "Line one\nLine \"two\" and more...");
	}

	#[test]
	fn prose_reply_falls_through_to_plain_text() {
		let raw = "The accounts posted nothing relevant this week.";

		assert_eq!(parse_reply(raw), ParsedReply::PlainText(raw.to_string()));
	}

	#[test]
	fn bare_json_prefix_is_unparseable() {
		assert_eq!(parse_reply(r#"{"wrong_key": "#), ParsedReply::Unparseable);
		assert_eq!(parse_reply("   "), ParsedReply::Unparseable);
		assert_eq!(parse_reply("!!!"), ParsedReply::Unparseable);
	}

	#[test]
	fn balanced_object_extraction_respects_strings() {
		let raw = r#"noise {"a": "}", "b": 1} tail"#;

		assert_eq!(extract_balanced_object(raw), Some(r#"{"a": "}", "b": 1}"#));
	}

	#[test]
	fn unterminated_fragment_detection() {
		assert!(is_unterminated_fragment("{\"open\": 1"));
		assert!(is_unterminated_fragment("[1, 2"));
		assert!(!is_unterminated_fragment("{\"closed\": 1}"));
		assert!(!is_unterminated_fragment("plain words"));
	}
}
