/// Truncates a draft to `max_chars` characters without splitting mid-word
/// when avoidable: prefer ending at the last sentence boundary inside the
/// back 40 % of the cap, then the last whitespace inside the back 20 %, then
/// a hard cut.
pub fn truncate_draft(text: &str, max_chars: usize) -> String {
	let chars: Vec<char> = text.chars().collect();

	if chars.len() <= max_chars {
		return text.to_string();
	}
	if max_chars == 0 {
		return String::new();
	}

	let window = &chars[..max_chars];
	let sentence_floor = max_chars.saturating_sub(max_chars * 2 / 5);

	for index in (sentence_floor..max_chars).rev() {
		if matches!(window[index], '.' | '!' | '?') {
			return window[..=index].iter().collect();
		}
	}

	let whitespace_floor = max_chars.saturating_sub(max_chars / 5);

	for index in (whitespace_floor..max_chars).rev() {
		if window[index].is_whitespace() {
			return window[..index].iter().collect::<String>().trim_end().to_string();
		}
	}

	window.iter().collect()
}
