use xmon_domain::{draft, evidence, handle, task};

#[test]
fn evidence_item_serializes_with_flat_fields() {
	let item = evidence::EvidenceItem::new(
		"1951234567890",
		"https://x.com/sec_news/status/1951234567890",
		"sec_news",
		"The  commission\nannounced new guidance.",
		Some(0.82),
	);
	let json = serde_json::to_value(&item).expect("Evidence must serialize.");

	assert_eq!(json["status_id"], "1951234567890");
	assert_eq!(json["excerpt"], "The commission announced new guidance.");
	assert!(json["score"].as_f64().expect("Score must be present.") > 0.8);
}

#[test]
fn handle_filter_and_lexical_tokens_compose() {
	let handles = handle::normalize_handles("@SEC_News, @GaryGensler");
	let tokens = task::lexical_tokens("What did @sec_news post about enforcement?", 8);

	assert_eq!(handles, vec!["sec_news", "garygensler"]);
	assert!(tokens.contains(&"enforcement".to_string()));
	assert!(tokens.contains(&"sec".to_string()));
}

#[test]
fn draft_truncation_respects_word_boundaries() {
	let draft_text = format!("First sentence ends here. {}", "pad ".repeat(100));
	let cut = draft::truncate_draft(&draft_text, 280);

	assert!(cut.chars().count() <= 280);
	assert!(!cut.ends_with("pa"), "Truncation must not split mid-word: {cut:?}");
}
