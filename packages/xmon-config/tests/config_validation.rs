use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("xmon_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_mutated(mutate: impl FnOnce(&mut Value)) -> xmon_config::Result<xmon_config::Config> {
	let mut value = sample_value();

	mutate(&mut value);

	let payload = toml::to_string(&value).expect("Failed to render template config.");
	let path = write_temp_config(payload);
	let result = xmon_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn section<'a>(value: &'a mut Value, path: &[&str]) -> &'a mut Value {
	let mut current = value;

	for key in path {
		current = current
			.as_table_mut()
			.and_then(|table| table.get_mut(*key))
			.unwrap_or_else(|| panic!("Template config must include [{key}]."));
	}

	current
}

fn insert(value: &mut Value, path: &[&str], key: &str, entry: Value) {
	section(value, path)
		.as_table_mut()
		.expect("Config section must be a table.")
		.insert(key.to_string(), entry);
}

#[test]
fn template_config_is_valid() {
	let config = load_mutated(|_| ()).expect("Template config must validate.");

	assert_eq!(config.query.retrieval_limit_max, 50);
	assert_eq!(config.jobs.max_attempts, 3);
	assert!(config.providers.chat.json_mode);
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let err = load_mutated(|value| {
		insert(value, &["providers", "embedding"], "dimensions", Value::Integer(768));
	})
	.expect_err("Expected dimension mismatch validation error.");

	assert!(
		err.to_string().contains("providers.embedding.dimensions must match storage.vector.dim."),
		"Unexpected error message: {err}"
	);
}

#[test]
fn chat_total_budget_must_cover_timeout() {
	let err = load_mutated(|value| {
		insert(value, &["providers", "chat"], "total_budget_ms", Value::Integer(5_000));
	})
	.expect_err("Expected budget validation error.");

	assert!(err.to_string().contains("total_budget_ms"), "Unexpected error message: {err}");
}

#[test]
fn context_limit_max_is_clamped_to_retrieval_limit_max() {
	let config = load_mutated(|value| {
		insert(value, &["query"], "retrieval_limit_max", Value::Integer(10));
		insert(value, &["query"], "retrieval_limit_default", Value::Integer(10));
		insert(value, &["query"], "context_limit_max", Value::Integer(40));
		insert(value, &["query"], "context_limit_default", Value::Integer(8));
	})
	.expect("Clamped config must validate.");

	assert_eq!(config.query.context_limit_max, 10);
}

#[test]
fn rate_ceilings_must_be_positive() {
	let err = load_mutated(|value| {
		insert(value, &["limits"], "requests_per_minute", Value::Integer(0));
	})
	.expect_err("Expected rate limit validation error.");

	assert!(
		err.to_string().contains("limits.requests_per_minute must be greater than zero."),
		"Unexpected error message: {err}"
	);
}

#[test]
fn job_ttl_must_be_positive() {
	let err = load_mutated(|value| {
		insert(value, &["jobs"], "ttl_seconds", Value::Integer(0));
	})
	.expect_err("Expected job TTL validation error.");

	assert!(
		err.to_string().contains("jobs.ttl_seconds must be greater than zero."),
		"Unexpected error message: {err}"
	);
}

#[test]
fn api_base_trailing_slash_is_normalized() {
	let config = load_mutated(|value| {
		insert(
			value,
			&["providers", "chat"],
			"api_base",
			Value::String("https://api.openai.com/v1/".to_string()),
		);
	})
	.expect("Normalized config must validate.");

	assert_eq!(config.providers.chat.api_base, "https://api.openai.com/v1");
}
