use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub query: Query,
	pub limits: Limits,
	pub jobs: Jobs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub vector: Vector,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vector {
	pub dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub chat: ChatProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default = "default_embedding_max_attempts")]
	pub max_attempts: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	/// Wall-clock ceiling covering both attempts of a timed-out call.
	pub total_budget_ms: u64,
	#[serde(default = "default_retry_timeout_ms")]
	pub retry_timeout_ms: u64,
	pub max_output_tokens: u32,
	#[serde(default = "default_min_retry_output_tokens")]
	pub min_retry_output_tokens: u32,
	#[serde(default = "default_json_mode")]
	pub json_mode: bool,
	#[serde(default)]
	pub strip_thinking: bool,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Query {
	#[serde(default = "default_retrieval_limit")]
	pub retrieval_limit_default: u32,
	#[serde(default = "default_retrieval_limit_max")]
	pub retrieval_limit_max: u32,
	#[serde(default = "default_context_limit")]
	pub context_limit_default: u32,
	#[serde(default = "default_context_limit_max")]
	pub context_limit_max: u32,
	#[serde(default = "default_candidate_multiplier")]
	pub candidate_multiplier: u32,
	#[serde(default = "default_max_candidate_k")]
	pub max_candidate_k: u32,
	#[serde(default = "default_min_score")]
	pub min_score: f32,
	#[serde(default = "default_max_lexical_tokens")]
	pub max_lexical_tokens: u32,
	#[serde(default = "default_max_citations")]
	pub max_citations: u32,
	#[serde(default = "default_max_key_points")]
	pub max_key_points: u32,
	pub cost: Cost,
	pub drafts: Drafts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cost {
	pub ceiling_usd: f64,
	pub input_usd_per_1k: f64,
	pub output_usd_per_1k: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Drafts {
	#[serde(default = "default_drafts_enabled")]
	pub enabled: bool,
	#[serde(default = "default_x_post_max_chars")]
	pub x_post_max_chars: u32,
	#[serde(default = "default_thread_max_chars")]
	pub thread_max_chars: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
	pub requests_per_minute: u32,
	pub max_concurrent: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jobs {
	pub ttl_seconds: i64,
	#[serde(default = "default_poll_after_ms")]
	pub poll_after_ms: u64,
	#[serde(default = "default_job_max_attempts")]
	pub max_attempts: i32,
	#[serde(default = "default_lease_seconds")]
	pub lease_seconds: i64,
	#[serde(default = "default_purge_after_seconds")]
	pub purge_after_seconds: i64,
}

fn default_embedding_max_attempts() -> u32 {
	3
}

fn default_retry_timeout_ms() -> u64 {
	8_000
}

fn default_min_retry_output_tokens() -> u32 {
	256
}

fn default_json_mode() -> bool {
	true
}

fn default_retrieval_limit() -> u32 {
	24
}

fn default_retrieval_limit_max() -> u32 {
	50
}

fn default_context_limit() -> u32 {
	12
}

fn default_context_limit_max() -> u32 {
	25
}

fn default_candidate_multiplier() -> u32 {
	3
}

fn default_max_candidate_k() -> u32 {
	200
}

fn default_min_score() -> f32 {
	0.15
}

fn default_max_lexical_tokens() -> u32 {
	12
}

fn default_max_citations() -> u32 {
	8
}

fn default_max_key_points() -> u32 {
	8
}

fn default_drafts_enabled() -> bool {
	true
}

fn default_x_post_max_chars() -> u32 {
	280
}

fn default_thread_max_chars() -> u32 {
	2_200
}

fn default_poll_after_ms() -> u64 {
	1_500
}

fn default_job_max_attempts() -> i32 {
	3
}

fn default_lease_seconds() -> i64 {
	120
}

fn default_purge_after_seconds() -> i64 {
	86_400
}
