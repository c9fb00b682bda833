use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredPost {
	pub status_id: String,
	pub author_handle: String,
	pub text: String,
	pub url: String,
	pub created_at: OffsetDateTime,
	/// Cosine similarity in [0, 1] for semantic rows; NULL for lexical rows.
	pub similarity: Option<f32>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ComposeJobRow {
	pub job_id: Uuid,
	pub status: String,
	pub request: Value,
	pub result: Option<Value>,
	pub error_code: Option<String>,
	pub error_message: Option<String>,
	pub attempts: i32,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub started_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
	pub expires_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
