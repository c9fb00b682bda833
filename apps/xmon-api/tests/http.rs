use axum::{
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::Map;
use tower::util::ServiceExt;

use xmon_api::{routes, state::AppState};
use xmon_config::{
	ChatProviderConfig, Config, Cost, Drafts, EmbeddingProviderConfig, Jobs, Limits, Postgres,
	Providers, Query, Service, Storage, Vector,
};
use xmon_testkit::TestDatabase;

fn test_config(dsn: String) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 1 },
			vector: Vector { dim: 4 },
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/embeddings".to_string(),
				model: "test".to_string(),
				dimensions: 4,
				timeout_ms: 1_000,
				max_attempts: 1,
				default_headers: Map::new(),
			},
			chat: ChatProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/chat/completions".to_string(),
				model: "test".to_string(),
				temperature: 0.1,
				timeout_ms: 1_000,
				total_budget_ms: 2_000,
				retry_timeout_ms: 500,
				max_output_tokens: 400,
				min_retry_output_tokens: 128,
				json_mode: true,
				strip_thinking: false,
				default_headers: Map::new(),
			},
		},
		query: Query {
			retrieval_limit_default: 24,
			retrieval_limit_max: 50,
			context_limit_default: 12,
			context_limit_max: 25,
			candidate_multiplier: 3,
			max_candidate_k: 200,
			min_score: 0.15,
			max_lexical_tokens: 12,
			max_citations: 8,
			max_key_points: 8,
			cost: Cost {
				ceiling_usd: 0.25,
				input_usd_per_1k: 0.000_15,
				output_usd_per_1k: 0.000_6,
			},
			drafts: Drafts { enabled: true, x_post_max_chars: 280, thread_max_chars: 2_200 },
		},
		limits: Limits { requests_per_minute: 30, max_concurrent: 4 },
		jobs: Jobs {
			ttl_seconds: 900,
			poll_after_ms: 1_500,
			max_attempts: 3,
			lease_seconds: 120,
			purge_after_seconds: 86_400,
		},
	}
}

async fn test_env() -> Option<TestDatabase> {
	let base_dsn = match xmon_testkit::env_dsn() {
		Some(value) => value,
		None => {
			eprintln!("Skipping HTTP tests; set XMON_PG_DSN to run this test.");

			return None;
		},
	};

	Some(TestDatabase::new(&base_dsn).await.expect("Failed to create test database."))
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set XMON_PG_DSN to run."]
async fn health_ok() {
	let Some(test_db) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string());
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let response = app
		.oneshot(
			Request::builder()
				.uri("/health")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set XMON_PG_DSN to run."]
async fn empty_task_is_rejected_with_400() {
	let Some(test_db) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string());
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let payload = serde_json::json!({ "task_text": "   " });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/query/compose")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call compose.");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: serde_json::Value = serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(json["error_code"], "validation");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set XMON_PG_DSN to run."]
async fn job_submission_returns_a_queued_ticket_and_polls() {
	let Some(test_db) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string());
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let payload = serde_json::json!({ "task_text": "summarize recent ETF chatter" });
	let response = app
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/query/compose/jobs")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to submit job.");

	assert_eq!(response.status(), StatusCode::OK);

	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let ticket: serde_json::Value =
		serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(ticket["status"], "queued");

	let job_id = ticket["job_id"].as_str().expect("Ticket must carry a job id.");
	let poll = app
		.oneshot(
			Request::builder()
				.uri(format!("/v1/query/compose/jobs/{job_id}"))
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to poll job.");

	assert_eq!(poll.status(), StatusCode::OK);

	let body = body::to_bytes(poll.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let view: serde_json::Value =
		serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(view["status"], "queued");
	assert!(view["poll_after_ms"].as_u64().is_some());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres with pgvector. Set XMON_PG_DSN to run."]
async fn unknown_job_is_404() {
	let Some(test_db) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string());
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let response = app
		.oneshot(
			Request::builder()
				.uri("/v1/query/compose/jobs/00000000-0000-0000-0000-000000000000")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to poll job.");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
