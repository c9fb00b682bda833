use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4_000;

pub async fn embed(
	cfg: &xmon_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let mut last_err = None;

	for attempt in 1..=cfg.max_attempts {
		let result = send_once(&client, &url, cfg, &body).await;

		match result {
			Ok(json) => return parse_embedding_response(json),
			Err(err) if is_transient(&err) && attempt < cfg.max_attempts => {
				tokio::time::sleep(backoff_for_attempt(attempt)).await;

				last_err = Some(err);
			},
			Err(err) => return Err(err),
		}
	}

	Err(last_err.unwrap_or(Error::InvalidResponse {
		message: "Embedding provider returned no response.".to_string(),
	}))
}

async fn send_once(
	client: &Client,
	url: &str,
	cfg: &xmon_config::EmbeddingProviderConfig,
	body: &Value,
) -> Result<Value> {
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(body)
		.send()
		.await?;
	let status = res.status();

	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();

		return Err(Error::UpstreamStatus {
			status: status.as_u16(),
			body: truncate_body(&body),
		});
	}

	Ok(res.json().await?)
}

fn is_transient(err: &Error) -> bool {
	match err {
		Error::Reqwest(inner) => inner.is_timeout() || inner.is_connect(),
		Error::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
		_ => false,
	}
}

fn backoff_for_attempt(attempt: u32) -> Duration {
	let exp = attempt.saturating_sub(1).min(4);
	let millis = BASE_BACKOFF_MS.saturating_mul(1 << exp).min(MAX_BACKOFF_MS);

	Duration::from_millis(millis)
}

fn truncate_body(body: &str) -> String {
	const MAX_BODY_CHARS: usize = 512;

	if body.chars().count() <= MAX_BODY_CHARS {
		return body.to_string();
	}

	let mut out: String = body.chars().take(MAX_BODY_CHARS).collect();

	out.push_str("...");

	out
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;

	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
