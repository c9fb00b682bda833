use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Fraction of the configured output budget granted to the reduced retry,
/// floor-bounded by `min_retry_output_tokens`.
const RETRY_TOKEN_NUMERATOR: u64 = 2;
const RETRY_TOKEN_DENOMINATOR: u64 = 5;

#[derive(Debug, Clone)]
pub struct ChatCall {
	pub system_prompt: String,
	pub user_prompt: String,
}

/// One step of the capped timeout-retry state machine: a full-budget attempt
/// followed by a single reduced-budget attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
	pub timeout_ms: u64,
	pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
	pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
	pub text: String,
	pub usage: Option<TokenUsage>,
	pub json_mode: bool,
	pub attempts: u32,
}

enum AttemptOutcome {
	Reply(Value),
	TimedOut,
	ModeUnsupported,
}

pub fn attempt_plan(cfg: &xmon_config::ChatProviderConfig) -> [Attempt; 2] {
	let reduced_tokens = (cfg.max_output_tokens as u64 * RETRY_TOKEN_NUMERATOR
		/ RETRY_TOKEN_DENOMINATOR) as u32;
	let reduced_tokens =
		reduced_tokens.max(cfg.min_retry_output_tokens).min(cfg.max_output_tokens);

	[
		Attempt { timeout_ms: cfg.timeout_ms, max_tokens: cfg.max_output_tokens },
		Attempt {
			timeout_ms: cfg.retry_timeout_ms.min(cfg.timeout_ms),
			max_tokens: reduced_tokens,
		},
	]
}

pub async fn complete(cfg: &xmon_config::ChatProviderConfig, call: &ChatCall) -> Result<ChatReply> {
	let client = Client::new();
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let started = Instant::now();
	let total_budget = Duration::from_millis(cfg.total_budget_ms);
	let plan = attempt_plan(cfg);
	let mut json_mode = cfg.json_mode;
	let mut attempts = 0_u32;

	for step in plan {
		loop {
			let elapsed = started.elapsed();

			if elapsed >= total_budget {
				return Err(Error::Timeout { attempts, budget_ms: cfg.total_budget_ms });
			}

			let timeout = Duration::from_millis(step.timeout_ms).min(total_budget - elapsed);
			let body = request_body(cfg, call, step.max_tokens, json_mode);

			attempts += 1;

			match send_once(&client, &url, headers.clone(), &body, timeout, json_mode).await? {
				AttemptOutcome::Reply(json) => {
					let text = extract_reply_text(&json)?;
					let text = if cfg.strip_thinking { strip_thinking(&text) } else { text };

					return Ok(ChatReply {
						text,
						usage: parse_usage(&json),
						json_mode,
						attempts,
					});
				},
				AttemptOutcome::ModeUnsupported => {
					// Does not consume the timeout retry; resend unstructured.
					json_mode = false;
				},
				AttemptOutcome::TimedOut => break,
			}
		}
	}

	Err(Error::Timeout { attempts, budget_ms: cfg.total_budget_ms })
}

fn request_body(
	cfg: &xmon_config::ChatProviderConfig,
	call: &ChatCall,
	max_tokens: u32,
	json_mode: bool,
) -> Value {
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": max_tokens,
		"messages": [
			{ "role": "system", "content": call.system_prompt },
			{ "role": "user", "content": call.user_prompt },
		],
	});

	if json_mode {
		body["response_format"] = serde_json::json!({ "type": "json_object" });
	}
	if cfg.strip_thinking {
		body["reasoning"] = serde_json::json!({ "enabled": false });
	}

	body
}

async fn send_once(
	client: &Client,
	url: &str,
	headers: reqwest::header::HeaderMap,
	body: &Value,
	timeout: Duration,
	json_mode: bool,
) -> Result<AttemptOutcome> {
	let res = client.post(url).headers(headers).timeout(timeout).json(body).send().await;
	let res = match res {
		Ok(res) => res,
		Err(err) if err.is_timeout() => return Ok(AttemptOutcome::TimedOut),
		Err(err) => return Err(err.into()),
	};
	let status = res.status();

	if status.is_success() {
		return Ok(AttemptOutcome::Reply(res.json().await?));
	}
	if matches!(status.as_u16(), 408 | 504) {
		return Ok(AttemptOutcome::TimedOut);
	}

	let body = res.text().await.unwrap_or_default();

	if json_mode && matches!(status.as_u16(), 400 | 422) && mentions_json_mode(&body) {
		return Ok(AttemptOutcome::ModeUnsupported);
	}

	Err(Error::UpstreamStatus { status: status.as_u16(), body: truncate_body(&body) })
}

fn mentions_json_mode(body: &str) -> bool {
	let lowered = body.to_lowercase();

	lowered.contains("response_format") || lowered.contains("json_object")
}

fn extract_reply_text(json: &Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat response is missing message content.".to_string(),
		})?;

	if let Some(text) = content.as_str() {
		return Ok(text.to_string());
	}

	if let Some(blocks) = content.as_array() {
		let mut out = String::new();

		for block in blocks {
			if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
				out.push_str(text);
			}
		}

		if !out.is_empty() {
			return Ok(out);
		}
	}

	Err(Error::InvalidResponse { message: "Chat content has an unsupported shape.".to_string() })
}

fn parse_usage(json: &Value) -> Option<TokenUsage> {
	let usage = json.get("usage")?;
	let prompt_tokens = usage.get("prompt_tokens").and_then(|v| v.as_u64())?;
	let completion_tokens = usage.get("completion_tokens").and_then(|v| v.as_u64())?;
	let total_tokens = usage
		.get("total_tokens")
		.and_then(|v| v.as_u64())
		.unwrap_or(prompt_tokens + completion_tokens);

	Some(TokenUsage { prompt_tokens, completion_tokens, total_tokens })
}

/// Informational only; the pre-spend gate is the projected cost upstream.
pub fn estimate_cost(usage: &TokenUsage, input_usd_per_1k: f64, output_usd_per_1k: f64) -> f64 {
	usage.prompt_tokens as f64 / 1_000.0 * input_usd_per_1k
		+ usage.completion_tokens as f64 / 1_000.0 * output_usd_per_1k
}

fn strip_thinking(text: &str) -> String {
	let trimmed = text.trim_start();

	if let Some(rest) = trimmed.strip_prefix("<think>")
		&& let Some(end) = rest.find("</think>")
	{
		return rest[end + "</think>".len()..].trim_start().to_string();
	}

	text.to_string()
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
