mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	ChatProviderConfig, Config, Cost, Drafts, EmbeddingProviderConfig, Jobs, Limits, Postgres,
	Providers, Query, Service, Storage, Vector,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.vector.dim == 0 {
		return Err(Error::Validation {
			message: "storage.vector.dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector.dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector.dim.".to_string(),
		});
	}
	if cfg.providers.embedding.max_attempts == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.chat.total_budget_ms < cfg.providers.chat.timeout_ms {
		return Err(Error::Validation {
			message: "providers.chat.total_budget_ms must cover providers.chat.timeout_ms."
				.to_string(),
		});
	}
	if cfg.providers.chat.max_output_tokens == 0 {
		return Err(Error::Validation {
			message: "providers.chat.max_output_tokens must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("chat", &cfg.providers.chat.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.query.retrieval_limit_max == 0 {
		return Err(Error::Validation {
			message: "query.retrieval_limit_max must be greater than zero.".to_string(),
		});
	}
	if cfg.query.retrieval_limit_default > cfg.query.retrieval_limit_max {
		return Err(Error::Validation {
			message: "query.retrieval_limit_default must not exceed query.retrieval_limit_max."
				.to_string(),
		});
	}
	if cfg.query.context_limit_max == 0 {
		return Err(Error::Validation {
			message: "query.context_limit_max must be greater than zero.".to_string(),
		});
	}
	if cfg.query.context_limit_default > cfg.query.context_limit_max {
		return Err(Error::Validation {
			message: "query.context_limit_default must not exceed query.context_limit_max."
				.to_string(),
		});
	}
	if cfg.query.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "query.candidate_multiplier must be greater than zero.".to_string(),
		});
	}
	if cfg.query.max_candidate_k == 0 {
		return Err(Error::Validation {
			message: "query.max_candidate_k must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.query.min_score) {
		return Err(Error::Validation {
			message: "query.min_score must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.query.max_citations == 0 {
		return Err(Error::Validation {
			message: "query.max_citations must be greater than zero.".to_string(),
		});
	}
	if cfg.query.cost.ceiling_usd <= 0.0 || !cfg.query.cost.ceiling_usd.is_finite() {
		return Err(Error::Validation {
			message: "query.cost.ceiling_usd must be a positive finite number.".to_string(),
		});
	}
	for (label, price) in [
		("query.cost.input_usd_per_1k", cfg.query.cost.input_usd_per_1k),
		("query.cost.output_usd_per_1k", cfg.query.cost.output_usd_per_1k),
	] {
		if price < 0.0 || !price.is_finite() {
			return Err(Error::Validation {
				message: format!("{label} must be a non-negative finite number."),
			});
		}
	}
	if cfg.query.drafts.x_post_max_chars == 0 || cfg.query.drafts.thread_max_chars == 0 {
		return Err(Error::Validation {
			message: "query.drafts character caps must be greater than zero.".to_string(),
		});
	}

	if cfg.limits.requests_per_minute == 0 {
		return Err(Error::Validation {
			message: "limits.requests_per_minute must be greater than zero.".to_string(),
		});
	}
	if cfg.limits.max_concurrent == 0 {
		return Err(Error::Validation {
			message: "limits.max_concurrent must be greater than zero.".to_string(),
		});
	}

	if cfg.jobs.ttl_seconds <= 0 {
		return Err(Error::Validation {
			message: "jobs.ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.jobs.max_attempts <= 0 {
		return Err(Error::Validation {
			message: "jobs.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.jobs.lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "jobs.lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.jobs.purge_after_seconds < 0 {
		return Err(Error::Validation {
			message: "jobs.purge_after_seconds must be zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for base in [&mut cfg.providers.embedding.api_base, &mut cfg.providers.chat.api_base] {
		while base.ends_with('/') {
			base.pop();
		}
	}

	cfg.query.retrieval_limit_max = cfg.query.retrieval_limit_max.max(1);
	cfg.query.context_limit_max =
		cfg.query.context_limit_max.min(cfg.query.retrieval_limit_max).max(1);
}
