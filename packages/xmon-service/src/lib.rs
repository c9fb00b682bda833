pub mod compose;
pub mod guardrails;
pub mod jobs;
pub mod limiter;
pub mod parse;
pub mod prompt;
pub mod retrieval;
pub mod time_serde;

mod error;

pub use compose::{
	AnswerStyle, ComposeRequest, ComposeResponse, DraftFormat, NormalizedRequest, RetrievalStats,
	Tier,
};
pub use error::ComposeError;
pub use jobs::{JobError, JobStatusView, JobTicket};
pub use limiter::RateLimiter;

use std::{future::Future, pin::Pin, sync::Arc};

use xmon_config::{ChatProviderConfig, Config, EmbeddingProviderConfig};
use xmon_providers::{
	chat::{ChatCall, ChatReply},
	embedding,
};
use xmon_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, xmon_providers::Result<Vec<Vec<f32>>>>;
}

pub trait ChatProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		call: &'a ChatCall,
	) -> BoxFuture<'a, xmon_providers::Result<ChatReply>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub chat: Arc<dyn ChatProvider>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, xmon_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl ChatProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a ChatProviderConfig,
		call: &'a ChatCall,
	) -> BoxFuture<'a, xmon_providers::Result<ChatReply>> {
		Box::pin(xmon_providers::chat::complete(cfg, call))
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, chat: Arc<dyn ChatProvider>) -> Self {
		Self { embedding, chat }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), chat: provider }
	}
}

pub struct QueryService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub limiter: RateLimiter,
}
impl QueryService {
	pub fn new(cfg: Config, db: Db) -> Self {
		let limiter = RateLimiter::new(&cfg.limits);

		Self { cfg, db, providers: Providers::default(), limiter }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		let limiter = RateLimiter::new(&cfg.limits);

		Self { cfg, db, providers, limiter }
	}
}
