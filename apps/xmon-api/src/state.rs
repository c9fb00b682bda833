use std::sync::Arc;

use xmon_service::QueryService;
use xmon_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<QueryService>,
}
impl AppState {
	pub async fn new(config: xmon_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.vector.dim).await?;

		let service = QueryService::new(config, db);

		Ok(Self { service: Arc::new(service) })
	}
}
