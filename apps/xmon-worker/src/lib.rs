pub mod worker;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use xmon_service::QueryService;
use xmon_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = xmon_cli::VERSION,
	rename_all = "kebab",
	styles = xmon_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = xmon_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.vector.dim).await?;

	let service = QueryService::new(config, db);

	worker::run_worker(service).await
}
