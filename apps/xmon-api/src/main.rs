use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = xmon_api::Args::parse();
	xmon_api::run(args).await
}
