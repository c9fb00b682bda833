use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = xmon_worker::Args::parse();
	xmon_worker::run(args).await
}
