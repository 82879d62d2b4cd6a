use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = usersearch_probe::Args::parse();

	usersearch_probe::run(args).await
}
