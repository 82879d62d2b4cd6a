use std::{
	fs,
	future::{self, Future},
	io::{self, Write},
	path::{Path, PathBuf},
	time::Duration,
};

use clap::{Parser, ValueEnum};
use color_eyre::eyre::WrapErr;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use usersearch_config::Config;
use usersearch_domain::User;
use usersearch_service::{SearchQuery, SearchStrategy, Searcher};
use usersearch_storage::memory::MemoryRemote;

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON tree loaded into the in-memory remote.
	#[arg(long, value_name = "FILE")]
	pub snapshot: PathBuf,
	/// Entity ID searching on whose behalf.
	#[arg(long, value_name = "ID")]
	pub viewer: String,
	#[arg(long, value_enum, default_value_t = Strategy::Lookup)]
	pub strategy: Strategy,
	/// How long a live search keeps following before it is cancelled.
	#[arg(long, value_name = "MS", default_value_t = 1_000)]
	pub follow_ms: u64,
	/// Index name, or the metadata attribute for live searches.
	pub index: String,
	pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
	Lookup,
	Live,
}
impl From<Strategy> for SearchStrategy {
	fn from(strategy: Strategy) -> Self {
		match strategy {
			Strategy::Lookup => Self::IndexLookup,
			Strategy::Live => Self::LiveAttribute,
		}
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = usersearch_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

	let remote = load_remote(&args.snapshot)?;
	let interrupted = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::warn!(error = %err, "Failed to listen for Ctrl-C.");

			future::pending::<()>().await;
		}
	};
	let mut stdout = io::stdout().lock();

	probe(&config, remote, &args, &mut stdout, interrupted).await?;

	Ok(())
}

pub fn load_remote(path: &Path) -> color_eyre::Result<MemoryRemote> {
	let raw = fs::read_to_string(path)
		.wrap_err_with(|| format!("Failed to read snapshot at {}.", path.display()))?;
	let remote = MemoryRemote::from_json_str(&raw)
		.wrap_err_with(|| format!("Failed to parse snapshot at {}.", path.display()))?;

	tracing::info!(path = %path.display(), "Loaded remote snapshot.");

	Ok(remote)
}

/// Runs one search and writes every match to `out` as a JSON line.
///
/// Live searches stop after `--follow-ms` or when `interrupted` resolves. Returns the number of
/// matches written, or the terminal search error.
pub async fn probe<W, F>(
	config: &Config,
	remote: MemoryRemote,
	args: &Args,
	out: &mut W,
	interrupted: F,
) -> color_eyre::Result<usize>
where
	W: Write,
	F: Future<Output = ()>,
{
	let searcher = Searcher::in_memory(config.clone(), remote);
	let strategy = SearchStrategy::from(args.strategy);
	let viewer = User::new(args.viewer.as_str());
	let query = SearchQuery::new(args.index.as_str(), args.value.as_str());
	let mut stream = searcher.search(strategy, &viewer, query);
	let follow = async {
		match args.strategy {
			Strategy::Live => tokio::time::sleep(Duration::from_millis(args.follow_ms)).await,
			Strategy::Lookup => future::pending::<()>().await,
		}
	};
	let mut matches = 0;

	tokio::pin!(follow, interrupted);

	let outcome = loop {
		let item = tokio::select! {
			biased;

			_ = &mut interrupted => break Ok(()),
			_ = &mut follow => break Ok(()),
			item = stream.next() => item,
		};

		match item {
			Some(Ok(user)) => {
				writeln!(out, "{}", serde_json::to_string(&user)?)?;

				matches += 1;
			},
			Some(Err(err)) => break Err(err),
			None => break Ok(()),
		}
	};
	let termination = stream.shutdown().await;

	tracing::info!(
		strategy = strategy.as_str(),
		matches,
		termination = termination.map(|termination| termination.as_str()).unwrap_or("rejected"),
		"Search finished."
	);

	match outcome {
		Ok(()) => Ok(matches),
		Err(err) => Err(err.into()),
	}
}
