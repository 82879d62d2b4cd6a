mod error;

pub use error::{Error, Result};

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use serde_json::Value;
use tokio::time;
use uuid::Uuid;

use usersearch_config::{Config, Remote, Search, Service};
use usersearch_domain::{User, normalize};
use usersearch_service::{SearchStream, Searcher};
use usersearch_storage::{cache::UserCache, memory::MemoryRemote, query};

pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Search items in arrival order, terminal errors included.
pub type Items = Vec<usersearch_service::Result<User>>;

/// A searcher wired to an in-process tree it shares with the test.
pub struct TestBackend {
	pub cfg: Config,
	pub remote: MemoryRemote,
	pub cache: UserCache,
	pub searcher: Searcher,
}
impl TestBackend {
	pub fn new() -> Self {
		Self::with_config(test_config())
	}

	pub fn with_config(cfg: Config) -> Self {
		Self::with_remote(cfg, MemoryRemote::new())
	}

	/// Wires a searcher to an existing tree, such as one built with [`MemoryRemote::from_value`].
	pub fn with_remote(cfg: Config, remote: MemoryRemote) -> Self {
		let cache = UserCache::new(remote.clone(), &cfg.remote);
		let searcher =
			Searcher::new(cfg.clone(), Arc::new(remote.clone()), Arc::new(cache.clone()));

		Self { cfg, remote, cache, searcher }
	}

	/// Writes a user with a display name and indexes it under `name`.
	pub fn seed_user(&self, entity_id: &str, name: &str) -> Result<User> {
		self.seed_meta(entity_id, "name", name)?;
		self.seed_index(entity_id, "name", &normalize(name))?;

		Ok(User::new(entity_id).with_meta("name", name))
	}

	/// Writes one metadata attribute without touching the index.
	pub fn seed_meta(&self, entity_id: &str, key: &str, value: &str) -> Result<()> {
		let meta = query::join(&self.cfg.remote.meta_key, key);
		let path = query::join(&self.user_path(entity_id), &meta);

		self.remote.set(&path, Value::String(value.to_string()))?;

		Ok(())
	}

	/// Writes a raw index entry. The value is stored as given.
	pub fn seed_index(&self, entity_id: &str, index: &str, value: &str) -> Result<()> {
		let path = query::join(&query::join(&self.cfg.remote.index_path, entity_id), index);

		self.remote.set(&path, Value::String(value.to_string()))?;

		Ok(())
	}

	pub fn user_path(&self, entity_id: &str) -> String {
		query::join(&self.cfg.remote.users_path, entity_id)
	}
}
impl Default for TestBackend {
	fn default() -> Self {
		Self::new()
	}
}

pub fn test_config() -> Config {
	Config {
		service: Service { log_level: "debug".to_string() },
		remote: Remote {
			index_path: "searchIndex".to_string(),
			users_path: "users".to_string(),
			meta_key: "meta".to_string(),
		},
		search: Search { max_results: 20, channel_capacity: 64 },
	}
}

pub fn fresh_user_id(prefix: &str) -> String {
	format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Drains a stream that is expected to end on its own.
pub async fn collect_items(stream: SearchStream, within: Duration) -> Result<Items> {
	time::timeout(within, stream.collect::<Items>())
		.await
		.map_err(|_| Error::Message(format!("Search stream did not finish within {within:?}.")))
}

/// Drains a stream and fails on its first error item.
pub async fn collect_users(stream: SearchStream, within: Duration) -> Result<Vec<User>> {
	let users = collect_items(stream, within)
		.await?
		.into_iter()
		.collect::<usersearch_service::Result<Vec<_>>>()?;

	Ok(users)
}

/// Reads exactly `count` users from a stream that may never end.
pub async fn take_users(
	stream: &mut SearchStream,
	count: usize,
	within: Duration,
) -> Result<Vec<User>> {
	let mut users = Vec::with_capacity(count);

	while users.len() < count {
		let next = time::timeout(within, stream.next()).await.map_err(|_| {
			Error::Message(format!("Expected {count} users, received {}.", users.len()))
		})?;

		match next {
			Some(item) => users.push(item?),
			None => {
				return Err(Error::Message(format!(
					"Search stream ended after {} of {count} users.",
					users.len()
				)));
			},
		}
	}

	Ok(users)
}

pub fn sorted_ids(users: &[User]) -> Vec<String> {
	let mut ids = users.iter().map(|user| user.entity_id.clone()).collect::<Vec<_>>();

	ids.sort();

	ids
}
