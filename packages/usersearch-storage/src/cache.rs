use std::{
	collections::{BTreeMap, HashMap},
	sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Value;

use usersearch_domain::{EntityKind, User};

use crate::{
	Error, Result,
	memory::MemoryRemote,
	query::{self, Snapshot},
};

/// Read-through entity cache backed by a [`MemoryRemote`].
///
/// Entries are created locally first and then refreshed from the remote, so a failed refresh
/// still leaves a placeholder behind. Nothing is ever evicted.
#[derive(Clone)]
pub struct UserCache {
	remote: MemoryRemote,
	users_path: String,
	meta_key: String,
	entries: Arc<Mutex<HashMap<(EntityKind, String), User>>>,
}
impl UserCache {
	pub fn new(remote: MemoryRemote, cfg: &usersearch_config::Remote) -> Self {
		Self {
			remote,
			users_path: cfg.users_path.clone(),
			meta_key: cfg.meta_key.clone(),
			entries: Arc::default(),
		}
	}

	/// Returns the cached entity, creating it when absent, after one remote read of its
	/// metadata.
	pub async fn fetch_or_create(&self, kind: EntityKind, entity_id: &str) -> Result<User> {
		if entity_id.trim().is_empty() {
			return Err(Error::InvalidPath { path: query::join(self.collection(kind), entity_id) });
		}

		let cache_key = (kind, entity_id.to_string());

		self.lock().entry(cache_key.clone()).or_insert_with(|| User::new(entity_id));

		let meta_path =
			query::join(&query::join(self.collection(kind), entity_id), &self.meta_key);
		let snapshot = self.remote.get(&meta_path).await?;
		let mut entries = self.lock();
		let user = entries.entry(cache_key).or_insert_with(|| User::new(entity_id));

		if snapshot.exists() {
			user.meta = meta_from_value(&snapshot.value);
		}

		Ok(user.clone())
	}

	/// Upserts an entity from a collection child without another remote read.
	pub fn materialize(&self, kind: EntityKind, snapshot: &Snapshot) -> Result<User> {
		if snapshot.key.trim().is_empty() {
			return Err(Error::InvalidPath { path: self.collection(kind).to_string() });
		}

		let meta = snapshot.child(&self.meta_key).map(meta_from_value).unwrap_or_default();
		let mut entries = self.lock();
		let user = entries
			.entry((kind, snapshot.key.clone()))
			.or_insert_with(|| User::new(snapshot.key.as_str()));

		user.meta = meta;

		Ok(user.clone())
	}

	pub fn get(&self, kind: EntityKind, entity_id: &str) -> Option<User> {
		self.lock().get(&(kind, entity_id.to_string())).cloned()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	fn collection(&self, kind: EntityKind) -> &str {
		match kind {
			EntityKind::User => &self.users_path,
		}
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<(EntityKind, String), User>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}

fn meta_from_value(value: &Value) -> BTreeMap<String, String> {
	let Some(map) = value.as_object() else {
		return BTreeMap::new();
	};

	map.iter()
		.filter_map(|(key, value)| value.as_str().map(|text| (key.clone(), text.to_string())))
		.collect()
}
