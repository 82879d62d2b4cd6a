//! In-process remote tree with ordered range reads and child-added listeners.
//!
//! Reads go through the same checks a networked store applies (permission, latency), which makes
//! the tree usable both as a local backend and as a fault-injecting double in tests.

use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use serde_json::{Map, Value};
use tokio::{sync::mpsc, time};

use crate::{
	Error, Result,
	query::{self, RangeQuery, Snapshot},
};

pub type ChildEvent = Result<Snapshot>;

#[derive(Clone, Default)]
pub struct MemoryRemote {
	inner: Arc<Mutex<Inner>>,
}

/// A registered child-added listener. Detaching consumes the handle, so a listener is released
/// at most once.
pub struct MemoryListener {
	id: u64,
	inner: Arc<Mutex<Inner>>,
}

pub struct Subscription {
	pub events: mpsc::UnboundedReceiver<ChildEvent>,
	pub listener: MemoryListener,
}

#[derive(Default)]
struct Inner {
	root: Value,
	listeners: Vec<ListenerSlot>,
	next_listener_id: u64,
	denied: BTreeSet<String>,
	delays: BTreeMap<String, Duration>,
	reads: usize,
	detached: usize,
}
impl Inner {
	fn check_denied(&self, path: &str) -> Result<()> {
		if self.denied.iter().any(|prefix| query::covers(prefix, path)) {
			return Err(Error::PermissionDenied { path: path.to_string() });
		}

		Ok(())
	}

	fn delay_for(&self, path: &str) -> Option<Duration> {
		self.delays
			.iter()
			.filter(|(prefix, _)| query::covers(prefix, path))
			.map(|(_, delay)| *delay)
			.max()
	}

	fn notify_child_added(&mut self, path: &str) {
		let root = &self.root;

		self.listeners.retain_mut(|slot| {
			if !query::covers(&slot.query.path, path) {
				return true;
			}

			let depth = query::segments(&slot.query.path).count();
			let Some(key) = query::segments(path).nth(depth) else {
				return true;
			};

			if slot.delivered.contains(key) || slot.delivered.len() >= slot.query.limit {
				return true;
			}

			let Some(child) = query::value_at(root, &query::join(&slot.query.path, key)) else {
				return true;
			};

			if !slot.query.admits(child) {
				return true;
			}

			slot.delivered.insert(key.to_string());

			// A closed receiver means the subscriber went away without detaching.
			slot.tx.send(Ok(Snapshot::new(key, child.clone()))).is_ok()
		});
	}
}

struct ListenerSlot {
	id: u64,
	query: RangeQuery,
	delivered: BTreeSet<String>,
	tx: mpsc::UnboundedSender<ChildEvent>,
}

impl MemoryRemote {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_value(root: Value) -> Self {
		let remote = Self::default();

		remote.lock().root = root;

		remote
	}

	pub fn from_json_str(raw: &str) -> Result<Self> {
		Ok(Self::from_value(serde_json::from_str(raw)?))
	}

	pub fn to_value(&self) -> Value {
		self.lock().root.clone()
	}

	pub async fn get(&self, path: &str) -> Result<Snapshot> {
		self.admit_read(path).await?;

		let inner = self.lock();
		let value = query::value_at(&inner.root, path).cloned().unwrap_or(Value::Null);
		let key = query::segments(path).last().unwrap_or_default();

		Ok(Snapshot::new(key, value))
	}

	/// Ordered children admitted by `query`.
	pub async fn range(&self, query: &RangeQuery) -> Result<Vec<Snapshot>> {
		self.admit_read(&query.path).await?;

		Ok(ordered_children(&self.lock().root, query))
	}

	/// Single-shot read of a range. No matching children yields a snapshot whose value is null.
	pub async fn once(&self, query: &RangeQuery) -> Result<Snapshot> {
		let children = self.range(query).await?;
		let key = query::segments(&query.path).last().unwrap_or_default();

		if children.is_empty() {
			return Ok(Snapshot::new(key, Value::Null));
		}

		let map = children.into_iter().map(|child| (child.key, child.value)).collect::<Map<_, _>>();

		Ok(Snapshot::new(key, Value::Object(map)))
	}

	/// Registers a child-added listener. Children already admitted by the query are replayed
	/// before any later write is delivered.
	pub fn listen(&self, query: &RangeQuery) -> Result<Subscription> {
		let mut inner = self.lock();

		inner.check_denied(&query.path)?;

		let (tx, events) = mpsc::unbounded_channel();
		let mut delivered = BTreeSet::new();

		for child in ordered_children(&inner.root, query) {
			delivered.insert(child.key.clone());

			let _ = tx.send(Ok(child));
		}

		let id = inner.next_listener_id;

		inner.next_listener_id += 1;
		inner.listeners.push(ListenerSlot { id, query: query.clone(), delivered, tx });

		Ok(Subscription { events, listener: MemoryListener { id, inner: self.inner.clone() } })
	}

	/// Writes `value` at `path`, creating intermediate objects. A null value removes the entry.
	pub fn set(&self, path: &str, value: Value) -> Result<()> {
		let mut inner = self.lock();

		write_at(&mut inner.root, path, value)?;
		inner.notify_child_added(path);

		Ok(())
	}

	/// Reads at or below `path` fail with [`Error::PermissionDenied`] until [`Self::allow`].
	pub fn deny(&self, path: &str) {
		self.lock().denied.insert(path.to_string());
	}

	pub fn allow(&self, path: &str) {
		self.lock().denied.remove(path);
	}

	/// Reads at or below `path` take at least `delay`.
	pub fn delay(&self, path: &str, delay: Duration) {
		self.lock().delays.insert(path.to_string(), delay);
	}

	/// Cancels every live listener with `err`, the way a store reports revoked access.
	pub fn revoke_listeners(&self, err: Error) -> usize {
		let mut inner = self.lock();
		let revoked = inner.listeners.len();

		for slot in inner.listeners.drain(..) {
			let _ = slot.tx.send(Err(err.clone()));
		}

		revoked
	}

	/// Closes every live listener feed without an error.
	pub fn close_listeners(&self) -> usize {
		let mut inner = self.lock();
		let closed = inner.listeners.len();

		inner.listeners.clear();

		closed
	}

	pub fn read_count(&self) -> usize {
		self.lock().reads
	}

	pub fn listener_count(&self) -> usize {
		self.lock().listeners.len()
	}

	pub fn detach_count(&self) -> usize {
		self.lock().detached
	}

	async fn admit_read(&self, path: &str) -> Result<()> {
		let delay = {
			let mut inner = self.lock();

			inner.reads += 1;
			inner.check_denied(path)?;
			inner.delay_for(path)
		};

		if let Some(delay) = delay {
			time::sleep(delay).await;
		}

		Ok(())
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		lock(&self.inner)
	}
}

impl MemoryListener {
	pub fn detach(self) {
		let mut inner = lock(&self.inner);

		inner.listeners.retain(|slot| slot.id != self.id);
		inner.detached += 1;
	}
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
	inner.lock().unwrap_or_else(|err| err.into_inner())
}

fn ordered_children(root: &Value, query: &RangeQuery) -> Vec<Snapshot> {
	let Some(map) = query::value_at(root, &query.path).and_then(Value::as_object) else {
		return Vec::new();
	};
	let mut admitted = map
		.iter()
		.filter_map(|(key, child)| {
			query
				.order_value(child)
				.filter(|value| *value >= query.start_at.as_str())
				.map(|value| (value, key, child))
		})
		.collect::<Vec<_>>();

	admitted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

	admitted
		.into_iter()
		.take(query.limit)
		.map(|(_, key, child)| Snapshot::new(key, child.clone()))
		.collect()
}

fn write_at(root: &mut Value, path: &str, value: Value) -> Result<()> {
	let segments = query::segments(path).collect::<Vec<_>>();
	let Some((last, parents)) = segments.split_last() else {
		return Err(Error::InvalidPath { path: path.to_string() });
	};
	let mut node = root;

	for segment in parents {
		if !node.is_object() {
			*node = Value::Object(Map::new());
		}

		node = node
			.as_object_mut()
			.map(|map| map.entry(segment.to_string()).or_insert(Value::Null))
			.ok_or_else(|| Error::InvalidPath { path: path.to_string() })?;
	}

	if !node.is_object() {
		*node = Value::Object(Map::new());
	}

	let Some(map) = node.as_object_mut() else {
		return Err(Error::InvalidPath { path: path.to_string() });
	};

	if value.is_null() {
		map.remove(*last);
	} else {
		map.insert(last.to_string(), value);
	}

	Ok(())
}
