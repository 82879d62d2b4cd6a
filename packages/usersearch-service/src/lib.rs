//! Prefix search over a store that only answers ordered range queries.
//!
//! Two strategies share one [`Searcher`]:
//!
//! - [`Searcher::index_lookup`] reads a secondary index once, resolves every hit through the
//!   entity cache concurrently, and keeps only entities whose indexed attribute really starts
//!   with the query. The stream completes when every candidate has settled.
//! - [`Searcher::live_attribute`] listens for children added to the user collection, ordered by
//!   a metadata attribute, and emits each one as it arrives until the stream is cancelled.
//!
//! The live strategy trusts the store's ordering and does not re-check the prefix locally, so it
//! can emit users whose attribute merely sorts after the query value.

pub mod stream;

mod error;
mod index_lookup;
mod live_attribute;

pub use error::{Error, Result};
pub use stream::{CancelHandle, SearchStream, Termination};
pub use usersearch_storage::memory::ChildEvent;

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::sync::mpsc;

use usersearch_config::Config;
use usersearch_domain::{EntityKind, User, normalize};
use usersearch_storage::{
	cache::UserCache,
	memory::{MemoryListener, MemoryRemote, Subscription},
	query::{RangeQuery, Snapshot},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type StoreResult<T> = usersearch_storage::Result<T>;

/// Ordered range reads and child-added subscriptions against the remote tree.
pub trait RemoteStore
where
	Self: Send + Sync,
{
	/// Single-shot read. A range without children yields a snapshot that does not exist.
	fn once<'a>(&'a self, query: &'a RangeQuery) -> BoxFuture<'a, StoreResult<Snapshot>>;

	fn on_child_added<'a>(
		&'a self,
		query: &'a RangeQuery,
	) -> BoxFuture<'a, StoreResult<ChildAddedFeed>>;
}

/// Releases a child-added listener. Taking `self` by box means a registration can only be
/// released once.
pub trait ListenerRegistration
where
	Self: Send,
{
	fn detach(self: Box<Self>);
}

/// Read-through entity cache.
pub trait EntityStore
where
	Self: Send + Sync,
{
	fn fetch_or_create<'a>(
		&'a self,
		kind: EntityKind,
		entity_id: &'a str,
	) -> BoxFuture<'a, StoreResult<User>>;

	/// Upserts an entity from a snapshot the store already delivered.
	fn materialize<'a>(
		&'a self,
		kind: EntityKind,
		snapshot: &'a Snapshot,
	) -> BoxFuture<'a, StoreResult<User>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
	IndexLookup,
	LiveAttribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
	/// Index name for lookups, metadata attribute for live searches.
	pub index: String,
	pub value: String,
}

pub struct ChildAddedFeed {
	pub events: mpsc::UnboundedReceiver<ChildEvent>,
	pub registration: Box<dyn ListenerRegistration>,
}

#[derive(Clone)]
pub struct Searcher {
	pub cfg: Config,
	pub remote: Arc<dyn RemoteStore>,
	pub entities: Arc<dyn EntityStore>,
}

impl SearchStrategy {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::IndexLookup => "index_lookup",
			Self::LiveAttribute => "live_attribute",
		}
	}
}

impl SearchQuery {
	pub fn new(index: impl Into<String>, value: impl Into<String>) -> Self {
		Self { index: index.into(), value: value.into() }
	}

	/// Normalized value, rejected before any remote call when blank.
	pub(crate) fn checked_bound(&self) -> Result<String> {
		if self.index.trim().is_empty() {
			return Err(Error::InvalidArgument { message: "Index is blank.".to_string() });
		}

		let bound = normalize(self.value.as_str());

		if bound.is_empty() {
			return Err(Error::InvalidArgument { message: "Value is blank.".to_string() });
		}

		Ok(bound)
	}
}

impl Searcher {
	pub fn new(cfg: Config, remote: Arc<dyn RemoteStore>, entities: Arc<dyn EntityStore>) -> Self {
		Self { cfg, remote, entities }
	}

	/// Searcher over the in-process backend, sharing `remote` with the cache.
	pub fn in_memory(cfg: Config, remote: MemoryRemote) -> Self {
		let entities = UserCache::new(remote.clone(), &cfg.remote);

		Self::new(cfg, Arc::new(remote), Arc::new(entities))
	}

	/// Runs `strategy` on behalf of `current_user`, who is never part of the results.
	pub fn search(
		&self,
		strategy: SearchStrategy,
		current_user: &User,
		query: SearchQuery,
	) -> SearchStream {
		match strategy {
			SearchStrategy::IndexLookup => self.index_lookup(current_user, query),
			SearchStrategy::LiveAttribute => self.live_attribute(current_user, query),
		}
	}

	pub(crate) fn channel_capacity(&self) -> usize {
		self.cfg.search.channel_capacity.max(1)
	}
}

impl RemoteStore for MemoryRemote {
	fn once<'a>(&'a self, query: &'a RangeQuery) -> BoxFuture<'a, StoreResult<Snapshot>> {
		Box::pin(MemoryRemote::once(self, query))
	}

	fn on_child_added<'a>(
		&'a self,
		query: &'a RangeQuery,
	) -> BoxFuture<'a, StoreResult<ChildAddedFeed>> {
		Box::pin(async move {
			let Subscription { events, listener } = self.listen(query)?;

			Ok(ChildAddedFeed { events, registration: Box::new(listener) })
		})
	}
}

impl ListenerRegistration for MemoryListener {
	fn detach(self: Box<Self>) {
		MemoryListener::detach(*self);
	}
}

impl EntityStore for UserCache {
	fn fetch_or_create<'a>(
		&'a self,
		kind: EntityKind,
		entity_id: &'a str,
	) -> BoxFuture<'a, StoreResult<User>> {
		Box::pin(UserCache::fetch_or_create(self, kind, entity_id))
	}

	fn materialize<'a>(
		&'a self,
		kind: EntityKind,
		snapshot: &'a Snapshot,
	) -> BoxFuture<'a, StoreResult<User>> {
		Box::pin(async move { UserCache::materialize(self, kind, snapshot) })
	}
}
