use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use futures::StreamExt;
use serde_json::json;

use usersearch_domain::{EntityKind, User};
use usersearch_service::{
	BoxFuture, ChildAddedFeed, EntityStore, Error, RemoteStore, SearchQuery, SearchStream,
	Searcher, StoreResult, Termination,
};
use usersearch_storage::{
	cache::UserCache,
	memory::MemoryRemote,
	query::{RangeQuery, Snapshot},
};
use usersearch_testkit::{DEFAULT_WAIT, TestBackend, collect_items, take_users};

struct RecordingRemote {
	inner: MemoryRemote,
	queries: Arc<Mutex<Vec<RangeQuery>>>,
}
impl RemoteStore for RecordingRemote {
	fn once<'a>(&'a self, query: &'a RangeQuery) -> BoxFuture<'a, StoreResult<Snapshot>> {
		RemoteStore::once(&self.inner, query)
	}

	fn on_child_added<'a>(
		&'a self,
		query: &'a RangeQuery,
	) -> BoxFuture<'a, StoreResult<ChildAddedFeed>> {
		self.queries.lock().expect("Query log lock poisoned.").push(query.clone());

		RemoteStore::on_child_added(&self.inner, query)
	}
}

/// Fails to materialize one entity and delegates everything else.
struct FlakyEntities {
	inner: UserCache,
	broken: String,
}
impl EntityStore for FlakyEntities {
	fn fetch_or_create<'a>(
		&'a self,
		kind: EntityKind,
		entity_id: &'a str,
	) -> BoxFuture<'a, StoreResult<User>> {
		EntityStore::fetch_or_create(&self.inner, kind, entity_id)
	}

	fn materialize<'a>(
		&'a self,
		kind: EntityKind,
		snapshot: &'a Snapshot,
	) -> BoxFuture<'a, StoreResult<User>> {
		if snapshot.key == self.broken {
			let err = usersearch_storage::Error::MalformedSnapshot {
				message: format!("{} has no usable metadata.", snapshot.key),
			};

			return Box::pin(async move { Err::<User, _>(err) });
		}

		EntityStore::materialize(&self.inner, kind, snapshot)
	}
}

fn follow(searcher: &Searcher, viewer: &str, value: &str) -> SearchStream {
	searcher.live_attribute(&User::new(viewer), SearchQuery::new("name", value))
}

async fn expect_end(stream: &mut SearchStream) {
	let next = tokio::time::timeout(DEFAULT_WAIT, stream.next())
		.await
		.expect("Stream did not end in time.");

	assert!(next.is_none(), "Stream yielded {next:?} instead of ending.");
}

#[tokio::test]
async fn live_replays_existing_matches_in_attribute_order() {
	let backend = TestBackend::new();

	backend.seed_meta("A", "name", "Joan").expect("Failed to seed A.");
	backend.seed_meta("B", "name", "John").expect("Failed to seed B.");
	backend.seed_meta("C", "name", "Adam").expect("Failed to seed C.");

	let mut stream = follow(&backend.searcher, "viewer", "Jo");
	let users = take_users(&mut stream, 2, DEFAULT_WAIT).await.expect("Live search failed.");
	let ids = users.iter().map(|user| user.entity_id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["A", "B"]);
	assert_eq!(users[1].meta_string("name"), Some("John"));
	assert_eq!(stream.shutdown().await, Some(Termination::Cancelled));
}

#[tokio::test]
async fn live_delivers_children_added_after_listening() {
	let backend = TestBackend::new();

	backend.seed_meta("A", "name", "Joan").expect("Failed to seed A.");

	let mut stream = follow(&backend.searcher, "viewer", "Jo");
	let first = take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Replay failed.");

	backend
		.remote
		.set("users/D", json!({ "meta": { "name": "Josephine", "city": "Oslo" } }))
		.expect("Failed to add D.");

	let second = take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live delivery failed.");

	assert_eq!(first[0].entity_id, "A");
	assert_eq!(second[0].entity_id, "D");
	assert_eq!(second[0].meta_string("city"), Some("Oslo"));
	assert!(backend.cache.get(EntityKind::User, "D").is_some());

	stream.shutdown().await;
}

#[tokio::test]
async fn live_never_emits_the_current_user() {
	let backend = TestBackend::new();

	backend.seed_meta("A", "name", "Joan").expect("Failed to seed A.");
	backend.seed_meta("B", "name", "John").expect("Failed to seed B.");

	let mut stream = follow(&backend.searcher, "A", "Jo");
	let users = take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live search failed.");

	backend.seed_meta("A", "city", "Rome").expect("Failed to touch A.");
	backend.seed_meta("E", "name", "Jolene").expect("Failed to seed E.");

	let later = take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live delivery failed.");

	assert_eq!(users[0].entity_id, "B");
	assert_eq!(later[0].entity_id, "E");

	stream.shutdown().await;
}

#[tokio::test]
async fn live_uses_the_raw_value_as_lower_bound() {
	let backend = TestBackend::new();
	let queries = Arc::new(Mutex::new(Vec::new()));
	let remote = RecordingRemote { inner: backend.remote.clone(), queries: queries.clone() };
	let searcher =
		Searcher::new(backend.cfg.clone(), Arc::new(remote), Arc::new(backend.cache.clone()));

	// Sorts after "John" but before "john".
	backend.seed_meta("K", "name", "Kim").expect("Failed to seed K.");

	let mut stream = follow(&searcher, "viewer", "John");
	let users = take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live search failed.");

	assert_eq!(users[0].entity_id, "K");

	stream.shutdown().await;

	let queries = queries.lock().expect("Query log lock poisoned.");

	assert_eq!(queries.len(), 1);
	assert_eq!(queries[0].path, "users");
	assert_eq!(queries[0].order_by, "meta/name");
	assert_eq!(queries[0].start_at, "John");
	assert_eq!(queries[0].limit, 20);
}

#[tokio::test]
async fn live_rejects_blank_value_without_listening() {
	let backend = TestBackend::new();
	let stream = follow(&backend.searcher, "viewer", "  ");
	let items = collect_items(stream, DEFAULT_WAIT).await.expect("Stream did not finish.");

	assert_eq!(items, vec![Err(Error::InvalidArgument { message: "Value is blank.".to_string() })]);
	assert_eq!(backend.remote.listener_count(), 0);
}

#[tokio::test]
async fn denied_collection_fails_the_live_stream() {
	let backend = TestBackend::new();

	backend.remote.deny("users");

	let stream = follow(&backend.searcher, "viewer", "Jo");
	let items = collect_items(stream, DEFAULT_WAIT).await.expect("Stream did not finish.");

	assert_eq!(
		items,
		vec![Err(Error::Transport(usersearch_storage::Error::PermissionDenied {
			path: "users".to_string(),
		}))]
	);
}

#[tokio::test]
async fn listener_error_fails_the_stream_and_detaches_once() {
	let backend = TestBackend::new();

	backend.seed_meta("B", "name", "John").expect("Failed to seed B.");

	let mut stream = follow(&backend.searcher, "viewer", "Jo");

	take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live search failed.");

	let denied = usersearch_storage::Error::PermissionDenied { path: "users".to_string() };
	let revoked = backend.remote.revoke_listeners(denied.clone());
	let next = tokio::time::timeout(DEFAULT_WAIT, stream.next())
		.await
		.expect("Stream did not report the revocation.");

	assert_eq!(revoked, 1);
	assert_eq!(next, Some(Err(Error::Transport(denied))));

	expect_end(&mut stream).await;

	assert_eq!(stream.shutdown().await, Some(Termination::Failed));
	assert_eq!(backend.remote.detach_count(), 1);
}

#[tokio::test]
async fn closed_feed_ends_the_stream() {
	let backend = TestBackend::new();

	backend.seed_meta("B", "name", "John").expect("Failed to seed B.");

	let mut stream = follow(&backend.searcher, "viewer", "Jo");

	take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live search failed.");

	assert_eq!(backend.remote.close_listeners(), 1);

	expect_end(&mut stream).await;

	assert_eq!(stream.shutdown().await, Some(Termination::Closed));
	assert_eq!(backend.remote.detach_count(), 1);
}

#[tokio::test]
async fn materialize_failure_skips_only_that_child() {
	let backend = TestBackend::new();
	let entities = FlakyEntities { inner: backend.cache.clone(), broken: "A".to_string() };
	let searcher =
		Searcher::new(backend.cfg.clone(), Arc::new(backend.remote.clone()), Arc::new(entities));

	backend.seed_meta("A", "name", "Joan").expect("Failed to seed A.");
	backend.seed_meta("B", "name", "John").expect("Failed to seed B.");

	let mut stream = follow(&searcher, "viewer", "Jo");
	let users = take_users(&mut stream, 1, DEFAULT_WAIT).await.expect("Live search failed.");

	assert_eq!(users[0].entity_id, "B");

	let quiet = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;

	assert!(quiet.is_err(), "Unexpected item after the skipped child: {quiet:?}.");

	stream.shutdown().await;
}
