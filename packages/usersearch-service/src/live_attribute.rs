use std::sync::Arc;

use usersearch_domain::{EntityKind, User};
use usersearch_storage::query::{self, RangeQuery};

use crate::{
	ChildAddedFeed, EntityStore, RemoteStore, SearchQuery, SearchStream, Searcher,
	stream::{Emitter, Termination},
};

struct LiveAttribute {
	remote: Arc<dyn RemoteStore>,
	entities: Arc<dyn EntityStore>,
	range: RangeQuery,
	current_user_id: String,
}

impl Searcher {
	/// Follows users whose metadata attribute `query.index` sorts at or after `query.value`.
	///
	/// The raw value is used as the lower bound and results are not re-checked, so the stream may
	/// carry users that do not share the prefix. It never completes on its own; it ends when the
	/// consumer cancels, when the store revokes the listener, or when the feed closes.
	pub fn live_attribute(&self, current_user: &User, query: SearchQuery) -> SearchStream {
		if let Err(err) = query.checked_bound() {
			return SearchStream::failed(err);
		}

		let range = RangeQuery::new(self.cfg.remote.users_path.as_str())
			.order_by_child(query::join(&self.cfg.remote.meta_key, &query.index))
			.start_at(query.value)
			.limit_to_first(self.cfg.search.max_results);

		tracing::debug!(
			order_by = %range.order_by,
			start_at = %range.start_at,
			limit = range.limit,
			"Starting live attribute search."
		);

		let live = LiveAttribute {
			remote: self.remote.clone(),
			entities: self.entities.clone(),
			range,
			current_user_id: current_user.entity_id.clone(),
		};

		SearchStream::spawn(self.channel_capacity(), move |emitter| live.run(emitter))
	}
}

impl LiveAttribute {
	async fn run(self, emitter: Emitter) -> Termination {
		let feed = tokio::select! {
			biased;

			_ = emitter.cancelled() => return Termination::Cancelled,
			feed = self.remote.on_child_added(&self.range) => feed,
		};
		let ChildAddedFeed { mut events, registration } = match feed {
			Ok(feed) => feed,
			Err(err) => return emitter.fail(err.into()).await,
		};
		let termination = loop {
			let event = tokio::select! {
				biased;

				_ = emitter.cancelled() => break Termination::Cancelled,
				event = events.recv() => event,
			};
			let snapshot = match event {
				Some(Ok(snapshot)) => snapshot,
				Some(Err(err)) => break emitter.fail(err.into()).await,
				None => break Termination::Closed,
			};
			let user = match self.entities.materialize(EntityKind::User, &snapshot).await {
				Ok(user) => user,
				Err(err) => {
					tracing::warn!(
						error = %err,
						entity_id = %snapshot.key,
						"Skipping live search child that failed to materialize."
					);

					continue;
				},
			};

			if user.is_entity(&self.current_user_id) {
				continue;
			}
			if !emitter.emit(Ok(user)).await {
				break Termination::Cancelled;
			}
		};

		registration.detach();

		tracing::debug!(
			order_by = %self.range.order_by,
			termination = termination.as_str(),
			"Live attribute search finished."
		);

		termination
	}
}
