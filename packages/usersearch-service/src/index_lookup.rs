use std::sync::Arc;

use futures::{StreamExt, stream::FuturesUnordered};

use usersearch_domain::{EntityKind, User, has_prefix, is_null_like_key};
use usersearch_storage::query::{RangeQuery, Snapshot};

use crate::{
	EntityStore, Error, RemoteStore, Result, SearchQuery, SearchStream, Searcher,
	stream::{Emitter, Termination},
};

struct IndexLookup {
	remote: Arc<dyn RemoteStore>,
	entities: Arc<dyn EntityStore>,
	range: RangeQuery,
	index: String,
	bound: String,
	current_user_id: String,
}

/// A resolved candidate and whether it really carries the queried prefix.
struct Verdict {
	user: User,
	passed: bool,
}

impl Searcher {
	/// Finds users through the secondary index.
	///
	/// The index range is bounded below by the normalized value, which also admits values that
	/// merely sort after it. Every hit is therefore resolved and re-checked before it is emitted.
	/// Matches arrive in the order their checks finish. The stream fails with
	/// [`Error::NotFound`] when the index yields no usable candidate, and completes, possibly
	/// empty, once every candidate has settled.
	pub fn index_lookup(&self, current_user: &User, query: SearchQuery) -> SearchStream {
		let bound = match query.checked_bound() {
			Ok(bound) => bound,
			Err(err) => return SearchStream::failed(err),
		};
		let range = RangeQuery::new(self.cfg.remote.index_path.as_str())
			.order_by_child(query.index.as_str())
			.start_at(bound.as_str())
			.limit_to_first(self.cfg.search.max_results);

		tracing::debug!(
			index = %query.index,
			bound = %bound,
			limit = range.limit,
			"Starting index lookup search."
		);

		let lookup = IndexLookup {
			remote: self.remote.clone(),
			entities: self.entities.clone(),
			range,
			index: query.index,
			bound,
			current_user_id: current_user.entity_id.clone(),
		};

		SearchStream::spawn(self.channel_capacity(), move |emitter| lookup.run(emitter))
	}
}

impl IndexLookup {
	async fn run(self, emitter: Emitter) -> Termination {
		let termination = self.drive(&emitter).await;

		tracing::debug!(
			index = %self.index,
			termination = termination.as_str(),
			"Index lookup search finished."
		);

		termination
	}

	async fn drive(&self, emitter: &Emitter) -> Termination {
		let snapshot = tokio::select! {
			biased;

			_ = emitter.cancelled() => return Termination::Cancelled,
			result = self.remote.once(&self.range) => result,
		};
		let snapshot = match snapshot {
			Ok(snapshot) => snapshot,
			Err(err) => return emitter.fail(err.into()).await,
		};
		let candidates = match self.candidates(&snapshot) {
			Ok(candidates) => candidates,
			Err(err) => return emitter.fail(err).await,
		};
		let mut pending = candidates
			.iter()
			.map(|entity_id| self.resolve(entity_id))
			.collect::<FuturesUnordered<_>>();

		loop {
			let next = tokio::select! {
				biased;

				_ = emitter.cancelled() => return Termination::Cancelled,
				next = pending.next() => next,
			};
			let Some(verdict) = next else {
				return Termination::Completed;
			};

			if let Some(Verdict { user, passed: true }) = verdict
				&& !emitter.emit(Ok(user)).await
			{
				return Termination::Cancelled;
			}
		}
	}

	/// Entity IDs worth resolving. Keys naming the current user or no entity at all are dropped
	/// here; resolving a null-like key never finishes.
	fn candidates(&self, snapshot: &Snapshot) -> Result<Vec<String>> {
		if !snapshot.has_children() {
			return Err(Error::NotFound { message: "No matching entity.".to_string() });
		}

		let candidates = snapshot
			.child_keys()
			.filter(|key| *key != self.current_user_id)
			.filter(|key| {
				let null_like = is_null_like_key(key);

				if null_like {
					tracing::warn!(
						index = %self.index,
						key = %key,
						"Skipping null-like index key."
					);
				}

				!null_like
			})
			.map(str::to_string)
			.collect::<Vec<_>>();

		if candidates.is_empty() {
			return Err(Error::NotFound { message: "No matching entity.".to_string() });
		}

		Ok(candidates)
	}

	/// Resolves one candidate. Failures only drop this candidate.
	async fn resolve(&self, entity_id: &str) -> Option<Verdict> {
		let user = match self.entities.fetch_or_create(EntityKind::User, entity_id).await {
			Ok(user) => user,
			Err(err) => {
				tracing::warn!(
					error = %err,
					entity_id = %entity_id,
					"Dropping search candidate that failed to resolve."
				);

				return None;
			},
		};
		let passed = has_prefix(user.meta_string(&self.index), &self.bound);

		if !passed {
			tracing::debug!(
				entity_id = %entity_id,
				index = %self.index,
				"Search candidate does not carry the queried prefix."
			);
		}

		Some(Verdict { user, passed })
	}
}
