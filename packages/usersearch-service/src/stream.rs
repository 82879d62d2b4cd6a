use std::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};

use futures::Stream;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};

use usersearch_domain::User;

use crate::{Error, Result};

/// How a search driver stopped. Exactly one of these ends every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
	Completed,
	Cancelled,
	Failed,
	/// The store closed the listener feed.
	Closed,
}

/// Lazily produced search results.
///
/// Results arrive as `Ok(user)`; a terminal error arrives as the last item. Dropping the stream
/// cancels it. Each stream owns its own remote operations and cannot be restarted.
pub struct SearchStream {
	rx: mpsc::Receiver<Result<User>>,
	cancel: CancelHandle,
	driver: Option<JoinHandle<Termination>>,
	_guard: DropGuard,
}

/// Cloneable cancellation for a [`SearchStream`]. Cancelling is idempotent, never fails, and
/// is allowed after the stream has already finished.
#[derive(Debug, Clone)]
pub struct CancelHandle {
	token: CancellationToken,
}

/// Producer half held by a search driver.
pub(crate) struct Emitter {
	tx: mpsc::Sender<Result<User>>,
	token: CancellationToken,
}

impl Termination {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Completed => "completed",
			Self::Cancelled => "cancelled",
			Self::Failed => "failed",
			Self::Closed => "closed",
		}
	}
}

impl SearchStream {
	pub(crate) fn spawn<F, Fut>(capacity: usize, drive: F) -> Self
	where
		F: FnOnce(Emitter) -> Fut,
		Fut: Future<Output = Termination> + Send + 'static,
	{
		let (tx, rx) = mpsc::channel(capacity);
		let token = CancellationToken::new();
		let driver = tokio::spawn(drive(Emitter { tx, token: token.clone() }));

		Self {
			rx,
			cancel: CancelHandle { token: token.clone() },
			driver: Some(driver),
			_guard: token.drop_guard(),
		}
	}

	/// A stream that yields `err` and ends, without touching the store.
	pub(crate) fn failed(err: Error) -> Self {
		let (tx, rx) = mpsc::channel(1);
		let token = CancellationToken::new();

		tracing::debug!(error = %err, "Search rejected before any remote call.");

		let _ = tx.try_send(Err(err));

		Self {
			rx,
			cancel: CancelHandle { token: token.clone() },
			driver: None,
			_guard: token.drop_guard(),
		}
	}

	pub fn cancel_handle(&self) -> CancelHandle {
		self.cancel.clone()
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Cancels the search and waits until the driver has released every remote resource.
	///
	/// Returns how the driver ended, or `None` when no driver was started.
	pub async fn shutdown(self) -> Option<Termination> {
		let Self { cancel, driver, .. } = self;

		cancel.cancel();

		match driver?.await {
			Ok(termination) => Some(termination),
			Err(err) => {
				tracing::error!(error = %err, "Search driver did not finish cleanly.");

				None
			},
		}
	}
}

impl Stream for SearchStream {
	type Item = Result<User>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if self.cancel.is_cancelled() {
			return Poll::Ready(None);
		}

		self.rx.poll_recv(cx)
	}
}

impl CancelHandle {
	pub fn cancel(&self) {
		self.token.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

impl Emitter {
	/// Hands `item` to the consumer. Returns `false` once the stream is cancelled or dropped, after
	/// which the driver must stop producing.
	pub(crate) async fn emit(&self, item: Result<User>) -> bool {
		tokio::select! {
			biased;

			_ = self.token.cancelled() => false,
			sent = self.tx.send(item) => sent.is_ok(),
		}
	}

	pub(crate) async fn cancelled(&self) {
		self.token.cancelled().await
	}

	/// Delivers a terminal error. The consumer may already be gone, in which case the error is
	/// only logged.
	pub(crate) async fn fail(&self, err: Error) -> Termination {
		tracing::debug!(error = %err, "Search stream failed.");

		if self.emit(Err(err)).await { Termination::Failed } else { Termination::Cancelled }
	}
}
