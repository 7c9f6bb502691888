use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A background task with a one-shot stop signal.
pub(crate) struct Worker {
	name: &'static str,
	shutdown_tx: Option<oneshot::Sender<()>>,
	join_handle: JoinHandle<()>,
}

impl Worker {
	/// Spawns `run`, handing it the receiving end of the stop signal.
	pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
	where
		F: FnOnce(oneshot::Receiver<()>) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let join_handle = tokio::spawn(run(shutdown_rx));
		debug!(worker = name, "Worker started");
		Self {
			name,
			shutdown_tx: Some(shutdown_tx),
			join_handle,
		}
	}

	pub fn is_finished(&self) -> bool {
		self.join_handle.is_finished()
	}

	/// True when called from inside this worker's own task.
	pub fn is_current_task(&self) -> bool {
		tokio::task::try_id() == Some(self.join_handle.id())
	}

	/// Asks the worker to exit without waiting for it.
	pub fn signal(&mut self) {
		if let Some(shutdown_tx) = self.shutdown_tx.take() {
			// Err only means the worker already exited
			let _ = shutdown_tx.send(());
		}
	}

	/// Signals the worker and, unless called from the worker itself, waits
	/// for it to finish.
	pub async fn stop(mut self) {
		self.signal();
		if self.is_current_task() {
			warn!(worker = self.name, "Worker asked to join itself; detaching");
			return;
		}
		match (&mut self.join_handle).await {
			| Ok(()) => debug!(worker = self.name, "Worker stopped"),
			| Err(err) if err.is_panic() => {
				error!(worker = self.name, error = ?err, "Worker panicked")
			}
			| Err(err) => debug!(worker = self.name, error = ?err, "Worker cancelled"),
		}
	}

	pub fn abort(&self) {
		self.join_handle.abort();
	}
}

/// Background tasks owned by one connection
#[derive(Default)]
pub(crate) struct Workers {
	/// Transport receive loop
	pub pump: Option<Worker>,
	/// Auto-dispatch loop
	pub dispatcher: Option<Worker>,
	/// Request timeout and republish reaper
	pub requests: Option<Worker>,
	/// Message bin flusher
	pub flusher: Option<Worker>,
}

impl Workers {
	pub fn abort_all(&self) {
		[&self.pump, &self.dispatcher, &self.requests, &self.flusher]
			.into_iter()
			.flatten()
			.for_each(Worker::abort);
	}
}
