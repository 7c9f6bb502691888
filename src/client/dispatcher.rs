//! Inbound pump and auto-dispatch loops
//!
//! The pump is the only reader of the transport. It de-aggregates binned
//! envelopes, applies receive-side validation and exclusions, completes
//! pending requests, and queues everything else for `receive()` or the
//! auto-dispatcher. Auto-dispatch drains that queue and invokes
//! subscription callbacks.

use std::sync::{Arc, Weak};

use tokio::sync::oneshot;
use tracing::{debug, info};

use super::connection::{Connection, ConnectionInner};

/// Receives from the transport until stopped or the link fails.
pub(super) async fn run_pump(
	weak: Weak<ConnectionInner>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	loop {
		let Some(inner) = weak.upgrade() else {
			break;
		};
		let transport = Arc::clone(&inner.transport);
		let poll_interval = inner.settings.dispatch_poll_interval;
		drop(inner);

		let received = tokio::select! {
			_ = &mut shutdown_rx => break,
			received = transport.receive(poll_interval) => received,
		};

		let Some(inner) = weak.upgrade() else {
			break;
		};
		let connection = Connection::from_inner(inner);
		match received {
			| Ok(Some(message)) => connection.accept_inbound(message),
			| Ok(None) => {}
			| Err(err) => {
				connection.link_lost(err);
				break;
			}
		}
	}
	debug!("Inbound pump terminated");
}

/// Auto-dispatch loop.
///
/// Owns the inbound queue for as long as it runs. A transport failure
/// forwarded by the pump is recorded as the dispatcher status and ends
/// the loop.
pub(super) async fn run_dispatcher(
	weak: Weak<ConnectionInner>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	let Some(inner) = weak.upgrade() else {
		return;
	};
	let inbound = Arc::clone(&inner.inbound_rx);
	drop(inner);

	let mut inbound = tokio::select! {
		_ = &mut shutdown_rx => return,
		inbound = inbound.lock_owned() => inbound,
	};
	info!("Auto-dispatch started");

	loop {
		let item = tokio::select! {
			_ = &mut shutdown_rx => break,
			item = inbound.recv() => item,
		};
		let Some(item) = item else {
			break;
		};
		let Some(inner) = weak.upgrade() else {
			break;
		};
		let connection = Connection::from_inner(inner);
		match item {
			| Ok(message) => connection.dispatch_queued(&message),
			| Err(err) => {
				connection.report_dispatcher_failure(&err);
				break;
			}
		}
	}
	info!("Auto-dispatch stopped");
}
