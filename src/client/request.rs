//! Request timing options and the background request reaper

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use super::connection::{Connection, ConnectionInner};
use crate::lock;

/// Smallest accepted republish interval
pub const MIN_REPUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// How long a request waits for its (final) reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
	After(Duration),
	/// No absolute deadline. Without a republish interval a blocking
	/// request then waits until a reply arrives or the connection closes.
	WaitForever,
}

impl Timeout {
	/// Negative values mean [`Timeout::WaitForever`].
	pub fn from_millis(millis: i64) -> Self {
		match u64::try_from(millis) {
			| Ok(millis) => Timeout::After(Duration::from_millis(millis)),
			| Err(_) => Timeout::WaitForever,
		}
	}

	pub fn duration(self) -> Option<Duration> {
		match self {
			| Timeout::After(duration) => Some(duration),
			| Timeout::WaitForever => None,
		}
	}
}

impl From<Duration> for Timeout {
	fn from(duration: Duration) -> Self {
		Timeout::After(duration)
	}
}

/// Whether and how often an unanswered request is sent again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Republish {
	#[default]
	Never,
	/// Use the connection's `gmsec-req-republish-ms` setting
	Default,
	Every(Duration),
}

impl Republish {
	/// Zero selects the connection default; negative values mean
	/// [`Republish::Never`].
	pub fn from_millis(millis: i64) -> Self {
		match u64::try_from(millis) {
			| Ok(0) => Republish::Default,
			| Ok(millis) => Republish::Every(Duration::from_millis(millis)),
			| Err(_) => Republish::Never,
		}
	}

	/// Effective interval, raised to [`MIN_REPUBLISH_INTERVAL`].
	pub fn interval(self, default: Option<Duration>) -> Option<Duration> {
		let interval = match self {
			| Republish::Never => None,
			| Republish::Default => default,
			| Republish::Every(interval) => Some(interval),
		}?;
		(!interval.is_zero()).then(|| interval.max(MIN_REPUBLISH_INTERVAL))
	}
}

/// Subject replies to a request on `request_subject` are published on.
///
/// The first `.REQ.` token is replaced by `.RESP.`; subjects without one
/// get `.RESP` appended.
pub fn response_subject(request_subject: &str) -> String {
	const REQ: &str = ".REQ.";
	match request_subject.find(REQ) {
		| Some(at) => format!(
			"{}.RESP.{}",
			&request_subject[.. at],
			&request_subject[at + REQ.len() ..]
		),
		| None => format!("{request_subject}.RESP"),
	}
}

/// Expires and republishes pending requests.
///
/// Sleeps until the earliest pending deadline, or until woken because a
/// new request was registered.
pub(super) async fn run_request_worker(
	weak: Weak<ConnectionInner>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	loop {
		let Some(inner) = weak.upgrade() else {
			break;
		};
		let notify = Arc::clone(&inner.request_notify);
		let deadline = lock(&inner.router).pending.next_deadline();
		drop(inner);

		tokio::select! {
			_ = &mut shutdown_rx => break,
			_ = notify.notified() => continue,
			_ = sleep_until_deadline(deadline) => {}
		}

		let Some(inner) = weak.upgrade() else {
			break;
		};
		trace!("Reaping pending requests");
		Connection::from_inner(inner).reap_requests().await;
	}
	debug!("Request worker terminated");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
	match deadline {
		| Some(deadline) => sleep_until(deadline).await,
		| None => std::future::pending().await,
	}
}
