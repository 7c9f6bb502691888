use std::fmt;

use super::callback::Callback;
use crate::config::Config;
use crate::routing::{SubscriptionHandle, SubscriptionId};
use crate::subject::SubjectPattern;

/// Record of one subscription, returned by `subscribe*` and consumed by
/// [`Connection::unsubscribe`](super::Connection::unsubscribe).
///
/// Unsubscribing clears the handle; presenting the same info again is an
/// unknown-handle error.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
	handle: Option<SubscriptionHandle>,
	id: SubscriptionId,
	pattern: SubjectPattern,
	callback: Option<Callback>,
	config: Option<Config>,
	connection: u64,
}

impl SubscriptionInfo {
	pub(crate) fn new(
		handle: SubscriptionHandle,
		pattern: SubjectPattern,
		callback: Option<Callback>,
		config: Option<Config>,
		connection: u64,
	) -> Self {
		Self {
			handle: Some(handle),
			id: handle.id(),
			pattern,
			callback,
			config,
			connection,
		}
	}

	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	pub fn subject_pattern(&self) -> &str {
		self.pattern.as_str()
	}

	pub fn pattern(&self) -> &SubjectPattern {
		&self.pattern
	}

	pub fn callback(&self) -> Option<&Callback> {
		self.callback.as_ref()
	}

	pub fn config(&self) -> Option<&Config> {
		self.config.as_ref()
	}

	/// Number of the connection that issued this subscription
	pub fn connection_number(&self) -> u64 {
		self.connection
	}

	/// False once unsubscribed
	pub fn is_active(&self) -> bool {
		self.handle.is_some()
	}

	pub(crate) fn handle(&self) -> Option<SubscriptionHandle> {
		self.handle
	}

	pub(crate) fn invalidate(&mut self) {
		self.handle = None;
	}
}

impl fmt::Display for SubscriptionInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} on '{}'", self.id, self.pattern)
	}
}
