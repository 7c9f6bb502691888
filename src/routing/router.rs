use std::num::NonZeroUsize;

use arcstr::ArcStr;
use lru::LruCache;
use tokio::time::Instant;

use super::exclusion::ExclusionSet;
use super::pending_requests::{Completion, PendingRequestTable};
use super::subscription_registry::SubscriptionRegistry;
use crate::message::{Kind, Message};
use crate::subject::SubjectPath;

/// Where an inbound message goes
#[derive(Debug)]
pub enum Route<C, R> {
	/// Subject matched an exclusion pattern
	Excluded,
	/// Reply correlated with a pending request
	Reply(Completion<R>),
	/// Ordinary delivery
	Deliver {
		callbacks: Vec<C>,
		/// A callbackless subscription also wants the message
		poll: bool,
	},
	/// Nothing is interested in the message
	Unwanted,
}

/// Subscription registry, exclusion set and pending-request table of one
/// connection, mutated together under a single lock.
pub struct Router<C, R> {
	pub subscriptions: SubscriptionRegistry<C>,
	pub exclusions: ExclusionSet,
	pub pending: PendingRequestTable<R>,
	subject_cache: LruCache<ArcStr, SubjectPath>,
}

impl<C: Clone + PartialEq, R: Clone> Router<C, R> {
	pub fn new(subject_cache_size: NonZeroUsize) -> Self {
		Self {
			subscriptions: SubscriptionRegistry::new(),
			exclusions: ExclusionSet::new(),
			pending: PendingRequestTable::new(),
			subject_cache: LruCache::new(subject_cache_size),
		}
	}

	/// Parsed subject, cached for repeated lookups.
	pub fn subject_path(&mut self, subject: &str) -> SubjectPath {
		if let Some(path) = self.subject_cache.get(subject) {
			return path.clone();
		}
		let path = SubjectPath::new(subject);
		self.subject_cache.put(path.path(), path.clone());
		path
	}

	/// Routes one message.
	///
	/// Exclusion is checked first, then reply correlation, then
	/// subscription matching.
	pub fn route(&mut self, message: &Message, now: Instant) -> Route<C, R> {
		let subject = self.subject_path(message.subject());

		if self.exclusions.is_excluded(&subject) {
			return Route::Excluded;
		}

		if message.kind() == Kind::Reply {
			if let Some(request_id) = message.request_id() {
				if let Some(completion) =
					self.pending.complete(request_id, message, now)
				{
					return Route::Reply(completion);
				}
			}
		}

		self.deliver(&subject)
	}

	/// Routes a message that already went through reply correlation:
	/// exclusion and subscription matching only.
	pub fn resolve(&mut self, message: &Message) -> Route<C, R> {
		let subject = self.subject_path(message.subject());
		if self.exclusions.is_excluded(&subject) {
			return Route::Excluded;
		}
		self.deliver(&subject)
	}

	fn deliver(&self, subject: &SubjectPath) -> Route<C, R> {
		let callbacks = self.subscriptions.resolve(subject);
		let poll = self.subscriptions.has_callbackless_subscription(subject);
		if callbacks.is_empty() && !poll {
			Route::Unwanted
		} else {
			Route::Deliver { callbacks, poll }
		}
	}

	/// Clears subscriptions and exclusions.
	pub fn reset(&mut self) {
		self.subscriptions.clear();
		self.exclusions.clear();
		self.subject_cache.clear();
	}
}
