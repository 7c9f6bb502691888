use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use arcstr::ArcStr;

use super::error::{SubscriptionError, SubscriptionResult};
use crate::config::Config;
use crate::subject::{SubjectMatcherNode, SubjectPath, SubjectPattern};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// A subscription identifier, unique within one registry.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
	pub fn value(self) -> u64 {
		self.0
	}
}

impl Display for SubscriptionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "SubscriptionId({})", self.0)
	}
}

/// Handle returned by [`SubscriptionRegistry::add`].
///
/// Carries the id of the registry that issued it, so a handle presented to
/// another registry is detected rather than misinterpreted.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct SubscriptionHandle {
	registry: u64,
	id: SubscriptionId,
}

impl SubscriptionHandle {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}
}

struct SubscriptionEntry<C> {
	pattern: SubjectPattern,
	callback: Option<C>,
	config: Option<Config>,
}

/// Slot data stored in the matcher tree: every subscription sharing one
/// pattern, with its callback.
type SubscriptionTable<C> = HashMap<SubscriptionId, Option<C>>;

/// Result of adding a subscription
#[derive(Debug)]
pub struct Added {
	pub handle: SubscriptionHandle,
	/// No other subscription used this pattern before
	pub fresh: bool,
}

/// Result of removing a subscription
#[derive(Debug)]
pub struct Removed {
	pub pattern: SubjectPattern,
	/// No remaining subscription uses this pattern
	pub pattern_unused: bool,
}

/// Active subscriptions of one connection.
///
/// `C` is the callback type. Two subscriptions are duplicates when they
/// share a pattern and compare equal on their optional callback.
pub struct SubscriptionRegistry<C> {
	registry_id: u64,
	matcher: SubjectMatcherNode<SubscriptionTable<C>>,
	subscriptions: HashMap<SubscriptionId, SubscriptionEntry<C>>,
	next_id: u64,
}

impl<C: Clone + PartialEq> Default for SubscriptionRegistry<C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C: Clone + PartialEq> SubscriptionRegistry<C> {
	pub fn new() -> Self {
		Self {
			registry_id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
			matcher: SubjectMatcherNode::new(),
			subscriptions: HashMap::new(),
			next_id: 1,
		}
	}

	/// Registers a subscription.
	///
	/// The same pattern may be registered many times with different
	/// callbacks; registering an identical (pattern, callback) pair again is
	/// rejected.
	pub fn add(
		&mut self,
		pattern: SubjectPattern,
		callback: Option<C>,
		config: Option<Config>,
	) -> SubscriptionResult<Added> {
		let table = self.matcher.get_or_create(&pattern);
		if table.values().any(|existing| *existing == callback) {
			return Err(SubscriptionError::duplicate(pattern.as_str()));
		}
		let fresh = table.is_empty();

		let id = SubscriptionId(self.next_id);
		self.next_id = self.next_id.wrapping_add(1);

		table.insert(id, callback.clone());
		self.subscriptions.insert(id, SubscriptionEntry {
			pattern,
			callback,
			config,
		});

		Ok(Added {
			handle: SubscriptionHandle {
				registry: self.registry_id,
				id,
			},
			fresh,
		})
	}

	/// Removes a subscription by handle.
	pub fn remove(
		&mut self,
		handle: &SubscriptionHandle,
	) -> SubscriptionResult<Removed> {
		if handle.registry != self.registry_id {
			return Err(SubscriptionError::ForeignHandle { id: handle.id });
		}
		let entry = self
			.subscriptions
			.remove(&handle.id)
			.ok_or(SubscriptionError::UnknownHandle { id: handle.id })?;

		let mut pattern_unused = false;
		self.matcher.update_node(entry.pattern.tokens(), |table| {
			table.remove(&handle.id);
			pattern_unused = table.is_empty();
		})?;

		Ok(Removed {
			pattern: entry.pattern,
			pattern_unused,
		})
	}

	pub fn contains(&self, handle: &SubscriptionHandle) -> bool {
		handle.registry == self.registry_id
			&& self.subscriptions.contains_key(&handle.id)
	}

	/// Callbacks of every subscription matching `subject`.
	pub fn resolve(&self, subject: &SubjectPath) -> Vec<C> {
		self.matcher
			.find_by_path(subject)
			.into_iter()
			.flat_map(|table| table.values().flatten().cloned())
			.collect()
	}

	/// True if a subscription without callback matches `subject`.
	pub fn has_callbackless_subscription(&self, subject: &SubjectPath) -> bool {
		self.matcher
			.find_by_path(subject)
			.into_iter()
			.any(|table| table.values().any(Option::is_none))
	}

	/// True if any subscription matches `subject`.
	pub fn is_wanted(&self, subject: &SubjectPath) -> bool {
		self.matcher.has_match(subject)
	}

	/// Transport config attached to a subscription.
	pub fn config(&self, handle: &SubscriptionHandle) -> Option<&Config> {
		self.subscriptions
			.get(&handle.id)
			.filter(|_| handle.registry == self.registry_id)
			.and_then(|entry| entry.config.as_ref())
	}

	/// Distinct patterns with at least one subscription.
	pub fn active_patterns(&self) -> Vec<SubjectPattern> {
		let mut seen: HashMap<ArcStr, SubjectPattern> = HashMap::new();
		for entry in self.subscriptions.values() {
			seen.entry(entry.pattern.pattern())
				.or_insert_with(|| entry.pattern.clone());
		}
		seen.into_values().collect()
	}

	pub fn len(&self) -> usize {
		self.subscriptions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.subscriptions.is_empty()
	}

	/// Removes every subscription.
	pub fn clear(&mut self) {
		self.subscriptions.clear();
		self.matcher = SubjectMatcherNode::new();
	}

	/// Callback attached to a subscription.
	pub fn callback(&self, handle: &SubscriptionHandle) -> Option<&C> {
		self.subscriptions
			.get(&handle.id)
			.filter(|_| handle.registry == self.registry_id)
			.and_then(|entry| entry.callback.as_ref())
	}
}
