use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;

use crate::subject::{SubjectMatcherNode, SubjectPath, SubjectPattern};

/// Subject patterns whose messages are dropped before dispatch.
#[derive(Default)]
pub struct ExclusionSet {
	matcher: SubjectMatcherNode<HashSet<ArcStr>>,
	patterns: HashMap<ArcStr, SubjectPattern>,
}

impl ExclusionSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a pattern. Returns false if it was already excluded.
	pub fn add(&mut self, pattern: SubjectPattern) -> bool {
		let key = pattern.pattern();
		if self.patterns.contains_key(&key) {
			return false;
		}
		self.matcher.get_or_create(&pattern).insert(key.clone());
		self.patterns.insert(key, pattern);
		true
	}

	/// Removes a pattern. Returns false if it was not excluded.
	pub fn remove(&mut self, pattern: &SubjectPattern) -> bool {
		let Some(stored) = self.patterns.remove(pattern.as_str()) else {
			return false;
		};
		// Both maps are updated together, so the node exists
		let _ = self.matcher.update_node(stored.tokens(), |set| {
			set.remove(stored.as_str());
		});
		true
	}

	pub fn is_excluded(&self, subject: &SubjectPath) -> bool {
		self.matcher.has_match(subject)
	}

	pub fn patterns(&self) -> impl Iterator<Item = &SubjectPattern> {
		self.patterns.values()
	}

	pub fn len(&self) -> usize {
		self.patterns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.patterns.is_empty()
	}

	pub fn clear(&mut self) {
		*self = Self::default();
	}
}
