use std::collections::{HashMap, HashSet};

use arcstr::Substr;
use thiserror::Error;

use super::subject_path::SubjectPath;
use super::subject_pattern::SubjectPattern;
use super::subject_token::SubjectToken;

/// Errors that can occur while updating the matcher tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectMatcherError {
	/// No node exists for the given pattern token
	#[error("No matcher node for token '{token}' at position {position}")]
	MissingNode { token: String, position: usize },
}

impl SubjectMatcherError {
	/// Creates a new MissingNode error
	pub fn missing_node(token: impl Into<String>, position: usize) -> Self {
		Self::MissingNode {
			token: token.into(),
			position,
		}
	}
}

/// Node in the subject matching tree.
///
/// Each node represents one token position. Data stored at a node belongs
/// to every pattern ending there; trailing wildcards keep their data on the
/// node that precedes them.
#[derive(Debug)]
pub struct SubjectMatcherNode<T> {
	/// Data for patterns ending exactly at this node
	exact_match_data: Option<T>,

	/// Children for literal next tokens
	exact_children: HashMap<Substr, SubjectMatcherNode<T>>,

	/// Child for a `*` next token
	star_node: Option<Box<SubjectMatcherNode<T>>>,

	/// Data for a trailing `>` (one or more remaining tokens)
	greater_data: Option<T>,

	/// Data for a trailing `+` (zero or more remaining tokens)
	plus_data: Option<T>,
}

pub trait Len {
	fn len(&self) -> usize;
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<T> Len for HashSet<T> {
	fn len(&self) -> usize {
		self.len()
	}
	fn is_empty(&self) -> bool {
		self.is_empty()
	}
}

impl<K, V> Len for HashMap<K, V> {
	fn len(&self) -> usize {
		self.len()
	}
	fn is_empty(&self) -> bool {
		self.is_empty()
	}
}

impl<T: Default + Len> Default for SubjectMatcherNode<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Default + Len> SubjectMatcherNode<T> {
	/// Creates a new empty matcher node
	pub fn new() -> Self {
		Self {
			exact_match_data: None,
			exact_children: HashMap::new(),
			star_node: None,
			greater_data: None,
			plus_data: None,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.exact_match_data.as_ref().is_none_or(T::is_empty)
			&& self.exact_children.is_empty()
			&& self.star_node.is_none()
			&& self.greater_data.as_ref().is_none_or(T::is_empty)
			&& self.plus_data.as_ref().is_none_or(T::is_empty)
	}

	/// Finds or creates the data slot for the given pattern
	pub fn get_or_create(&mut self, pattern: &SubjectPattern) -> &mut T {
		let mut current_node = self;

		for token in pattern.iter() {
			match token {
				| SubjectToken::Literal(s) => {
					current_node =
						current_node.exact_children.entry(s.clone()).or_default()
				}
				| SubjectToken::Star => {
					current_node = current_node
						.star_node
						.get_or_insert_with(|| Box::new(SubjectMatcherNode::new()))
				}
				// Trailing wildcards are always last, return immediately
				| SubjectToken::Greater => {
					return current_node.greater_data.get_or_insert_with(T::default);
				}
				| SubjectToken::Plus => {
					return current_node.plus_data.get_or_insert_with(T::default);
				}
			}
		}
		current_node.exact_match_data.get_or_insert_with(T::default)
	}

	/// Applies `f` to the data slot of the given pattern and prunes nodes
	/// left empty. Returns true when this node became empty.
	pub fn update_node<F>(
		&mut self,
		pattern: &[SubjectToken],
		f: F,
	) -> Result<bool, SubjectMatcherError>
	where
		F: FnMut(&mut T),
	{
		self.update_node_at(pattern, 0, f)
	}

	fn update_node_at<F>(
		&mut self,
		pattern: &[SubjectToken],
		position: usize,
		mut f: F,
	) -> Result<bool, SubjectMatcherError>
	where
		F: FnMut(&mut T),
	{
		let Some((current, rest)) = pattern.split_first() else {
			let data = self.exact_match_data.as_mut().ok_or_else(|| {
				SubjectMatcherError::missing_node("<end>", position)
			})?;
			f(data);
			if data.is_empty() {
				self.exact_match_data = None
			}
			return Ok(self.is_empty());
		};

		match current {
			| SubjectToken::Literal(s) => {
				let child = self.exact_children.get_mut(s).ok_or_else(|| {
					SubjectMatcherError::missing_node(s.as_str(), position)
				})?;
				if child.update_node_at(rest, position + 1, f)? {
					self.exact_children.remove(s);
					return Ok(self.is_empty());
				}
			}
			| SubjectToken::Star => {
				let child = self.star_node.as_mut().ok_or_else(|| {
					SubjectMatcherError::missing_node("*", position)
				})?;
				if child.update_node_at(rest, position + 1, f)? {
					self.star_node = None;
					return Ok(self.is_empty());
				}
			}
			| SubjectToken::Greater | SubjectToken::Plus => {
				let slot = if matches!(current, SubjectToken::Greater) {
					&mut self.greater_data
				} else {
					&mut self.plus_data
				};
				let data = slot.as_mut().ok_or_else(|| {
					SubjectMatcherError::missing_node(current.as_str(), position)
				})?;
				f(data);
				if data.is_empty() {
					*slot = None;
					return Ok(self.is_empty());
				}
			}
		}
		Ok(false)
	}

	/// Recursively collects all data whose pattern matches the given tokens
	fn collect_matching<'a>(
		&'a self,
		subject: &[Substr],
		matching_data: &mut Vec<&'a T>,
	) {
		match subject {
			| [] => {
				self.exact_match_data
					.iter()
					.for_each(|data| matching_data.push(data));
				// `+` also matches zero remaining tokens
				self.plus_data
					.iter()
					.for_each(|data| matching_data.push(data));
			}
			| [token, remaining @ ..] => {
				if let Some(child) = self.exact_children.get(token) {
					child.collect_matching(remaining, matching_data);
				}
				self.star_node
					.iter()
					.for_each(|star| star.collect_matching(remaining, matching_data));
				self.greater_data
					.iter()
					.chain(self.plus_data.iter())
					.for_each(|data| matching_data.push(data));
			}
		}
	}

	/// Finds all data entries whose pattern matches the given subject
	pub fn find_by_path<'a>(&'a self, subject: &SubjectPath) -> Vec<&'a T> {
		let mut matching = Vec::new();
		self.collect_matching(subject.tokens(), &mut matching);
		matching
	}

	/// Returns true if any stored pattern matches the subject
	pub fn has_match(&self, subject: &SubjectPath) -> bool {
		self.find_by_path(subject).iter().any(|data| !data.is_empty())
	}
}
