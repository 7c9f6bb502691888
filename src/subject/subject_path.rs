use std::fmt;

use arcstr::{ArcStr, Substr};

use super::error::SubjectResult;
use super::validation;

/// A concrete subject split into tokens.
///
/// Tokens are [`Substr`] slices sharing the subject's allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectPath {
	path: ArcStr,
	tokens: Vec<Substr>,
}

impl SubjectPath {
	/// Splits `path` on `.` without validating it.
	pub fn new(path: impl Into<ArcStr>) -> Self {
		let path = path.into();
		let tokens: Vec<Substr> =
			path.split('.').map(|s| path.substr_from(s)).collect();
		Self { path, tokens }
	}

	/// Parses a subject that is about to be published.
	pub fn for_publish(path: impl Into<ArcStr>) -> SubjectResult<Self> {
		let path = path.into();
		validation::validate_publish_subject(&path)?;
		Ok(Self::new(path))
	}

	pub fn as_str(&self) -> &str {
		&self.path
	}

	pub fn path(&self) -> ArcStr {
		self.path.clone()
	}

	pub fn tokens(&self) -> &[Substr] {
		&self.tokens
	}
}

impl fmt::Display for SubjectPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.path)
	}
}
