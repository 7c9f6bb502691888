use std::convert::TryFrom;
use std::fmt::{self, Display};
use std::slice::Iter;

use arcstr::ArcStr;
use smallvec::SmallVec;

use super::error::{SubjectError, SubjectResult};
use super::subject_path::SubjectPath;
use super::subject_token::SubjectToken;
use super::validation;

/// Parsed subscription or exclusion pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectPattern {
	pattern: ArcStr,
	tokens: SmallVec<[SubjectToken; 8]>,
}

impl SubjectPattern {
	/// Parses and validates a subject pattern.
	///
	/// Malformed patterns are rejected here so that routing never has to
	/// deal with them.
	pub fn new(pattern: impl Into<ArcStr>) -> SubjectResult<Self> {
		let pattern = pattern.into();
		validation::validate_shape(&pattern)?;

		let tokens = pattern
			.split('.')
			.enumerate()
			.map(|(position, token)| {
				SubjectToken::try_from(pattern.substr_from(token)).map_err(
					|_| SubjectError::invalid_token(token, position),
				)
			})
			.collect::<Result<SmallVec<[SubjectToken; 8]>, _>>()?;

		if let Some(position) =
			tokens.iter().position(SubjectToken::is_trailing_wildcard)
		{
			if position != tokens.len() - 1 {
				let wildcard = match tokens[position] {
					| SubjectToken::Plus => '+',
					| _ => '>',
				};
				return Err(SubjectError::wildcard_position(
					pattern.as_str(),
					wildcard,
				));
			}
		}

		Ok(Self { pattern, tokens })
	}

	pub fn as_str(&self) -> &str {
		&self.pattern
	}

	pub fn pattern(&self) -> ArcStr {
		self.pattern.clone()
	}

	pub fn tokens(&self) -> &[SubjectToken] {
		&self.tokens
	}

	pub fn iter(&self) -> Iter<'_, SubjectToken> {
		self.tokens.iter()
	}

	/// Returns true if any token is a wildcard.
	pub fn has_wildcards(&self) -> bool {
		self.tokens.iter().any(SubjectToken::is_wildcard)
	}

	/// Token-by-token match of a concrete subject against this pattern.
	pub fn matches(&self, subject: &SubjectPath) -> bool {
		match_tokens(&self.tokens, subject.tokens())
	}
}

fn match_tokens(pattern: &[SubjectToken], subject: &[arcstr::Substr]) -> bool {
	match (pattern, subject) {
		| ([], []) => true,
		| ([SubjectToken::Greater], rest) => !rest.is_empty(),
		| ([SubjectToken::Plus], _) => true,
		| ([], _) | (_, []) => false,
		| ([SubjectToken::Star, pattern_rest @ ..], [_, subject_rest @ ..]) => {
			match_tokens(pattern_rest, subject_rest)
		}
		| (
			[SubjectToken::Literal(literal), pattern_rest @ ..],
			[token, subject_rest @ ..],
		) => literal == token && match_tokens(pattern_rest, subject_rest),
		| _ => false,
	}
}

impl Display for SubjectPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.pattern)
	}
}

impl TryFrom<&str> for SubjectPattern {
	type Error = SubjectError;

	fn try_from(pattern: &str) -> Result<Self, Self::Error> {
		Self::new(pattern)
	}
}
