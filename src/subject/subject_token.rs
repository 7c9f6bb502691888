//! Subject pattern tokens

use std::convert::TryFrom;

use arcstr::Substr;

use super::error::SubjectError;
use super::validation::is_token_char;

/// One token of a subject pattern: a literal or a wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectToken {
	/// Literal token, compared exactly
	Literal(Substr),
	/// `*`: exactly one token
	Star,
	/// `>`: one or more trailing tokens
	Greater,
	/// `+`: zero or more trailing tokens
	Plus,
}

impl SubjectToken {
	/// Returns string representation of the token.
	pub fn as_str(&self) -> &str {
		match self {
			| SubjectToken::Literal(s) => s,
			| SubjectToken::Star => "*",
			| SubjectToken::Greater => ">",
			| SubjectToken::Plus => "+",
		}
	}

	/// Returns true if this token is a wildcard.
	pub fn is_wildcard(&self) -> bool {
		!matches!(self, SubjectToken::Literal(_))
	}

	/// Returns true for wildcards that may only end a pattern.
	pub fn is_trailing_wildcard(&self) -> bool {
		matches!(self, SubjectToken::Greater | SubjectToken::Plus)
	}
}

impl std::fmt::Display for SubjectToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

impl TryFrom<Substr> for SubjectToken {
	type Error = SubjectError;
	fn try_from(token: Substr) -> Result<Self, Self::Error> {
		let res = match token.as_str() {
			| "*" => SubjectToken::Star,
			| ">" => SubjectToken::Greater,
			| "+" => SubjectToken::Plus,
			| _ if token.chars().all(is_token_char) && !token.is_empty() => {
				SubjectToken::Literal(token)
			}
			| _ => return Err(SubjectError::invalid_token(token.as_str(), 0)),
		};
		Ok(res)
	}
}
