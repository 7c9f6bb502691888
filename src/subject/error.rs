//! Error types and utilities for the subject module

use thiserror::Error;

/// Errors raised while parsing or validating subjects and subject patterns
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
	/// Subject or pattern is empty
	#[error("Subject cannot be empty")]
	Empty,

	/// Two consecutive separators, or a leading/trailing separator
	#[error("Subject '{subject}' contains an empty token at position {position}")]
	EmptyToken { subject: String, position: usize },

	/// Token contains characters outside the subject alphabet
	#[error("Invalid token '{token}' at position {position}")]
	InvalidToken { token: String, position: usize },

	/// `>` or `+` used anywhere but the final token
	#[error(
		"Invalid subject pattern '{pattern}': '{wildcard}' can only be the \
		 last token"
	)]
	WildcardPosition { pattern: String, wildcard: char },

	/// Wildcards are only valid in subscription patterns
	#[error("Subject '{subject}' contains wildcards and cannot be published")]
	WildcardInSubject { subject: String },

	/// Subject exceeds one of the size limits
	#[error("Subject exceeds limit: {details}")]
	LimitExceeded { details: String },
}

impl SubjectError {
	/// Creates a new EmptyToken error
	pub fn empty_token(subject: impl Into<String>, position: usize) -> Self {
		Self::EmptyToken {
			subject: subject.into(),
			position,
		}
	}

	/// Creates a new InvalidToken error
	pub fn invalid_token(token: impl Into<String>, position: usize) -> Self {
		Self::InvalidToken {
			token: token.into(),
			position,
		}
	}

	/// Creates a new WildcardPosition error
	pub fn wildcard_position(pattern: impl Into<String>, wildcard: char) -> Self {
		Self::WildcardPosition {
			pattern: pattern.into(),
			wildcard,
		}
	}

	/// Creates a new WildcardInSubject error
	pub fn wildcard_in_subject(subject: impl Into<String>) -> Self {
		Self::WildcardInSubject {
			subject: subject.into(),
		}
	}

	/// Creates a new LimitExceeded error
	pub fn limit_exceeded(details: impl Into<String>) -> Self {
		Self::LimitExceeded {
			details: details.into(),
		}
	}
}

/// Convenient Result type for subject operations
pub type SubjectResult<T> = Result<T, SubjectError>;

/// Subject processing limits
pub mod limits {
	/// Maximum number of tokens in a subject
	pub const MAX_SUBJECT_DEPTH: usize = 32;

	/// Maximum length of a single token
	pub const MAX_TOKEN_LENGTH: usize = 256;

	/// Maximum total subject length
	pub const MAX_SUBJECT_LENGTH: usize = 1024;
}

/// Validation utilities for subjects
pub mod validation {
	use super::SubjectError;
	use super::limits::*;

	/// Characters allowed in a literal token
	pub fn is_token_char(c: char) -> bool {
		c.is_ascii_alphanumeric() || c == '-' || c == '_'
	}

	/// Checks size limits shared by subjects and patterns, and that no
	/// token is empty.
	pub fn validate_shape(subject: &str) -> Result<(), SubjectError> {
		if subject.is_empty() || subject.trim().is_empty() {
			return Err(SubjectError::Empty);
		}

		if subject.len() > MAX_SUBJECT_LENGTH {
			return Err(SubjectError::limit_exceeded(format!(
				"subject too long: {} > {}",
				subject.len(),
				MAX_SUBJECT_LENGTH
			)));
		}

		let depth = subject.split('.').count();
		if depth > MAX_SUBJECT_DEPTH {
			return Err(SubjectError::limit_exceeded(format!(
				"too many tokens: {depth} > {MAX_SUBJECT_DEPTH}"
			)));
		}

		for (position, token) in subject.split('.').enumerate() {
			if token.is_empty() {
				return Err(SubjectError::empty_token(subject, position));
			}
			if token.len() > MAX_TOKEN_LENGTH {
				return Err(SubjectError::limit_exceeded(format!(
					"token {position} too long: {} > {MAX_TOKEN_LENGTH}",
					token.len()
				)));
			}
		}

		Ok(())
	}

	/// Validates a subject used for publishing: no wildcards allowed.
	pub fn validate_publish_subject(subject: &str) -> Result<(), SubjectError> {
		validate_shape(subject)?;
		for (position, token) in subject.split('.').enumerate() {
			if matches!(token, "*" | ">" | "+") {
				return Err(SubjectError::wildcard_in_subject(subject));
			}
			if !token.chars().all(is_token_char) {
				return Err(SubjectError::invalid_token(token, position));
			}
		}
		Ok(())
	}
}
