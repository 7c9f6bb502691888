use thiserror::Error;

use super::subscription_registry::SubscriptionId;
use crate::subject::{SubjectError, SubjectMatcherError};

/// Errors raised by subscription management
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
	/// Pattern failed validation
	#[error("Invalid subject pattern: {0}")]
	InvalidPattern(#[from] SubjectError),

	/// Same pattern already registered with the same callback
	#[error("Duplicate subscription to '{pattern}'")]
	Duplicate { pattern: String },

	/// Handle unknown to this registry or already removed
	#[error("Unknown subscription handle {id}")]
	UnknownHandle { id: SubscriptionId },

	/// Handle created by a different connection
	#[error("Subscription {id} belongs to a different connection")]
	ForeignHandle { id: SubscriptionId },

	/// Matcher tree out of sync with the subscription table
	#[error("Subscription matcher failed: {0}")]
	Matcher(#[from] SubjectMatcherError),
}

impl SubscriptionError {
	/// Creates a new Duplicate error
	pub fn duplicate(pattern: impl Into<String>) -> Self {
		Self::Duplicate {
			pattern: pattern.into(),
		}
	}
}

/// Errors raised by request/reply correlation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
	/// A request with this correlation id is already pending
	#[error("Request id {request_id} is already pending")]
	DuplicateRequestId { request_id: u64 },

	/// Caller-supplied `REQUEST-ID` is not a non-negative integer
	#[error("Invalid REQUEST-ID value '{value}'")]
	InvalidRequestId { value: String },

	/// No reply arrived before the deadline
	#[error("Request {request_id} timed out")]
	Timeout { request_id: u64 },

	/// Connection went away while the request was pending
	#[error("Request {request_id} interrupted: {reason}")]
	Interrupted { request_id: u64, reason: String },
}

impl RequestError {
	/// Creates a new Interrupted error
	pub fn interrupted(request_id: u64, reason: impl Into<String>) -> Self {
		Self::Interrupted {
			request_id,
			reason: reason.into(),
		}
	}
}

/// Convenient Result type for subscription operations
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

/// Convenient Result type for request operations
pub type RequestResult<T> = Result<T, RequestError>;
