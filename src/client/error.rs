use std::fmt;

use crate::config::ConfigError;
use crate::message::Kind;
use crate::message_codec::CodecError;
use crate::routing::{RequestError, SubscriptionError};
use crate::subject::SubjectError;
use crate::transport::TransportError;

/// Error taxonomy shared by results and status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	ConfigurationError,
	NotInitialized,
	ConnectionError,
	InvalidSubject,
	InvalidMessageKind,
	DuplicateSubscription,
	UnknownSubscriptionHandle,
	InvalidRequest,
	RequestTimeout,
	DispatcherError,
	ValidationError,
	EncodingError,
}

/// Errors returned by [`Connection`](super::Connection) operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
	/// Operation attempted before connect or after disconnect
	#[error("{operation} requires an established connection")]
	NotInitialized { operation: &'static str },

	#[error("Connection is already established")]
	AlreadyConnected,

	/// Link was lost; disconnect before connecting again
	#[error("Connection is broken: {reason}")]
	Broken { reason: String },

	#[error("Configuration error: {0}")]
	Configuration(#[from] ConfigError),

	#[error("Invalid subject: {0}")]
	Subject(#[from] SubjectError),

	#[error("Subscription error: {0}")]
	Subscription(#[from] SubscriptionError),

	#[error("Request error: {0}")]
	Request(#[from] RequestError),

	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Codec error: {0}")]
	Codec(#[from] CodecError),

	#[error("{operation} requires a {expected} message, got {actual}")]
	InvalidMessageKind {
		operation: &'static str,
		expected: Kind,
		actual: Kind,
	},

	/// Rejected by the installed message validator
	#[error("Message '{subject}' failed validation: {reason}")]
	Validation { subject: String, reason: String },

	#[error("Auto-dispatch is already running")]
	DispatcherRunning,

	#[error("Auto-dispatch is not running")]
	DispatcherNotRunning,

	/// An aggregated envelope could not be published
	#[error("Failed to publish aggregated messages on '{subject}': {reason}")]
	PublishFailure { subject: String, reason: String },
}

impl ConnectionError {
	/// Creates a new NotInitialized error
	pub fn not_initialized(operation: &'static str) -> Self {
		Self::NotInitialized { operation }
	}

	/// Creates a new InvalidMessageKind error
	pub fn invalid_kind(
		operation: &'static str,
		expected: Kind,
		actual: Kind,
	) -> Self {
		Self::InvalidMessageKind {
			operation,
			expected,
			actual,
		}
	}

	/// Maps the error onto the shared taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			| Self::NotInitialized { .. } => ErrorKind::NotInitialized,
			| Self::AlreadyConnected
			| Self::Broken { .. }
			| Self::PublishFailure { .. } => ErrorKind::ConnectionError,
			| Self::Configuration(_) => ErrorKind::ConfigurationError,
			| Self::Subject(_) => ErrorKind::InvalidSubject,
			| Self::Subscription(err) => match err {
				| SubscriptionError::InvalidPattern(_) => ErrorKind::InvalidSubject,
				| SubscriptionError::Duplicate { .. } => {
					ErrorKind::DuplicateSubscription
				}
				| SubscriptionError::UnknownHandle { .. }
				| SubscriptionError::ForeignHandle { .. }
				| SubscriptionError::Matcher(_) => {
					ErrorKind::UnknownSubscriptionHandle
				}
			},
			| Self::Request(err) => match err {
				| RequestError::Timeout { .. } => ErrorKind::RequestTimeout,
				| RequestError::DuplicateRequestId { .. }
				| RequestError::InvalidRequestId { .. } => ErrorKind::InvalidRequest,
				| RequestError::Interrupted { .. } => ErrorKind::ConnectionError,
			},
			| Self::Transport(TransportError::UnknownMiddleware { .. }) => {
				ErrorKind::ConfigurationError
			}
			| Self::Transport(_) => ErrorKind::ConnectionError,
			| Self::Codec(CodecError::UnknownCodec(_)) => {
				ErrorKind::ConfigurationError
			}
			| Self::Codec(_) => ErrorKind::EncodingError,
			| Self::InvalidMessageKind { .. } => ErrorKind::InvalidMessageKind,
			| Self::Validation { .. } => ErrorKind::ValidationError,
			| Self::DispatcherRunning | Self::DispatcherNotRunning => {
				ErrorKind::DispatcherError
			}
		}
	}
}

/// Outcome reported across the callback boundary.
///
/// Event callbacks and [`Connection::last_dispatcher_status`](super::Connection::last_dispatcher_status)
/// receive a `Status` rather than an error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	kind: Option<ErrorKind>,
	reason: String,
}

impl Status {
	pub fn ok(reason: impl Into<String>) -> Self {
		Self {
			kind: None,
			reason: reason.into(),
		}
	}

	pub fn error(kind: ErrorKind, reason: impl Into<String>) -> Self {
		Self {
			kind: Some(kind),
			reason: reason.into(),
		}
	}

	pub fn is_error(&self) -> bool {
		self.kind.is_some()
	}

	pub fn kind(&self) -> Option<ErrorKind> {
		self.kind
	}

	pub fn reason(&self) -> &str {
		&self.reason
	}
}

impl From<&ConnectionError> for Status {
	fn from(err: &ConnectionError) -> Self {
		Status::error(err.kind(), err.to_string())
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.kind {
			| Some(kind) => write!(f, "[{kind:?}] {}", self.reason),
			| None => write!(f, "[OK] {}", self.reason),
		}
	}
}
