//! Periodic publishers
//!
//! A [`PeriodicPublisher`] republishes a template message on a connection
//! every `PUB-RATE` seconds from a background task. Heartbeat and resource
//! generators are thin wrappers that build the template.

pub mod heartbeat;
pub mod periodic;
pub mod resource;

use thiserror::Error;

use crate::client::ConnectionError;
use crate::message::Kind;

pub use heartbeat::HeartbeatGenerator;
pub use periodic::{DEFAULT_PUB_RATE, PeriodicPublisher};
pub use resource::{FieldSampler, ResourceGenerator};

/// Errors reported by periodic publishers
#[derive(Error, Debug)]
pub enum GeneratorError {
	/// `PUB-RATE` must be zero or positive
	#[error("Invalid publish rate {value}: must not be negative")]
	NegativeRate { value: i64 },

	#[error("Invalid value for field '{name}': {reason}")]
	InvalidField { name: String, reason: String },

	#[error("Generator template must be a {expected} message, got {actual}")]
	InvalidMessageKind { expected: Kind, actual: Kind },

	/// Resource sampling needs `1 <= sample <= average`
	#[error(
		"Invalid sampling: sample interval {sample}s, averaging window {average}s"
	)]
	InvalidSampling { sample: u32, average: u32 },

	#[error("Connection error: {0}")]
	Connection(#[from] ConnectionError),
}

impl GeneratorError {
	/// Creates a new InvalidField error
	pub fn invalid_field(
		name: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::InvalidField {
			name: name.into(),
			reason: reason.into(),
		}
	}
}
