//! Message codecs used for aggregated (binned) envelopes.

use std::fmt::Debug;

use thiserror::Error;

use crate::message::Message;

/// Errors raised by a [`MessageCodec`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
	#[error("Failed to encode message: {0}")]
	Encode(String),

	#[error("Failed to decode message: {0}")]
	Decode(String),

	/// Envelope payload ended before the announced length
	#[error("Truncated payload: expected {expected} bytes, {available} available")]
	Truncated { expected: usize, available: usize },

	#[error("Unknown message codec '{0}'")]
	UnknownCodec(String),
}

/// Converts messages to and from bytes.
///
/// Implement this trait to use a custom encoding for aggregated envelopes.
pub trait MessageCodec: Debug + Send + Sync + 'static {
	/// Short codec name, as accepted by [`codec_by_name`]
	fn name(&self) -> &'static str;
	/// Convert a message to bytes
	fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;
	/// Convert bytes back into a message
	fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// Default codec using the bincode format.
#[derive(Clone)]
pub struct BincodeCodec {
	config: bincode::config::Configuration,
}

impl Default for BincodeCodec {
	fn default() -> Self {
		Self {
			config: bincode::config::standard(),
		}
	}
}

impl Debug for BincodeCodec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BincodeCodec").finish_non_exhaustive()
	}
}

impl BincodeCodec {
	/// Creates a new codec with default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a codec with custom bincode configuration.
	pub fn with_config(config: bincode::config::Configuration) -> Self {
		Self { config }
	}
}

impl MessageCodec for BincodeCodec {
	fn name(&self) -> &'static str {
		"bincode"
	}

	fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
		bincode::serde::encode_to_vec(message, self.config)
			.map_err(|e| CodecError::Encode(e.to_string()))
	}

	fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
		bincode::serde::decode_from_slice(bytes, self.config)
			.map(|(message, _)| message)
			.map_err(|e| CodecError::Decode(e.to_string()))
	}
}

/// JSON codec, enabled by the `json` feature.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl MessageCodec for JsonCodec {
	fn name(&self) -> &'static str {
		"json"
	}

	fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
		serde_json::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
	}

	fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
		serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
	}
}

/// Looks up a built-in codec by name.
pub fn codec_by_name(
	name: &str,
) -> Result<std::sync::Arc<dyn MessageCodec>, CodecError> {
	match name.to_ascii_lowercase().as_str() {
		| "bincode" => Ok(std::sync::Arc::new(BincodeCodec::new())),
		#[cfg(feature = "json")]
		| "json" => Ok(std::sync::Arc::new(JsonCodec)),
		| other => Err(CodecError::UnknownCodec(other.to_string())),
	}
}
