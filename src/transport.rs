//! Transport capability
//!
//! The connection core never talks to a wire protocol directly. It drives a
//! [`Transport`] object created by a middleware factory registered under a
//! `mw-id` (see [`registry`]). The built-in [`loopback`] middleware routes
//! messages between connections inside the current process.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::message::Message;
use crate::subject::SubjectPattern;

pub mod loopback;
pub mod registry;

pub use loopback::{LoopbackFactory, LoopbackTransport};
pub use registry::{
	MiddlewareFactory, create_transport, register_middleware,
	shutdown_all_middlewares, shutdown_middleware,
};

/// Errors reported by transports and the middleware registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	/// Operation requires an established link
	#[error("Transport is not connected")]
	NotConnected,

	/// Link could not be established
	#[error("Unable to connect to '{server}': {reason}")]
	ConnectFailed { server: String, reason: String },

	/// Established link was lost
	#[error("Connection link broken: {reason}")]
	LinkBroken { reason: String },

	/// Message could not be handed to the middleware
	#[error("Failed to send message on '{subject}': {reason}")]
	SendFailed { subject: String, reason: String },

	/// Subscription could not be registered with the middleware
	#[error("Failed to subscribe to '{pattern}': {reason}")]
	SubscribeFailed { pattern: String, reason: String },

	/// No factory registered under the requested middleware id
	#[error("Unknown middleware id '{id}'")]
	UnknownMiddleware { id: String },

	#[error("Transport error: {0}")]
	Other(String),
}

impl TransportError {
	/// Creates a new ConnectFailed error
	pub fn connect_failed(
		server: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::ConnectFailed {
			server: server.into(),
			reason: reason.into(),
		}
	}

	/// Creates a new LinkBroken error
	pub fn link_broken(reason: impl Into<String>) -> Self {
		Self::LinkBroken {
			reason: reason.into(),
		}
	}

	/// Creates a new SendFailed error
	pub fn send_failed(
		subject: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::SendFailed {
			subject: subject.into(),
			reason: reason.into(),
		}
	}

	/// Whether the error means the link is gone for good
	pub fn is_link_loss(&self) -> bool {
		matches!(self, Self::LinkBroken { .. } | Self::NotConnected)
	}
}

/// Send/receive primitives a middleware backend provides to a connection.
///
/// One transport object serves exactly one connection. Implementations
/// must tolerate `receive` being polled from a background task while
/// `send`/`subscribe` are called from caller tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	/// Middleware library name, e.g. `"loopback"`
	fn library_name(&self) -> &str;

	/// Human-readable middleware description
	fn mw_info(&self) -> String {
		self.library_name().to_string()
	}

	/// Establish the link
	async fn connect(&self) -> Result<(), TransportError>;

	/// Tear the link down
	async fn disconnect(&self) -> Result<(), TransportError>;

	/// Start receiving messages whose subject matches `pattern`
	async fn subscribe(
		&self,
		pattern: &SubjectPattern,
		config: Option<&Config>,
	) -> Result<(), TransportError>;

	/// Stop receiving messages for `pattern`
	async fn unsubscribe(
		&self,
		pattern: &SubjectPattern,
	) -> Result<(), TransportError>;

	/// Hand a message to the middleware
	async fn send(&self, message: &Message) -> Result<(), TransportError>;

	/// Wait up to `timeout` for the next inbound message.
	///
	/// `Ok(None)` means the timeout elapsed. An error means the link is
	/// unusable.
	async fn receive(
		&self,
		timeout: Duration,
	) -> Result<Option<Message>, TransportError>;
}
