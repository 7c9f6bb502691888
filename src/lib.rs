//! # GMSEC Core
//!
//! Connection and messaging core of a publish/subscribe and request/reply
//! middleware client. The core is middleware-agnostic: a pluggable
//! [`Transport`](transport::Transport) provides connect, send and receive,
//! and everything above it lives here.
//!
//! ## Features
//!
//! - **Subject routing**: dot-delimited subjects with `*`, `>` and `+`
//!   wildcards, plus subject exclusion
//! - **Dispatch**: manual `receive`/`dispatch` or a background auto-dispatcher
//! - **Request/reply**: blocking or callback requests with timeouts,
//!   republish and multi-response completion
//! - **Message binning**: aggregation of small publishes into one envelope
//! - **Periodic publishers**: heartbeat and resource generators
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gmsec_core::{Callback, Config, Connection, Kind, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::parse("mw-id=loopback server=demo")?;
//!     let connection = Connection::new(&config)?;
//!     connection.connect().await?;
//!
//!     connection
//!         .subscribe_with_callback(
//!             "GMSEC.DEMO.>",
//!             Callback::new(|_, message| println!("received {message}")),
//!         )
//!         .await?;
//!     connection.start_auto_dispatch()?;
//!
//!     let message = Message::new("GMSEC.DEMO.HB", Kind::Publish)
//!         .with_field("COUNTER", 1u32);
//!     connection.publish(&message).await?;
//!
//!     connection.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod generator;
pub mod message;
pub mod message_codec;
pub mod routing;
pub mod subject;
pub mod transport;

use std::sync::{Mutex, MutexGuard};

// === Core Public API ===
pub use client::{
	Callback, Connection, ConnectionError, ConnectionState, ErrorKind, Event,
	EventCallback, Republish, ReplyCallback, Status, SubscriptionInfo, Timeout,
};
pub use config::{Config, ConfigError};
pub use generator::{
	FieldSampler, GeneratorError, HeartbeatGenerator, PeriodicPublisher,
	ResourceGenerator,
};
pub use message::{Field, FieldValue, Kind, Message, ResponseStatus};
pub use transport::{
	MiddlewareFactory, Transport, TransportError, register_middleware,
	shutdown_all_middlewares, shutdown_middleware,
};

/// Result type alias for connection operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Locks `mutex`, recovering the data from a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Prelude module for convenient imports
///
/// ```rust
/// use gmsec_core::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most applications

	pub use crate::{
		Callback, Config, Connection, ConnectionError, Event, Kind, Message,
		Republish, ReplyCallback, Result, Timeout,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use gmsec_core::errors::*;
/// ```
pub mod errors {
	//! All error types used in the library

	pub use crate::client::{ConnectionError, ErrorKind, Status};
	pub use crate::config::ConfigError;
	pub use crate::generator::GeneratorError;
	pub use crate::message_codec::CodecError;
	pub use crate::routing::{RequestError, SubscriptionError};
	pub use crate::subject::{SubjectError, SubjectMatcherError};
	pub use crate::transport::TransportError;
}
