//! Connection façade
//!
//! A [`Connection`] ties a transport to the routing state of
//! [`crate::routing`] and runs the background work around it: the inbound
//! pump, the optional auto-dispatcher, the request reaper and the message
//! bin flusher.

/// Subscription, reply and event callbacks
pub mod callback;
/// Settings read from the connection configuration
pub mod config;
pub mod connection;
/// Client error types
pub mod error;
pub mod events;
pub mod request;
pub mod subscription;
pub mod validation;

mod binning;
mod dispatcher;
pub(crate) mod worker;

pub use binning::{aggregate, disaggregate};
pub use callback::{Callback, EventCallback, ReplyCallback};
pub use config::{BinSettings, ConnectionSettings, ValidationSettings, keys};
pub use connection::{Connection, ConnectionState};
pub use error::{ConnectionError, ErrorKind, Status};
pub use events::Event;
pub use request::{MIN_REPUBLISH_INTERVAL, Republish, Timeout, response_subject};
pub use subscription::SubscriptionInfo;
pub use validation::MessageValidator;
