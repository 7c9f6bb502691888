//! Routing of inbound messages
//!
//! This module holds the state a connection consults for every received
//! message: the subscription registry, the exclusion set and the table of
//! pending requests. [`Router`] combines them and decides where a message
//! goes; invoking callbacks is left to the connection.

pub mod error;
pub mod exclusion;
pub mod pending_requests;
pub mod router;
pub mod subscription_registry;

#[cfg(test)]
mod pending_requests_tests;

pub use error::{RequestError, RequestResult, SubscriptionError, SubscriptionResult};
pub use exclusion::ExclusionSet;
pub use pending_requests::{
	Completion, PendingRequest, PendingRequestTable, Reaped, ReplyMode,
};
pub use router::{Route, Router};
pub use subscription_registry::{
	Added, Removed, SubscriptionHandle, SubscriptionId, SubscriptionRegistry,
};
