//! Callback objects passed to subscribe and request calls
//!
//! Callbacks receive the connection and message by reference, valid only
//! for the duration of the call. Clone the message to keep it.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::Connection;
use super::error::Status;
use super::events::Event;
use crate::message::Message;

type MessageFn = dyn Fn(&Connection, &Message) + Send + Sync;
type ReplyFn = dyn Fn(&Connection, &Message, &Message) + Send + Sync;
type EventFn = dyn Fn(&Connection, &Status, Event) + Send + Sync;

/// Runs `f`, turning a panic into its message.
pub(crate) fn guarded<F: FnOnce()>(f: F) -> Result<(), String> {
	catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic payload".to_string()
	}
}

/// Subscription callback.
///
/// Two callbacks are equal only if they are clones of the same callback,
/// which is how duplicate subscriptions are detected.
#[derive(Clone)]
pub struct Callback(Arc<MessageFn>);

impl Callback {
	pub fn new<F>(f: F) -> Self
	where F: Fn(&Connection, &Message) + Send + Sync + 'static {
		Self(Arc::new(f))
	}

	pub(crate) fn call(&self, connection: &Connection, message: &Message) {
		(self.0)(connection, message)
	}
}

impl PartialEq for Callback {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Callback({:p})", Arc::as_ptr(&self.0))
	}
}

/// Connection event callback
#[derive(Clone)]
pub struct EventCallback(Arc<EventFn>);

impl EventCallback {
	pub fn new<F>(f: F) -> Self
	where F: Fn(&Connection, &Status, Event) + Send + Sync + 'static {
		Self(Arc::new(f))
	}

	pub(crate) fn call(&self, connection: &Connection, status: &Status, event: Event) {
		(self.0)(connection, status, event)
	}
}

impl fmt::Debug for EventCallback {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "EventCallback({:p})", Arc::as_ptr(&self.0))
	}
}

/// Callback pair for asynchronous requests.
///
/// `on_reply` receives the original request and each reply. `on_event`,
/// if set, is told about timeouts and about the request being abandoned
/// on disconnect.
#[derive(Clone)]
pub struct ReplyCallback {
	on_reply: Arc<ReplyFn>,
	on_event: Option<EventCallback>,
}

impl ReplyCallback {
	pub fn new<F>(on_reply: F) -> Self
	where F: Fn(&Connection, &Message, &Message) + Send + Sync + 'static {
		Self {
			on_reply: Arc::new(on_reply),
			on_event: None,
		}
	}

	pub fn with_event<F>(mut self, on_event: F) -> Self
	where F: Fn(&Connection, &Status, Event) + Send + Sync + 'static {
		self.on_event = Some(EventCallback::new(on_event));
		self
	}

	pub(crate) fn call_reply(
		&self,
		connection: &Connection,
		request: &Message,
		reply: &Message,
	) {
		(self.on_reply)(connection, request, reply)
	}

	pub(crate) fn call_event(
		&self,
		connection: &Connection,
		status: &Status,
		event: Event,
	) {
		if let Some(on_event) = &self.on_event {
			on_event.call(connection, status, event)
		}
	}
}

impl fmt::Debug for ReplyCallback {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReplyCallback")
			.field("on_reply", &Arc::as_ptr(&self.on_reply))
			.field("has_event_callback", &self.on_event.is_some())
			.finish()
	}
}
