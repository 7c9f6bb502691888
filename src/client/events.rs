use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use super::callback::EventCallback;
use crate::lock;

/// Connection-level events reported through event callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
	/// Auto-dispatch hit a transport failure or a callback panicked
	DispatcherError,
	/// A request expired without a reply
	RequestTimeout,
	ConnectionSuccessful,
	/// The transport reported a lost link
	ConnectionBroken,
	ConnectionReconnect,
	/// A pending request was abandoned because the connection closed
	ConnectionException,
	/// An aggregated envelope could not be published
	MsgPublishFailure,
	/// A received message failed validation and was dropped
	InvalidMessage,
	/// Registration key matching every event without its own callback
	AllEvents,
}

impl fmt::Display for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			| Event::DispatcherError => "DISPATCHER_ERROR_EVENT",
			| Event::RequestTimeout => "REQUEST_TIMEOUT_EVENT",
			| Event::ConnectionSuccessful => "CONNECTION_SUCCESSFUL_EVENT",
			| Event::ConnectionBroken => "CONNECTION_BROKEN_EVENT",
			| Event::ConnectionReconnect => "CONNECTION_RECONNECT_EVENT",
			| Event::ConnectionException => "CONNECTION_EXCEPTION_EVENT",
			| Event::MsgPublishFailure => "MSG_PUBLISH_FAILURE_EVENT",
			| Event::InvalidMessage => "INVALID_MESSAGE_EVENT",
			| Event::AllEvents => "ALL_EVENTS",
		};
		f.write_str(name)
	}
}

/// One callback per event kind.
#[derive(Default)]
pub(crate) struct EventTable {
	callbacks: Mutex<HashMap<Event, EventCallback>>,
}

impl EventTable {
	/// Installs `callback`, returning the one it replaced.
	pub fn register(
		&self,
		event: Event,
		callback: EventCallback,
	) -> Option<EventCallback> {
		lock(&self.callbacks).insert(event, callback)
	}

	/// Callback for `event`, falling back to the `AllEvents` registration.
	pub fn lookup(&self, event: Event) -> Option<EventCallback> {
		let callbacks = lock(&self.callbacks);
		callbacks
			.get(&event)
			.or_else(|| callbacks.get(&Event::AllEvents))
			.cloned()
	}
}
