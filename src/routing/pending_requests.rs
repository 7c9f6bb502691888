//! In-flight request state keyed by correlation id

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::{RequestError, RequestResult};
use crate::message::{Message, fields};

/// How the reply to a pending request is delivered
pub enum ReplyMode<R> {
	/// A caller is awaiting the (terminal) reply
	Blocking(oneshot::Sender<RequestResult<Message>>),
	/// Every reply and event goes to a listener
	Callback(R),
}

impl<R> std::fmt::Debug for ReplyMode<R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			| ReplyMode::Blocking(_) => f.write_str("Blocking"),
			| ReplyMode::Callback(_) => f.write_str("Callback"),
		}
	}
}

/// One outstanding request
#[derive(Debug)]
pub struct PendingRequest<R> {
	pub request_id: u64,
	/// Copy of the outgoing request, re-sent on republish
	pub request: Message,
	pub issued_at: Instant,
	/// `None` waits forever
	pub timeout: Option<Duration>,
	/// `None` never republishes
	pub republish: Option<Duration>,
	pub multi_response: bool,
	pub mode: ReplyMode<R>,
	expires_at: Option<Instant>,
	next_republish: Option<Instant>,
}

impl<R> PendingRequest<R> {
	pub fn new(
		request_id: u64,
		request: Message,
		timeout: Option<Duration>,
		republish: Option<Duration>,
		multi_response: bool,
		mode: ReplyMode<R>,
		now: Instant,
	) -> Self {
		Self {
			request_id,
			request,
			issued_at: now,
			timeout,
			republish,
			multi_response,
			mode,
			expires_at: timeout.map(|t| now + t),
			next_republish: republish.map(|r| now + r),
		}
	}

	pub fn expires_at(&self) -> Option<Instant> {
		self.expires_at
	}

	pub fn next_republish(&self) -> Option<Instant> {
		self.next_republish
	}

	/// Earliest instant at which the reaper must look at this entry.
	pub fn deadline(&self) -> Option<Instant> {
		match (self.expires_at, self.next_republish) {
			| (Some(a), Some(b)) => Some(a.min(b)),
			| (a, b) => a.or(b),
		}
	}

	/// Whether `reply` echoes the requester stamp this request was sent
	/// with. Requests without a stamp accept unstamped replies only.
	pub fn accepts(&self, reply: &Message) -> bool {
		reply.string_value(fields::REPLY_UNIQUE_ID)
			== self.request.string_value(fields::REPLY_UNIQUE_ID)
	}

	/// Restart both timers from `now`.
	fn keep_alive(&mut self, now: Instant) {
		self.expires_at = self.timeout.map(|t| now + t);
		self.next_republish = self.republish.map(|r| now + r);
	}
}

/// Outcome of delivering a reply to a pending request
#[derive(Debug)]
pub enum Completion<R> {
	/// The request is finished and has been removed from the table
	Final(PendingRequest<R>),
	/// A multi-response request stays pending; `listener` is set for
	/// callback-mode requests
	KeepAlive {
		request_id: u64,
		request: Message,
		listener: Option<R>,
	},
}

impl<R> Completion<R> {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Completion::Final(_))
	}
}

/// Work produced by one reaper pass
#[derive(Debug)]
pub struct Reaped<R> {
	/// Requests whose absolute timeout elapsed, now removed
	pub timed_out: Vec<PendingRequest<R>>,
	/// Request messages due to be sent again
	pub republish: Vec<Message>,
}

impl<R> Default for Reaped<R> {
	fn default() -> Self {
		Self {
			timed_out: Vec::new(),
			republish: Vec::new(),
		}
	}
}

/// Pending requests keyed by correlation id.
///
/// The table itself is not synchronised; the connection keeps it behind
/// the same lock as its subscription registry.
#[derive(Debug)]
pub struct PendingRequestTable<R> {
	entries: HashMap<u64, PendingRequest<R>>,
}

impl<R> Default for PendingRequestTable<R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<R> PendingRequestTable<R> {
	pub fn new() -> Self {
		Self {
			entries: HashMap::new(),
		}
	}

	/// Adds a request. Fails if its id is already pending.
	pub fn register(&mut self, pending: PendingRequest<R>) -> RequestResult<()> {
		let request_id = pending.request_id;
		if self.entries.contains_key(&request_id) {
			return Err(RequestError::DuplicateRequestId { request_id });
		}
		self.entries.insert(request_id, pending);
		Ok(())
	}

	pub fn contains(&self, request_id: u64) -> bool {
		self.entries.contains_key(&request_id)
	}

	pub fn get(&self, request_id: u64) -> Option<&PendingRequest<R>> {
		self.entries.get(&request_id)
	}

	pub fn remove(&mut self, request_id: u64) -> Option<PendingRequest<R>> {
		self.entries.remove(&request_id)
	}

	/// Single-response completion: removes and returns the entry.
	pub fn complete_one(&mut self, request_id: u64) -> Option<PendingRequest<R>> {
		self.entries.remove(&request_id)
	}

	/// Multi-response completion.
	///
	/// Acknowledgement and keep-alive statuses leave the entry pending and
	/// restart its timers; every other status, or no status at all, ends
	/// the request.
	pub fn complete_multi(
		&mut self,
		request_id: u64,
		reply: &Message,
		now: Instant,
	) -> Option<Completion<R>>
	where
		R: Clone,
	{
		let terminal = reply.response_status().is_none_or(|s| s.is_terminal());
		if terminal {
			return self.entries.remove(&request_id).map(Completion::Final);
		}

		let entry = self.entries.get_mut(&request_id)?;
		entry.keep_alive(now);
		let listener = match &entry.mode {
			| ReplyMode::Callback(listener) => Some(listener.clone()),
			| ReplyMode::Blocking(_) => None,
		};
		Some(Completion::KeepAlive {
			request_id,
			request: entry.request.clone(),
			listener,
		})
	}

	/// Delivers `reply` according to the entry's response mode.
	///
	/// A reply carrying another requester's stamp leaves the entry alone
	/// and returns `None`.
	pub fn complete(
		&mut self,
		request_id: u64,
		reply: &Message,
		now: Instant,
	) -> Option<Completion<R>>
	where
		R: Clone,
	{
		let entry = self.entries.get(&request_id)?;
		if !entry.accepts(reply) {
			return None;
		}
		if entry.multi_response {
			self.complete_multi(request_id, reply, now)
		} else {
			self.complete_one(request_id).map(Completion::Final)
		}
	}

	/// Expires or republishes every entry whose deadline has passed.
	///
	/// An elapsed absolute timeout always wins over a due republish.
	pub fn reap_expired(&mut self, now: Instant) -> Reaped<R> {
		let mut reaped = Reaped::default();

		let expired: Vec<u64> = self
			.entries
			.values()
			.filter(|entry| entry.expires_at.is_some_and(|at| at <= now))
			.map(|entry| entry.request_id)
			.collect();
		for request_id in expired {
			if let Some(entry) = self.entries.remove(&request_id) {
				reaped.timed_out.push(entry);
			}
		}

		for entry in self.entries.values_mut() {
			if let (Some(at), Some(interval)) =
				(entry.next_republish, entry.republish)
			{
				if at <= now {
					entry.next_republish = Some(now + interval);
					reaped.republish.push(entry.request.clone());
				}
			}
		}

		reaped
	}

	/// Earliest deadline over all entries.
	pub fn next_deadline(&self) -> Option<Instant> {
		self.entries.values().filter_map(PendingRequest::deadline).min()
	}

	/// Removes every entry, e.g. on disconnect.
	pub fn drain(&mut self) -> Vec<PendingRequest<R>> {
		self.entries.drain().map(|(_, entry)| entry).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
