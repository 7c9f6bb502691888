use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::binning::{self, Batch, MessageBinner, run_flusher};
use super::callback::{Callback, EventCallback, ReplyCallback, guarded};
use super::config::ConnectionSettings;
use super::dispatcher::{run_dispatcher, run_pump};
use super::error::{ConnectionError, ErrorKind, Status};
use super::events::{Event, EventTable};
use super::request::{Republish, Timeout, response_subject, run_request_worker};
use super::subscription::SubscriptionInfo;
use super::validation::MessageValidator;
use super::worker::{Worker, Workers};
use crate::config::Config;
use crate::lock;
use crate::message::{Kind, Message, fields};
use crate::message_codec::{MessageCodec, codec_by_name};
use crate::routing::{
	Completion, PendingRequest, ReplyMode, RequestError, Route, Router,
	SubscriptionError,
};
use crate::subject::{SubjectPath, SubjectPattern};
use crate::transport::{Transport, TransportError, create_transport};

static NEXT_CONNECTION_NUMBER: AtomicU64 = AtomicU64::new(1);
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub(super) type ClientRouter = Router<Callback, ReplyCallback>;
type Inbound = Result<Message, ConnectionError>;

/// Lifecycle state of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	NotConnected,
	Connected,
	/// The transport lost its link; `disconnect()` before connecting again
	Broken,
	Disconnected,
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			| ConnectionState::NotConnected => "not connected",
			| ConnectionState::Connected => "connected",
			| ConnectionState::Broken => "broken",
			| ConnectionState::Disconnected => "disconnected",
		};
		f.write_str(name)
	}
}

pub(crate) struct ConnectionInner {
	number: u64,
	id: String,
	name: Mutex<String>,
	config: Config,
	pub(super) settings: ConnectionSettings,
	pub(super) transport: Arc<dyn Transport>,
	codec: Arc<dyn MessageCodec>,
	state: Mutex<ConnectionState>,
	broken_reason: Mutex<Option<String>>,
	pub(super) router: Mutex<ClientRouter>,
	events: EventTable,
	validator: Mutex<Option<Arc<dyn MessageValidator>>>,
	response_subjects: Mutex<HashSet<String>>,
	binner: Option<Mutex<MessageBinner>>,
	publish_failure: Mutex<Option<ConnectionError>>,
	dispatcher_status: Mutex<Option<Status>>,
	inbound_tx: mpsc::UnboundedSender<Inbound>,
	pub(super) inbound_rx:
		Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>>,
	poll_tx: mpsc::UnboundedSender<Message>,
	poll_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
	pub(super) request_notify: Arc<Notify>,
	workers: Mutex<Workers>,
	lifecycle: tokio::sync::Mutex<()>,
	/// Held across a registry change and the transport call it implies
	subscription_changes: tokio::sync::Mutex<()>,
}

impl Drop for ConnectionInner {
	fn drop(&mut self) {
		self.workers
			.get_mut()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.abort_all();
		let state = *self
			.state
			.get_mut()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		if state == ConnectionState::Connected {
			warn!(
				connection = self.number,
				"Connection dropped without calling disconnect(); background \
				 work was aborted"
			);
		}
	}
}

/// Handle to one middleware connection.
///
/// Cloning is cheap and every clone drives the same connection. Callbacks
/// receive a `&Connection` valid for the duration of the call; clone it
/// to use the connection from a spawned task.
#[derive(Clone)]
pub struct Connection {
	inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("number", &self.inner.number)
			.field("id", &self.inner.id)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl Connection {
	/// Creates a connection using the middleware named by `mw-id`.
	pub fn new(config: &Config) -> Result<Self, ConnectionError> {
		let transport = create_transport(config)?;
		Self::with_transport(config, transport)
	}

	/// Creates a connection over an already built transport.
	pub fn with_transport(
		config: &Config,
		transport: Arc<dyn Transport>,
	) -> Result<Self, ConnectionError> {
		let settings = ConnectionSettings::from_config(config)?;
		let codec = codec_by_name(&settings.bin_codec)?;
		let number = NEXT_CONNECTION_NUMBER.fetch_add(1, Ordering::Relaxed);

		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (poll_tx, poll_rx) = mpsc::unbounded_channel();

		let inner = ConnectionInner {
			number,
			id: connection_id(number),
			name: Mutex::new(format!("Connection {number}")),
			config: config.clone(),
			router: Mutex::new(Router::new(settings.subject_cache_size)),
			binner: settings
				.binning
				.clone()
				.map(|bins| Mutex::new(MessageBinner::new(bins))),
			settings,
			transport,
			codec,
			state: Mutex::new(ConnectionState::NotConnected),
			broken_reason: Mutex::new(None),
			events: EventTable::default(),
			validator: Mutex::new(None),
			response_subjects: Mutex::new(HashSet::new()),
			publish_failure: Mutex::new(None),
			dispatcher_status: Mutex::new(None),
			inbound_tx,
			inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
			poll_tx,
			poll_rx: tokio::sync::Mutex::new(poll_rx),
			request_notify: Arc::new(Notify::new()),
			workers: Mutex::new(Workers::default()),
			lifecycle: tokio::sync::Mutex::new(()),
			subscription_changes: tokio::sync::Mutex::new(()),
		};
		debug!(connection = number, id = %inner.id, "Connection created");

		Ok(Self {
			inner: Arc::new(inner),
		})
	}

	pub(super) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
		Self { inner }
	}

	fn downgrade(&self) -> Weak<ConnectionInner> {
		Arc::downgrade(&self.inner)
	}

	/// Process-unique instance number
	pub fn number(&self) -> u64 {
		self.inner.number
	}

	/// `GMSEC_<host>_<hex time>_<pid>_<number>`
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	pub fn name(&self) -> String {
		lock(&self.inner.name).clone()
	}

	pub fn set_name(&self, name: impl Into<String>) {
		*lock(&self.inner.name) = name.into();
	}

	pub fn library_name(&self) -> &str {
		self.inner.transport.library_name()
	}

	pub fn mw_info(&self) -> String {
		self.inner.transport.mw_info()
	}

	pub fn config(&self) -> &Config {
		&self.inner.config
	}

	pub fn settings(&self) -> &ConnectionSettings {
		&self.inner.settings
	}

	pub fn state(&self) -> ConnectionState {
		*lock(&self.inner.state)
	}

	/// Number of requests still awaiting a reply
	pub fn pending_request_count(&self) -> usize {
		lock(&self.inner.router).pending.len()
	}

	/// Establishes the transport link and starts background work.
	pub async fn connect(&self) -> Result<(), ConnectionError> {
		let _lifecycle = self.inner.lifecycle.lock().await;
		match self.state() {
			| ConnectionState::Connected => {
				return Err(ConnectionError::AlreadyConnected);
			}
			| ConnectionState::Broken => return Err(self.broken_error()),
			| ConnectionState::NotConnected | ConnectionState::Disconnected => {}
		}

		self.inner.transport.connect().await.inspect_err(|err| {
			warn!(connection = self.inner.number, error = %err, "Connect failed");
		})?;
		*lock(&self.inner.state) = ConnectionState::Connected;
		lock(&self.inner.broken_reason).take();
		self.start_workers();

		info!(
			connection = self.inner.number,
			library = self.library_name(),
			"Connection established"
		);
		self.emit(
			Event::ConnectionSuccessful,
			&Status::ok(format!("Connected via {}", self.mw_info())),
		);
		Ok(())
	}

	/// Tears the connection down.
	///
	/// Order: stop auto-dispatch, fail pending requests, flush message
	/// bins, stop the inbound pump, drop subscriptions, close the
	/// transport. Calling it on a connection that is not connected is a
	/// no-op.
	pub async fn disconnect(&self) -> Result<(), ConnectionError> {
		let _lifecycle = self.inner.lifecycle.lock().await;
		let state = self.state();
		if !matches!(state, ConnectionState::Connected | ConnectionState::Broken)
		{
			debug!(connection = self.inner.number, %state, "Nothing to disconnect");
			return Ok(());
		}

		let workers = std::mem::take(&mut *lock(&self.inner.workers));
		if let Some(dispatcher) = workers.dispatcher {
			dispatcher.stop().await;
		}
		if let Some(requests) = workers.requests {
			requests.stop().await;
		}
		self.abandon_pending_requests();

		if let Some(flusher) = workers.flusher {
			flusher.stop().await;
		}
		if state == ConnectionState::Connected {
			self.flush_bins(true).await;
		} else if let Some(binner) = &self.inner.binner {
			let lost = lock(binner).take_all();
			if !lost.is_empty() {
				warn!(bins = lost.len(), "Discarding message bins of a broken connection");
			}
		}

		if let Some(pump) = workers.pump {
			pump.stop().await;
		}
		lock(&self.inner.router).reset();
		lock(&self.inner.response_subjects).clear();

		let result = self.inner.transport.disconnect().await;
		*lock(&self.inner.state) = ConnectionState::Disconnected;
		self.drain_queues();

		info!(connection = self.inner.number, "Connection closed");
		result.map_err(ConnectionError::from)
	}

	fn start_workers(&self) {
		let mut workers = lock(&self.inner.workers);
		let weak = self.downgrade();
		workers.pump = Some(Worker::spawn("pump", move |rx| run_pump(weak, rx)));
		let weak = self.downgrade();
		workers.requests = Some(Worker::spawn("requests", move |rx| {
			run_request_worker(weak, rx)
		}));
		if self.inner.binner.is_some() {
			let weak = self.downgrade();
			workers.flusher =
				Some(Worker::spawn("flusher", move |rx| run_flusher(weak, rx)));
		}
	}

	/// Drops queued inbound messages. A queue held by a pending
	/// `receive()` is left alone.
	fn drain_queues(&self) {
		if let Ok(mut inbound) = self.inner.inbound_rx.try_lock() {
			while inbound.try_recv().is_ok() {}
		}
		if let Ok(mut polled) = self.inner.poll_rx.try_lock() {
			while polled.try_recv().is_ok() {}
		}
	}

	fn ensure_connected(
		&self,
		operation: &'static str,
	) -> Result<(), ConnectionError> {
		match self.state() {
			| ConnectionState::Connected => Ok(()),
			| ConnectionState::Broken => Err(self.broken_error()),
			| ConnectionState::NotConnected | ConnectionState::Disconnected => {
				Err(ConnectionError::not_initialized(operation))
			}
		}
	}

	fn broken_error(&self) -> ConnectionError {
		let reason = lock(&self.inner.broken_reason)
			.clone()
			.unwrap_or_else(|| "transport link lost".to_string());
		ConnectionError::Broken { reason }
	}

	/// Installs `callback` for `event`, returning the callback it replaced.
	pub fn register_event_callback(
		&self,
		event: Event,
		callback: EventCallback,
	) -> Option<EventCallback> {
		self.inner.events.register(event, callback)
	}

	/// Installs the content validator used by the
	/// `gmsec-msg-content-validate*` settings.
	pub fn set_validator(&self, validator: impl MessageValidator) {
		*lock(&self.inner.validator) = Some(Arc::new(validator));
	}

	pub fn clear_validator(&self) {
		lock(&self.inner.validator).take();
	}

	fn validate(&self, message: &Message) -> Result<(), String> {
		let validator = lock(&self.inner.validator).clone();
		match validator {
			| Some(validator) => validator.validate(message),
			| None => Ok(()),
		}
	}

	fn validate_outgoing(&self, message: &Message) -> Result<(), ConnectionError> {
		if !self.inner.settings.validation.send {
			return Ok(());
		}
		self.validate(message)
			.map_err(|reason| ConnectionError::Validation {
				subject: message.subject().to_string(),
				reason,
			})
	}

	pub(super) fn emit(&self, event: Event, status: &Status) {
		let Some(callback) = self.inner.events.lookup(event) else {
			trace!(%event, %status, "No callback registered for event");
			return;
		};
		if let Err(panic) = guarded(|| callback.call(self, status, event)) {
			error!(%event, panic = %panic, "Event callback panicked");
		}
	}

	/// Subscribes without a callback; matching messages are returned by
	/// [`receive`](Self::receive).
	pub async fn subscribe(
		&self,
		pattern: &str,
	) -> Result<SubscriptionInfo, ConnectionError> {
		self.subscribe_with_config(pattern, None, None).await
	}

	pub async fn subscribe_with_callback(
		&self,
		pattern: &str,
		callback: Callback,
	) -> Result<SubscriptionInfo, ConnectionError> {
		self.subscribe_with_config(pattern, Some(callback), None).await
	}

	/// Registers a subscription and, the first time a pattern is used,
	/// subscribes the transport to it.
	pub async fn subscribe_with_config(
		&self,
		pattern: &str,
		callback: Option<Callback>,
		config: Option<Config>,
	) -> Result<SubscriptionInfo, ConnectionError> {
		self.ensure_connected("subscribe")?;
		let pattern =
			SubjectPattern::new(pattern).map_err(SubscriptionError::from)?;

		let _changes = self.inner.subscription_changes.lock().await;
		let added = lock(&self.inner.router).subscriptions.add(
			pattern.clone(),
			callback.clone(),
			config.clone(),
		)?;

		if added.fresh {
			if let Err(err) =
				self.inner.transport.subscribe(&pattern, config.as_ref()).await
			{
				let _ = lock(&self.inner.router).subscriptions.remove(&added.handle);
				return Err(err.into());
			}
		}

		debug!(
			connection = self.inner.number,
			pattern = %pattern,
			id = %added.handle.id(),
			"Subscribed"
		);
		Ok(SubscriptionInfo::new(
			added.handle,
			pattern,
			callback,
			config,
			self.inner.number,
		))
	}

	/// Removes a subscription and clears `info`'s handle.
	pub async fn unsubscribe(
		&self,
		info: &mut SubscriptionInfo,
	) -> Result<(), ConnectionError> {
		self.ensure_connected("unsubscribe")?;
		let handle = info
			.handle()
			.ok_or(SubscriptionError::UnknownHandle { id: info.id() })?;

		let _changes = self.inner.subscription_changes.lock().await;
		let removed = lock(&self.inner.router).subscriptions.remove(&handle)?;
		info.invalidate();

		if removed.pattern_unused {
			self.inner.transport.unsubscribe(&removed.pattern).await?;
		}
		debug!(
			connection = self.inner.number,
			pattern = %removed.pattern,
			"Unsubscribed"
		);
		Ok(())
	}

	/// Drops every inbound message whose subject matches `pattern`, even
	/// when a subscription also matches.
	pub fn exclude_subject(&self, pattern: &str) -> Result<(), ConnectionError> {
		self.ensure_connected("exclude_subject")?;
		let pattern = SubjectPattern::new(pattern)?;
		if lock(&self.inner.router).exclusions.add(pattern.clone()) {
			debug!(pattern = %pattern, "Subject excluded");
		}
		Ok(())
	}

	/// Returns false if `pattern` was not excluded.
	pub fn remove_excluded_subject(
		&self,
		pattern: &str,
	) -> Result<bool, ConnectionError> {
		self.ensure_connected("remove_excluded_subject")?;
		let pattern = SubjectPattern::new(pattern)?;
		Ok(lock(&self.inner.router).exclusions.remove(&pattern))
	}

	/// Publishes a PUBLISH message, through a message bin when binning
	/// applies to its subject.
	///
	/// If a previous background bin flush failed, that failure is returned
	/// instead and `message` is not sent.
	pub async fn publish(&self, message: &Message) -> Result<(), ConnectionError> {
		self.ensure_connected("publish")?;
		if message.kind() != Kind::Publish {
			return Err(ConnectionError::invalid_kind(
				"publish",
				Kind::Publish,
				message.kind(),
			));
		}
		let subject = SubjectPath::for_publish(message.subject())?;
		self.validate_outgoing(message)?;

		if let Some(failure) = lock(&self.inner.publish_failure).take() {
			return Err(failure);
		}

		let binned = match &self.inner.binner {
			| Some(binner) => {
				let mut binner = lock(binner);
				binner
					.participates(&subject)
					.then(|| binner.add(message.clone(), Instant::now()))
			}
			| None => None,
		};

		match binned {
			| Some(Some(batch)) => self.send_batch(batch).await,
			| Some(None) => {
				trace!(subject = %subject, "Message binned");
				Ok(())
			}
			| None => {
				self.inner.transport.send(message).await?;
				trace!(subject = %subject, "Message published");
				Ok(())
			}
		}
	}

	async fn send_batch(&self, batch: Batch) -> Result<(), ConnectionError> {
		let envelope =
			binning::aggregate(&batch.subject, &batch.messages, self.inner.codec.as_ref())?;
		self.inner.transport.send(&envelope).await.map_err(|err| {
			ConnectionError::PublishFailure {
				subject: batch.subject.clone(),
				reason: err.to_string(),
			}
		})?;
		debug!(
			subject = %batch.subject,
			count = batch.messages.len(),
			"Aggregated message published"
		);
		Ok(())
	}

	/// Sends due bins (or all bins). Failures are retained for the next
	/// `publish()` and reported as `MsgPublishFailure` events.
	pub(super) async fn flush_bins(&self, all: bool) {
		let Some(binner) = &self.inner.binner else {
			return;
		};
		let batches = {
			let mut binner = lock(binner);
			if all {
				binner.take_all()
			} else {
				binner.take_due(Instant::now())
			}
		};

		for batch in batches {
			if let Err(err) = self.send_batch(batch).await {
				warn!(error = %err, "Failed to flush message bin");
				self.emit(Event::MsgPublishFailure, &Status::from(&err));
				*lock(&self.inner.publish_failure) = Some(err);
			}
		}
	}

	/// Sends a request and waits for its reply.
	///
	/// With multi-response enabled, intermediate replies only extend the
	/// deadline and the terminal reply is returned.
	pub async fn request(
		&self,
		request: &Message,
		timeout: Timeout,
		republish: Republish,
	) -> Result<Message, ConnectionError> {
		let (reply_tx, reply_rx) = oneshot::channel();
		let request_id = self
			.issue_request(request, timeout, republish, ReplyMode::Blocking(reply_tx))
			.await?;

		match reply_rx.await {
			| Ok(result) => result.map_err(ConnectionError::from),
			| Err(_) => Err(
				RequestError::interrupted(request_id, "request was abandoned").into(),
			),
		}
	}

	/// Sends a request whose replies and events go to `callback`.
	///
	/// Returns the request's correlation id.
	pub async fn request_with_callback(
		&self,
		request: &Message,
		timeout: Timeout,
		republish: Republish,
		callback: ReplyCallback,
	) -> Result<u64, ConnectionError> {
		self.issue_request(request, timeout, republish, ReplyMode::Callback(callback))
			.await
	}

	async fn issue_request(
		&self,
		request: &Message,
		timeout: Timeout,
		republish: Republish,
		mode: ReplyMode<ReplyCallback>,
	) -> Result<u64, ConnectionError> {
		self.ensure_connected("request")?;
		if request.kind() != Kind::Request {
			return Err(ConnectionError::invalid_kind(
				"request",
				Kind::Request,
				request.kind(),
			));
		}
		SubjectPath::for_publish(request.subject())?;
		self.validate_outgoing(request)?;

		let mut request = request.clone();
		let request_id = match request.field(fields::REQUEST_ID) {
			| Some(value) => value.as_u64().ok_or_else(|| {
				RequestError::InvalidRequestId {
					value: value.to_string(),
				}
			})?,
			| None => NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
		};
		request.set_request_id(request_id);
		request.set_field(fields::REPLY_UNIQUE_ID, self.inner.id.as_str());

		if self.inner.settings.subscribe_for_response {
			self.ensure_response_subscription(request.subject()).await?;
		}

		let pending = PendingRequest::new(
			request_id,
			request.clone(),
			timeout.duration(),
			republish.interval(self.inner.settings.default_republish),
			self.inner.settings.multi_response,
			mode,
			Instant::now(),
		);
		lock(&self.inner.router).pending.register(pending)?;

		if let Err(err) = self.inner.transport.send(&request).await {
			lock(&self.inner.router).pending.remove(request_id);
			return Err(err.into());
		}
		self.inner.request_notify.notify_one();

		debug!(
			connection = self.inner.number,
			subject = %request.subject(),
			request_id,
			"Request sent"
		);
		Ok(request_id)
	}

	async fn ensure_response_subscription(
		&self,
		request_subject: &str,
	) -> Result<(), ConnectionError> {
		let pattern = format!("{}.+", response_subject(request_subject));
		let _changes = self.inner.subscription_changes.lock().await;
		if lock(&self.inner.response_subjects).contains(&pattern) {
			return Ok(());
		}
		let parsed = SubjectPattern::new(pattern.as_str())?;
		self.inner.transport.subscribe(&parsed, None).await?;
		debug!(pattern = %pattern, "Subscribed for responses");
		lock(&self.inner.response_subjects).insert(pattern);
		Ok(())
	}

	/// Publishes `reply` to `request`.
	///
	/// Copies `REQUEST-ID`, swaps `COMPONENT` and `DESTINATION-COMPONENT`,
	/// and publishes on the derived response subject when `reply` has no
	/// subject of its own. May be called repeatedly for one request.
	pub async fn reply(
		&self,
		request: &Message,
		reply: &Message,
	) -> Result<(), ConnectionError> {
		self.ensure_connected("reply")?;
		if request.kind() != Kind::Request {
			return Err(ConnectionError::invalid_kind(
				"reply",
				Kind::Request,
				request.kind(),
			));
		}
		if reply.kind() != Kind::Reply {
			return Err(ConnectionError::invalid_kind(
				"reply",
				Kind::Reply,
				reply.kind(),
			));
		}
		let request_id = request.request_id().ok_or_else(|| {
			RequestError::InvalidRequestId {
				value: request
					.field(fields::REQUEST_ID)
					.map(ToString::to_string)
					.unwrap_or_default(),
			}
		})?;

		let mut reply = reply.clone();
		reply.set_request_id(request_id);
		if let Some(stamp) = request.string_value(fields::REPLY_UNIQUE_ID) {
			reply.set_field(fields::REPLY_UNIQUE_ID, stamp);
		}
		if let Some(component) = request.string_value(fields::DESTINATION_COMPONENT)
		{
			reply.set_field(fields::COMPONENT, component);
		}
		if let Some(component) = request.string_value(fields::COMPONENT) {
			reply.set_field(fields::DESTINATION_COMPONENT, component);
		}
		if reply.subject().is_empty() {
			reply.set_subject(response_subject(request.subject()));
		}
		SubjectPath::for_publish(reply.subject())?;
		self.validate_outgoing(&reply)?;

		self.inner.transport.send(&reply).await?;
		trace!(subject = %reply.subject(), request_id, "Reply sent");
		Ok(())
	}

	pub(super) async fn reap_requests(&self) {
		let reaped = lock(&self.inner.router).pending.reap_expired(Instant::now());

		for message in &reaped.republish {
			debug!(
				subject = %message.subject(),
				request_id = message.request_id(),
				"Republishing request"
			);
			if let Err(err) = self.inner.transport.send(message).await {
				warn!(subject = %message.subject(), error = %err, "Republish failed");
			}
		}

		for pending in reaped.timed_out {
			let request_id = pending.request_id;
			debug!(request_id, "Request timed out");
			self.fail_request(
				pending,
				RequestError::Timeout { request_id },
				Event::RequestTimeout,
			);
		}
	}

	fn abandon_pending_requests(&self) {
		let abandoned = lock(&self.inner.router).pending.drain();
		for pending in abandoned {
			let request_id = pending.request_id;
			self.fail_request(
				pending,
				RequestError::interrupted(request_id, "connection closed"),
				Event::ConnectionException,
			);
		}
	}

	fn fail_request(
		&self,
		pending: PendingRequest<ReplyCallback>,
		err: RequestError,
		event: Event,
	) {
		let status = Status::from(&ConnectionError::from(err.clone()));
		match pending.mode {
			| ReplyMode::Blocking(reply_tx) => {
				// Err only means the caller stopped waiting
				let _ = reply_tx.send(Err(err));
				// interruption reaches the caller through the returned error only
				if event != Event::ConnectionException {
					self.emit(event, &status);
				}
			}
			| ReplyMode::Callback(listener) => {
				if let Err(panic) =
					guarded(|| listener.call_event(self, &status, event))
				{
					error!(%event, panic = %panic, "Request event callback panicked");
				}
				self.emit(event, &status);
			}
		}
	}

	/// Waits for the next message for a callbackless subscription.
	///
	/// Without auto-dispatch every subscribed message is returned here and
	/// may be handed to [`dispatch`](Self::dispatch). A transport failure
	/// is returned once as an error.
	pub async fn receive(
		&self,
		timeout: Timeout,
	) -> Result<Option<Message>, ConnectionError> {
		match self.state() {
			| ConnectionState::Connected | ConnectionState::Broken => {}
			| ConnectionState::NotConnected | ConnectionState::Disconnected => {
				return Err(ConnectionError::not_initialized("receive"));
			}
		}

		if self.auto_dispatch_running() {
			let mut polled = self.inner.poll_rx.lock().await;
			return Ok(wait(timeout, polled.recv()).await.flatten());
		}

		let mut inbound = self.inner.inbound_rx.lock().await;
		match wait(timeout, inbound.recv()).await.flatten() {
			| Some(Ok(message)) => Ok(Some(message)),
			| Some(Err(err)) => Err(err),
			| None => Ok(None),
		}
	}

	/// Invokes every subscription callback matching `message` on the
	/// calling task.
	///
	/// Do not combine with auto-dispatch; delivery order across the two is
	/// undefined.
	pub fn dispatch(&self, message: &Message) -> Result<(), ConnectionError> {
		self.ensure_connected("dispatch")?;
		let route = lock(&self.inner.router).resolve(message);
		if let Route::Deliver { callbacks, .. } = route {
			self.invoke_callbacks(&callbacks, message);
		}
		Ok(())
	}

	pub(super) fn dispatch_queued(&self, message: &Message) {
		let route = lock(&self.inner.router).resolve(message);
		match route {
			| Route::Deliver { callbacks, poll } => {
				self.invoke_callbacks(&callbacks, message);
				if poll {
					// Err only means the connection is going away
					let _ = self.inner.poll_tx.send(message.clone());
				}
			}
			| Route::Excluded | Route::Unwanted | Route::Reply(_) => {
				trace!(subject = %message.subject(), "Queued message no longer wanted");
			}
		}
	}

	fn invoke_callbacks(&self, callbacks: &[Callback], message: &Message) {
		for callback in callbacks {
			if let Err(panic) = guarded(|| callback.call(self, message)) {
				error!(
					subject = %message.subject(),
					panic = %panic,
					"Subscription callback panicked"
				);
				let status = Status::error(
					ErrorKind::DispatcherError,
					format!("callback for '{}' panicked: {panic}", message.subject()),
				);
				*lock(&self.inner.dispatcher_status) = Some(status.clone());
				self.emit(Event::DispatcherError, &status);
			}
		}
	}

	/// Entry point for everything the transport delivers.
	pub(super) fn accept_inbound(&self, message: Message) {
		if !message.is_aggregated() {
			self.route_inbound(message);
			return;
		}
		match binning::disaggregate(&message, self.inner.codec.as_ref()) {
			| Ok(messages) => {
				trace!(
					subject = %message.subject(),
					count = messages.len(),
					"Aggregated message received"
				);
				messages.into_iter().for_each(|m| self.route_inbound(m));
			}
			| Err(err) => {
				warn!(subject = %message.subject(), error = %err, "Dropping malformed aggregated message");
				let err = ConnectionError::from(err);
				self.emit(Event::InvalidMessage, &Status::from(&err));
			}
		}
	}

	fn route_inbound(&self, message: Message) {
		if self.inner.settings.validation.recv {
			if let Err(reason) = self.validate(&message) {
				warn!(subject = %message.subject(), reason = %reason, "Inbound message failed validation");
				self.emit(
					Event::InvalidMessage,
					&Status::error(ErrorKind::ValidationError, reason),
				);
				return;
			}
		}

		let route = lock(&self.inner.router).route(&message, Instant::now());
		match route {
			| Route::Excluded => {
				trace!(subject = %message.subject(), "Excluded message dropped")
			}
			| Route::Unwanted => {
				trace!(subject = %message.subject(), "Unwanted message dropped")
			}
			| Route::Reply(completion) => self.complete_request(completion, &message),
			| Route::Deliver { .. } => {
				// Err only means the connection is going away
				let _ = self.inner.inbound_tx.send(Ok(message));
			}
		}
	}

	fn complete_request(
		&self,
		completion: Completion<ReplyCallback>,
		reply: &Message,
	) {
		let delivered = match completion {
			| Completion::Final(pending) => {
				trace!(request_id = pending.request_id, "Request completed");
				match pending.mode {
					| ReplyMode::Blocking(reply_tx) => {
						let _ = reply_tx.send(Ok(reply.clone()));
						Ok(())
					}
					| ReplyMode::Callback(listener) => guarded(|| {
						listener.call_reply(self, &pending.request, reply)
					}),
				}
			}
			| Completion::KeepAlive {
				request,
				listener: Some(listener),
				..
			} => guarded(|| listener.call_reply(self, &request, reply)),
			| Completion::KeepAlive { listener: None, .. } => Ok(()),
		};
		if let Err(panic) = delivered {
			error!(panic = %panic, "Reply callback panicked");
		}
	}

	/// Marks the connection broken after the pump saw a transport failure.
	pub(super) fn link_lost(&self, err: TransportError) {
		let reason = err.to_string();
		{
			let mut state = lock(&self.inner.state);
			if *state == ConnectionState::Connected {
				*state = ConnectionState::Broken;
			}
		}
		*lock(&self.inner.broken_reason) = Some(reason.clone());
		error!(connection = self.inner.number, error = %err, "Connection broken");

		self.emit(
			Event::ConnectionBroken,
			&Status::error(ErrorKind::ConnectionError, reason),
		);
		// Err only means the connection is going away
		let _ = self.inner.inbound_tx.send(Err(err.into()));
	}

	pub(super) fn report_dispatcher_failure(&self, err: &ConnectionError) {
		error!(connection = self.inner.number, error = %err, "Auto-dispatch failed");
		let status = Status::error(ErrorKind::DispatcherError, err.to_string());
		*lock(&self.inner.dispatcher_status) = Some(status.clone());
		self.emit(Event::DispatcherError, &status);
	}

	/// Starts the auto-dispatch worker.
	pub fn start_auto_dispatch(&self) -> Result<(), ConnectionError> {
		self.ensure_connected("start_auto_dispatch")?;
		let mut workers = lock(&self.inner.workers);
		if workers
			.dispatcher
			.as_ref()
			.is_some_and(|worker| !worker.is_finished())
		{
			return Err(ConnectionError::DispatcherRunning);
		}
		let weak = self.downgrade();
		workers.dispatcher = Some(Worker::spawn("dispatcher", move |rx| {
			run_dispatcher(weak, rx)
		}));
		Ok(())
	}

	/// Stops the auto-dispatch worker, optionally waiting until any
	/// in-flight callback has returned.
	pub async fn stop_auto_dispatch(
		&self,
		wait_for_completion: bool,
	) -> Result<(), ConnectionError> {
		let worker = lock(&self.inner.workers).dispatcher.take();
		let mut worker = match worker {
			| Some(worker) if !worker.is_finished() => worker,
			| _ => return Err(ConnectionError::DispatcherNotRunning),
		};
		if wait_for_completion {
			worker.stop().await;
		} else {
			worker.signal();
		}
		Ok(())
	}

	pub fn auto_dispatch_running(&self) -> bool {
		lock(&self.inner.workers)
			.dispatcher
			.as_ref()
			.is_some_and(|worker| !worker.is_finished())
	}

	/// Takes the most recent auto-dispatch failure, if any.
	pub fn last_dispatcher_status(&self) -> Option<Status> {
		lock(&self.inner.dispatcher_status).take()
	}
}

async fn wait<F: Future>(timeout: Timeout, future: F) -> Option<F::Output> {
	match timeout {
		| Timeout::After(duration) => tokio::time::timeout(duration, future).await.ok(),
		| Timeout::WaitForever => Some(future.await),
	}
}

fn connection_id(number: u64) -> String {
	let host = std::env::var("HOSTNAME")
		.ok()
		.filter(|host| !host.is_empty())
		.unwrap_or_else(|| "localhost".to_string());
	let seconds = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_secs())
		.unwrap_or_default();
	format!("GMSEC_{host}_{seconds:x}_{}_{number}", std::process::id())
}
