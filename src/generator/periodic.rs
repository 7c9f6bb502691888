use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::GeneratorError;
use crate::client::worker::Worker;
use crate::client::{Connection, ConnectionError, ConnectionState};
use crate::lock;
use crate::message::{Field, FieldValue, Kind, Message, fields};

/// Publish rate used when the template carries no `PUB-RATE`
pub const DEFAULT_PUB_RATE: Duration = Duration::from_secs(30);

type Sampler = Arc<dyn Fn() -> Vec<Field> + Send + Sync>;

struct Shared {
	template: Mutex<Message>,
	/// Value stamped into `COUNTER` on the next publish
	next_counter: AtomicU32,
	sampler: Option<Sampler>,
}

impl Shared {
	/// Builds the message for one cycle.
	fn next_message(&self) -> Message {
		let counter = match self.next_counter.load(Ordering::SeqCst) {
			| 0 => 1,
			| counter => counter,
		};
		self.next_counter
			.store(counter.wrapping_add(1), Ordering::SeqCst);

		let mut message = lock(&self.template).clone();
		message.set_field(fields::COUNTER, counter);
		if let Some(sampler) = &self.sampler {
			for field in sampler() {
				message.add_field(field);
			}
		}
		message
	}

	async fn publish(&self, connection: &Connection) {
		let message = self.next_message();
		if let Err(err) = connection.publish(&message).await {
			warn!(subject = %message.subject(), error = %err, "Periodic publish failed");
		}
	}
}

enum Step {
	Publish,
	Pause,
	Stop,
}

/// Background publisher of a template message.
///
/// The first message goes out as soon as the publisher starts, then one
/// every `PUB-RATE` seconds. A rate changed while running applies from the
/// next interval on; a rate of zero stops periodic publishing until a
/// non-zero rate is set.
pub struct PeriodicPublisher {
	connection: Connection,
	shared: Arc<Shared>,
	rate_tx: watch::Sender<Duration>,
	running: AtomicBool,
	worker: Mutex<Option<Worker>>,
}

impl PeriodicPublisher {
	pub fn new(
		connection: Connection,
		template: Message,
	) -> Result<Self, GeneratorError> {
		Self::build(connection, template, None)
	}

	pub(super) fn build(
		connection: Connection,
		mut template: Message,
		sampler: Option<Sampler>,
	) -> Result<Self, GeneratorError> {
		if template.kind() != Kind::Publish {
			return Err(GeneratorError::InvalidMessageKind {
				expected: Kind::Publish,
				actual: template.kind(),
			});
		}

		let rate = match template.field(fields::PUB_RATE) {
			| Some(value) => parse_rate(value)?,
			| None => {
				template.set_field(fields::PUB_RATE, DEFAULT_PUB_RATE.as_secs());
				DEFAULT_PUB_RATE
			}
		};
		let next_counter = match template.field(fields::COUNTER) {
			| Some(value) => parse_counter(value)?,
			| None => 1,
		};
		let (rate_tx, _) = watch::channel(rate);

		Ok(Self {
			connection,
			shared: Arc::new(Shared {
				template: Mutex::new(template),
				next_counter: AtomicU32::new(next_counter),
				sampler,
			}),
			rate_tx,
			running: AtomicBool::new(false),
			worker: Mutex::new(None),
		})
	}

	/// Starts publishing. Returns `Ok(false)` if already running.
	pub fn start(&self) -> Result<bool, GeneratorError> {
		if self.connection.state() != ConnectionState::Connected {
			return Err(ConnectionError::not_initialized("generator start").into());
		}
		let mut worker = lock(&self.worker);
		if self.running.swap(true, Ordering::SeqCst) {
			return Ok(false);
		}

		let connection = self.connection.clone();
		let shared = Arc::clone(&self.shared);
		let rate_rx = self.rate_tx.subscribe();
		*worker = Some(Worker::spawn("generator", move |shutdown_rx| {
			run(connection, shared, rate_rx, shutdown_rx)
		}));
		info!(
			subject = %lock(&self.shared.template).subject(),
			rate = ?self.publish_rate(),
			"Periodic publisher started"
		);
		Ok(true)
	}

	/// Stops publishing. Returns `Ok(false)` if it was not running.
	pub async fn stop(
		&self,
		wait_for_completion: bool,
	) -> Result<bool, GeneratorError> {
		let worker = {
			let mut worker = lock(&self.worker);
			if !self.running.swap(false, Ordering::SeqCst) {
				return Ok(false);
			}
			worker.take()
		};
		if let Some(mut worker) = worker {
			if wait_for_completion {
				worker.stop().await;
			} else {
				worker.signal();
			}
		}
		info!("Periodic publisher stopped");
		Ok(true)
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	pub fn publish_rate(&self) -> Duration {
		*self.rate_tx.borrow()
	}

	/// Copy of the current template
	pub fn template(&self) -> Message {
		lock(&self.shared.template).clone()
	}

	/// Adds or replaces a template field.
	///
	/// `PUB-RATE` and `COUNTER` are validated. Setting `PUB-RATE` to zero
	/// while running publishes one message immediately.
	pub async fn set_field(&self, field: Field) -> Result<(), GeneratorError> {
		match field.name.as_str() {
			| fields::PUB_RATE => {
				let rate = parse_rate(&field.value)?;
				lock(&self.shared.template).add_field(field);
				self.rate_tx.send_replace(rate);
				debug!(rate = ?rate, "Publish rate changed");
				if rate.is_zero() && self.is_running() {
					self.shared.publish(&self.connection).await;
				}
			}
			| fields::COUNTER => {
				let counter = parse_counter(&field.value)?;
				self.shared.next_counter.store(counter, Ordering::SeqCst);
				lock(&self.shared.template).add_field(field);
			}
			| _ => {
				lock(&self.shared.template).add_field(field);
			}
		}
		Ok(())
	}

	/// Removes a template field. `PUB-RATE` cannot be removed.
	pub fn clear_field(&self, name: &str) -> Result<bool, GeneratorError> {
		if name == fields::PUB_RATE {
			return Err(GeneratorError::invalid_field(
				name,
				"the publish rate cannot be removed",
			));
		}
		Ok(lock(&self.shared.template).clear_field(name).is_some())
	}
}

impl Drop for PeriodicPublisher {
	fn drop(&mut self) {
		if let Some(worker) = lock(&self.worker).as_ref() {
			worker.abort();
		}
	}
}

fn parse_rate(value: &FieldValue) -> Result<Duration, GeneratorError> {
	let seconds = value.as_i64().ok_or_else(|| {
		GeneratorError::invalid_field(fields::PUB_RATE, "not an integer")
	})?;
	u64::try_from(seconds)
		.map(Duration::from_secs)
		.map_err(|_| GeneratorError::NegativeRate { value: seconds })
}

fn parse_counter(value: &FieldValue) -> Result<u32, GeneratorError> {
	let counter = value.as_i64().ok_or_else(|| {
		GeneratorError::invalid_field(fields::COUNTER, "not an integer")
	})?;
	u32::try_from(counter).map_err(|_| {
		GeneratorError::invalid_field(
			fields::COUNTER,
			format!("{counter} is outside 0..={}", u32::MAX),
		)
	})
}

async fn run(
	connection: Connection,
	shared: Arc<Shared>,
	mut rate_rx: watch::Receiver<Duration>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	let mut step = Step::Publish;
	loop {
		match step {
			| Step::Publish => shared.publish(&connection).await,
			| Step::Pause => debug!("Periodic publishing paused"),
			| Step::Stop => break,
		}
		step = next_step(&mut rate_rx, &mut shutdown_rx).await;
	}
	debug!("Periodic publisher terminated");
}

/// Waits for whatever comes next: the end of the current interval, a
/// switch to rate zero, or shutdown.
async fn next_step(
	rate_rx: &mut watch::Receiver<Duration>,
	shutdown_rx: &mut oneshot::Receiver<()>,
) -> Step {
	let rate = *rate_rx.borrow_and_update();

	if rate.is_zero() {
		loop {
			tokio::select! {
				_ = &mut *shutdown_rx => return Step::Stop,
				changed = rate_rx.changed() => {
					if changed.is_err() {
						return Step::Stop;
					}
					let resumed = !rate_rx.borrow().is_zero();
					if resumed {
						return Step::Publish;
					}
				}
			}
		}
	}

	let tick = tokio::time::sleep(rate);
	tokio::pin!(tick);
	loop {
		tokio::select! {
			_ = &mut *shutdown_rx => return Step::Stop,
			_ = &mut tick => return Step::Publish,
			changed = rate_rx.changed() => {
				if changed.is_err() {
					return Step::Stop;
				}
				// other rate changes apply from the next interval
				let paused = rate_rx.borrow().is_zero();
				if paused {
					return Step::Pause;
				}
			}
		}
	}
}
