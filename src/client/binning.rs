//! Message binning
//!
//! Published messages whose subject participates in binning are collected
//! per subject and sent as one aggregated envelope once the bin is full or
//! its oldest message has waited for the configured timeout.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::config::BinSettings;
use super::connection::{Connection, ConnectionInner};
use crate::message::{Kind, Message, fields};
use crate::message_codec::{CodecError, MessageCodec};
use crate::subject::SubjectPath;

const LENGTH_PREFIX: usize = std::mem::size_of::<u32>();

/// How often bins are checked for an elapsed timeout
const FLUSH_TICK: Duration = Duration::from_millis(100);

struct Bin {
	messages: Vec<Message>,
	opened_at: Instant,
}

/// A batch of messages taken out of one bin
#[derive(Debug)]
pub(crate) struct Batch {
	pub subject: String,
	pub messages: Vec<Message>,
}

pub(crate) struct MessageBinner {
	settings: BinSettings,
	bins: HashMap<String, Bin>,
}

impl MessageBinner {
	pub fn new(settings: BinSettings) -> Self {
		Self {
			settings,
			bins: HashMap::new(),
		}
	}

	/// Whether messages on `subject` are binned.
	///
	/// Exclusions win; an empty include list admits every subject.
	pub fn participates(&self, subject: &SubjectPath) -> bool {
		if self.settings.exclude.iter().any(|p| p.matches(subject)) {
			return false;
		}
		self.settings.include.is_empty()
			|| self.settings.include.iter().any(|p| p.matches(subject))
	}

	/// Adds `message` to its subject's bin, returning the bin's contents
	/// when it has reached the configured size.
	pub fn add(&mut self, message: Message, now: Instant) -> Option<Batch> {
		let size = self.settings.size;
		let subject = message.subject().to_string();
		let bin = self.bins.entry(subject.clone()).or_insert_with(|| Bin {
			messages: Vec::with_capacity(size),
			opened_at: now,
		});
		bin.messages.push(message);

		if bin.messages.len() >= size {
			self.bins.remove(&subject).map(|bin| Batch {
				subject,
				messages: bin.messages,
			})
		} else {
			None
		}
	}

	/// Removes bins whose oldest message is at least the timeout old.
	pub fn take_due(&mut self, now: Instant) -> Vec<Batch> {
		let timeout = self.settings.timeout;
		let due: Vec<String> = self
			.bins
			.iter()
			.filter(|(_, bin)| now.duration_since(bin.opened_at) >= timeout)
			.map(|(subject, _)| subject.clone())
			.collect();
		due.into_iter()
			.filter_map(|subject| {
				self.bins.remove(&subject).map(|bin| Batch {
					subject,
					messages: bin.messages,
				})
			})
			.collect()
	}

	/// Removes every non-empty bin.
	pub fn take_all(&mut self) -> Vec<Batch> {
		self.bins
			.drain()
			.map(|(subject, bin)| Batch {
				subject,
				messages: bin.messages,
			})
			.collect()
	}

	/// Number of messages waiting in all bins
	pub fn pending(&self) -> usize {
		self.bins.values().map(|bin| bin.messages.len()).sum()
	}
}

/// Packs `messages` into one envelope published on `subject`.
///
/// `MSG-DATA` holds each message encoded with `codec`, preceded by its
/// length as a big-endian `u32`.
pub fn aggregate(
	subject: &str,
	messages: &[Message],
	codec: &dyn MessageCodec,
) -> Result<Message, CodecError> {
	let mut data = BytesMut::new();
	for message in messages {
		let encoded = codec.encode(message)?;
		let len = u32::try_from(encoded.len()).map_err(|_| {
			CodecError::Encode(format!(
				"message of {} bytes is too large to aggregate",
				encoded.len()
			))
		})?;
		data.reserve(LENGTH_PREFIX + encoded.len());
		data.put_u32(len);
		data.put_slice(&encoded);
	}
	let count = u32::try_from(messages.len())
		.map_err(|_| CodecError::Encode("too many messages in bin".into()))?;

	Ok(Message::new(subject, Kind::Publish)
		.with_field(fields::AGGREGATED_MSG, true)
		.with_field(fields::NUM_MESSAGES, count)
		.with_field(fields::MSG_DATA, data.freeze()))
}

/// Unpacks an envelope built by [`aggregate`].
pub fn disaggregate(
	envelope: &Message,
	codec: &dyn MessageCodec,
) -> Result<Vec<Message>, CodecError> {
	let mut data = envelope
		.field(fields::MSG_DATA)
		.and_then(|value| value.as_bytes())
		.cloned()
		.ok_or_else(|| CodecError::Decode("envelope has no MSG-DATA".into()))?;
	let expected = envelope
		.field(fields::NUM_MESSAGES)
		.and_then(|value| value.as_u64());

	let mut messages = Vec::new();
	while data.has_remaining() {
		if data.remaining() < LENGTH_PREFIX {
			return Err(CodecError::Truncated {
				expected: LENGTH_PREFIX,
				available: data.remaining(),
			});
		}
		let len = data.get_u32() as usize;
		if data.remaining() < len {
			return Err(CodecError::Truncated {
				expected: len,
				available: data.remaining(),
			});
		}
		let encoded = data.split_to(len);
		messages.push(codec.decode(&encoded)?);
	}

	if let Some(expected) = expected {
		if expected != messages.len() as u64 {
			return Err(CodecError::Decode(format!(
				"envelope announces {expected} messages but carries {}",
				messages.len()
			)));
		}
	}
	Ok(messages)
}

/// Periodically sends bins whose timeout has elapsed.
pub(super) async fn run_flusher(
	weak: Weak<ConnectionInner>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	let mut ticker = tokio::time::interval(FLUSH_TICK);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	loop {
		tokio::select! {
			_ = &mut shutdown_rx => break,
			_ = ticker.tick() => {}
		}
		let Some(inner) = weak.upgrade() else {
			break;
		};
		Connection::from_inner(inner).flush_bins(false).await;
	}
	debug!("Bin flusher terminated");
}
