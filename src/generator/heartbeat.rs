use std::time::Duration;

use super::{GeneratorError, PeriodicPublisher};
use crate::client::Connection;
use crate::message::{Field, Kind, Message, fields};
use crate::subject::SubjectPath;

/// Publishes a heartbeat message on a fixed subject.
pub struct HeartbeatGenerator {
	publisher: PeriodicPublisher,
}

impl HeartbeatGenerator {
	/// Heartbeat on `subject` every `pub_rate` seconds.
	pub fn new(
		connection: Connection,
		subject: &str,
		pub_rate: u16,
	) -> Result<Self, GeneratorError> {
		SubjectPath::for_publish(subject).map_err(|err| {
			GeneratorError::Connection(err.into())
		})?;
		let template = Message::new(subject, Kind::Publish)
			.with_field(fields::PUB_RATE, pub_rate);
		Self::with_template(connection, template)
	}

	/// Heartbeat built from a caller-supplied template.
	pub fn with_template(
		connection: Connection,
		template: Message,
	) -> Result<Self, GeneratorError> {
		Ok(Self {
			publisher: PeriodicPublisher::new(connection, template)?,
		})
	}

	pub fn start(&self) -> Result<bool, GeneratorError> {
		self.publisher.start()
	}

	pub async fn stop(
		&self,
		wait_for_completion: bool,
	) -> Result<bool, GeneratorError> {
		self.publisher.stop(wait_for_completion).await
	}

	pub fn is_running(&self) -> bool {
		self.publisher.is_running()
	}

	pub fn publish_rate(&self) -> Duration {
		self.publisher.publish_rate()
	}

	pub async fn set_field(&self, field: Field) -> Result<(), GeneratorError> {
		self.publisher.set_field(field).await
	}

	pub fn clear_field(&self, name: &str) -> Result<bool, GeneratorError> {
		self.publisher.clear_field(name)
	}

	pub fn publisher(&self) -> &PeriodicPublisher {
		&self.publisher
	}
}
