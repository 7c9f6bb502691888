use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{GeneratorError, PeriodicPublisher};
use crate::client::Connection;
use crate::message::{Field, Kind, Message, fields};
use crate::subject::SubjectPath;

/// Template field carrying the sampling interval in seconds
pub const SAMPLE_INTERVAL: &str = "SAMPLE-INTERVAL";
/// Template field carrying the averaging window in seconds
pub const AVERAGE_INTERVAL: &str = "AVERAGE-INTERVAL";

/// Produces the resource fields embedded in each published message.
///
/// Called once per publish cycle on the publisher's task, whatever the
/// generator's sampling intervals. A sampler that averages its readings
/// keeps its own history and reads the window from
/// [`ResourceGenerator::average_interval`].
#[derive(Clone)]
pub struct FieldSampler(Arc<dyn Fn() -> Vec<Field> + Send + Sync>);

impl FieldSampler {
	pub fn new<F>(sample: F) -> Self
	where F: Fn() -> Vec<Field> + Send + Sync + 'static {
		Self(Arc::new(sample))
	}

	pub fn sample(&self) -> Vec<Field> {
		(self.0)()
	}
}

impl fmt::Debug for FieldSampler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "FieldSampler({:p})", Arc::as_ptr(&self.0))
	}
}

/// Publishes resource metrics gathered by a [`FieldSampler`].
///
/// The sampling and averaging intervals are advertised in every message
/// as [`SAMPLE_INTERVAL`] and [`AVERAGE_INTERVAL`]. They describe how the
/// sampler measures; the publish rate alone decides when it runs.
pub struct ResourceGenerator {
	publisher: PeriodicPublisher,
	sample_interval: Duration,
	average_interval: Duration,
}

impl ResourceGenerator {
	/// `sample_interval` must be at least one second and no longer than
	/// `average_interval`.
	pub fn new(
		connection: Connection,
		subject: &str,
		pub_rate: u16,
		sample_interval: u32,
		average_interval: u32,
		sampler: FieldSampler,
	) -> Result<Self, GeneratorError> {
		if sample_interval < 1 || average_interval < sample_interval {
			return Err(GeneratorError::InvalidSampling {
				sample: sample_interval,
				average: average_interval,
			});
		}
		SubjectPath::for_publish(subject).map_err(|err| {
			GeneratorError::Connection(err.into())
		})?;

		let template = Message::new(subject, Kind::Publish)
			.with_field(fields::PUB_RATE, pub_rate)
			.with_field(SAMPLE_INTERVAL, sample_interval)
			.with_field(AVERAGE_INTERVAL, average_interval);
		let publisher = PeriodicPublisher::build(
			connection,
			template,
			Some(sampler.0),
		)?;

		Ok(Self {
			publisher,
			sample_interval: Duration::from_secs(sample_interval.into()),
			average_interval: Duration::from_secs(average_interval.into()),
		})
	}

	pub fn sample_interval(&self) -> Duration {
		self.sample_interval
	}

	pub fn average_interval(&self) -> Duration {
		self.average_interval
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

	pub async fn set_field(&self, field: Field) -> Result<(), GeneratorError> {
		self.publisher.set_field(field).await
	}

	pub fn publisher(&self) -> &PeriodicPublisher {
		&self.publisher
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;

	fn connection() -> Connection {
		Connection::new(&Config::parse("mw-id=loopback server=resource-unit").unwrap())
			.unwrap()
	}

	#[test]
	fn test_sampling_intervals_are_validated() {
		let sampler = FieldSampler::new(Vec::new);

		for (sample, average) in [(0, 5), (10, 5)] {
			let result = ResourceGenerator::new(
				connection(),
				"GMSEC.RSRC",
				5,
				sample,
				average,
				sampler.clone(),
			);
			assert!(matches!(result, Err(GeneratorError::InvalidSampling { .. })));
		}

		let generator =
			ResourceGenerator::new(connection(), "GMSEC.RSRC", 5, 1, 10, sampler)
				.unwrap();
		assert_eq!(generator.sample_interval(), Duration::from_secs(1));
		assert_eq!(generator.average_interval(), Duration::from_secs(10));
		assert!(!generator.is_running());
	}
}
