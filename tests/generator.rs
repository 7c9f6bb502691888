//! Heartbeat and resource generators, driven on paused time.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{config, connected, server};
use gmsec_core::message::fields;
use gmsec_core::{
	Callback, Connection, Field, FieldSampler, GeneratorError,
	HeartbeatGenerator, Kind, Message, PeriodicPublisher, ResourceGenerator,
};

type Inbox = Arc<Mutex<Vec<Message>>>;

/// A second connection collecting everything published on `pattern`.
async fn collector(server: &str, pattern: &str) -> (Connection, Inbox) {
	let connection = connected(&config(server, "")).await;
	let inbox: Inbox = Arc::default();
	let seen = Arc::clone(&inbox);
	connection
		.subscribe_with_callback(
			pattern,
			Callback::new(move |_, message| seen.lock().unwrap().push(message.clone())),
		)
		.await
		.unwrap();
	connection.start_auto_dispatch().unwrap();
	(connection, inbox)
}

fn counters(inbox: &Inbox) -> Vec<i64> {
	inbox
		.lock()
		.unwrap()
		.iter()
		.filter_map(|message| message.i64_value(fields::COUNTER))
		.collect()
}

async fn sleep_ms(millis: u64) {
	tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_publishes_immediately_then_periodically() {
	let server = server("heartbeat");
	let (listener, inbox) = collector(&server, "GMSEC.HB.>").await;
	let connection = connected(&config(&server, "")).await;

	let heartbeat =
		HeartbeatGenerator::new(connection.clone(), "GMSEC.HB.SAT1", 1).unwrap();
	assert!(heartbeat.start().unwrap());
	assert!(!heartbeat.start().unwrap());
	assert!(heartbeat.is_running());

	sleep_ms(2_500).await;
	assert_eq!(counters(&inbox), vec![1, 2, 3]);
	let first = inbox.lock().unwrap()[0].clone();
	assert_eq!(first.subject(), "GMSEC.HB.SAT1");
	assert_eq!(first.i64_value(fields::PUB_RATE), Some(1));

	assert!(heartbeat.stop(true).await.unwrap());
	assert!(!heartbeat.stop(true).await.unwrap());
	assert!(!heartbeat.is_running());

	sleep_ms(3_000).await;
	assert_eq!(counters(&inbox).len(), 3);

	connection.disconnect().await.unwrap();
	listener.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rate_change_applies_from_next_interval() {
	let server = server("heartbeat-rate");
	let (listener, inbox) = collector(&server, "GMSEC.HB.>").await;
	let connection = connected(&config(&server, "")).await;

	let heartbeat =
		HeartbeatGenerator::new(connection.clone(), "GMSEC.HB.RATE", 10).unwrap();
	heartbeat.start().unwrap();
	sleep_ms(1_000).await;
	heartbeat
		.set_field(Field::new(fields::PUB_RATE, 2u16))
		.await
		.unwrap();
	assert_eq!(heartbeat.publish_rate(), Duration::from_secs(2));

	sleep_ms(8_500).await; // t = 9.5s
	assert_eq!(counters(&inbox).len(), 1);
	sleep_ms(1_000).await; // t = 10.5s
	assert_eq!(counters(&inbox).len(), 2);
	sleep_ms(2_000).await; // t = 12.5s
	assert_eq!(counters(&inbox), vec![1, 2, 3]);

	heartbeat.stop(true).await.unwrap();
	connection.disconnect().await.unwrap();
	listener.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_rate_pauses_after_one_last_publish() {
	let server = server("heartbeat-zero");
	let (listener, inbox) = collector(&server, "GMSEC.HB.>").await;
	let connection = connected(&config(&server, "")).await;

	let heartbeat =
		HeartbeatGenerator::new(connection.clone(), "GMSEC.HB.ZERO", 1).unwrap();
	heartbeat.start().unwrap();
	sleep_ms(500).await;
	assert_eq!(counters(&inbox).len(), 1);

	heartbeat
		.set_field(Field::new(fields::PUB_RATE, 0i32))
		.await
		.unwrap();
	sleep_ms(100).await;
	assert_eq!(counters(&inbox), vec![1, 2]);

	sleep_ms(5_000).await;
	assert_eq!(counters(&inbox).len(), 2);
	assert!(heartbeat.is_running());

	heartbeat
		.set_field(Field::new(fields::PUB_RATE, 1i32))
		.await
		.unwrap();
	sleep_ms(100).await;
	assert_eq!(counters(&inbox), vec![1, 2, 3]);

	heartbeat.stop(true).await.unwrap();
	connection.disconnect().await.unwrap();
	listener.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_template_fields_are_validated() {
	let connection = connected(&config(&server("heartbeat-fields"), "")).await;

	let heartbeat =
		HeartbeatGenerator::new(connection.clone(), "GMSEC.HB.FIELDS", 5).unwrap();
	assert!(matches!(
		heartbeat
			.set_field(Field::new(fields::PUB_RATE, -5i32))
			.await,
		Err(GeneratorError::NegativeRate { value: -5 })
	));
	assert_eq!(heartbeat.publish_rate(), Duration::from_secs(5));
	assert!(matches!(
		heartbeat
			.set_field(Field::new(fields::COUNTER, -1i32))
			.await,
		Err(GeneratorError::InvalidField { .. })
	));
	assert!(heartbeat.clear_field(fields::PUB_RATE).is_err());

	heartbeat
		.set_field(Field::new("STATUS", "NOMINAL"))
		.await
		.unwrap();
	assert!(heartbeat.clear_field("STATUS").unwrap());
	assert!(!heartbeat.clear_field("STATUS").unwrap());

	let negative = Message::new("GMSEC.HB.NEG", Kind::Publish)
		.with_field(fields::PUB_RATE, -1i32);
	assert!(matches!(
		PeriodicPublisher::new(connection.clone(), negative),
		Err(GeneratorError::NegativeRate { .. })
	));

	assert!(HeartbeatGenerator::new(connection.clone(), "GMSEC.*", 5).is_err());

	connection.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_counter_can_be_reset() {
	let server = server("heartbeat-counter");
	let (listener, inbox) = collector(&server, "GMSEC.HB.>").await;
	let connection = connected(&config(&server, "")).await;

	let heartbeat =
		HeartbeatGenerator::new(connection.clone(), "GMSEC.HB.COUNT", 1).unwrap();
	heartbeat
		.set_field(Field::new(fields::COUNTER, 100u32))
		.await
		.unwrap();
	heartbeat.start().unwrap();
	sleep_ms(1_500).await;
	assert_eq!(counters(&inbox), vec![100, 101]);

	heartbeat.stop(true).await.unwrap();
	connection.disconnect().await.unwrap();
	listener.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resource_generator_samples_every_cycle() {
	let server = server("resource");
	let (listener, inbox) = collector(&server, "GMSEC.RSRC.>").await;
	let connection = connected(&config(&server, "")).await;

	let samples = Arc::new(AtomicUsize::new(0));
	let taken = Arc::clone(&samples);
	let sampler = FieldSampler::new(move || {
		taken.fetch_add(1, Ordering::SeqCst);
		vec![Field::new("CPU-UTIL", 12.5f64)]
	});

	let resource = ResourceGenerator::new(
		connection.clone(),
		"GMSEC.RSRC.SAT1",
		1,
		1,
		2,
		sampler,
	)
	.unwrap();
	assert_eq!(resource.sample_interval(), Duration::from_secs(1));
	assert_eq!(resource.average_interval(), Duration::from_secs(2));

	resource.start().unwrap();
	sleep_ms(2_500).await;
	resource.stop(true).await.unwrap();

	assert_eq!(samples.load(Ordering::SeqCst), 3);
	let messages = inbox.lock().unwrap().clone();
	assert_eq!(messages.len(), 3);
	for message in &messages {
		assert_eq!(
			message.field("CPU-UTIL").and_then(|value| value.as_f64()),
			Some(12.5)
		);
		assert_eq!(message.i64_value("SAMPLE-INTERVAL"), Some(1));
		assert_eq!(message.i64_value("AVERAGE-INTERVAL"), Some(2));
	}

	connection.disconnect().await.unwrap();
	listener.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resource_sampling_follows_publish_rate() {
	let server = server("resource-rate");
	let (listener, inbox) = collector(&server, "GMSEC.RSRC.>").await;
	let connection = connected(&config(&server, "")).await;

	let samples = Arc::new(AtomicUsize::new(0));
	let taken = Arc::clone(&samples);
	let sampler = FieldSampler::new(move || {
		taken.fetch_add(1, Ordering::SeqCst);
		Vec::new()
	});

	let resource = ResourceGenerator::new(
		connection.clone(),
		"GMSEC.RSRC.SAT2",
		2,
		1,
		4,
		sampler,
	)
	.unwrap();
	resource.start().unwrap();
	sleep_ms(4_500).await; // publishes at 0s, 2s and 4s
	resource.stop(true).await.unwrap();

	assert_eq!(samples.load(Ordering::SeqCst), 3);
	let messages = inbox.lock().unwrap().clone();
	assert_eq!(messages.len(), 3);
	assert!(messages.iter().all(|message| {
		message.i64_value("SAMPLE-INTERVAL") == Some(1)
			&& message.i64_value("AVERAGE-INTERVAL") == Some(4)
	}));

	connection.disconnect().await.unwrap();
	listener.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_resource_sampling_intervals_are_checked() {
	let connection = connected(&config(&server("resource-check"), "")).await;
	let sampler = FieldSampler::new(Vec::new);

	for (sample, average) in [(0, 5), (5, 2)] {
		let result = ResourceGenerator::new(
			connection.clone(),
			"GMSEC.RSRC.X",
			1,
			sample,
			average,
			sampler.clone(),
		);
		assert!(matches!(
			result,
			Err(GeneratorError::InvalidSampling { .. })
		));
	}

	connection.disconnect().await.unwrap();
}
