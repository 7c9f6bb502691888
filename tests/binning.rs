//! Message binning over the loopback middleware.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, connected, init_tracing, server};
use gmsec_core::transport::LoopbackTransport;
use gmsec_core::{Connection, Kind, Message, Timeout};

const LONG: Timeout = Timeout::After(Duration::from_secs(2));
const SHORT: Timeout = Timeout::After(Duration::from_millis(100));

/// A binning publisher whose transport stays observable.
async fn binning_publisher(
	server: &str,
	settings: &str,
) -> (Connection, Arc<LoopbackTransport>) {
	init_tracing();
	let transport = Arc::new(LoopbackTransport::new(server));
	let config = config(server, &format!("gmsec-use-msg-bins=true {settings}"));
	let connection = Connection::with_transport(&config, transport.clone()).unwrap();
	connection.connect().await.unwrap();
	(connection, transport)
}

fn numbered(subject: &str, n: i32) -> Message {
	Message::new(subject, Kind::Publish).with_field("N", n)
}

async fn receive_numbers(connection: &Connection, count: usize) -> Vec<i64> {
	let mut numbers = Vec::new();
	for _ in 0 .. count {
		let message = connection.receive(LONG).await.unwrap().unwrap();
		numbers.push(message.i64_value("N").unwrap());
	}
	numbers
}

#[tokio::test]
async fn test_full_bin_is_sent_as_one_envelope() {
	let server = server("bin-full");
	let subscriber = connected(&config(&server, "")).await;
	subscriber.subscribe("GMSEC.BIN.>").await.unwrap();
	let (publisher, transport) = binning_publisher(
		&server,
		"gmsec-msg-bin-size=3 gmsec-msg-bin-timeout=60000",
	)
	.await;

	publisher.publish(&numbered("GMSEC.BIN.A", 0)).await.unwrap();
	publisher.publish(&numbered("GMSEC.BIN.A", 1)).await.unwrap();
	assert_eq!(transport.sent_count(), 0);
	publisher.publish(&numbered("GMSEC.BIN.A", 2)).await.unwrap();
	assert_eq!(transport.sent_count(), 1);

	assert_eq!(receive_numbers(&subscriber, 3).await, vec![0, 1, 2]);
	assert!(subscriber.receive(SHORT).await.unwrap().is_none());

	publisher.disconnect().await.unwrap();
	subscriber.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_bins_are_kept_per_subject() {
	let server = server("bin-subjects");
	let (publisher, transport) = binning_publisher(
		&server,
		"gmsec-msg-bin-size=2 gmsec-msg-bin-timeout=60000",
	)
	.await;

	publisher.publish(&numbered("GMSEC.BIN.A", 0)).await.unwrap();
	publisher.publish(&numbered("GMSEC.BIN.B", 0)).await.unwrap();
	assert_eq!(transport.sent_count(), 0);
	publisher.publish(&numbered("GMSEC.BIN.B", 1)).await.unwrap();
	assert_eq!(transport.sent_count(), 1);

	publisher.disconnect().await.unwrap();
	assert_eq!(transport.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_bin_flushes_after_timeout() {
	let server = server("bin-timeout");
	let subscriber = connected(&config(&server, "")).await;
	subscriber.subscribe("GMSEC.BIN.>").await.unwrap();
	let (publisher, transport) = binning_publisher(
		&server,
		"gmsec-msg-bin-size=10 gmsec-msg-bin-timeout=500",
	)
	.await;

	publisher.publish(&numbered("GMSEC.BIN.T", 0)).await.unwrap();
	publisher.publish(&numbered("GMSEC.BIN.T", 1)).await.unwrap();
	assert_eq!(transport.sent_count(), 0);

	tokio::time::sleep(Duration::from_secs(1)).await;
	assert_eq!(transport.sent_count(), 1);
	assert_eq!(receive_numbers(&subscriber, 2).await, vec![0, 1]);

	publisher.disconnect().await.unwrap();
	subscriber.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_flushes_partial_bins() {
	let server = server("bin-disconnect");
	let subscriber = connected(&config(&server, "")).await;
	subscriber.subscribe("GMSEC.BIN.>").await.unwrap();
	let (publisher, transport) = binning_publisher(
		&server,
		"gmsec-msg-bin-size=10 gmsec-msg-bin-timeout=60000",
	)
	.await;

	publisher.publish(&numbered("GMSEC.BIN.D", 7)).await.unwrap();
	publisher.publish(&numbered("GMSEC.BIN.D", 8)).await.unwrap();
	publisher.disconnect().await.unwrap();

	assert_eq!(transport.sent_count(), 1);
	assert_eq!(receive_numbers(&subscriber, 2).await, vec![7, 8]);

	subscriber.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_excluded_and_unlisted_subjects_bypass_bins() {
	let server = server("bin-exclude");
	let subscriber = connected(&config(&server, "")).await;
	subscriber.subscribe("GMSEC.>").await.unwrap();
	let (publisher, transport) = binning_publisher(
		&server,
		"gmsec-msg-bin-size=10 gmsec-msg-bin-timeout=60000 \
		 gmsec-msg-bin-subject-1=GMSEC.TLM.> \
		 gmsec-msg-bin-exclude-subject-1=GMSEC.TLM.LOG.>",
	)
	.await;

	publisher.publish(&numbered("GMSEC.TLM.LOG.X", 1)).await.unwrap();
	assert_eq!(transport.sent_count(), 1);
	publisher.publish(&numbered("GMSEC.CMD.X", 2)).await.unwrap();
	assert_eq!(transport.sent_count(), 2);
	publisher.publish(&numbered("GMSEC.TLM.X", 3)).await.unwrap();
	assert_eq!(transport.sent_count(), 2);

	let direct = subscriber.receive(LONG).await.unwrap().unwrap();
	assert_eq!(direct.subject(), "GMSEC.TLM.LOG.X");
	assert!(!direct.is_aggregated());
	assert_eq!(receive_numbers(&subscriber, 1).await, vec![2]);

	publisher.disconnect().await.unwrap();
	assert_eq!(receive_numbers(&subscriber, 1).await, vec![3]);
	subscriber.disconnect().await.unwrap();
}
