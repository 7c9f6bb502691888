use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::{
	Completion, PendingRequest, PendingRequestTable, ReplyMode, RequestError,
};
use crate::message::{Kind, Message, ResponseStatus, fields};

fn request(id: u64) -> Message {
	let mut message = Message::new("GMSEC.REQ.A", Kind::Request);
	message.set_request_id(id);
	message
}

fn reply(id: u64, status: Option<ResponseStatus>) -> Message {
	let mut message = Message::new("GMSEC.RESP.A", Kind::Reply);
	message.set_request_id(id);
	if let Some(status) = status {
		message.set_response_status(status);
	}
	message
}

fn callback_entry(
	id: u64,
	timeout: Option<u64>,
	republish: Option<u64>,
	multi: bool,
	now: Instant,
) -> PendingRequest<&'static str> {
	PendingRequest::new(
		id,
		request(id),
		timeout.map(Duration::from_millis),
		republish.map(Duration::from_millis),
		multi,
		ReplyMode::Callback("listener"),
		now,
	)
}

#[test]
fn test_register_rejects_duplicate_ids() {
	let now = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(1, Some(100), None, false, now)).unwrap();

	assert_eq!(
		table.register(callback_entry(1, Some(100), None, false, now)),
		Err(RequestError::DuplicateRequestId { request_id: 1 })
	);
	assert_eq!(table.len(), 1);
}

#[test]
fn test_complete_one_removes_entry() {
	let now = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(7, Some(100), None, false, now)).unwrap();

	let completion = table.complete(7, &reply(7, None), now).unwrap();
	assert!(completion.is_terminal());
	assert!(table.is_empty());
	assert!(table.complete(7, &reply(7, None), now).is_none());
}

#[test]
fn test_reply_must_echo_requester_stamp() {
	let now = Instant::now();
	let mut table = PendingRequestTable::new();
	let mut entry = callback_entry(5, Some(100), None, false, now);
	entry.request.set_field(fields::REPLY_UNIQUE_ID, "GMSEC_HOST_A_1");
	table.register(entry).unwrap();

	let mut foreign = reply(5, None);
	foreign.set_field(fields::REPLY_UNIQUE_ID, "GMSEC_HOST_B_2");
	assert!(table.complete(5, &foreign, now).is_none());
	assert!(table.complete(5, &reply(5, None), now).is_none());
	assert!(table.contains(5));

	let mut own = reply(5, None);
	own.set_field(fields::REPLY_UNIQUE_ID, "GMSEC_HOST_A_1");
	assert!(table.complete(5, &own, now).unwrap().is_terminal());
	assert!(table.is_empty());
}

#[test]
fn test_multi_response_sequence() {
	let start = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(3, Some(100), None, true, start)).unwrap();

	let later = start + Duration::from_millis(80);
	let ack = table
		.complete(3, &reply(3, Some(ResponseStatus::Acknowledgement)), later)
		.unwrap();
	match ack {
		| Completion::KeepAlive {
			request_id,
			listener,
			..
		} => {
			assert_eq!(request_id, 3);
			assert_eq!(listener, Some("listener"));
		}
		| Completion::Final(_) => panic!("ACK must keep the request alive"),
	}
	// Timer restarted from the keep-alive
	assert_eq!(
		table.get(3).unwrap().expires_at(),
		Some(later + Duration::from_millis(100))
	);

	let working = table
		.complete(3, &reply(3, Some(ResponseStatus::WorkingKeepAlive)), later)
		.unwrap();
	assert!(!working.is_terminal());

	let done = table
		.complete(
			3,
			&reply(3, Some(ResponseStatus::SuccessfulCompletion)),
			later,
		)
		.unwrap();
	assert!(done.is_terminal());
	assert!(table.is_empty());
}

#[test]
fn test_multi_response_without_status_is_terminal() {
	let now = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(4, None, None, true, now)).unwrap();

	assert!(table.complete_multi(4, &reply(4, None), now).unwrap().is_terminal());
}

#[test]
fn test_blocking_keep_alive_has_no_listener() {
	let now = Instant::now();
	let (tx, _rx) = oneshot::channel();
	let mut table = PendingRequestTable::<&'static str>::new();
	table
		.register(PendingRequest::new(
			5,
			request(5),
			None,
			None,
			true,
			ReplyMode::Blocking(tx),
			now,
		))
		.unwrap();

	match table
		.complete(5, &reply(5, Some(ResponseStatus::WorkingKeepAlive)), now)
		.unwrap()
	{
		| Completion::KeepAlive { listener, .. } => assert!(listener.is_none()),
		| Completion::Final(_) => panic!("keep-alive must not finish"),
	}
}

#[test]
fn test_reap_times_out_without_republish() {
	let start = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(1, Some(100), None, false, start)).unwrap();
	table.register(callback_entry(2, Some(500), None, false, start)).unwrap();

	assert_eq!(table.next_deadline(), Some(start + Duration::from_millis(100)));

	let reaped = table.reap_expired(start + Duration::from_millis(50));
	assert!(reaped.timed_out.is_empty());

	let reaped = table.reap_expired(start + Duration::from_millis(100));
	assert_eq!(reaped.timed_out.len(), 1);
	assert_eq!(reaped.timed_out[0].request_id, 1);
	assert!(reaped.republish.is_empty());
	assert!(!table.contains(1));
	assert!(table.contains(2));
}

#[test]
fn test_reap_republishes_until_absolute_timeout() {
	let start = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(9, Some(250), Some(100), false, start)).unwrap();

	let at = |ms| start + Duration::from_millis(ms);

	let reaped = table.reap_expired(at(100));
	assert_eq!(reaped.republish.len(), 1);
	assert_eq!(reaped.republish[0].request_id(), Some(9));
	assert_eq!(table.get(9).unwrap().next_republish(), Some(at(200)));
	assert_eq!(table.next_deadline(), Some(at(200)));

	let reaped = table.reap_expired(at(200));
	assert_eq!(reaped.republish.len(), 1);
	assert_eq!(table.next_deadline(), Some(at(250)));

	let reaped = table.reap_expired(at(250));
	assert!(reaped.republish.is_empty());
	assert_eq!(reaped.timed_out.len(), 1);
	assert!(table.is_empty());
}

#[test]
fn test_wait_forever_republishes_indefinitely() {
	let start = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(1, None, Some(100), false, start)).unwrap();

	for tick in 1 ..= 5 {
		let reaped = table.reap_expired(start + Duration::from_millis(100 * tick));
		assert_eq!(reaped.republish.len(), 1);
		assert!(reaped.timed_out.is_empty());
	}
	assert!(table.contains(1));
}

#[test]
fn test_drain() {
	let now = Instant::now();
	let mut table = PendingRequestTable::new();
	table.register(callback_entry(1, None, None, false, now)).unwrap();
	table.register(callback_entry(2, None, None, false, now)).unwrap();

	assert_eq!(table.next_deadline(), None);
	let mut drained: Vec<u64> = table.drain().into_iter().map(|p| p.request_id).collect();
	drained.sort();
	assert_eq!(drained, vec![1, 2]);
	assert!(table.is_empty());
}
