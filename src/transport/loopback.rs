//! In-process loopback middleware
//!
//! Connections configured with the same `server` name share a bus. A
//! message sent on the bus is delivered to every connected endpoint
//! (including the sender) holding a matching subscription.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcstr::ArcStr;
use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::registry::MiddlewareFactory;
use super::{Transport, TransportError};
use crate::config::Config;
use crate::lock;
use crate::message::Message;
use crate::subject::{SubjectMatcherNode, SubjectPath, SubjectPattern};

/// Middleware id of the loopback transport
pub const LOOPBACK_MW_ID: &str = "loopback";

/// Configuration key naming the bus to join
pub const SERVER_KEY: &str = "server";

const DEFAULT_SERVER: &str = "default";

/// Global registry of buses keyed by server name
static BUSES: Lazy<DashMap<String, Arc<LoopbackBus>>> = Lazy::new(DashMap::new);

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

fn bus(server: &str) -> Arc<LoopbackBus> {
	BUSES.entry(server.to_string()).or_default().clone()
}

/// Marks a bus as reachable or not.
///
/// Taking a bus offline breaks the link of every endpoint connected to it
/// and makes further connects fail until it is brought back online.
pub fn set_server_online(server: &str, online: bool) {
	let bus = bus(server);
	bus.offline.store(!online, Ordering::SeqCst);
	if !online {
		info!(server = %server, "Loopback server taken offline");
		let endpoints: Vec<_> = lock(&bus.endpoints).drain().collect();
		for (_, endpoint) in endpoints {
			endpoint.close();
		}
	}
}

#[derive(Default)]
struct LoopbackBus {
	endpoints: Mutex<HashMap<u64, Arc<Endpoint>>>,
	offline: AtomicBool,
}

impl LoopbackBus {
	fn deliver(&self, message: &Message) -> usize {
		let subject = SubjectPath::new(message.subject());
		let endpoints: Vec<Arc<Endpoint>> =
			lock(&self.endpoints).values().cloned().collect();

		endpoints
			.iter()
			.filter(|endpoint| endpoint.wants(&subject))
			.filter(|endpoint| endpoint.push(message.clone()))
			.count()
	}
}

struct Endpoint {
	subscriptions: Mutex<SubjectMatcherNode<HashSet<ArcStr>>>,
	tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl Endpoint {
	fn wants(&self, subject: &SubjectPath) -> bool {
		lock(&self.subscriptions).has_match(subject)
	}

	fn push(&self, message: Message) -> bool {
		lock(&self.tx)
			.as_ref()
			.is_some_and(|tx| tx.send(message).is_ok())
	}

	fn close(&self) {
		lock(&self.tx).take();
	}
}

struct Link {
	bus: Arc<LoopbackBus>,
	endpoint_id: u64,
	endpoint: Arc<Endpoint>,
}

/// Transport joining an in-process bus.
pub struct LoopbackTransport {
	server: String,
	link: Mutex<Option<Link>>,
	inbox: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
	sent: AtomicUsize,
}

impl LoopbackTransport {
	pub fn new(server: impl Into<String>) -> Self {
		Self {
			server: server.into(),
			link: Mutex::new(None),
			inbox: tokio::sync::Mutex::new(None),
			sent: AtomicUsize::new(0),
		}
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(config.get(SERVER_KEY).unwrap_or(DEFAULT_SERVER))
	}

	pub fn server(&self) -> &str {
		&self.server
	}

	/// Number of messages successfully handed to the bus.
	pub fn sent_count(&self) -> usize {
		self.sent.load(Ordering::SeqCst)
	}

	/// Drops this endpoint's link as if the network failed.
	pub fn break_link(&self) {
		if let Some(link) = lock(&self.link).as_ref() {
			debug!(server = %self.server, "Breaking loopback link");
			link.endpoint.close();
		}
	}

	fn endpoint(&self) -> Result<(Arc<LoopbackBus>, Arc<Endpoint>), TransportError> {
		lock(&self.link)
			.as_ref()
			.map(|link| (Arc::clone(&link.bus), Arc::clone(&link.endpoint)))
			.ok_or(TransportError::NotConnected)
	}
}

#[async_trait]
impl Transport for LoopbackTransport {
	fn library_name(&self) -> &str {
		LOOPBACK_MW_ID
	}

	fn mw_info(&self) -> String {
		format!("{LOOPBACK_MW_ID} (server: {})", self.server)
	}

	async fn connect(&self) -> Result<(), TransportError> {
		let bus = bus(&self.server);
		if bus.offline.load(Ordering::SeqCst) {
			return Err(TransportError::connect_failed(
				&self.server,
				"server is offline",
			));
		}

		let (tx, rx) = mpsc::unbounded_channel();
		let endpoint_id = NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed);
		let endpoint = Arc::new(Endpoint {
			subscriptions: Mutex::new(SubjectMatcherNode::new()),
			tx: Mutex::new(Some(tx)),
		});

		lock(&bus.endpoints).insert(endpoint_id, Arc::clone(&endpoint));
		*self.inbox.lock().await = Some(rx);
		let previous = lock(&self.link).replace(Link {
			bus,
			endpoint_id,
			endpoint,
		});
		if let Some(previous) = previous {
			lock(&previous.bus.endpoints).remove(&previous.endpoint_id);
		}

		debug!(server = %self.server, endpoint_id, "Loopback endpoint connected");
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), TransportError> {
		let link = lock(&self.link).take();
		if let Some(link) = link {
			link.endpoint.close();
			lock(&link.bus.endpoints).remove(&link.endpoint_id);
			debug!(
				server = %self.server,
				endpoint_id = link.endpoint_id,
				"Loopback endpoint disconnected"
			);
		}
		self.inbox.lock().await.take();
		Ok(())
	}

	async fn subscribe(
		&self,
		pattern: &SubjectPattern,
		_config: Option<&Config>,
	) -> Result<(), TransportError> {
		let (_, endpoint) = self.endpoint()?;
		lock(&endpoint.subscriptions)
			.get_or_create(pattern)
			.insert(pattern.pattern());
		Ok(())
	}

	async fn unsubscribe(
		&self,
		pattern: &SubjectPattern,
	) -> Result<(), TransportError> {
		let (_, endpoint) = self.endpoint()?;
		lock(&endpoint.subscriptions)
			.update_node(pattern.tokens(), |set| {
				set.remove(pattern.as_str());
			})
			.map_err(|e| TransportError::Other(e.to_string()))?;
		Ok(())
	}

	async fn send(&self, message: &Message) -> Result<(), TransportError> {
		let (bus, _) = self.endpoint()?;
		if bus.offline.load(Ordering::SeqCst) {
			return Err(TransportError::send_failed(
				message.subject(),
				"server is offline",
			));
		}
		let delivered = bus.deliver(message);
		self.sent.fetch_add(1, Ordering::SeqCst);
		trace!(subject = %message.subject(), delivered, "Loopback send");
		Ok(())
	}

	async fn receive(
		&self,
		timeout: Duration,
	) -> Result<Option<Message>, TransportError> {
		let mut inbox = self.inbox.lock().await;
		let rx = inbox.as_mut().ok_or(TransportError::NotConnected)?;
		match tokio::time::timeout(timeout, rx.recv()).await {
			| Ok(Some(message)) => Ok(Some(message)),
			| Ok(None) => Err(TransportError::link_broken(format!(
				"loopback server '{}' closed the link",
				self.server
			))),
			| Err(_elapsed) => Ok(None),
		}
	}
}

/// Factory registered under [`LOOPBACK_MW_ID`].
#[derive(Debug, Default)]
pub struct LoopbackFactory;

impl MiddlewareFactory for LoopbackFactory {
	fn create(
		&self,
		config: &Config,
	) -> Result<Arc<dyn Transport>, TransportError> {
		Ok(Arc::new(LoopbackTransport::from_config(config)))
	}

	fn shutdown(&self) {
		let servers: Vec<String> =
			BUSES.iter().map(|entry| entry.key().clone()).collect();
		for server in servers {
			if let Some((_, bus)) = BUSES.remove(&server) {
				let endpoints: Vec<_> = lock(&bus.endpoints).drain().collect();
				for (_, endpoint) in endpoints {
					endpoint.close();
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::Kind;

	fn pattern(p: &str) -> SubjectPattern {
		SubjectPattern::new(p).unwrap()
	}

	#[tokio::test]
	async fn test_delivers_only_to_matching_endpoints() {
		let a = LoopbackTransport::new("loopback-unit-match");
		let b = LoopbackTransport::new("loopback-unit-match");
		a.connect().await.unwrap();
		b.connect().await.unwrap();
		b.subscribe(&pattern("A.*"), None).await.unwrap();

		a.send(&Message::new("A.X", Kind::Publish)).await.unwrap();
		a.send(&Message::new("B.X", Kind::Publish)).await.unwrap();

		let received = b.receive(Duration::from_millis(100)).await.unwrap();
		assert_eq!(received.unwrap().subject(), "A.X");
		assert!(b.receive(Duration::from_millis(20)).await.unwrap().is_none());
		assert!(a.receive(Duration::from_millis(20)).await.unwrap().is_none());
		assert_eq!(a.sent_count(), 2);
	}

	#[tokio::test]
	async fn test_unsubscribe_stops_delivery() {
		let t = LoopbackTransport::new("loopback-unit-unsub");
		t.connect().await.unwrap();
		t.subscribe(&pattern("A.>"), None).await.unwrap();
		t.unsubscribe(&pattern("A.>")).await.unwrap();

		t.send(&Message::new("A.B", Kind::Publish)).await.unwrap();
		assert!(t.receive(Duration::from_millis(20)).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_broken_link_is_reported() {
		let t = LoopbackTransport::new("loopback-unit-broken");
		t.connect().await.unwrap();
		t.break_link();

		assert!(matches!(
			t.receive(Duration::from_millis(20)).await,
			Err(TransportError::LinkBroken { .. })
		));
	}

	#[tokio::test]
	async fn test_offline_server_refuses_connect() {
		set_server_online("loopback-unit-offline", false);
		let t = LoopbackTransport::new("loopback-unit-offline");
		assert!(matches!(
			t.connect().await,
			Err(TransportError::ConnectFailed { .. })
		));
		set_server_online("loopback-unit-offline", true);
		assert!(t.connect().await.is_ok());
	}

	#[tokio::test]
	async fn test_operations_require_connect() {
		let t = LoopbackTransport::new("loopback-unit-idle");
		assert_eq!(
			t.send(&Message::new("A", Kind::Publish)).await,
			Err(TransportError::NotConnected)
		);
		assert_eq!(
			t.receive(Duration::from_millis(1)).await,
			Err(TransportError::NotConnected)
		);
	}
}
