//! Process-wide middleware registry
//!
//! Factories are registered under a middleware id and looked up through
//! the `mw-id` configuration key. Each registered factory is shut down at
//! most once, either individually or through [`shutdown_all_middlewares`].

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, info};

use super::loopback::{LOOPBACK_MW_ID, LoopbackFactory};
use super::{Transport, TransportError};
use crate::config::Config;

/// Configuration key selecting the middleware
pub const MW_ID_KEY: &str = "mw-id";

/// Creates transports for one middleware.
pub trait MiddlewareFactory: Send + Sync + 'static {
	/// Build a transport for a new connection
	fn create(
		&self,
		config: &Config,
	) -> Result<Arc<dyn Transport>, TransportError>;

	/// Release process-wide middleware resources
	fn shutdown(&self) {}
}

static MIDDLEWARES: Lazy<DashMap<String, Arc<dyn MiddlewareFactory>>> =
	Lazy::new(DashMap::new);

fn normalize(id: &str) -> String {
	id.trim().to_ascii_lowercase()
}

/// Registers `factory` under `id`, returning the factory it replaced.
pub fn register_middleware(
	id: &str,
	factory: Arc<dyn MiddlewareFactory>,
) -> Option<Arc<dyn MiddlewareFactory>> {
	debug!(mw_id = %id, "Registering middleware");
	MIDDLEWARES.insert(normalize(id), factory)
}

/// Returns true if a factory is registered under `id`.
pub fn is_registered(id: &str) -> bool {
	MIDDLEWARES.contains_key(&normalize(id))
}

/// Builds a transport for the middleware named by `mw-id`.
///
/// The loopback middleware is registered on first use.
pub fn create_transport(
	config: &Config,
) -> Result<Arc<dyn Transport>, TransportError> {
	let id = config.get(MW_ID_KEY).map(normalize).ok_or_else(|| {
		TransportError::UnknownMiddleware { id: String::new() }
	})?;

	if id == LOOPBACK_MW_ID {
		MIDDLEWARES
			.entry(id.clone())
			.or_insert_with(|| Arc::new(LoopbackFactory));
	}

	// Clone the factory out so the map shard is not locked during create()
	let factory = MIDDLEWARES
		.get(&id)
		.map(|entry| Arc::clone(entry.value()))
		.ok_or_else(|| TransportError::UnknownMiddleware { id: id.clone() })?;

	factory.create(config)
}

/// Shuts down one middleware. Returns false if it was not registered.
pub fn shutdown_middleware(id: &str) -> bool {
	match MIDDLEWARES.remove(&normalize(id)) {
		| Some((id, factory)) => {
			info!(mw_id = %id, "Shutting down middleware");
			factory.shutdown();
			true
		}
		| None => false,
	}
}

/// Shuts down every registered middleware and returns how many were torn
/// down. Calling it again is a no-op until new middlewares are registered.
pub fn shutdown_all_middlewares() -> usize {
	let ids: Vec<String> =
		MIDDLEWARES.iter().map(|entry| entry.key().clone()).collect();
	ids.iter().filter(|id| shutdown_middleware(id)).count()
}
