//! Shared helpers for integration tests
#![allow(dead_code)]

use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gmsec_core::{Config, Connection};
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();
static NEXT_SERVER: AtomicUsize = AtomicUsize::new(1);

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
	INIT.call_once(|| {
		let _ = tracing_subscriber::fmt()
			.with_env_filter(EnvFilter::from_default_env())
			.with_test_writer()
			.try_init();
	});
}

/// Loopback bus name unique to the calling test
pub fn server(prefix: &str) -> String {
	format!("{prefix}-{}", NEXT_SERVER.fetch_add(1, Ordering::Relaxed))
}

pub fn config(server: &str, extra: &str) -> Config {
	Config::parse(&format!("mw-id=loopback server={server} {extra}"))
		.expect("valid test configuration")
}

pub async fn connected(config: &Config) -> Connection {
	init_tracing();
	let connection = Connection::new(config).expect("connection");
	connection.connect().await.expect("connect");
	connection
}

/// Polls `condition` for up to two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
	for _ in 0 .. 200 {
		if condition() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	condition()
}
