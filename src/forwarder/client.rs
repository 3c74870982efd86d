//! Configuration for HTTP clients used to spawn forwarders.
use std::{
    num::NonZero,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::consts::DEFAULT_HTTP_TIMEOUT_SECS;

/// The default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 800;
/// The default pool idle timeout in seconds.
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 28;
/// The default HTTP connection limit per host.
pub const DEFAULT_CONNECTION_LIMIT_PER_HOST: usize = 64;

/// Create a default reqwest client builder for forwarders with optimized settings.
///
/// Every relay call is bounded by the request timeout, so a stalled
/// downstream cannot accumulate tasks without bound.
pub fn default_http_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS))
        // HTTP/1.x configuration
        .pool_idle_timeout(Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS))
        .pool_max_idle_per_host(DEFAULT_CONNECTION_LIMIT_PER_HOST)
        // HTTP/2 configuration. Protocol selection is left to ALPN so that
        // deployments behind HTTP/1.1-only proxies keep working.
        .http2_adaptive_window(true)
        .http2_keep_alive_interval(Duration::from_secs(10))
        .http2_keep_alive_while_idle(true)
}

/// A pool of HTTP clients for load balancing. Works with round-robin selection.
#[derive(Debug, Clone)]
pub struct HttpClientPool {
    /// The clients in the pool.
    clients: Arc<[reqwest::Client]>,
    /// The number of clients in the pool, so you don't have to deference the arc every time.
    num_clients: usize,
    /// The index of the last used client. Used for round-robin load balancing.
    last_used: Arc<AtomicU8>,
}

impl HttpClientPool {
    /// Create a new client pool with `num_clients` clients, created by the `make_client` function.
    pub fn new(num_clients: NonZero<usize>, make_client: impl Fn() -> reqwest::Client) -> Self {
        let clients = (0..num_clients.get()).map(|_| make_client()).collect();
        Self { clients, num_clients: num_clients.get(), last_used: Arc::new(AtomicU8::new(0)) }
    }

    /// Get a client from the pool.
    pub fn client(&self) -> &reqwest::Client {
        // NOTE: This will automatically wrap.
        let index = self.last_used.fetch_add(1, Ordering::Relaxed);
        &self.clients[(index as usize) % self.num_clients]
    }
}
