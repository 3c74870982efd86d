use std::{net::SocketAddr, num::NonZero, path::PathBuf, str::FromStr};

use clap::Parser;

use crate::{
    dedup::DEFAULT_DEDUP_CAPACITY,
    policy::{DEFAULT_GAS_CEILING, DEFAULT_GAS_FLOOR, DEFAULT_MAX_DISTINCT_TO},
};

/// The maximum request size in bytes (10 MiB).
const MAX_REQUEST_SIZE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
pub struct BundleIngressArgs {
    /// Listen socket address for receiving bundle submissions.
    #[clap(long, env = "LISTEN_ADDR", id = "LISTEN_ADDR", default_value = "127.0.0.1:18545")]
    pub listen_addr: SocketAddr,

    /// Comma-separated list of downstream relay URLs to fan submissions out to.
    #[clap(
        long,
        env = "RELAY_ENDPOINTS",
        id = "RELAY_ENDPOINTS",
        value_delimiter = ',',
        required = false
    )]
    pub relays: Vec<String>,

    /// The URL of the simulation backend used by eth_callBundle.
    #[clap(long, env = "SIMULATION_RPC", id = "SIMULATION_RPC")]
    pub simulation_rpc: Option<String>,

    /// The URL of the remote credential store for key-scheme authentication.
    #[clap(long, env = "KEYSTORE_ENDPOINT", id = "KEYSTORE_ENDPOINT")]
    pub keystore_url: Option<String>,

    /// Path to a JSON file with static key-scheme credentials. Mutually
    /// exclusive with `--keystore-url`.
    #[clap(long, env = "KEYSTORE_FILE", id = "KEYSTORE_FILE", conflicts_with = "KEYSTORE_ENDPOINT")]
    pub keystore_file: Option<PathBuf>,

    /// Path to a JSON file with the list of denylisted addresses.
    #[clap(long, env = "DENYLIST_FILE", id = "DENYLIST_FILE")]
    pub denylist_file: Option<PathBuf>,

    /// Threshold for the distinct-address spam heuristic.
    #[clap(long, default_value_t = DEFAULT_MAX_DISTINCT_TO)]
    pub max_distinct_to: usize,

    /// Exclusive lower bound on the summed bundle gas.
    #[clap(long, default_value_t = DEFAULT_GAS_FLOOR)]
    pub gas_floor: u64,

    /// Inclusive upper bound on the summed bundle gas.
    #[clap(long, default_value_t = DEFAULT_GAS_CEILING)]
    pub gas_ceiling: u64,

    /// The per-identity rate-limit window, in seconds.
    #[clap(long = "rate-limit.window-s", default_value_t = 60)]
    pub rate_limit_window_s: u64,

    /// Max number of requests per identity per rolling window.
    #[clap(long = "rate-limit.count", default_value_t = 30)]
    pub rate_limit_count: u64,

    /// The global rate-limit window, in seconds.
    #[clap(long = "rate-limit.global-window-s", default_value_t = 15)]
    pub rate_limit_global_window_s: u64,

    /// Max number of requests overall per rolling global window.
    #[clap(long = "rate-limit.global-count", default_value_t = 60)]
    pub rate_limit_global_count: u64,

    /// The capacity of the replay-fingerprint set.
    #[clap(long, default_value_t = DEFAULT_DEDUP_CAPACITY)]
    pub dedup_capacity: usize,

    /// The maximum request size in bytes.
    #[clap(long, default_value_t = MAX_REQUEST_SIZE_BYTES)]
    pub max_request_size: usize,

    /// The maximum number of raw transactions per bundle.
    #[clap(long, default_value_t = 100)]
    pub max_txs_per_bundle: usize,

    /// Enable Prometheus metrics.
    /// The metrics will be served at the given interface and port.
    #[arg(long, env = "METRICS_ADDR", id = "METRICS_ADDR")]
    pub metrics: Option<SocketAddr>,

    /// Outputs logs in JSON format if enabled.
    #[clap(long = "log.json", default_value_t = false, env = "LOG_JSON", id = "LOG_JSON")]
    pub log_json: bool,

    /// Flag indicating whether GZIP support is enabled.
    #[clap(long = "http.enable-gzip", default_value_t = false)]
    pub gzip_enabled: bool,

    /// For each relay, the size of the HTTP client pool used to forward requests.
    #[clap(
        long = "http.client-pool-size",
        default_value_t = NonZero::new(8).expect("non-zero"),
        env = "CLIENT_POOL_SIZE",
        id = "CLIENT_POOL_SIZE"
    )]
    pub client_pool_size: NonZero<usize>,

    /// The number of IO worker threads used in Tokio.
    #[clap(long, default_value_t = 4, env = "IO_THREADS", id = "IO_THREADS")]
    pub io_threads: usize,
}

impl Default for BundleIngressArgs {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from_str("127.0.0.1:0").unwrap(),
            relays: vec![],
            simulation_rpc: None,
            keystore_url: None,
            keystore_file: None,
            denylist_file: None,
            max_distinct_to: DEFAULT_MAX_DISTINCT_TO,
            gas_floor: DEFAULT_GAS_FLOOR,
            gas_ceiling: DEFAULT_GAS_CEILING,
            rate_limit_window_s: 60,
            rate_limit_count: 30,
            rate_limit_global_window_s: 15,
            rate_limit_global_count: 60,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            max_request_size: MAX_REQUEST_SIZE_BYTES,
            max_txs_per_bundle: 100,
            metrics: None,
            log_json: false,
            gzip_enabled: false,
            client_pool_size: NonZero::new(8).unwrap(),
            io_threads: 4,
        }
    }
}

impl BundleIngressArgs {
    /// Set the relay targets.
    pub fn relays(mut self, relays: Vec<String>) -> Self {
        self.relays = relays;
        self
    }

    /// Set rate limit window seconds.
    pub fn rate_limit_window_s(mut self, window_s: u64) -> Self {
        self.rate_limit_window_s = window_s;
        self
    }

    /// Set rate limit count.
    pub fn rate_limit_count(mut self, count: u64) -> Self {
        self.rate_limit_count = count;
        self
    }

    /// Set the global rate limit count.
    pub fn rate_limit_global_count(mut self, count: u64) -> Self {
        self.rate_limit_global_count = count;
        self
    }

    /// Enable support for gzip encoded requests.
    pub fn gzip_enabled(mut self) -> Self {
        self.gzip_enabled = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_parse() {
        let args = BundleIngressArgs::try_parse_from(["test"]).unwrap();
        assert!(args.relays.is_empty());
        assert_eq!(args.max_distinct_to, DEFAULT_MAX_DISTINCT_TO);
        assert_eq!(args.gas_floor, DEFAULT_GAS_FLOOR);
        assert_eq!(args.rate_limit_window_s, 60);
    }

    #[test]
    fn cli_relays_are_comma_separated() {
        let args = BundleIngressArgs::try_parse_from([
            "test",
            "--relays",
            "http://relay-a:8545,http://relay-b:8545",
        ])
        .unwrap();
        assert_eq!(args.relays, vec!["http://relay-a:8545", "http://relay-b:8545"]);
    }

    #[test]
    fn cli_keystore_sources_conflict() {
        let err = BundleIngressArgs::try_parse_from([
            "test",
            "--keystore-url",
            "http://keystore:8080",
            "--keystore-file",
            "./keys.json",
        ])
        .unwrap_err();
        assert!(
            err.to_string().contains("cannot be used with"),
            "Unexpected error: {err}"
        );
    }
}
