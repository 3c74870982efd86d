//! JSON-RPC bundle gateway: authenticates submitters, enforces admission
//! policy and relays accepted bundles to downstream builders.

use alloy_primitives::Address;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use std::{collections::HashSet, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;

pub mod cli;
use cli::BundleIngressArgs;

pub mod ingress;
use ingress::BundleIngress;

pub mod auth;
pub mod consts;
pub mod dedup;
pub mod forwarder;
pub mod jsonrpc;
pub mod keystore;
pub mod metrics;
pub mod policy;
pub mod primitives;
pub mod rate_limit;
pub mod simulator;
pub mod statics;
pub mod trace;

use crate::{
    dedup::FingerprintSet,
    forwarder::client::{default_http_builder, HttpClientPool},
    keystore::{HttpKeystore, Keystore, StaticKeystore},
    policy::PolicyConfig,
    rate_limit::{GlobalWindow, RateLimitConfig},
    simulator::SimulationClient,
};

pub async fn run(args: BundleIngressArgs) -> eyre::Result<()> {
    fdlimit::raise_fd_limit()?;

    let listener = TcpListener::bind(&args.listen_addr).await?;
    run_with_listener(args, listener).await
}

pub async fn run_with_listener(
    args: BundleIngressArgs,
    listener: TcpListener,
) -> eyre::Result<()> {
    if let Some(metrics_addr) = args.metrics {
        spawn_metrics_server(metrics_addr).await?;
    }

    let denylist = match args.denylist_file {
        Some(ref path) => load_denylist(path)?,
        None => HashSet::default(),
    };
    tracing::info!(target: "ingress", entries = denylist.len(), "Denylist loaded");

    let policy =
        PolicyConfig::new(denylist, args.max_distinct_to, args.gas_floor, args.gas_ceiling);

    let keystore = if let Some(url) = args.keystore_url {
        tracing::info!(target: "ingress", %url, "Using remote credential store");
        Keystore::Http(HttpKeystore::new(url))
    } else if let Some(ref path) = args.keystore_file {
        let store = StaticKeystore::from_file(path)?;
        tracing::info!(target: "ingress", path = %path.display(), "Using static credential store");
        Keystore::Static(store)
    } else {
        tracing::warn!(target: "ingress", "No credential store configured, key-scheme authentication is disabled");
        Keystore::Disabled
    };

    if args.relays.is_empty() {
        tracing::warn!(target: "ingress", "No relay targets configured, accepted bundles will not be forwarded");
    }

    // One pooled HTTP client set shared by all relay forwarders.
    let pool = HttpClientPool::new(args.client_pool_size, || {
        default_http_builder().build().expect("to create relay client")
    });
    let forwarders = forwarder::spawn_forwarders(&args.relays, pool)?;

    let simulator = args.simulation_rpc.map(SimulationClient::new);

    let rate_limits = RateLimitConfig {
        window: Duration::from_secs(args.rate_limit_window_s),
        count: args.rate_limit_count,
        global_window: Duration::from_secs(args.rate_limit_global_window_s),
        global_count: args.rate_limit_global_count,
    };

    let ingress = Arc::new(BundleIngress {
        gzip_enabled: args.gzip_enabled,
        rate_limits,
        max_txs_per_bundle: args.max_txs_per_bundle,
        policy,
        keystore,
        entities: DashMap::default(),
        global_window: GlobalWindow::new(rate_limits.global_window, rate_limits.global_count),
        seen_requests: FingerprintSet::new(args.dedup_capacity),
        forwarders,
        simulator,
    });

    // Spawn a state maintenance task.
    tokio::spawn(ingress.clone().maintain(Duration::from_secs(60)));

    let router = Router::new()
        .route("/", post(BundleIngress::handler))
        .route("/health", get(|| async { Ok::<_, ()>(()) }))
        .route("/livez", get(|| async { Ok::<_, ()>(()) }))
        .route("/readyz", get(|| async { Ok::<_, ()>(()) }))
        .layer(DefaultBodyLimit::max(args.max_request_size))
        .with_state(ingress);

    let addr = listener.local_addr()?;
    tracing::info!(target: "ingress", ?addr, "Starting bundle ingress server");

    axum::serve(listener, router).await?;

    Ok(())
}

/// Load the denylisted addresses from a JSON file containing a list of hex
/// addresses. Address comparison is byte equality, so mixed-case entries
/// match regardless of how callers checksum them.
fn load_denylist(path: impl AsRef<Path>) -> eyre::Result<HashSet<Address>> {
    let raw = std::fs::read_to_string(path)?;
    let addresses: Vec<Address> = serde_json::from_str(&raw)?;
    Ok(addresses.into_iter().collect())
}

/// Serve the Prometheus text endpoint on a dedicated listener.
async fn spawn_metrics_server(addr: SocketAddr) -> eyre::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let router = Router::new().route("/metrics", get(|| async { metrics::render() }));
    tracing::info!(target: "metrics", ?addr, "Starting metrics server");
    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(target: "metrics", ?error, "Metrics server terminated");
        }
    });
    Ok(())
}
