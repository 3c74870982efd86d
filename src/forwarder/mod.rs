//! Fan-out of validated requests to the configured downstream relay targets.
//!
//! Each target is served by an independent forwarder task. Dispatch never
//! blocks the caller-facing response path and a failing target can neither
//! fail the request nor cancel its siblings.

use alloy_primitives::B256;
use axum::http::HeaderValue;
use hyper::{header::CONTENT_TYPE, HeaderMap};
use serde_json::json;
use std::{
    sync::Arc,
    time::Instant,
};
use tokio::sync::mpsc;
use tracing::*;

pub mod client;
pub mod http;

use http::spawn_http_forwarder;

/// The set of downstream relay forwarders the ingress broadcasts to.
#[derive(Debug, Default)]
pub struct RelayForwarders {
    /// One handle per configured relay target.
    relays: Vec<RelayHandle>,
}

impl RelayForwarders {
    pub fn new(relays: Vec<RelayHandle>) -> Self {
        Self { relays }
    }

    /// Returns the number of configured relay targets.
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Broadcast the request to every relay target. Fire-and-forget with
    /// respect to the response path: per-target outcomes are observed by the
    /// forwarder tasks only.
    pub fn broadcast(&self, request: Arc<ForwardingRequest>) {
        debug!(target: "forwarder", relays = self.relays.len(), hash = %request.hash, "broadcasting request");
        for handle in &self.relays {
            if let Err(e) = handle.sender.send(request.clone()) {
                error!(target: "forwarder", ?e, relay = %handle.name, "failed to send forwarding request to relay");
            }
        }
    }
}

/// A handle to one spawned relay forwarder.
#[derive(Debug)]
pub struct RelayHandle {
    /// Relay name, used for logging and metrics.
    pub name: String,
    /// Sender to the relay forwarder task.
    pub sender: mpsc::UnboundedSender<Arc<ForwardingRequest>>,
}

/// Spawn one HTTP forwarder per relay URL.
pub fn spawn_forwarders(
    urls: &[String],
    pool: client::HttpClientPool,
) -> eyre::Result<RelayForwarders> {
    let mut relays = Vec::with_capacity(urls.len());
    for (index, url) in urls.iter().enumerate() {
        let name = format!("relay-{index}");
        let sender = spawn_http_forwarder(name.clone(), url.clone(), pool.clone())?;
        relays.push(RelayHandle { name, sender });
    }
    Ok(RelayForwarders::new(relays))
}

/// A validated request ready to be relayed downstream.
#[derive(Debug)]
pub struct ForwardingRequest {
    /// The JSON-RPC encoded body to be forwarded.
    pub body: Arc<Vec<u8>>,
    /// The headers of the request.
    pub headers: HeaderMap,
    /// The hash identifying the forwarded payload.
    pub hash: B256,
    /// The instant the originating request was received.
    pub received_at: Instant,
}

impl ForwardingRequest {
    /// Build a forwarding request re-encoding the method call with the
    /// normalized parameter.
    pub fn from_method_call(
        id: u64,
        method: &str,
        param: &impl serde::Serialize,
        hash: B256,
        received_at: Instant,
    ) -> Self {
        let json = json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": method,
            "params": [param]
        });
        let body = serde_json::to_vec(&json).expect("to JSON serialize request");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self { body: Arc::new(body), headers, hash, received_at }
    }

    pub fn encoded_size(&self) -> usize {
        self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn forwarding_request_reshapes_method_call() {
        let param = json!({"txs": ["0xdead"], "blockNumber": "0x10"});
        let request = ForwardingRequest::from_method_call(
            7,
            "eth_sendBundle",
            &param,
            B256::ZERO,
            Instant::now(),
        );

        let decoded: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(decoded["id"], json!(7));
        assert_eq!(decoded["jsonrpc"], json!("2.0"));
        assert_eq!(decoded["method"], json!("eth_sendBundle"));
        assert_eq!(decoded["params"], json!([param]));
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }
}
