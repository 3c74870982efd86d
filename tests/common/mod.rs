// Common test utilities and types
// This module is shared across all integration tests

use std::net::SocketAddr;

use alloy_consensus::{SignableTransaction as _, TxEip1559, TxEnvelope};
use alloy_eips::Encodable2718 as _;
use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_signer::{Signer, SignerSync as _};
use alloy_signer_local::PrivateKeySigner;
use axum::{extract::State, routing::post, Router};
use bundleproxy::{
    cli::BundleIngressArgs,
    consts::FLASHBOTS_SIGNATURE_HEADER,
    jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION_2},
};
use hyper::header;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::mpsc};

pub(crate) struct IngressClient<S: Signer> {
    pub(crate) url: String,
    pub(crate) client: reqwest::Client,
    pub(crate) signer: S,
}

pub(crate) async fn spawn_ingress_with_args(
    args: BundleIngressArgs,
) -> IngressClient<PrivateKeySigner> {
    let listener = TcpListener::bind(&args.listen_addr).await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        bundleproxy::run_with_listener(args, listener).await.unwrap();
    });

    IngressClient {
        url: format!("http://{address}"),
        client: reqwest::Client::default(),
        signer: PrivateKeySigner::random(),
    }
}

pub(crate) async fn spawn_ingress(relays: Vec<String>) -> IngressClient<PrivateKeySigner> {
    // Rate limits are raised so unrelated tests never trip them.
    let args = BundleIngressArgs::default()
        .relays(relays)
        .rate_limit_count(500)
        .rate_limit_global_count(10_000)
        .gzip_enabled();
    spawn_ingress_with_args(args).await
}

impl<S: Signer + Sync> IngressClient<S> {
    pub(crate) fn build_request(
        &self,
        body: impl Into<reqwest::Body>,
        signature_header: Option<String>,
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into());

        if let Some(signature_header) = signature_header {
            request = request.header(FLASHBOTS_SIGNATURE_HEADER, signature_header);
        }

        request
    }

    pub(crate) async fn send_json(&self, body: &Value) -> reqwest::Response {
        let body = serde_json::to_vec(body).unwrap();
        let signature = self.sign_payload(&body).await;
        self.build_request(body, Some(signature)).send().await.unwrap()
    }

    pub(crate) async fn send_bundle(&self, bundle: &Value) -> reqwest::Response {
        let request = json!({
            "id": 0,
            "jsonrpc": JSONRPC_VERSION_2,
            "method": "eth_sendBundle",
            "params": [bundle]
        });
        self.send_json(&request).await
    }

    pub(crate) async fn sign_payload(&self, payload: &[u8]) -> String {
        let sighash = format!("{:?}", keccak256(payload));
        let signature = self.signer.sign_message(sighash.as_bytes()).await.unwrap();
        format!("{:?}:{}", self.signer.address(), signature)
    }
}

/// A signed transaction along with its EIP-2718 encoding.
pub(crate) struct TestTransaction {
    pub(crate) envelope: TxEnvelope,
    pub(crate) raw: Bytes,
}

impl TestTransaction {
    pub(crate) fn hash(&self) -> B256 {
        *self.envelope.tx_hash()
    }
}

/// Build a signed EIP-1559 transaction from a fresh random signer.
pub(crate) fn signed_tx(nonce: u64) -> TestTransaction {
    signed_tx_with(&PrivateKeySigner::random(), nonce, Address::repeat_byte(0x42))
}

pub(crate) fn signed_tx_with(signer: &PrivateKeySigner, nonce: u64, to: Address) -> TestTransaction {
    let tx = TxEip1559 {
        chain_id: 1,
        nonce,
        gas_limit: 100_000,
        max_fee_per_gas: 1_000_000_000,
        max_priority_fee_per_gas: 1_000_000,
        to: TxKind::Call(to),
        value: U256::ZERO,
        access_list: Default::default(),
        input: Bytes::new(),
    };

    let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
    let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
    let raw: Bytes = envelope.encoded_2718().into();
    TestTransaction { envelope, raw }
}

/// The bundle identifier expected for the given transactions.
pub(crate) fn expected_bundle_hash(txs: &[&TestTransaction]) -> B256 {
    let mut concatenated = Vec::new();
    for tx in txs {
        concatenated.extend_from_slice(tx.hash().as_slice());
    }
    keccak256(&concatenated)
}

pub(crate) struct RelayReceiver {
    pub(crate) local_addr: SocketAddr,
    pub(crate) receiver: mpsc::Receiver<Value>,
}

impl RelayReceiver {
    pub(crate) async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let (sender, receiver) = mpsc::channel(128);

        let router = Router::new().route("/", post(RelayReceiver::receive)).with_state(sender);

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        RelayReceiver { local_addr: address, receiver }
    }

    pub(crate) async fn recv<T: DeserializeOwned>(&mut self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.receiver.recv().await.unwrap())
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    async fn receive(
        State(sender): State<mpsc::Sender<Value>>,
        body: axum::body::Bytes,
    ) -> JsonRpcResponse<()> {
        let mut request: JsonRpcRequest<Value> = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(?e, ?body, "failed to decode body");
                return JsonRpcResponse::error(None, JsonRpcError::ParseError);
            }
        };

        let request_id = request.id;
        tracing::info!(id = request_id, method = request.method, "received request");

        let mut params = request.take_params();
        if let Err(e) = sender.send(params.pop().unwrap_or(Value::Null)).await {
            panic!("failed to send received request to channel: {e}");
        }

        JsonRpcResponse::result(request_id, ())
    }
}
