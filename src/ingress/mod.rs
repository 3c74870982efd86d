use crate::{
    auth::{authenticate, AuthError, Entity, Identity},
    consts::{ETH_CALL_BUNDLE_METHOD, ETH_SEND_BUNDLE_METHOD, FLASHBOTS_GET_USER_STATS_METHOD},
    dedup::FingerprintSet,
    forwarder::{ForwardingRequest, RelayForwarders},
    jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
    keystore::Keystore,
    metrics::INGRESS_METRICS,
    policy::{PolicyConfig, PolicyError},
    primitives::{bundle_hash, decode_bundle_txs, EthResponse, RawBundle, SimBundle},
    rate_limit::{CounterOverTime, GlobalWindow, RateLimitConfig},
    simulator::{total_gas_used, SimulationClient},
};
use alloy_primitives::B256;
use axum::{
    extract::State,
    http::{header, HeaderMap},
};
use dashmap::DashMap;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::{
    io::Read as _,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::*;

pub mod error;
use error::IngressError;

/// The admission and relay pipeline state.
#[derive(Debug)]
pub struct BundleIngress {
    pub gzip_enabled: bool,
    pub rate_limits: RateLimitConfig,
    pub max_txs_per_bundle: usize,
    pub policy: PolicyConfig,
    pub keystore: Keystore,
    /// Per-identity rate-limit state, keyed by identity proof.
    pub entities: DashMap<Entity, EntityData>,
    /// The global backstop window for traffic that passed identity checks.
    pub global_window: GlobalWindow,
    /// Fingerprints of recently seen signed request bodies.
    pub seen_requests: FingerprintSet,
    pub forwarders: RelayForwarders,
    pub simulator: Option<SimulationClient>,
}

/// Per-identity information kept in the system.
#[derive(Debug)]
pub struct EntityData {
    pub rate_limit: CounterOverTime,
}

impl BundleIngress {
    /// Return the rate-limit state for the given entity, creating it on first
    /// contact.
    fn entity_data(
        &self,
        entity: Entity,
    ) -> dashmap::mapref::one::RefMut<'_, Entity, EntityData> {
        self.entities.entry(entity).or_insert_with(|| EntityData {
            rate_limit: CounterOverTime::new(self.rate_limits.window, 8),
        })
    }

    /// Consult both rate-limit tiers for the identity.
    ///
    /// Tier 1 charges every proof the identity carries; tier 2 is the global
    /// window. Runs strictly before any decode or policy work.
    fn check_rate_limits(&self, identity: &Identity) -> Result<(), JsonRpcError> {
        for entity in identity.entities() {
            let mut data = self.entity_data(entity);
            if data.rate_limit.count() >= self.rate_limits.count {
                trace!(target: "ingress", "Rate limited request");
                INGRESS_METRICS.requests_rate_limited.with_label_values(&["identity"]).inc();
                return Err(JsonRpcError::RateLimited);
            }
            data.rate_limit.inc();
        }

        if self.global_window.check_and_count() {
            trace!(target: "ingress", "Globally rate limited request");
            INGRESS_METRICS.requests_rate_limited.with_label_values(&["global"]).inc();
            return Err(JsonRpcError::RateLimited);
        }

        Ok(())
    }

    /// A maintenance (upkeep) task for internal ingress state.
    pub async fn maintain(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            let len_before = self.entities.len();
            info!(target: "ingress::state", entries = len_before, "Starting state maintenance");
            self.entities.retain(|_, data| data.rate_limit.count() > 0);
            let len_after = self.entities.len();
            let num_removed = len_before.saturating_sub(len_after);

            INGRESS_METRICS.entity_count.set(len_after as i64);
            info!(target: "ingress::state", entries = len_after, num_removed, "Finished state maintenance");
        }
    }

    /// Handler for the JSON-RPC endpoint.
    pub async fn handler(
        State(ingress): State<Arc<Self>>,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> JsonRpcResponse<EthResponse> {
        let received_at = Instant::now();

        let body = match maybe_decompress(ingress.gzip_enabled, &headers, body) {
            Ok(decompressed) => decompressed,
            Err(error) => return JsonRpcResponse::error(None, error),
        };

        // Authentication is the very first gate: anonymous traffic is refused
        // before any body interpretation.
        let identity = match authenticate(&headers, &body, &ingress.keystore).await {
            Ok(identity) => identity,
            Err(error) => {
                trace!(target: "ingress", %error, "Error authenticating request");
                INGRESS_METRICS.auth_failures.with_label_values(&[error.as_str()]).inc();
                return JsonRpcResponse::error(None, error.into());
            }
        };

        if let Err(error) = ingress.check_rate_limits(&identity) {
            return JsonRpcResponse::error(None, error);
        }

        // Replay suppression for the signature flow. The fingerprint is
        // recorded even if the request is rejected further down the pipeline.
        if identity.is_signed() && ingress.seen_requests.observe(FingerprintSet::fingerprint(&body))
        {
            trace!(target: "ingress", "Replayed signed request");
            INGRESS_METRICS.duplicate_requests.inc();
            return JsonRpcResponse::error(None, JsonRpcError::DuplicateRequest);
        }

        let mut request: JsonRpcRequest<Value> = match JsonRpcRequest::from_bytes(&body) {
            Ok(request) => request,
            Err(error) => {
                trace!(target: "ingress", "Error parsing JSON-RPC request");
                INGRESS_METRICS.json_rpc_parse_errors.inc();
                return JsonRpcResponse::error(None, error);
            }
        };

        trace!(target: "ingress", ?identity, id = request.id, method = request.method, "Serving JSON-RPC request");
        let method = request.method.clone();
        let result = match request.method.as_str() {
            ETH_SEND_BUNDLE_METHOD => {
                let params = request.take_params();
                ingress.on_bundle(request.id, params, received_at).await.map(EthResponse::BundleHash)
            }
            ETH_CALL_BUNDLE_METHOD => {
                let params = request.take_params();
                ingress.on_call_bundle(request.id, params).await.map(EthResponse::Simulation)
            }
            FLASHBOTS_GET_USER_STATS_METHOD => {
                // The statistics backend is not part of this deployment.
                return JsonRpcResponse::error(
                    Some(request.id),
                    JsonRpcError::Rejected(
                        "flashbots_getUserStats is not implemented on this network".to_string(),
                    ),
                );
            }
            other => {
                warn!(target: "ingress", %other, "Method not supported");
                INGRESS_METRICS.json_rpc_unknown_method.with_label_values(&[other]).inc();
                return JsonRpcResponse::error(
                    Some(request.id),
                    JsonRpcError::MethodNotFound(other.to_owned()),
                );
            }
        };

        INGRESS_METRICS
            .rpc_request_duration
            .with_label_values(&[method.as_str()])
            .observe(received_at.elapsed().as_secs_f64());

        match result {
            Ok(response) => JsonRpcResponse::result(request.id, response),
            Err(error) => {
                if error.is_validation() {
                    INGRESS_METRICS.validation_errors.inc();
                }
                JsonRpcResponse::error(Some(request.id), error.into_jsonrpc_error())
            }
        }
    }

    /// Handles a new bundle submission.
    async fn on_bundle(
        &self,
        id: u64,
        params: Vec<Value>,
        received_at: Instant,
    ) -> Result<B256, IngressError> {
        let start = Instant::now();
        INGRESS_METRICS.bundles_received.inc();

        let bundle = RawBundle::from_params(params)?.normalize()?;
        if bundle.txs.len() > self.max_txs_per_bundle {
            return Err(IngressError::TooManyTransactions);
        }

        // Decoding recovers every transaction signer, which is expensive
        // enough to keep off the IO threads.
        let txs = bundle.txs.clone();
        let decoded = tokio::task::spawn_blocking(move || decode_bundle_txs(&txs))
            .await
            .map_err(|e| {
                error!(target: "ingress", ?e, "Decode worker failed");
                IngressError::Internal
            })?
            .inspect_err(|e| {
                trace!(target: "ingress", ?e, "Error decoding bundle");
            })?;

        if let Err(rejection) = self.policy.evaluate(&decoded) {
            debug!(target: "ingress", %rejection, "Bundle rejected by policy");
            INGRESS_METRICS.policy_rejections.with_label_values(&[rejection.as_str()]).inc();
            return Err(rejection.into());
        }

        let hash = bundle_hash(&decoded);
        let elapsed = start.elapsed();
        debug!(target: "ingress", bundle_hash = %hash, txs = decoded.len(), ?elapsed, "Bundle validated");

        // Relay to all targets; the response does not wait for them.
        let forward = ForwardingRequest::from_method_call(
            id,
            ETH_SEND_BUNDLE_METHOD,
            &bundle,
            hash,
            received_at,
        );
        self.forwarders.broadcast(Arc::new(forward));

        Ok(hash)
    }

    /// Handles a bundle simulation request.
    async fn on_call_bundle(&self, id: u64, params: Vec<Value>) -> Result<Value, IngressError> {
        let bundle = SimBundle::from_params(params)?;

        let txs = bundle.txs.clone();
        let decoded = tokio::task::spawn_blocking(move || decode_bundle_txs(&txs))
            .await
            .map_err(|e| {
                error!(target: "ingress", ?e, "Decode worker failed");
                IngressError::Internal
            })??;

        if self.policy.is_denylisted(&decoded) {
            INGRESS_METRICS
                .policy_rejections
                .with_label_values(&[PolicyError::Denylisted.as_str()])
                .inc();
            return Err(PolicyError::Denylisted.into());
        }

        let simulator = self.simulator.as_ref().ok_or(IngressError::SimulationUnavailable)?;
        let result = simulator.simulate(id, &bundle).await?;

        // A bundle that spends less than the floor is a no-op; refuse to
        // report it as viable.
        if let Some(gas) = total_gas_used(&result) {
            if gas < self.policy.gas_floor {
                return Err(IngressError::SimulationGasTooLow { floor: self.policy.gas_floor });
            }
        }

        Ok(result)
    }
}

/// Attempt to decompress the body if the `content-encoding` header is set to `gzip`.
pub fn maybe_decompress(
    gzip_enabled: bool,
    headers: &HeaderMap,
    body: axum::body::Bytes,
) -> Result<Vec<u8>, JsonRpcError> {
    if gzip_enabled && headers.get(header::CONTENT_ENCODING).is_some_and(|enc| enc == "gzip") {
        let mut decompressed = Vec::new();
        GzDecoder::new(&body[..])
            .read_to_end(&mut decompressed)
            .map_err(|_| JsonRpcError::ParseError)?;
        Ok(decompressed)
    } else {
        Ok(body.to_vec())
    }
}

impl From<AuthError> for JsonRpcError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::InvalidSignature => Self::InvalidSignature,
            AuthError::InvalidCredential => Self::InvalidCredential,
        }
    }
}
