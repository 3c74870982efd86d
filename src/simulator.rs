//! Client for the external simulation backend used by `eth_callBundle`.
//!
//! The backend is a query service: the gateway forwards the reshaped request
//! and relays the result, it never executes transactions itself.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::*;

use crate::{
    consts::{ETH_CALL_BUNDLE_METHOD, SIMULATION_TIMEOUT_SECS},
    primitives::SimBundle,
};

/// A simulation backend client.
#[derive(Debug)]
pub struct SimulationClient {
    inner: reqwest::Client,
    url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("simulation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("simulation backend returned no result")]
    MissingResult,
}

impl SimulationClient {
    /// Create a new simulation client.
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SIMULATION_TIMEOUT_SECS))
            .build()
            .expect("to build reqwest client");
        Self { inner: client, url }
    }

    /// Simulate a bundle, returning the backend's `result` object.
    pub async fn simulate(&self, id: u64, bundle: &SimBundle) -> Result<Value, SimulationError> {
        let request = json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": ETH_CALL_BUNDLE_METHOD,
            "params": [bundle]
        });

        let response =
            self.inner.post(&self.url).json(&request).send().await?.json::<Value>().await?;

        match response.get("result") {
            Some(result) if !result.is_null() => Ok(result.clone()),
            _ => {
                error!(target: "simulator", ?response, "simulation backend returned no result");
                Err(SimulationError::MissingResult)
            }
        }
    }
}

/// Extract the total gas used from a simulation result, if reported.
pub fn total_gas_used(result: &Value) -> Option<u64> {
    result.get("totalGasUsed").and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_total_gas_used() {
        let result = json!({"totalGasUsed": 63_000, "results": []});
        assert_eq!(total_gas_used(&result), Some(63_000));
        assert_eq!(total_gas_used(&json!({})), None);
    }
}
