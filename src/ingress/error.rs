use crate::{
    jsonrpc::JsonRpcError,
    policy::PolicyError,
    primitives::{DecodeError, NormalizeError},
    simulator::SimulationError,
};

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// Bundle shape normalization error.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// Transaction decoding or signer recovery error.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Bundle contains too many transactions.
    #[error("bundle contains too many transactions")]
    TooManyTransactions,
    /// Bundle rejected by admission policy.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Simulation backend error.
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    /// No simulation backend configured.
    #[error("simulation is not available on this gateway")]
    SimulationUnavailable,
    /// Simulation spent too little gas.
    #[error("bundle used too little gas, must use at least {floor}")]
    SimulationGasTooLow { floor: u64 },
    /// Serde error.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Unexpected failure in some pipeline stage. Surfaced generically, no
    /// internal detail leaks to the caller.
    #[error("internal error")]
    Internal,
}

impl IngressError {
    /// Convert [`IngressError`] into [`JsonRpcError`].
    pub fn into_jsonrpc_error(self) -> JsonRpcError {
        match self {
            Self::Normalize(e) => JsonRpcError::InvalidBundle(e.to_string()),
            Self::Decode(_) => JsonRpcError::InvalidBundle("unable to decode txs".to_string()),
            Self::TooManyTransactions => JsonRpcError::InvalidBundle(self.to_string()),
            Self::Policy(e) => JsonRpcError::Rejected(e.to_string()),
            Self::Simulation(_) => JsonRpcError::Rejected("failed to simulate bundle".to_string()),
            Self::SimulationUnavailable => JsonRpcError::Rejected(self.to_string()),
            Self::SimulationGasTooLow { .. } => JsonRpcError::Rejected(self.to_string()),
            Self::Serde(_) => JsonRpcError::ParseError,
            Self::Internal => JsonRpcError::Internal,
        }
    }

    /// Returns `true` if the error was caused by invalid client input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Normalize(_) | Self::Decode(_) | Self::TooManyTransactions)
    }
}
