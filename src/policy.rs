use alloy_primitives::Address;
use std::collections::HashSet;

use crate::primitives::DecodedTransaction;

/// Default threshold for the distinct-address heuristic.
pub const DEFAULT_MAX_DISTINCT_TO: usize = 2;

/// Default exclusive lower bound on the summed bundle gas.
pub const DEFAULT_GAS_FLOOR: u64 = 42_000;

/// Default inclusive upper bound on the summed bundle gas.
pub const DEFAULT_GAS_CEILING: u64 = 30_000_000;

/// Admission policy over the decoded transactions of a bundle.
///
/// All policy data is injected at startup so it can be updated without
/// touching the checks themselves.
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    /// Addresses whose involvement, as sender or recipient, rejects a bundle.
    pub denylist: HashSet<Address>,
    /// Threshold for the distinct-address heuristic.
    pub max_distinct_to: usize,
    /// Exclusive lower bound on the summed gas limit.
    pub gas_floor: u64,
    /// Inclusive upper bound on the summed gas limit.
    pub gas_ceiling: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("transaction interacts with a denylisted address")]
    Denylisted,
    #[error("bundle touches too many distinct addresses")]
    TooManyDistinctAddresses,
    #[error("bundle gas too low, must exceed {floor}")]
    GasTooLow { floor: u64 },
    #[error("bundle gas too high, must not exceed {ceiling}")]
    GasTooHigh { ceiling: u64 },
}

impl PolicyError {
    /// A stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Denylisted => "denylisted",
            Self::TooManyDistinctAddresses => "too_many_distinct_addresses",
            Self::GasTooLow { .. } => "gas_too_low",
            Self::GasTooHigh { .. } => "gas_too_high",
        }
    }
}

impl PolicyConfig {
    pub fn new(
        denylist: HashSet<Address>,
        max_distinct_to: usize,
        gas_floor: u64,
        gas_ceiling: u64,
    ) -> Self {
        Self { denylist, max_distinct_to, gas_floor, gas_ceiling }
    }

    /// Evaluate the bundle against all checks in fixed order: denylist, then
    /// distinct addresses, then gas bounds. The first failing check
    /// determines the rejection reason.
    pub fn evaluate(&self, txs: &[DecodedTransaction]) -> Result<(), PolicyError> {
        if self.is_denylisted(txs) {
            return Err(PolicyError::Denylisted);
        }
        if self.too_many_distinct_addresses(txs) {
            return Err(PolicyError::TooManyDistinctAddresses);
        }
        self.check_gas_bounds(txs)
    }

    /// Returns `true` if any transaction's sender or recipient is on the
    /// denylist. Contract-creation transactions have no recipient and are
    /// only checked on the sender.
    pub fn is_denylisted(&self, txs: &[DecodedTransaction]) -> bool {
        txs.iter().any(|tx| {
            self.denylist.contains(&tx.sender) ||
                tx.to.is_some_and(|to| self.denylist.contains(&to))
        })
    }

    /// Returns `true` if BOTH the distinct-recipient set and the
    /// distinct-sender set exceed the threshold. A bundle with one sender
    /// fanning out to many recipients is a common legitimate pattern and is
    /// never rejected by this check alone.
    pub fn too_many_distinct_addresses(&self, txs: &[DecodedTransaction]) -> bool {
        // A creation transaction contributes a single `None` recipient slot.
        let to: HashSet<Option<Address>> = txs.iter().map(|tx| tx.to).collect();
        let from: HashSet<Address> = txs.iter().map(|tx| tx.sender).collect();

        to.len() > self.max_distinct_to && from.len() > self.max_distinct_to
    }

    /// The summed gas limit must lie in `(floor, ceiling]`. The floor is
    /// exclusive to guard against no-op bundles.
    pub fn check_gas_bounds(&self, txs: &[DecodedTransaction]) -> Result<(), PolicyError> {
        let total: u128 = txs.iter().map(|tx| tx.gas_limit as u128).sum();
        if total <= self.gas_floor as u128 {
            return Err(PolicyError::GasTooLow { floor: self.gas_floor });
        }
        if total > self.gas_ceiling as u128 {
            return Err(PolicyError::GasTooHigh { ceiling: self.gas_ceiling });
        }
        Ok(())
    }
}
