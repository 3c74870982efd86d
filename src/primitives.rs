use alloy_consensus::{
    crypto::RecoveryError,
    transaction::{PooledTransaction, SignerRecoverable as _},
    Transaction as _,
};
use alloy_eips::{
    eip2718::{Eip2718Error, Eip2718Result},
    Decodable2718 as _,
};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consts::DEFAULT_BUNDLE_VERSION;

/// A raw bundle as submitted over the wire, before normalization.
///
/// The wire format is versioned: older clients spread the bundle over the
/// positional `params` array, newer clients pass a single object. The union
/// is resolved once at the boundary into a canonical [`Bundle`] so everything
/// downstream is version-agnostic.
#[derive(Debug, Clone)]
pub enum RawBundle {
    /// Legacy positional form: `[txs, blockNumber, minTimestamp?, maxTimestamp?]`.
    Legacy(Vec<Value>),
    /// Versioned object form.
    Versioned(VersionedBundle),
}

/// The object form of a submitted bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedBundle {
    #[serde(default)]
    pub txs: Vec<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// The canonical bundle record produced by normalization.
///
/// Invariants: `txs` is non-empty and `block_number` parses to a positive
/// integer. If both timestamps are present, `min_timestamp <= max_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub txs: Vec<Bytes>,
    pub block_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timestamp: Option<u64>,
    pub version: u32,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("missing params")]
    MissingParams,
    #[error("missing txs")]
    MissingTxs,
    #[error("missing block param")]
    MissingBlockNumber,
    #[error("block param must be a hex int")]
    InvalidBlockNumber,
    #[error("{0} must be a positive int")]
    InvalidTimestamp(&'static str),
    #[error("minTimestamp must not exceed maxTimestamp")]
    TimestampOrdering,
    #[error("malformed bundle: {0}")]
    Malformed(String),
}

impl RawBundle {
    /// Resolve the wire form from the JSON-RPC `params` array.
    ///
    /// If the first positional element is itself an array it is the legacy
    /// transaction list, otherwise it must be the versioned object.
    pub fn from_params(params: Vec<Value>) -> Result<Self, NormalizeError> {
        let first = params.first().ok_or(NormalizeError::MissingParams)?;
        if first.is_array() {
            Ok(Self::Legacy(params))
        } else {
            let bundle = serde_json::from_value(first.clone())
                .map_err(|e| NormalizeError::Malformed(e.to_string()))?;
            Ok(Self::Versioned(bundle))
        }
    }

    /// Normalize into the canonical [`Bundle`] record.
    pub fn normalize(self) -> Result<Bundle, NormalizeError> {
        let versioned = match self {
            Self::Versioned(bundle) => bundle,
            Self::Legacy(params) => VersionedBundle {
                txs: params
                    .first()
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| NormalizeError::Malformed(e.to_string()))?
                    .unwrap_or_default(),
                block_number: params
                    .get(1)
                    .and_then(Value::as_str)
                    .map(|block_number| block_number.to_string()),
                min_timestamp: params
                    .get(2)
                    .filter(|v| !v.is_null())
                    .map(require_u64("minTimestamp"))
                    .transpose()?,
                max_timestamp: params
                    .get(3)
                    .filter(|v| !v.is_null())
                    .map(require_u64("maxTimestamp"))
                    .transpose()?,
                version: None,
            },
        };

        let VersionedBundle { txs, block_number, min_timestamp, max_timestamp, version } =
            versioned;

        if txs.is_empty() {
            return Err(NormalizeError::MissingTxs);
        }

        let block_number = block_number.ok_or(NormalizeError::MissingBlockNumber)?;
        let without_prefix =
            block_number.strip_prefix("0x").ok_or(NormalizeError::InvalidBlockNumber)?;
        match u64::from_str_radix(without_prefix, 16) {
            Ok(block) if block > 0 => {}
            _ => return Err(NormalizeError::InvalidBlockNumber),
        }

        if min_timestamp == Some(0) {
            return Err(NormalizeError::InvalidTimestamp("minTimestamp"));
        }
        if max_timestamp == Some(0) {
            return Err(NormalizeError::InvalidTimestamp("maxTimestamp"));
        }
        if let (Some(min), Some(max)) = (min_timestamp, max_timestamp) {
            if min > max {
                return Err(NormalizeError::TimestampOrdering);
            }
        }

        Ok(Bundle {
            txs,
            block_number,
            min_timestamp,
            max_timestamp,
            version: version.unwrap_or(DEFAULT_BUNDLE_VERSION),
        })
    }
}

fn require_u64(field: &'static str) -> impl Fn(&Value) -> Result<u64, NormalizeError> {
    move |value| value.as_u64().ok_or(NormalizeError::InvalidTimestamp(field))
}

/// A simulation bundle as accepted by `eth_callBundle`. The legacy positional
/// form is `[txs, blockNumber, stateBlockNumber, timestamp?]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimBundle {
    #[serde(default)]
    pub txs: Vec<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_block_number: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl SimBundle {
    /// Resolve the simulation bundle from the JSON-RPC `params` array.
    pub fn from_params(params: Vec<Value>) -> Result<Self, NormalizeError> {
        let first = params.first().ok_or(NormalizeError::MissingParams)?;
        let bundle = if first.is_array() {
            Self {
                txs: serde_json::from_value(first.clone())
                    .map_err(|e| NormalizeError::Malformed(e.to_string()))?,
                block_number: params
                    .get(1)
                    .and_then(Value::as_str)
                    .map(|block_number| block_number.to_string()),
                state_block_number: params.get(2).filter(|v| !v.is_null()).cloned(),
                timestamp: params.get(3).and_then(Value::as_u64),
            }
        } else {
            serde_json::from_value(first.clone())
                .map_err(|e| NormalizeError::Malformed(e.to_string()))?
        };

        if bundle.txs.is_empty() {
            return Err(NormalizeError::MissingTxs);
        }
        Ok(bundle)
    }
}

/// The routing- and policy-relevant fields of one signed transaction.
///
/// `to` is absent for contract-creation transactions, which is a valid state
/// and must not be conflated with a decode failure. The sender is always
/// recovered from the transaction signature rather than trusted from the
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub sender: Address,
    pub to: Option<Address>,
    pub gas_limit: u64,
    pub hash: B256,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Decode2718(#[from] Eip2718Error),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

impl DecodedTransaction {
    /// Decode a raw signed-transaction envelope and recover its sender.
    pub fn try_from_raw(raw: &Bytes) -> Result<Self, DecodeError> {
        let tx = decode_transaction(raw)?;
        let sender = tx.recover_signer()?;
        Ok(Self { sender, to: tx.to(), gas_limit: tx.gas_limit(), hash: *tx.tx_hash() })
    }
}

/// Decode a pooled Ethereum transaction from raw bytes. Supports both legacy
/// RLP transactions and EIP-2718 typed envelopes.
pub fn decode_transaction(raw: &Bytes) -> Eip2718Result<PooledTransaction> {
    if raw.is_empty() {
        return Err(Eip2718Error::RlpError(alloy_rlp::Error::InputTooShort));
    }
    PooledTransaction::decode_2718(&mut &raw[..])
}

/// Decode every transaction in the bundle, preserving order.
pub fn decode_bundle_txs(txs: &[Bytes]) -> Result<Vec<DecodedTransaction>, DecodeError> {
    txs.iter().map(DecodedTransaction::try_from_raw).collect()
}

/// Compute the caller-facing bundle identifier: the keccak-256 digest of the
/// concatenated transaction hashes, in bundle order. Reordering transactions
/// changes the identifier.
pub fn bundle_hash(txs: &[DecodedTransaction]) -> B256 {
    let mut concatenated = Vec::with_capacity(txs.len() * 32);
    for tx in txs {
        concatenated.extend_from_slice(tx.hash.as_slice());
    }
    keccak256(&concatenated)
}

/// Response for the bundle submission and simulation methods.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EthResponse {
    BundleHash(B256),
    #[serde(untagged)]
    Simulation(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx(i: u8) -> DecodedTransaction {
        DecodedTransaction {
            sender: Address::with_last_byte(i),
            to: Some(Address::with_last_byte(i + 1)),
            gas_limit: 21_000,
            hash: B256::with_last_byte(i),
        }
    }

    #[test]
    fn bundle_hash_is_deterministic_and_order_sensitive() {
        let txs = vec![tx(1), tx(2)];
        assert_eq!(bundle_hash(&txs), bundle_hash(&txs));

        let permuted = vec![tx(2), tx(1)];
        assert_ne!(bundle_hash(&txs), bundle_hash(&permuted));

        // Matches keccak over the raw concatenation of the hash bytes.
        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(tx(1).hash.as_slice());
        concatenated.extend_from_slice(tx(2).hash.as_slice());
        assert_eq!(bundle_hash(&txs), keccak256(&concatenated));
    }

    #[test]
    fn normalize_legacy_and_versioned_agree() {
        let tx1 = Bytes::from(vec![0xde, 0xad]);
        let tx2 = Bytes::from(vec![0xbe, 0xef]);

        let legacy = RawBundle::from_params(vec![json!([tx1, tx2]), json!("0x10")])
            .unwrap()
            .normalize()
            .unwrap();
        let versioned =
            RawBundle::from_params(vec![json!({"txs": [tx1, tx2], "blockNumber": "0x10"})])
                .unwrap()
                .normalize()
                .unwrap();

        assert_eq!(legacy.txs, versioned.txs);
        assert_eq!(legacy.block_number, versioned.block_number);
        assert_eq!(versioned.version, DEFAULT_BUNDLE_VERSION);
    }

    #[test]
    fn normalize_legacy_timestamps() {
        let tx1 = Bytes::from(vec![0xde, 0xad]);
        let bundle =
            RawBundle::from_params(vec![json!([tx1]), json!("0x10"), json!(100), json!(200)])
                .unwrap()
                .normalize()
                .unwrap();
        assert_eq!(bundle.min_timestamp, Some(100));
        assert_eq!(bundle.max_timestamp, Some(200));
    }

    #[test]
    fn normalize_rejects_malformed_bundles() {
        let tx1 = Bytes::from(vec![0xde, 0xad]);

        let missing_txs = RawBundle::from_params(vec![json!({"blockNumber": "0x10"})]).unwrap();
        assert_eq!(missing_txs.normalize(), Err(NormalizeError::MissingTxs));

        let empty_txs =
            RawBundle::from_params(vec![json!({"txs": [], "blockNumber": "0x10"})]).unwrap();
        assert_eq!(empty_txs.normalize(), Err(NormalizeError::MissingTxs));

        let missing_block = RawBundle::from_params(vec![json!({"txs": [tx1]})]).unwrap();
        assert_eq!(missing_block.normalize(), Err(NormalizeError::MissingBlockNumber));

        let bad_block =
            RawBundle::from_params(vec![json!({"txs": [tx1], "blockNumber": "16"})]).unwrap();
        assert_eq!(bad_block.normalize(), Err(NormalizeError::InvalidBlockNumber));

        let zero_block =
            RawBundle::from_params(vec![json!({"txs": [tx1], "blockNumber": "0x0"})]).unwrap();
        assert_eq!(zero_block.normalize(), Err(NormalizeError::InvalidBlockNumber));

        let inverted = RawBundle::from_params(vec![
            json!({"txs": [tx1], "blockNumber": "0x10", "minTimestamp": 5, "maxTimestamp": 3}),
        ])
        .unwrap();
        assert_eq!(inverted.normalize(), Err(NormalizeError::TimestampOrdering));

        assert_eq!(RawBundle::from_params(vec![]).unwrap_err(), NormalizeError::MissingParams);
    }

    #[test]
    fn decode_empty_transaction_fails() {
        assert!(decode_transaction(&Bytes::new()).is_err());
    }

    mod codec {
        use super::super::*;
        use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
        use alloy_eips::Encodable2718 as _;
        use alloy_primitives::{TxKind, U256};
        use alloy_signer::SignerSync as _;
        use alloy_signer_local::PrivateKeySigner;

        fn encode<T>(signer: &PrivateKeySigner, tx: T) -> Bytes
        where
            T: SignableTransaction<alloy_primitives::Signature>,
            TxEnvelope: From<alloy_consensus::Signed<T>>,
        {
            let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
            TxEnvelope::from(tx.into_signed(signature)).encoded_2718().into()
        }

        #[test]
        fn decodes_typed_envelope_and_recovers_sender() {
            let signer = PrivateKeySigner::random();
            let to = Address::repeat_byte(0x11);
            let raw = encode(
                &signer,
                TxEip1559 {
                    chain_id: 1,
                    nonce: 7,
                    gas_limit: 77_000,
                    max_fee_per_gas: 1_000_000_000,
                    max_priority_fee_per_gas: 1_000_000,
                    to: TxKind::Call(to),
                    value: U256::ZERO,
                    access_list: Default::default(),
                    input: Bytes::new(),
                },
            );

            let decoded = DecodedTransaction::try_from_raw(&raw).unwrap();
            assert_eq!(decoded.sender, signer.address());
            assert_eq!(decoded.to, Some(to));
            assert_eq!(decoded.gas_limit, 77_000);
        }

        #[test]
        fn decodes_legacy_rlp_transaction() {
            let signer = PrivateKeySigner::random();
            let raw = encode(
                &signer,
                TxLegacy {
                    chain_id: Some(1),
                    nonce: 0,
                    gas_price: 1_000_000_000,
                    gas_limit: 21_000,
                    to: TxKind::Call(Address::repeat_byte(0x22)),
                    value: U256::ZERO,
                    input: Bytes::new(),
                },
            );

            let decoded = DecodedTransaction::try_from_raw(&raw).unwrap();
            assert_eq!(decoded.sender, signer.address());
            assert_eq!(decoded.gas_limit, 21_000);
        }

        #[test]
        fn creation_transaction_has_no_recipient() {
            let signer = PrivateKeySigner::random();
            let raw = encode(
                &signer,
                TxLegacy {
                    chain_id: Some(1),
                    nonce: 0,
                    gas_price: 1_000_000_000,
                    gas_limit: 60_000,
                    to: TxKind::Create,
                    value: U256::ZERO,
                    input: Bytes::from(vec![0x60, 0x00]),
                },
            );

            // Absent recipient is a valid state, not a decode failure.
            let decoded = DecodedTransaction::try_from_raw(&raw).unwrap();
            assert_eq!(decoded.to, None);
        }

        #[test]
        fn truncated_transaction_fails_to_decode() {
            let signer = PrivateKeySigner::random();
            let raw = encode(
                &signer,
                TxLegacy {
                    chain_id: Some(1),
                    nonce: 0,
                    gas_price: 1_000_000_000,
                    gas_limit: 21_000,
                    to: TxKind::Call(Address::repeat_byte(0x22)),
                    value: U256::ZERO,
                    input: Bytes::new(),
                },
            );

            let truncated = Bytes::from(raw[..raw.len() / 2].to_vec());
            assert!(DecodedTransaction::try_from_raw(&truncated).is_err());
        }
    }

    #[test]
    fn bundle_hash_response_serialization() {
        let hash = B256::from([1; 32]);
        let json = serde_json::to_value(EthResponse::BundleHash(hash)).unwrap();
        assert_eq!(json, json!({"bundleHash": hash}));
    }
}
