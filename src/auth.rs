use alloy_consensus::crypto::secp256k1::recover_signer;
use alloy_primitives::{eip191_hash_message, keccak256, Address};
use alloy_signer::Signature;
use axum::http::{header, HeaderMap};
use std::str::FromStr as _;

use crate::{consts::FLASHBOTS_SIGNATURE_HEADER, keystore::Keystore};

/// The authenticated principal behind a request.
///
/// A request may carry both credential schemes; the identity then holds both
/// proofs rather than silently preferring one, and rate limiting charges
/// every bucket present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    /// Address recovered from the request signature.
    pub signer: Option<Address>,
    /// Identifier of the verified pre-shared key.
    pub key_id: Option<String>,
}

impl Identity {
    /// Returns `true` if the request was signature-authenticated. Only this
    /// flow is subject to replay deduplication.
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// The rate-limit buckets charged for this identity.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.signer
            .map(Entity::Signer)
            .into_iter()
            .chain(self.key_id.clone().map(Entity::Key))
    }
}

/// A rate-limit bucket key derived from one identity proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    /// Address recovered from a request signature.
    Signer(Address),
    /// A pre-shared key identifier.
    Key(String),
}

impl Entity {
    /// Returns entity type as string.
    pub fn as_str_ty(&self) -> &'static str {
        match self {
            Self::Signer(_) => "signer",
            Self::Key(_) => "key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Neither credential scheme was present on the request.
    #[error("missing credentials")]
    Unauthenticated,
    /// The signature header was present but did not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// The authorization header was present but the credentials did not verify.
    #[error("invalid credentials")]
    InvalidCredential,
}

impl AuthError {
    /// A stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidCredential => "invalid_credential",
        }
    }
}

/// Authenticate a request from its headers and exact raw body bytes.
///
/// This is the very first gate: requests without any credentials are refused
/// before any body interpretation happens. When both schemes are present,
/// both must verify.
pub async fn authenticate(
    headers: &HeaderMap,
    body: &[u8],
    keystore: &Keystore,
) -> Result<Identity, AuthError> {
    let signature_header = headers.get(FLASHBOTS_SIGNATURE_HEADER);
    let authorization_header = headers.get(header::AUTHORIZATION);

    if signature_header.is_none() && authorization_header.is_none() {
        return Err(AuthError::Unauthenticated);
    }

    let mut identity = Identity::default();

    if signature_header.is_some() {
        let signer = verify_signature(headers, body).ok_or(AuthError::InvalidSignature)?;
        identity.signer = Some(signer);
    }

    if let Some(value) = authorization_header {
        let (key_id, secret) =
            parse_key_credentials(value.to_str().ok()).ok_or(AuthError::InvalidCredential)?;
        let verified =
            keystore.verify(key_id, secret).await.map_err(|error| {
                tracing::error!(target: "ingress::auth", ?error, "Credential store lookup failed");
                AuthError::InvalidCredential
            })?;
        if !verified {
            return Err(AuthError::InvalidCredential);
        }
        identity.key_id = Some(key_id.to_string());
    }

    Ok(identity)
}

/// Parse the signature header in the form `signer_address:signature` and
/// verify the signer of the request.
///
/// The digest covers the exact raw body bytes: re-serialized JSON is not
/// canonical, so the body is hashed as received. The recovered address must
/// match the claimed one, and a recovered zero address never authenticates.
pub fn verify_signature(headers: &HeaderMap, body: &[u8]) -> Option<Address> {
    let signature_header = headers.get(FLASHBOTS_SIGNATURE_HEADER)?;
    let (address, signature) = signature_header.to_str().ok()?.split_once(':')?;
    let signature = Signature::from_str(signature).ok()?;

    let hash_str = format!("{:?}", keccak256(body));
    let message_hash = eip191_hash_message(hash_str.as_bytes());
    let signer = recover_signer(&signature, message_hash).ok()?;

    if signer.is_zero() {
        return None;
    }

    Some(signer).filter(|signer| Some(signer) == Address::from_str(address).ok().as_ref())
}

/// Parse the `Authorization` header value in the form `[Bearer ]keyID:secret`.
fn parse_key_credentials(value: Option<&str>) -> Option<(&str, &str)> {
    let value = value?;
    let value = value.strip_prefix("Bearer ").unwrap_or(value);
    value.split_once(':').filter(|(key_id, secret)| !key_id.is_empty() && !secret.is_empty())
}
