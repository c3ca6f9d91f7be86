// src/wallet/signer.rs
//! Signing of did:plc operations with an identity's rotation keys.
//!
//! # Process Flow
//! 1. Canonically encode the operation without `sig`
//! 2. SHA-256 the bytes and sign the digest with one rotation key
//! 3. Attach the base64url (unpadded) signature
//! 4. Re-encode the signed operation and derive the DID from those bytes

use crate::error::{AttemptFailure, PlcError, Result};
use crate::models::identity::IdentityState;
use crate::models::operation::Operation;
use crate::utils::crypto::{derive_did, hash_data};
use crate::utils::serialization::encode_dag_cbor;
use crate::wallet::key_management::KeyHandle;
use log::{debug, warn};

/// Signs `op` with the rotation key at `index`.
///
/// # Returns
/// The DID derived from the signed operation, and the signed operation.
///
/// # Errors
/// - `KeyIndexOutOfRange` before any encoding or crypto work is done
/// - `Encoding` if the operation violates the schema
/// - `SigningFailed` if the key cannot sign
pub fn sign_with_index(state: &IdentityState, index: usize, op: &Operation) -> Result<(String, Operation)> {
    let key = state
        .rotation_keys
        .get(index)
        .ok_or(PlcError::KeyIndexOutOfRange {
            index,
            len: state.rotation_keys.len(),
        })?;

    let unsigned = op.unsigned();
    let digest = hash_data(&encode_dag_cbor(&unsigned)?);
    let sig = key.sign(&digest).map_err(PlcError::SigningFailed)?;

    let signed = unsigned.with_sig(Some(base64::encode_config(sig, base64::URL_SAFE_NO_PAD)));
    let did = derive_did(&encode_dag_cbor(&signed)?)?;
    debug!("signed {} with rotation key {} -> {}", signed.kind(), index, did);

    Ok((did, signed))
}

/// Signs `op` with the first rotation key that works, in precedence order.
///
/// # Errors
/// `AllKeysExhausted` listing the failure of every key. This is fatal; the
/// key material has to be fixed before trying again.
pub fn calc_did(state: &IdentityState, op: &Operation) -> Result<(String, Operation)> {
    let mut attempts = Vec::new();
    for index in 0..state.rotation_keys.len() {
        match sign_with_index(state, index, op) {
            Ok(signed) => return Ok(signed),
            Err(err) => {
                warn!("failed to calculate DID with rotation key {}; {}", index, err);
                attempts.push(AttemptFailure {
                    attempt: index,
                    key_index: Some(index),
                    reason: err.to_string(),
                });
            }
        }
    }
    Err(PlcError::AllKeysExhausted { attempts })
}

/// Builds the genesis operation for `state` and signs it.
pub fn calc_genesis(state: &IdentityState) -> Result<(String, Operation)> {
    let unsigned = state.unsigned_operation()?;
    calc_did(state, &unsigned)
}

/// Checks that `op.sig` is a valid signature by `key` over the unsigned form.
///
/// Returns `Ok(false)` for a missing, undecodable or wrong signature.
pub fn verify_operation(op: &Operation, key: &KeyHandle) -> Result<bool> {
    let sig = match op.sig() {
        Some(sig) => sig,
        None => return Ok(false),
    };
    let sig = match base64::decode_config(sig, base64::URL_SAFE_NO_PAD) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };
    let digest = hash_data(&encode_dag_cbor(&op.unsigned())?);
    Ok(key.verify(&digest, &sig))
}
