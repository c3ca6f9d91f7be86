// src/utils/serialization.rs
//! Canonical serialization of did:plc operations.
//!
//! Signatures and content hashes are computed over these bytes, so two
//! implementations that disagree on a single byte produce different DIDs.
//! - DAG-CBOR (`serde_ipld_dagcbor`), used for hashing and signing. Map keys
//!   are written in canonical order, shorter keys first and then bytewise,
//!   whatever order the maps were populated in.
//! - JSON (`serde_json`), used as the request body when submitting to a
//!   directory.
//!
//! Both encoders run the same schema check first.

use crate::models::operation::Operation;

/// Errors raised while encoding an operation.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("prev is present but empty")]
    EmptyPrev,

    #[error("sig is present but empty")]
    EmptySignature,

    #[error("rotation key at index {0} is empty")]
    EmptyRotationKey(usize),

    #[error("dag-cbor encoding failed: {0}")]
    Cbor(String),

    #[error("content identifier could not be built: {0}")]
    Cid(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejects operations whose fields would encode but are not valid documents.
pub fn validate(op: &Operation) -> Result<(), EncodingError> {
    let (prev, sig) = match op {
        Operation::Plc(body) => {
            if let Some(idx) = body.rotation_keys.iter().position(String::is_empty) {
                return Err(EncodingError::EmptyRotationKey(idx));
            }
            (body.prev.as_deref(), body.sig.as_deref())
        }
        Operation::Tombstone(body) => (Some(body.prev.as_str()), body.sig.as_deref()),
    };
    if prev == Some("") {
        return Err(EncodingError::EmptyPrev);
    }
    if sig == Some("") {
        return Err(EncodingError::EmptySignature);
    }
    Ok(())
}

/// Encodes an operation as DAG-CBOR.
///
/// # Returns
/// - `Ok(bytes)` with the canonical encoding
/// - `Err(EncodingError)` if a field violates the operation schema
///
/// # Determinism
/// Two operations that compare equal always encode to the same bytes. A
/// genesis operation carries `prev` as an explicit null; an unset `sig` is
/// left out entirely.
pub fn encode_dag_cbor(op: &Operation) -> Result<Vec<u8>, EncodingError> {
    validate(op)?;
    serde_ipld_dagcbor::to_vec(op).map_err(|e| EncodingError::Cbor(e.to_string()))
}

/// Encodes an operation as JSON, the body format the directory accepts.
pub fn encode_dag_json(op: &Operation) -> Result<Vec<u8>, EncodingError> {
    validate(op)?;
    Ok(serde_json::to_vec(op)?)
}
