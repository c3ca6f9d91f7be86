// src/services/audit.rs
//! Verification of an audit log fetched from a directory.
//!
//! Walks the non-nullified entries oldest-first and checks that they form one
//! signed chain rooted at the DID:
//! 1. the genesis entry has no `prev` and its signed bytes derive the DID
//! 2. every entry's `cid` is the content address of its signed bytes
//! 3. every later entry points at the one before it
//! 4. every entry is signed by a rotation key of the operation it builds on
//!    (the genesis entry by one of its own keys)
//! 5. nothing follows a tombstone

use crate::models::operation::{LogEntry, Operation};
use crate::utils::crypto::{derive_did, operation_cid};
use crate::utils::serialization::encode_dag_cbor;
use crate::wallet::key_management::KeyHandle;
use crate::wallet::signer::verify_operation;
use log::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit log has no valid entries")]
    Empty,

    #[error("entry {index}: genesis must not have prev")]
    GenesisHasPrev { index: usize },

    #[error("entry {index}: genesis must be a plc_operation")]
    GenesisIsTombstone { index: usize },

    #[error("genesis derives {derived}, expected {expected}")]
    DidMismatch { expected: String, derived: String },

    #[error("entry {index}: cid {reported} does not match content {computed}")]
    CidMismatch {
        index: usize,
        reported: String,
        computed: String,
    },

    #[error("entry {index}: prev {found:?} does not point at {expected}")]
    BrokenChain {
        index: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("entry {index}: not signed by any authorised rotation key")]
    BadSignature { index: usize },

    #[error("entry {index}: operation follows a tombstone")]
    AfterTombstone { index: usize },

    #[error("entry {index}: {reason}")]
    Malformed { index: usize, reason: String },
}

fn signed_by_any(op: &Operation, keys: &[String], index: usize) -> Result<bool, AuditError> {
    for did_key in keys {
        let key = KeyHandle::from_did_string(did_key).map_err(|e| AuditError::Malformed {
            index,
            reason: format!("rotation key {did_key}: {e}"),
        })?;
        let valid = verify_operation(op, &key).map_err(|e| AuditError::Malformed {
            index,
            reason: e.to_string(),
        })?;
        if valid {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Verifies that `log` is a valid operation chain for `did`.
pub fn verify_audit_log(did: &str, log: &[LogEntry]) -> Result<(), AuditError> {
    let mut chain: Vec<&LogEntry> = log.iter().filter(|entry| !entry.nullified).collect();
    chain.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut prev: Option<&LogEntry> = None;
    for (index, entry) in chain.iter().enumerate() {
        let op = &entry.operation;
        let bytes = encode_dag_cbor(op).map_err(|e| AuditError::Malformed {
            index,
            reason: e.to_string(),
        })?;

        let computed = operation_cid(&bytes).map_err(|e| AuditError::Malformed {
            index,
            reason: e.to_string(),
        })?;
        if computed != entry.cid {
            return Err(AuditError::CidMismatch {
                index,
                reported: entry.cid.clone(),
                computed,
            });
        }

        let authorised = match prev {
            None => {
                if op.prev().is_some() {
                    return Err(AuditError::GenesisHasPrev { index });
                }
                if op.is_tombstone() {
                    return Err(AuditError::GenesisIsTombstone { index });
                }
                let derived = derive_did(&bytes).map_err(|e| AuditError::Malformed {
                    index,
                    reason: e.to_string(),
                })?;
                if derived != did {
                    return Err(AuditError::DidMismatch {
                        expected: did.to_string(),
                        derived,
                    });
                }
                op.rotation_keys()
            }
            Some(parent) => {
                if parent.operation.is_tombstone() {
                    return Err(AuditError::AfterTombstone { index });
                }
                if op.prev() != Some(parent.cid.as_str()) {
                    return Err(AuditError::BrokenChain {
                        index,
                        expected: parent.cid.clone(),
                        found: op.prev().map(str::to_string),
                    });
                }
                parent.operation.rotation_keys()
            }
        };

        if !signed_by_any(op, authorised, index)? {
            return Err(AuditError::BadSignature { index });
        }
        prev = Some(entry);
    }

    match prev {
        Some(last) => {
            debug!("verified {} entries for {}, head {}", chain.len(), did, last.cid);
            Ok(())
        }
        None => Err(AuditError::Empty),
    }
}
