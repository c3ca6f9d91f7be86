// tests/common/mod.rs
//! In-memory PLC directory that enforces the same chain rules as a real one.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use did_plc::models::identity::latest_valid;
use did_plc::utils::crypto::{derive_did, operation_cid};
use did_plc::utils::serialization::encode_dag_cbor;
use did_plc::wallet::signer::verify_operation;
use did_plc::{Curve, Directory, DirectoryError, KeyHandle, LogEntry, Operation, PlcData};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MemoryDirectory {
    logs: Mutex<HashMap<String, Vec<LogEntry>>>,
    ticks: AtomicI64,
    fail_next: AtomicUsize,
    submissions: AtomicUsize,
}

fn rejected(reason: impl Into<String>) -> DirectoryError {
    DirectoryError::ServerError {
        status: 400,
        body: reason.into(),
    }
}

fn signed_by_any(op: &Operation, keys: &[String]) -> bool {
    keys.iter().any(|did_key| {
        KeyHandle::from_did_string(did_key)
            .ok()
            .and_then(|key| verify_operation(op, &key).ok())
            .unwrap_or(false)
    })
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` submissions fail with a 503 before validation.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Submissions received, failed ones included.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn log(&self, did: &str) -> Vec<LogEntry> {
        self.logs.lock().unwrap().get(did).cloned().unwrap_or_default()
    }

    /// Stores entries without any validation.
    pub fn insert_raw(&self, did: &str, entries: Vec<LogEntry>) {
        self.logs.lock().unwrap().insert(did.to_string(), entries);
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(tick)
    }

    fn validate(&self, did: &str, op: &Operation, log: &[LogEntry], bytes: &[u8]) -> Result<(), DirectoryError> {
        match latest_valid(log) {
            None => {
                if op.prev().is_some() || op.is_tombstone() {
                    return Err(rejected("genesis must be a plc_operation without prev"));
                }
                if derive_did(bytes).map_err(DirectoryError::from)? != did {
                    return Err(rejected("genesis does not hash to the DID"));
                }
                if !signed_by_any(op, op.rotation_keys()) {
                    return Err(rejected("genesis not signed by its own rotation key"));
                }
            }
            Some(head) => {
                if head.operation.is_tombstone() {
                    return Err(rejected("DID is tombstoned"));
                }
                if op.prev() != Some(head.cid.as_str()) {
                    return Err(rejected("prev does not reference the latest operation"));
                }
                if !signed_by_any(op, head.operation.rotation_keys()) {
                    return Err(rejected("invalid signature"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn fetch_data(&self, did: &str, cancel: &CancellationToken) -> Result<PlcData, DirectoryError> {
        if cancel.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        let log = self.log(did);
        match latest_valid(&log).map(|entry| &entry.operation) {
            Some(Operation::Plc(op)) => Ok(PlcData {
                did: did.to_string(),
                rotation_keys: op.rotation_keys.clone(),
                verification_methods: op.verification_methods.clone(),
                also_known_as: op.also_known_as.clone(),
                services: op.services.clone(),
            }),
            _ => Err(DirectoryError::NotFound),
        }
    }

    async fn fetch_audit_log(&self, did: &str, cancel: &CancellationToken) -> Result<Vec<LogEntry>, DirectoryError> {
        if cancel.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        self.logs
            .lock()
            .unwrap()
            .get(did)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn submit(&self, did: &str, op: &Operation, cancel: &CancellationToken) -> Result<(), DirectoryError> {
        if cancel.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(DirectoryError::ServerError {
                status: 503,
                body: "temporarily unavailable".into(),
            });
        }

        let bytes = encode_dag_cbor(op)?;
        let mut logs = self.logs.lock().unwrap();
        let existing = logs.get(did).map(Vec::as_slice).unwrap_or(&[]);
        self.validate(did, op, existing, &bytes)?;

        let entry = LogEntry {
            cid: operation_cid(&bytes)?,
            operation: op.clone(),
            nullified: false,
            created_at: self.next_timestamp(),
        };
        logs.entry(did.to_string()).or_default().push(entry);
        Ok(())
    }
}

/// A key the caller knows only by its did:key.
pub fn public_only(curve: Curve) -> KeyHandle {
    KeyHandle::from_did_string(&KeyHandle::generate(curve).to_did_string()).unwrap()
}
