// src/models/operation.rs
//! did:plc operation data model.
//!
//! These are the documents that get signed, hashed and submitted to a PLC
//! directory, together with the rows the directory hands back from its audit
//! log. Field names on the wire are camelCase and the operation kind travels
//! in a `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire tag for a regular operation.
pub const PLC_OPERATION: &str = "plc_operation";
/// Wire tag for a tombstone.
pub const PLC_TOMBSTONE: &str = "plc_tombstone";

/// A service endpoint advertised in the DID document.
///
/// Example: `{"type": "AtprotoPersonalDataServer", "endpoint": "https://pds.example.com"}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Service type, e.g. "AtprotoPersonalDataServer"
    #[serde(rename = "type")]
    pub kind: String,

    /// URI where the service is reachable
    pub endpoint: String,
}

impl Service {
    pub fn new(kind: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// The body of a `plc_operation`.
///
/// All keys are `did:key` strings. Map fields are `BTreeMap`s so that every
/// iteration over them is already ordered; the canonical encoder still sorts
/// them by its own rule and never relies on this.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlcOperation {
    pub rotation_keys: Vec<String>,
    pub verification_methods: BTreeMap<String, String>,
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, Service>,
    /// Content hash of the operation this one builds on. `None` only for genesis.
    pub prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// The body of a `plc_tombstone`. Carries no identity fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlcTombstone {
    pub prev: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// A did:plc operation document.
///
/// `sig` is unset on the form that gets hashed and signed, and set on the form
/// that gets submitted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Operation {
    #[serde(rename = "plc_operation")]
    Plc(PlcOperation),
    #[serde(rename = "plc_tombstone")]
    Tombstone(PlcTombstone),
}

impl Operation {
    /// The wire tag of this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Plc(_) => PLC_OPERATION,
            Operation::Tombstone(_) => PLC_TOMBSTONE,
        }
    }

    pub fn prev(&self) -> Option<&str> {
        match self {
            Operation::Plc(op) => op.prev.as_deref(),
            Operation::Tombstone(op) => Some(op.prev.as_str()),
        }
    }

    pub fn sig(&self) -> Option<&str> {
        match self {
            Operation::Plc(op) => op.sig.as_deref(),
            Operation::Tombstone(op) => op.sig.as_deref(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Operation::Tombstone(_))
    }

    /// Rotation keys authorised by this operation. Empty for a tombstone.
    pub fn rotation_keys(&self) -> &[String] {
        match self {
            Operation::Plc(op) => &op.rotation_keys,
            Operation::Tombstone(_) => &[],
        }
    }

    /// Returns a copy with the signature removed: the form that gets signed.
    pub fn unsigned(&self) -> Operation {
        self.clone().with_sig(None)
    }

    /// Returns this operation carrying `sig`.
    pub fn with_sig(self, sig: Option<String>) -> Operation {
        match self {
            Operation::Plc(op) => Operation::Plc(PlcOperation { sig, ..op }),
            Operation::Tombstone(op) => Operation::Tombstone(PlcTombstone { sig, ..op }),
        }
    }
}

/// One row of a directory audit log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Content hash of the signed operation.
    pub cid: String,
    pub operation: Operation,
    /// Set when a conflicting rotation superseded this entry.
    pub nullified: bool,
    pub created_at: DateTime<Utc>,
}

/// Current document state as served by `GET {base}/{did}/data`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlcData {
    pub did: String,
    pub rotation_keys: Vec<String>,
    #[serde(default)]
    pub verification_methods: BTreeMap<String, String>,
    #[serde(default)]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}
