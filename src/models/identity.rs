// src/models/identity.rs
//! In-memory state of one did:plc identity and the log-model rules built on it.
//!
//! [`IdentityState`] owns the key material references, document fields and the
//! last audit log fetched from the directory. It is not thread-safe:
//! every mutating operation takes `&mut self`, and callers sharing one state
//! across tasks must wrap it in their own lock.

use crate::error::{PlcError, Result};
use crate::models::operation::{LogEntry, Operation, PlcData, PlcOperation, PlcTombstone, Service};
use crate::wallet::key_management::KeyHandle;
use std::collections::BTreeMap;

/// Where an identity sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No DID has been derived yet.
    Uninitialized,
    /// A DID is known but the directory has no operations for it yet.
    GenesisPending,
    Active,
    Tombstoned,
}

/// Caller-held state of a did:plc identity.
///
/// # Fields
/// - `did`: the identifier, unset until `create` succeeds or the caller sets it
/// - `rotation_keys`: signing precedence is the order of this list
/// - `log`: last audit log fetched; replaced wholesale, never patched
#[derive(Debug, Clone, Default)]
pub struct IdentityState {
    pub did: Option<String>,
    pub rotation_keys: Vec<KeyHandle>,
    pub verification_methods: BTreeMap<String, KeyHandle>,
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, Service>,
    pub log: Vec<LogEntry>,
}

impl IdentityState {
    /// A fresh identity with the given rotation keys and nothing else.
    pub fn new(rotation_keys: Vec<KeyHandle>) -> Self {
        Self {
            rotation_keys,
            ..Default::default()
        }
    }

    /// State for an already registered DID, to be filled by a fetch.
    pub fn for_did(did: impl Into<String>) -> Self {
        Self {
            did: Some(did.into()),
            ..Default::default()
        }
    }

    pub fn with_verification_method(mut self, name: impl Into<String>, key: KeyHandle) -> Self {
        self.verification_methods.insert(name.into(), key);
        self
    }

    pub fn with_service(mut self, name: impl Into<String>, service: Service) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    pub fn with_also_known_as(mut self, uri: impl Into<String>) -> Self {
        self.also_known_as.push(uri.into());
        self
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.did.is_none() {
            return Lifecycle::Uninitialized;
        }
        match latest_valid(&self.log) {
            None => Lifecycle::GenesisPending,
            Some(entry) if entry.operation.is_tombstone() => Lifecycle::Tombstoned,
            Some(_) => Lifecycle::Active,
        }
    }

    /// Builds the unsigned operation reflecting the current document fields.
    ///
    /// `prev` points at the latest valid log entry, or is `None` for genesis.
    ///
    /// # Errors
    /// `NoRotationKeys` if there are no rotation keys, whatever else is set.
    pub fn unsigned_operation(&self) -> Result<Operation> {
        if self.rotation_keys.is_empty() {
            return Err(PlcError::NoRotationKeys);
        }

        Ok(Operation::Plc(PlcOperation {
            rotation_keys: self.rotation_keys.iter().map(KeyHandle::to_did_string).collect(),
            verification_methods: self
                .verification_methods
                .iter()
                .map(|(name, key)| (name.clone(), key.to_did_string()))
                .collect(),
            also_known_as: self.also_known_as.clone(),
            services: self.services.clone(),
            prev: latest_valid(&self.log).map(|entry| entry.cid.clone()),
            sig: None,
        }))
    }

    /// Builds the unsigned tombstone that ends this identity's log.
    ///
    /// # Errors
    /// `NoPriorOperation` if there is no valid anchor to deactivate.
    pub fn unsigned_tombstone(&self) -> Result<Operation> {
        let anchor = anchor(&self.log).ok_or(PlcError::NoPriorOperation)?;
        Ok(Operation::Tombstone(PlcTombstone {
            prev: anchor.cid.clone(),
            sig: None,
        }))
    }

    /// Replaces the document fields with what the directory reports.
    ///
    /// Keys the caller already holds privately are kept as signing handles when
    /// their did:key matches; every other key becomes public-only.
    pub fn apply_data(&mut self, data: PlcData) -> Result<()> {
        let known: BTreeMap<String, KeyHandle> = self
            .rotation_keys
            .iter()
            .chain(self.verification_methods.values())
            .filter(|key| key.can_sign())
            .map(|key| (key.to_did_string(), key.clone()))
            .collect();

        let resolve = |did: &str| -> Result<KeyHandle> {
            match known.get(did) {
                Some(key) => Ok(key.clone()),
                None => Ok(KeyHandle::from_did_string(did)?),
            }
        };

        let rotation_keys = data
            .rotation_keys
            .iter()
            .map(|did| resolve(did.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let verification_methods = data
            .verification_methods
            .iter()
            .map(|(name, did)| Ok((name.clone(), resolve(did.as_str())?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        self.did = Some(data.did);
        self.rotation_keys = rotation_keys;
        self.verification_methods = verification_methods;
        self.also_known_as = data.also_known_as;
        self.services = data.services;
        Ok(())
    }
}

/// Orders a log newest-first. The sort is stable, so entries sharing a
/// timestamp keep the order the directory returned them in.
pub fn sort_newest_first(log: &mut [LogEntry]) {
    log.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// The operation currently in force: the newest entry that is not nullified.
pub fn latest_valid(log: &[LogEntry]) -> Option<&LogEntry> {
    let mut ordered: Vec<&LogEntry> = log.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ordered.into_iter().find(|entry| !entry.nullified)
}

/// The entry a new operation may build on.
///
/// Same as [`latest_valid`], except that a tombstoned log has no anchor.
pub fn anchor(log: &[LogEntry]) -> Option<&LogEntry> {
    latest_valid(log).filter(|entry| !entry.operation.is_tombstone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::Curve;
    use chrono::{TimeZone, Utc};

    fn entry(cid: &str, secs: i64, nullified: bool) -> LogEntry {
        LogEntry {
            cid: cid.to_string(),
            operation: Operation::Plc(PlcOperation {
                rotation_keys: vec![],
                verification_methods: BTreeMap::new(),
                also_known_as: vec![],
                services: BTreeMap::new(),
                prev: None,
                sig: Some("sig".into()),
            }),
            nullified,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    fn tombstone(cid: &str, secs: i64) -> LogEntry {
        LogEntry {
            operation: Operation::Tombstone(PlcTombstone {
                prev: "x".into(),
                sig: Some("sig".into()),
            }),
            ..entry(cid, secs, false)
        }
    }

    #[test]
    fn test_latest_valid_empty() {
        assert!(latest_valid(&[]).is_none());
    }

    #[test]
    fn test_latest_valid_skips_nullified() {
        let log = vec![
            entry("a", 0, false),
            entry("c", 20, true),
            entry("b", 10, false),
        ];
        assert_eq!(latest_valid(&log).unwrap().cid, "b");

        let all_nullified = vec![entry("a", 0, true), entry("b", 1, true)];
        assert!(latest_valid(&all_nullified).is_none());
    }

    #[test]
    fn test_latest_valid_ties_keep_fetch_order() {
        let log = vec![entry("first", 5, false), entry("second", 5, false)];
        assert_eq!(latest_valid(&log).unwrap().cid, "first");

        let mut sorted = vec![entry("old", 0, false), entry("x", 5, false), entry("y", 5, false)];
        sort_newest_first(&mut sorted);
        let cids: Vec<_> = sorted.iter().map(|e| e.cid.as_str()).collect();
        assert_eq!(cids, vec!["x", "y", "old"]);
    }

    #[test]
    fn test_anchor_excludes_tombstone() {
        let log = vec![entry("a", 0, false), tombstone("t", 10)];
        assert_eq!(latest_valid(&log).unwrap().cid, "t");
        assert!(anchor(&log).is_none());
    }

    #[test]
    fn test_unsigned_operation_requires_rotation_keys() {
        let state = IdentityState::default()
            .with_verification_method("atproto", KeyHandle::generate(Curve::P256))
            .with_also_known_as("at://alice.test")
            .with_service("pds", Service::new("Pds", "https://pds.test"));
        assert!(matches!(
            state.unsigned_operation(),
            Err(PlcError::NoRotationKeys)
        ));
    }

    #[test]
    fn test_unsigned_operation_prev() {
        let key = KeyHandle::generate(Curve::P256);
        let mut state = IdentityState::new(vec![key.clone()])
            .with_verification_method("atproto", key.clone());

        let genesis = state.unsigned_operation().unwrap();
        assert_eq!(genesis.prev(), None);
        assert_eq!(genesis.sig(), None);
        assert_eq!(genesis.rotation_keys(), &[key.to_did_string()]);

        state.log = vec![entry("a", 0, false), entry("b", 10, false)];
        assert_eq!(state.unsigned_operation().unwrap().prev(), Some("b"));
    }

    #[test]
    fn test_unsigned_tombstone() {
        let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);
        assert!(matches!(
            state.unsigned_tombstone(),
            Err(PlcError::NoPriorOperation)
        ));

        state.log = vec![entry("a", 0, false)];
        let tomb = state.unsigned_tombstone().unwrap();
        assert!(tomb.is_tombstone());
        assert_eq!(tomb.prev(), Some("a"));
    }

    #[test]
    fn test_lifecycle() {
        let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);
        assert_eq!(state.lifecycle(), Lifecycle::Uninitialized);
        state.did = Some("did:plc:abcdefghijklmnopqrstuvwx".into());
        assert_eq!(state.lifecycle(), Lifecycle::GenesisPending);
        state.log = vec![entry("a", 0, false)];
        assert_eq!(state.lifecycle(), Lifecycle::Active);
        state.log.push(tombstone("t", 1));
        assert_eq!(state.lifecycle(), Lifecycle::Tombstoned);
    }

    #[test]
    fn test_apply_data_keeps_private_handles() {
        let signer = KeyHandle::generate(Curve::P256);
        let other = KeyHandle::generate(Curve::Secp256k1);
        let mut state = IdentityState::new(vec![signer.clone()]);

        state
            .apply_data(PlcData {
                did: "did:plc:abcdefghijklmnopqrstuvwx".into(),
                rotation_keys: vec![other.to_did_string(), signer.to_did_string()],
                verification_methods: BTreeMap::from([(
                    "atproto".to_string(),
                    other.to_did_string(),
                )]),
                also_known_as: vec!["at://bob.test".into()],
                services: BTreeMap::new(),
            })
            .unwrap();

        assert_eq!(state.did.as_deref(), Some("did:plc:abcdefghijklmnopqrstuvwx"));
        assert!(!state.rotation_keys[0].can_sign());
        assert!(state.rotation_keys[1].can_sign());
        assert!(!state.verification_methods["atproto"].can_sign());
        assert_eq!(state.also_known_as, vec!["at://bob.test".to_string()]);
    }

    #[test]
    fn test_apply_data_rejects_bad_keys() {
        let mut state = IdentityState::default();
        let err = state
            .apply_data(PlcData {
                did: "did:plc:abcdefghijklmnopqrstuvwx".into(),
                rotation_keys: vec!["did:key:notbase58!".into()],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PlcError::InvalidKey(_)));
        // nothing was replaced
        assert!(state.did.is_none());
    }
}
