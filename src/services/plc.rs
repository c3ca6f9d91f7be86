// src/services/plc.rs
//! Create / update / deactivate state machine for one did:plc identity.
//!
//! # Responsibilities
//! - Checking preconditions before any network write
//! - Falling back across rotation keys in precedence order
//! - Bounded, cancellation-aware retries against the directory
//! - Re-reading the audit log after every accepted write
//!
//! Calls are strictly sequential: one submission in flight at a time, never
//! two for the same identifier.

use crate::error::{AttemptFailure, PlcError, Result};
use crate::models::identity::{anchor, sort_newest_first, IdentityState};
use crate::models::operation::Operation;
use crate::services::audit::verify_audit_log;
use crate::services::retry::RetryPolicy;
use crate::storage::directory_client::{Directory, DirectoryError};
use crate::wallet::signer::{calc_genesis, sign_with_index};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

/// The two writes that extend an existing log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    Update,
    Deactivate,
}

impl Write {
    fn label(self) -> &'static str {
        match self {
            Write::Update => "update",
            Write::Deactivate => "deactivate",
        }
    }

    fn exhausted(self, attempts: Vec<AttemptFailure>) -> PlcError {
        match self {
            Write::Update => PlcError::UpdateRetriesExceeded { attempts },
            Write::Deactivate => PlcError::DeactivateRetriesExceeded { attempts },
        }
    }
}

/// Drives identity operations against a [`Directory`].
pub struct PlcClient<D: Directory> {
    directory: D,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<D: Directory> PlcClient<D> {
    /// Creates a client with its own, never-cancelled token.
    ///
    /// # Arguments
    /// * `directory` - Where operations are read from and submitted to
    /// * `policy` - Retry bounds and backoff
    pub fn new(directory: D, policy: RetryPolicy) -> Self {
        Self {
            directory,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token. Cancelling it aborts the operation in
    /// progress with [`PlcError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PlcError::Cancelled);
        }
        Ok(())
    }

    /// Replaces the document fields of `state` with the directory's view.
    pub async fn fetch_data(&self, state: &mut IdentityState) -> Result<()> {
        let did = state.did.clone().ok_or(PlcError::MissingDid)?;
        let data = self.directory.fetch_data(&did, &self.cancel).await?;
        state.apply_data(data)
    }

    /// Replaces `state.log` with the directory's audit log, newest first.
    pub async fn fetch_audit_log(&self, state: &mut IdentityState) -> Result<()> {
        let did = state.did.clone().ok_or(PlcError::MissingDid)?;
        let mut log = self.directory.fetch_audit_log(&did, &self.cancel).await?;
        sort_newest_first(&mut log);
        state.log = log;
        Ok(())
    }

    /// Builds a state for `did` from the directory's data and audit log.
    pub async fn resolve(&self, did: &str) -> Result<IdentityState> {
        let mut state = IdentityState::for_did(did);
        self.fetch_data(&mut state).await?;
        self.fetch_audit_log(&mut state).await?;
        Ok(state)
    }

    /// Checks the chain currently held in `state.log`.
    pub async fn verify(&self, state: &IdentityState) -> Result<()> {
        let did = state.did.as_deref().ok_or(PlcError::MissingDid)?;
        verify_audit_log(did, &state.log)?;
        Ok(())
    }

    /// Re-reads the log after an accepted write.
    ///
    /// The write is already durable, so a failure here only leaves `state.log`
    /// stale and is not reported as a failure of the write.
    async fn confirm(&self, state: &mut IdentityState) -> Result<()> {
        match self.fetch_audit_log(state).await {
            Ok(()) => Ok(()),
            Err(PlcError::Cancelled) => Err(PlcError::Cancelled),
            Err(err) => {
                warn!("write accepted but audit log re-fetch failed; {}", err);
                Ok(())
            }
        }
    }

    /// Registers a new identity built from the fields of `state`.
    ///
    /// The genesis operation is signed once; every retry resubmits the same
    /// bytes.
    ///
    /// # Returns
    /// The new DID, which is also stored in `state.did`.
    ///
    /// # Errors
    /// - `DidAlreadySet` if `state.did` is already set
    /// - `AlreadyExists` if the directory already has a log for the DID
    /// - `CreateRetriesExceeded` after `max_create_attempts` rejected submissions
    pub async fn create(&self, state: &mut IdentityState) -> Result<String> {
        if let Some(did) = &state.did {
            return Err(PlcError::DidAlreadySet(did.clone()));
        }

        let (did, signed) = calc_genesis(state)?;
        state.did = Some(did.clone());

        match self.directory.fetch_audit_log(&did, &self.cancel).await {
            Ok(_) => return Err(PlcError::AlreadyExists(did)),
            Err(DirectoryError::Cancelled) => return Err(PlcError::Cancelled),
            Err(err) => info!("{} not registered yet ({}); submitting genesis", did, err),
        }

        let mut attempts = Vec::new();
        for attempt in 0..self.policy.max_create_attempts {
            if attempt > 0 {
                self.policy.pause(attempt, &self.cancel).await?;
            }
            self.check_cancelled()?;

            match self.directory.submit(&did, &signed, &self.cancel).await {
                Ok(()) => {
                    info!("created {}", did);
                    self.confirm(state).await?;
                    return Ok(did);
                }
                Err(DirectoryError::Cancelled) => return Err(PlcError::Cancelled),
                Err(err) => {
                    warn!("failed to create DID on attempt {}; {}", attempt, err);
                    attempts.push(AttemptFailure {
                        attempt,
                        key_index: None,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Err(PlcError::CreateRetriesExceeded { attempts })
    }

    /// Publishes the current fields of `state` as a new operation.
    ///
    /// # Errors
    /// - `MissingDid` if `state.did` is unset
    /// - `NoPriorOperation` if the log has nothing valid to build on
    /// - `UpdateRetriesExceeded` once every key has used up its retries
    pub async fn update(&self, state: &mut IdentityState) -> Result<()> {
        self.extend(state, Write::Update).await
    }

    /// Ends the identity with a tombstone.
    ///
    /// # Errors
    /// Same as [`PlcClient::update`], with `DeactivateRetriesExceeded` on
    /// exhaustion.
    pub async fn deactivate(&self, state: &mut IdentityState) -> Result<()> {
        self.extend(state, Write::Deactivate).await
    }

    async fn extend(&self, state: &mut IdentityState, write: Write) -> Result<()> {
        let did = state.did.clone().ok_or(PlcError::MissingDid)?;

        match self.fetch_audit_log(state).await {
            Ok(()) => {}
            Err(PlcError::Directory(DirectoryError::NotFound)) => state.log.clear(),
            Err(err) => return Err(err),
        }
        if anchor(&state.log).is_none() {
            return Err(PlcError::NoPriorOperation);
        }
        if self.policy.verify_audit_log {
            verify_audit_log(&did, &state.log)?;
        }

        let unsigned = match write {
            Write::Update => state.unsigned_operation()?,
            Write::Deactivate => state.unsigned_tombstone()?,
        };
        let len = state.rotation_keys.len();
        if len == 0 {
            return Err(PlcError::NoRotationKeys);
        }

        let total = self.policy.attempt_budget(len);
        let mut attempts = Vec::new();
        for attempt in 0..total {
            self.check_cancelled()?;
            let index = attempt % len;

            let signed: Operation = match sign_with_index(state, index, &unsigned) {
                Ok((_, signed)) => signed,
                Err(err) => {
                    warn!(
                        "failed to {} DID with rotation key {}; {}",
                        write.label(),
                        index,
                        err
                    );
                    attempts.push(AttemptFailure {
                        attempt,
                        key_index: Some(index),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if signed.prev().is_none() {
                return Err(PlcError::NoPriorOperation);
            }

            match self.directory.submit(&did, &signed, &self.cancel).await {
                Ok(()) => {
                    info!("{} of {} accepted (rotation key {})", write.label(), did, index);
                    return self.confirm(state).await;
                }
                Err(DirectoryError::Cancelled) => return Err(PlcError::Cancelled),
                Err(err) => {
                    warn!(
                        "failed to {} DID with rotation key {}; {}",
                        write.label(),
                        index,
                        err
                    );
                    attempts.push(AttemptFailure {
                        attempt,
                        key_index: Some(index),
                        reason: err.to_string(),
                    });
                    if attempt + 1 < total {
                        self.policy.pause(attempts.len(), &self.cancel).await?;
                    }
                }
            }
        }

        debug!("{} of {} gave up after {} attempts", write.label(), did, attempts.len());
        Err(write.exhausted(attempts))
    }
}
