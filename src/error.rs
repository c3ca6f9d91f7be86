// src/error.rs
//! Error taxonomy for did:plc operations.
//!
//! - Structural errors (`NoRotationKeys`, `NoPriorOperation`, `KeyIndexOutOfRange`,
//!   `AlreadyExists`, `MissingDid`, `DidAlreadySet`) are never retried.
//! - Cryptographic errors (`SigningFailed`, `Encoding`) skip one key or attempt.
//! - Directory errors are retried up to a bound and then surface as one of the
//!   `*RetriesExceeded` variants, which list every attempt that was made.

use crate::services::audit::AuditError;
use crate::storage::directory_client::DirectoryError;
use crate::utils::serialization::EncodingError;
use crate::wallet::key_management::KeyError;
use std::fmt;

pub type Result<T> = std::result::Result<T, PlcError>;

/// One failed attempt inside a retry or key-fallback loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// Zero-based attempt number.
    pub attempt: usize,
    /// Rotation key used, if the attempt got as far as signing.
    pub key_index: Option<usize>,
    pub reason: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_index {
            Some(idx) => write!(f, "#{} (key {}): {}", self.attempt, idx, self.reason),
            None => write!(f, "#{}: {}", self.attempt, self.reason),
        }
    }
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum PlcError {
    #[error("rotationKeys must contain at least one key")]
    NoRotationKeys,

    #[error("there is no valid previous operation")]
    NoPriorOperation,

    #[error("key index {index} is out of range for {len} rotation keys")]
    KeyIndexOutOfRange { index: usize, len: usize },

    #[error("{0} already exists in the directory")]
    AlreadyExists(String),

    #[error("DID is not set")]
    MissingDid,

    #[error("DID is already set to {0}")]
    DidAlreadySet(String),

    #[error("signing failed: {0}")]
    SigningFailed(#[source] KeyError),

    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("failed to sign with all {} rotation keys: {}", .attempts.len(), summarize(.attempts))]
    AllKeysExhausted { attempts: Vec<AttemptFailure> },

    #[error("directory error: {0}")]
    Directory(DirectoryError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to create DID; max retries exceeded after {} attempts: {}", .attempts.len(), summarize(.attempts))]
    CreateRetriesExceeded { attempts: Vec<AttemptFailure> },

    #[error("failed to update DID; max retries exceeded after {} attempts: {}", .attempts.len(), summarize(.attempts))]
    UpdateRetriesExceeded { attempts: Vec<AttemptFailure> },

    #[error("failed to deactivate DID; max retries exceeded after {} attempts: {}", .attempts.len(), summarize(.attempts))]
    DeactivateRetriesExceeded { attempts: Vec<AttemptFailure> },

    #[error("audit log verification failed: {0}")]
    Audit(#[from] AuditError),
}

impl From<DirectoryError> for PlcError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Cancelled => PlcError::Cancelled,
            other => PlcError::Directory(other),
        }
    }
}
