// src/lib.rs

//! # did:plc client
//!
//! Creates, updates and deactivates `did:plc` identities against a PLC
//! directory.
//!
//! ## Architecture Overview
//! 1. **Encoding Layer**: canonical DAG-CBOR bytes and DID derivation (`utils`)
//! 2. **Key Layer**: P-256 / secp256k1 rotation keys and signing (`wallet`)
//! 3. **Storage Layer**: the directory's HTTP interface (`storage`)
//! 4. **Services Layer**: the operation-log state machine (`services`)

// Module declarations (organized by functional domain)
pub mod config;   // Environment-driven settings
pub mod error;    // Error taxonomy
pub mod models;   // Data structures
pub mod services; // State machine, retries, audit
pub mod storage;  // PLC directory client
pub mod syntax;   // NSID and record-key grammars
pub mod utils;    // Encoding and hashing helpers
pub mod wallet;   // Cryptographic key operations

pub use config::Settings;
pub use error::{AttemptFailure, PlcError, Result};
pub use models::identity::{IdentityState, Lifecycle};
pub use models::operation::{LogEntry, Operation, PlcData, Service};
pub use services::plc::PlcClient;
pub use services::retry::RetryPolicy;
pub use storage::directory_client::{Directory, DirectoryError, HttpDirectory};
pub use wallet::key_management::{Curve, KeyHandle};
