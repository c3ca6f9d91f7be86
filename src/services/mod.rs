// src/services/mod.rs
pub mod audit; // Audit log chain verification
pub mod plc;   // Create / update / deactivate
pub mod retry; // Backoff and retry bounds
