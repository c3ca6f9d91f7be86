// src/models/mod.rs
pub mod identity;  // Caller-held identity state and log resolution
pub mod operation; // Operation documents and directory payloads
