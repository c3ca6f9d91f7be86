// src/storage/mod.rs
pub mod directory_client; // PLC directory over HTTP
