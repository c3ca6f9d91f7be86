// src/syntax/mod.rs
//! Identifier grammars used alongside did:plc records.

pub mod nsid;
pub mod rkey;
