// src/syntax/rkey.rs
//! Record keys: timestamp identifiers (TIDs) and free-form keys.
//!
//! A TID is 13 characters of sortable base32: 11 for the timestamp in
//! microseconds and 2 for a clock identifier that keeps keys from different
//! writers apart. The clock identifier is chosen once by the caller and passed
//! in; nothing here holds global state.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Sortable base32 alphabet.
pub const S32_ALPHABET: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_CHARS: usize = 11;
const CLOCK_CHARS: usize = 2;
const MAX_CLOCK_ID: u16 = 1023;

static RKEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.\-_~]{1,512}$").expect("rkey pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordKeyError {
    #[error("invalid rkey: {0:?}")]
    Invalid(String),
    #[error("invalid TID: {0:?}")]
    InvalidTid(String),
    #[error("clock id {0} is out of range (max {MAX_CLOCK_ID})")]
    ClockIdOutOfRange(u16),
}

fn s32_encode(mut n: u64, width: usize) -> String {
    let mut out = Vec::with_capacity(width);
    while n > 0 {
        out.push(S32_ALPHABET[(n % 32) as usize]);
        n /= 32;
    }
    while out.len() < width {
        out.push(S32_ALPHABET[0]);
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn s32_decode(s: &str) -> Option<u64> {
    s.bytes().try_fold(0u64, |acc, c| {
        let digit = S32_ALPHABET.iter().position(|&a| a == c)? as u64;
        acc.checked_mul(32)?.checked_add(digit)
    })
}

/// `[A-Za-z0-9.\-_~]{1,512}`, excluding `.` and `..`
pub fn is_valid_rkey(s: &str) -> bool {
    RKEY_PATTERN.is_match(s) && s != "." && s != ".."
}

/// Identifies one TID writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockId(u16);

impl ClockId {
    pub fn new(id: u16) -> Result<Self, RecordKeyError> {
        if id > MAX_CLOCK_ID {
            return Err(RecordKeyError::ClockIdOutOfRange(id));
        }
        Ok(Self(id))
    }

    /// A random clock id, drawn once per writer.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(0..MAX_CLOCK_ID))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// Timestamp identifier. Orders by time, then clock id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid {
    timestamp_micros: u64,
    clock_id: ClockId,
}

impl Tid {
    pub fn new(timestamp_micros: u64, clock_id: ClockId) -> Self {
        Self {
            timestamp_micros,
            clock_id,
        }
    }

    /// A TID for the current time.
    pub fn now(clock_id: ClockId) -> Self {
        let micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
        Self::new(micros, clock_id)
    }

    pub fn timestamp_micros(&self) -> u64 {
        self.timestamp_micros
    }

    pub fn clock_id(&self) -> ClockId {
        self.clock_id
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            s32_encode(self.timestamp_micros, TIMESTAMP_CHARS),
            s32_encode(self.clock_id.0 as u64, CLOCK_CHARS)
        )
    }
}

impl FromStr for Tid {
    type Err = RecordKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RecordKeyError::InvalidTid(s.to_string());
        if s.len() != TIMESTAMP_CHARS + CLOCK_CHARS || !s.is_ascii() {
            return Err(invalid());
        }
        let (ts, clock) = s.split_at(TIMESTAMP_CHARS);
        let timestamp_micros = s32_decode(ts).ok_or_else(invalid)?;
        let clock = s32_decode(clock).ok_or_else(invalid)?;
        let clock_id = u16::try_from(clock)
            .map_err(|_| invalid())
            .and_then(ClockId::new)?;
        Ok(Self::new(timestamp_micros, clock_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKeyKind {
    Tid,
    Literal,
    Any,
}

impl fmt::Display for RecordKeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKeyKind::Tid => "tid",
            RecordKeyKind::Literal => "literal",
            RecordKeyKind::Any => "any",
        })
    }
}

/// Key of a record inside a repository collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Tid(Tid),
    /// A fixed key such as `self`.
    Literal(String),
    Any(String),
}

impl RecordKey {
    pub fn tid(clock_id: ClockId) -> Self {
        RecordKey::Tid(Tid::now(clock_id))
    }

    pub fn literal(value: impl Into<String>) -> Result<Self, RecordKeyError> {
        let value = value.into();
        if !is_valid_rkey(&value) {
            return Err(RecordKeyError::Invalid(value));
        }
        Ok(RecordKey::Literal(value))
    }

    pub fn any(value: impl Into<String>) -> Result<Self, RecordKeyError> {
        let value = value.into();
        if !is_valid_rkey(&value) {
            return Err(RecordKeyError::Invalid(value));
        }
        Ok(RecordKey::Any(value))
    }

    pub fn kind(&self) -> RecordKeyKind {
        match self {
            RecordKey::Tid(_) => RecordKeyKind::Tid,
            RecordKey::Literal(_) => RecordKeyKind::Literal,
            RecordKey::Any(_) => RecordKeyKind::Any,
        }
    }

    pub fn value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Tid(tid) => fmt::Display::fmt(tid, f),
            RecordKey::Literal(value) | RecordKey::Any(value) => f.write_str(value),
        }
    }
}
