// src/syntax/nsid.rs
//! Namespaced identifiers (NSIDs) such as `com.example.fooBar#baz`.
//!
//! An NSID is a reversed domain followed by a name, with an optional fragment.
//! The name may be the wildcard `*`, in which case no fragment is allowed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

const MAX_LEN: usize = 317;
const MAX_DOMAIN_LEN: usize = 253;
const MAX_SEGMENT_LEN: usize = 63;

/// Domain segments, then either `.*` or a name with an optional `.*` or fragment.
static NSID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+((\.\*)|(\.([a-zA-Z]{1,63}))((\.\*)|(#[a-zA-Z]{1,63}))?)$",
    )
    .expect("NSID pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NsidError {
    #[error("invalid NSID {0:?}: empty")]
    Empty(String),
    #[error("invalid NSID {0:?}: too long")]
    TooLong(String),
    #[error("invalid NSID {0:?}: wrong pattern")]
    Pattern(String),
    #[error("invalid NSID {0:?}: multi-fragment")]
    MultiFragment(String),
    #[error("invalid NSID {0:?}: segments are too few")]
    TooFewSegments(String),
    #[error("invalid NSID {0:?}: domain segment is too long")]
    SegmentTooLong(String),
    #[error("invalid NSID {0:?}: domain segments are too long")]
    DomainTooLong(String),
    #[error("invalid NSID {0:?}: name is too long")]
    NameTooLong(String),
    #[error("invalid NSID {0:?}: wildcard NSID cannot have fragment")]
    GlobWithFragment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nsid {
    domain_segments: Vec<String>,
    name: String,
    fragment: Option<String>,
}

impl Nsid {
    pub fn parse(input: &str) -> Result<Self, NsidError> {
        let err = || input.to_string();
        if input.is_empty() {
            return Err(NsidError::Empty(err()));
        }
        if input.len() > MAX_LEN {
            return Err(NsidError::TooLong(err()));
        }
        if !NSID_PATTERN.is_match(input) {
            return Err(NsidError::Pattern(err()));
        }

        let mut parts = input.split('#');
        let body = parts.next().unwrap_or_default();
        let fragment = parts.next();
        if parts.next().is_some() {
            return Err(NsidError::MultiFragment(err()));
        }

        let mut segments: Vec<&str> = body.split('.').collect();
        if segments.len() < 3 {
            return Err(NsidError::TooFewSegments(err()));
        }
        let name = segments.pop().unwrap_or_default();

        if segments.iter().any(|s| s.len() > MAX_SEGMENT_LEN) {
            return Err(NsidError::SegmentTooLong(err()));
        }
        if segments.join(".").len() > MAX_DOMAIN_LEN {
            return Err(NsidError::DomainTooLong(err()));
        }
        if name == "*" && fragment.is_some() {
            return Err(NsidError::GlobWithFragment(err()));
        }
        if name.len() > MAX_SEGMENT_LEN {
            return Err(NsidError::NameTooLong(err()));
        }

        Ok(Self {
            domain_segments: segments.iter().map(|s| s.to_ascii_lowercase()).collect(),
            name: name.to_string(),
            fragment: fragment.map(str::to_string),
        })
    }

    /// Domain segments in written order, lowercased. Excludes the name.
    pub fn domain_segments(&self) -> &[String] {
        &self.domain_segments
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// True when the name is the wildcard `*`.
    pub fn is_glob(&self) -> bool {
        self.name == "*"
    }
}

impl FromStr for Nsid {
    type Err = NsidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain_segments.join("."), self.name)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}
