//! Media identifiers.
//!
//! A [`MediaId`] is a caller-supplied positive integer. Parsing is strict:
//! only ASCII digits are accepted and zero is rejected, so a path segment
//! like `+7`, `-3`, `0` or `abc` never resolves to a media item.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use crate::Error;

/// Identifier of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(NonZeroU64);

impl MediaId {
    /// Build an ID from a raw integer, returning `None` for zero.
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Return the raw integer value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MediaId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidId(s.to_string()));
        }

        s.parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| Error::InvalidId(s.to_string()))
    }
}

impl From<MediaId> for u64 {
    fn from(id: MediaId) -> Self {
        id.get()
    }
}
