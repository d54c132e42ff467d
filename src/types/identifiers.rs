//! Newtype wrappers for type safety
//!
//! Guard and report identifiers are both plain integers on the wire; wrapping
//! them keeps a report id from ever being sent where a guard id belongs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Guard ID assigned by the dispatch server at login or registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuardId(i64);

impl GuardId {
    /// Create a new guard ID
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for GuardId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for GuardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Intervention report ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(i64);

impl ReportId {
    /// Persisted value meaning "no report"
    pub const NONE_SENTINEL: i64 = -1;

    /// Create a new report ID
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Decode a persisted value, mapping the sentinel (and any negative id) to `None`
    #[must_use]
    pub const fn from_persisted(raw: i64) -> Option<Self> {
        if raw < 0 { None } else { Some(Self(raw)) }
    }

    /// Encode an optional report id for persistence
    #[must_use]
    pub const fn to_persisted(id: Option<Self>) -> i64 {
        match id {
            Some(id) => id.0,
            None => Self::NONE_SENTINEL,
        }
    }
}

impl From<i64> for ReportId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
