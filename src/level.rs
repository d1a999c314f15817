//! Alert severity levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Severity of an event.
///
/// Levels are totally ordered: `Unknown < Ok < Info < Warning < Critical`.
/// `Unknown` marks an event for which no data is available; it sorts below
/// `Ok` so that a minimum level of `Unknown` admits every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// No data.
    Unknown,
    /// Healthy.
    #[default]
    Ok,
    /// Informational.
    Info,
    /// Degraded.
    Warning,
    /// Failing.
    Critical,
}

impl Level {
    /// All levels in ascending order of severity.
    pub const ALL: [Self; 5] = [Self::Unknown, Self::Ok, Self::Info, Self::Warning, Self::Critical];

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == upper)
            .ok_or_else(|| ValidationError::UnknownLevel { value: s.to_string() })
    }
}
