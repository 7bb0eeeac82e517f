//! Readiness diagnostics.

use serde::Serialize;
use std::fmt;

/// Outcome of a single check, also used for the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything works.
    Ok,
    /// Usable, but something needs attention.
    Degraded,
    /// Not usable.
    Error,
}

impl HealthStatus {
    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Error => "error",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    /// Check name, e.g. `database`.
    pub name: String,
    /// Result.
    pub status: HealthStatus,
    /// Human-readable detail.
    pub message: String,
}

impl Check {
    /// A passing check.
    pub fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Ok, message)
    }

    /// A check that needs attention.
    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded, message)
    }

    /// A failed check.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Error, message)
    }

    fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
        }
    }
}

/// A set of checks and their aggregate status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Individual checks, in the order they ran.
    pub checks: Vec<Check>,
}

impl Diagnostics {
    /// Adds a check.
    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// Worst status among the checks; `Ok` when there are none.
    pub fn status(&self) -> HealthStatus {
        self.checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Ok)
    }

    /// True when every check passed.
    pub fn is_ok(&self) -> bool {
        self.status() == HealthStatus::Ok
    }

    /// Looks up a check by name.
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}
