//! Propagation levels and the begin-time policy table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// How a new demarcation boundary interacts with an ambient transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropagationLevel {
    /// Join the ambient transaction, or start one.
    #[default]
    Required,
    /// Always run in a fresh transaction, suspending any ambient one.
    RequiresNew,
    /// Join the ambient transaction; fail without one.
    Mandatory,
    /// Run without a transaction; fail if one is active.
    Never,
    /// Run without a transaction, suspending any ambient one.
    NotSupported,
    /// Join the ambient transaction if there is one.
    Supports,
}

/// What `begin` must do, decided purely from the level and ambient presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginPlan {
    JoinAmbient,
    StartNew,
    SuspendAndStartNew,
    SuspendAndRunWithout,
    RunWithout,
}

/// A level whose precondition on the ambient transaction does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    NoAmbientTransaction,
    UnexpectedAmbientTransaction,
}

impl PropagationLevel {
    pub const ALL: [PropagationLevel; 6] = [
        Self::Required,
        Self::RequiresNew,
        Self::Mandatory,
        Self::Never,
        Self::NotSupported,
        Self::Supports,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::Mandatory => "MANDATORY",
            Self::Never => "NEVER",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Supports => "SUPPORTS",
        }
    }

    /// Numeric code understood by coordinators that take propagation as an integer.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Required => 0,
            Self::Supports => 1,
            Self::Mandatory => 2,
            Self::RequiresNew => 3,
            Self::NotSupported => 4,
            Self::Never => 5,
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidPropagationCode` for codes outside `0..=5`.
    pub fn from_code(code: i32) -> Result<Self, ConfigurationError> {
        Self::ALL
            .into_iter()
            .find(|level| level.code() == code)
            .ok_or(ConfigurationError::InvalidPropagationCode { code })
    }

    /// The policy table: what `begin` does given whether an ambient transaction exists.
    ///
    /// # Errors
    ///
    /// Returns the violated precondition for `MANDATORY` without an ambient
    /// transaction and `NEVER` with one.
    pub fn plan(self, ambient_present: bool) -> Result<BeginPlan, PolicyViolation> {
        match (self, ambient_present) {
            (Self::Required | Self::Mandatory | Self::Supports, true) => Ok(BeginPlan::JoinAmbient),
            (Self::Required | Self::RequiresNew, false) => Ok(BeginPlan::StartNew),
            (Self::RequiresNew, true) => Ok(BeginPlan::SuspendAndStartNew),
            (Self::Mandatory, false) => Err(PolicyViolation::NoAmbientTransaction),
            (Self::Never, true) => Err(PolicyViolation::UnexpectedAmbientTransaction),
            (Self::NotSupported, true) => Ok(BeginPlan::SuspendAndRunWithout),
            (Self::Never | Self::NotSupported | Self::Supports, false) => Ok(BeginPlan::RunWithout),
        }
    }
}

impl fmt::Display for PropagationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropagationLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == trimmed)
            .ok_or_else(|| ConfigurationError::InvalidPropagationLevel {
                value: s.to_string(),
            })
    }
}
