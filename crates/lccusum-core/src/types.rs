use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Decision status of one monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InProgress,
    Competent,
    NotCompetent,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::InProgress => "in_progress",
            Status::Competent => "competent",
            Status::NotCompetent => "not_competent",
        }
    }

    pub fn is_decided(self) -> bool {
        !matches!(self, Status::InProgress)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::CusumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Status::InProgress),
            "competent" => Ok(Status::Competent),
            "not_competent" => Ok(Status::NotCompetent),
            _ => Err(crate::error::CusumError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AutonomyLevel
// ---------------------------------------------------------------------------

/// Self-reported level of autonomy on one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Observed,
    Assisted,
    Capable,
    Autonomous,
}

impl AutonomyLevel {
    pub fn all() -> &'static [AutonomyLevel] {
        &[
            AutonomyLevel::Observed,
            AutonomyLevel::Assisted,
            AutonomyLevel::Capable,
            AutonomyLevel::Autonomous,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AutonomyLevel::Observed => "observed",
            AutonomyLevel::Assisted => "assisted",
            AutonomyLevel::Capable => "capable",
            AutonomyLevel::Autonomous => "autonomous",
        }
    }

    /// Used when no supervisor-validated result exists for the attempt.
    pub fn counts_as_success(self) -> bool {
        matches!(self, AutonomyLevel::Capable | AutonomyLevel::Autonomous)
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AutonomyLevel {
    type Err = crate::error::CusumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observed" => Ok(AutonomyLevel::Observed),
            "assisted" => Ok(AutonomyLevel::Assisted),
            "capable" => Ok(AutonomyLevel::Capable),
            "autonomous" => Ok(AutonomyLevel::Autonomous),
            _ => Err(crate::error::CusumError::InvalidAutonomy(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
