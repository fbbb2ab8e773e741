//! Confidence alerts and the per-cell progress summary.
//!
//! A team may set, per procedure, the range of attempts after which trainees
//! usually reach competence. Self-reporting full autonomy before the low end
//! is flagged as over-confidence; still not being competent after twice the
//! high end is flagged as under-confidence.

use crate::error::{CusumError, Result};
use crate::outcome::OutcomeRecord;
use crate::tracker::LearningCurveTracker;
use crate::types::{AutonomyLevel, Status};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiple of `max_procedures` past which a trainee is flagged.
pub const UNDER_CONFIDENCE_FACTOR: u64 = 2;

// ---------------------------------------------------------------------------
// ProcedureThreshold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold")]
pub struct ProcedureThreshold {
    min_procedures: u32,
    max_procedures: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThreshold {
    min_procedures: u32,
    max_procedures: u32,
}

impl TryFrom<RawThreshold> for ProcedureThreshold {
    type Error = CusumError;

    fn try_from(raw: RawThreshold) -> Result<Self> {
        ProcedureThreshold::new(raw.min_procedures, raw.max_procedures)
    }
}

impl ProcedureThreshold {
    pub fn new(min_procedures: u32, max_procedures: u32) -> Result<Self> {
        if max_procedures == 0 || min_procedures > max_procedures {
            return Err(CusumError::domain(format!(
                "threshold needs 0 < min_procedures <= max_procedures, got {min_procedures}..{max_procedures}"
            )));
        }
        Ok(Self {
            min_procedures,
            max_procedures,
        })
    }

    pub fn min_procedures(&self) -> u32 {
        self.min_procedures
    }

    pub fn max_procedures(&self) -> u32 {
        self.max_procedures
    }
}

// ---------------------------------------------------------------------------
// ConfidenceAlert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OverConfidence,
    UnderConfidence,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::OverConfidence => "over_confidence",
            AlertKind::UnderConfidence => "under_confidence",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAlert {
    pub trainee: String,
    pub procedure: String,
    pub kind: AlertKind,
    /// Attempt at which autonomy was first self-reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_at: Option<u64>,
    pub attempts: u64,
    pub min_procedures: u32,
    pub max_procedures: u32,
}

fn first_autonomous(tracker: &LearningCurveTracker, records: &[OutcomeRecord]) -> Option<u64> {
    let cycle = tracker.state().cycle;
    records
        .iter()
        .filter(|r| r.cycle == cycle && r.autonomy == Some(AutonomyLevel::Autonomous))
        .map(|r| r.index)
        .min()
}

/// Checks the open cycle of `tracker` against `threshold`.
pub fn detect(
    tracker: &LearningCurveTracker,
    records: &[OutcomeRecord],
    threshold: &ProcedureThreshold,
) -> Option<ConfidenceAlert> {
    let state = tracker.state();
    let attempts = tracker.attempts();
    let declared_at = first_autonomous(tracker, records);

    let kind = match declared_at {
        Some(at) if at < u64::from(threshold.min_procedures) => AlertKind::OverConfidence,
        _ if state.status != Status::Competent
            && attempts > u64::from(threshold.max_procedures) * UNDER_CONFIDENCE_FACTOR =>
        {
            AlertKind::UnderConfidence
        }
        _ => return None,
    };

    Some(ConfidenceAlert {
        trainee: state.trainee.clone(),
        procedure: state.procedure.clone(),
        kind,
        declared_at,
        attempts,
        min_procedures: threshold.min_procedures,
        max_procedures: threshold.max_procedures,
    })
}

// ---------------------------------------------------------------------------
// Progress cell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    Learning,
    Competent,
    NotCompetent,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::Learning => "learning",
            ProgressStatus::Competent => "competent",
            ProgressStatus::NotCompetent => "not_competent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressCell {
    pub status: ProgressStatus,
    pub attempts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertKind>,
}

pub fn progress_cell(
    tracker: Option<&LearningCurveTracker>,
    records: &[OutcomeRecord],
    threshold: Option<&ProcedureThreshold>,
) -> ProgressCell {
    let Some(tracker) = tracker else {
        return ProgressCell {
            status: ProgressStatus::NotStarted,
            attempts: 0,
            alert: None,
        };
    };
    let status = match tracker.state().status {
        _ if tracker.attempts() == 0 => ProgressStatus::NotStarted,
        Status::InProgress => ProgressStatus::Learning,
        Status::Competent => ProgressStatus::Competent,
        Status::NotCompetent => ProgressStatus::NotCompetent,
    };
    ProgressCell {
        status,
        attempts: tracker.attempts(),
        alert: threshold
            .and_then(|t| detect(tracker, records, t))
            .map(|a| a.kind),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::ResolvedRates;

    fn tracker_with(records: &[OutcomeRecord]) -> LearningCurveTracker {
        let rates = ResolvedRates::new(0.20, 0.10, 0.05, 0.20).unwrap();
        let mut t = LearningCurveTracker::start("m-dupont", "bronchoscopy", rates).unwrap();
        for r in records {
            t.append(r.outcome()).unwrap();
        }
        t
    }

    fn record(index: u64, autonomy: AutonomyLevel) -> OutcomeRecord {
        OutcomeRecord::new("m-dupont", "bronchoscopy", 1, index, None, Some(autonomy)).unwrap()
    }

    #[test]
    fn threshold_validation() {
        assert!(ProcedureThreshold::new(10, 25).is_ok());
        assert!(ProcedureThreshold::new(30, 25).is_err());
        assert!(ProcedureThreshold::new(0, 0).is_err());
        assert!(serde_yaml::from_str::<ProcedureThreshold>("min_procedures: 9\nmax_procedures: 3\n").is_err());
    }

    #[test]
    fn early_autonomy_is_over_confidence() {
        let records: Vec<_> = (1..=4)
            .map(|i| {
                if i == 3 {
                    record(i, AutonomyLevel::Autonomous)
                } else {
                    record(i, AutonomyLevel::Assisted)
                }
            })
            .collect();
        let t = tracker_with(&records);
        let alert = detect(&t, &records, &ProcedureThreshold::new(10, 25).unwrap()).unwrap();
        assert_eq!(alert.kind, AlertKind::OverConfidence);
        assert_eq!(alert.declared_at, Some(3));
    }

    #[test]
    fn long_learning_is_under_confidence() {
        // Alternating results never cross either boundary.
        let records: Vec<_> = (1..=12)
            .map(|i| {
                let level = if i % 4 == 0 {
                    AutonomyLevel::Observed
                } else {
                    AutonomyLevel::Capable
                };
                record(i, level)
            })
            .collect();
        let t = tracker_with(&records);
        assert_eq!(t.state().status, Status::InProgress);
        let alert = detect(&t, &records, &ProcedureThreshold::new(2, 5).unwrap()).unwrap();
        assert_eq!(alert.kind, AlertKind::UnderConfidence);
        assert_eq!(alert.attempts, 12);
    }

    #[test]
    fn within_range_no_alert() {
        let records: Vec<_> = (1..=6).map(|i| record(i, AutonomyLevel::Capable)).collect();
        let t = tracker_with(&records);
        assert!(detect(&t, &records, &ProcedureThreshold::new(3, 10).unwrap()).is_none());
    }

    #[test]
    fn progress_cells() {
        let none = progress_cell(None, &[], None);
        assert_eq!(none.status, ProgressStatus::NotStarted);

        let records: Vec<_> = (1..=3).map(|i| record(i, AutonomyLevel::Capable)).collect();
        let t = tracker_with(&records);
        let cell = progress_cell(Some(&t), &records, None);
        assert_eq!(cell.status, ProgressStatus::Learning);
        assert_eq!(cell.attempts, 3);
        assert!(cell.alert.is_none());

        let failures: Vec<_> = (1..=5).map(|i| record(i, AutonomyLevel::Observed)).collect();
        let t = tracker_with(&failures);
        let cell = progress_cell(Some(&t), &failures, None);
        assert_eq!(cell.status, ProgressStatus::NotCompetent);
    }
}
