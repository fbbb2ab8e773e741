use crate::engine::Outcome;
use crate::error::{CusumError, Result};
use crate::types::AutonomyLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded attempt of a procedure by a trainee. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub trainee: String,
    pub procedure: String,
    pub cycle: u32,
    pub index: u64,
    /// Supervisor-validated result. Takes precedence over `autonomy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomy: Option<AutonomyLevel>,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(
        trainee: impl Into<String>,
        procedure: impl Into<String>,
        cycle: u32,
        index: u64,
        validated_success: Option<bool>,
        autonomy: Option<AutonomyLevel>,
    ) -> Result<Self> {
        if validated_success.is_none() && autonomy.is_none() {
            return Err(CusumError::domain(
                "an outcome needs a validated result or an autonomy level",
            ));
        }
        Ok(Self {
            trainee: trainee.into(),
            procedure: procedure.into(),
            cycle,
            index,
            validated_success,
            autonomy,
            recorded_at: Utc::now(),
        })
    }

    /// Effective success: the validated flag when present, else derived from
    /// the self-reported autonomy level.
    pub fn success(&self) -> bool {
        match (self.validated_success, self.autonomy) {
            (Some(s), _) => s,
            (None, Some(level)) => level.counts_as_success(),
            (None, None) => false,
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            index: self.index,
            success: self.success(),
        }
    }
}

/// Engine view of the records of one cycle, in stored order.
pub fn outcomes_for_cycle(records: &[OutcomeRecord], cycle: u32) -> Vec<Outcome> {
    records
        .iter()
        .filter(|r| r.cycle == cycle)
        .map(OutcomeRecord::outcome)
        .collect()
}
