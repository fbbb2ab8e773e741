//! Stateful, incremental use of the engine: one open monitoring cycle per
//! (trainee, procedure), plus the closed cycles before it.

use crate::engine::{self, CusumParams, Outcome};
use crate::error::{CusumError, Result};
use crate::outcome::OutcomeRecord;
use crate::rates::ResolvedRates;
use crate::types::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TrackerKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackerKey {
    pub trainee: String,
    pub procedure: String,
}

impl TrackerKey {
    pub fn new(trainee: impl Into<String>, procedure: impl Into<String>) -> Self {
        Self {
            trainee: trainee.into(),
            procedure: procedure.into(),
        }
    }
}

impl fmt::Display for TrackerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trainee, self.procedure)
    }
}

// ---------------------------------------------------------------------------
// CusumState
// ---------------------------------------------------------------------------

/// What one `append` did to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new index was processed while the cycle was open.
    Stepped,
    /// A new index was processed after the decision; only the trajectory grew.
    PostDecision,
    /// The index was already processed; nothing changed.
    Replayed,
}

/// One monitoring cycle.
///
/// `trajectory.len() == highest_index`. While the cycle is open,
/// `cumulative_sum` is the last trajectory entry (0 when empty). Once `status`
/// leaves `InProgress`, `status`, `decided_at_index` and `cumulative_sum` are
/// frozen; post-decision outcomes only extend `trajectory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CusumState {
    pub trainee: String,
    pub procedure: String,
    pub cycle: u32,
    pub cumulative_sum: f64,
    pub trajectory: Vec<f64>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at_index: Option<u64>,
    pub highest_index: u64,
}

impl CusumState {
    pub fn new(trainee: impl Into<String>, procedure: impl Into<String>, cycle: u32) -> Self {
        Self {
            trainee: trainee.into(),
            procedure: procedure.into(),
            cycle,
            cumulative_sum: 0.0,
            trajectory: Vec::new(),
            status: Status::InProgress,
            decided_at_index: None,
            highest_index: 0,
        }
    }

    pub fn key(&self) -> TrackerKey {
        TrackerKey::new(self.trainee.clone(), self.procedure.clone())
    }

    pub fn is_decided(&self) -> bool {
        self.status.is_decided()
    }

    /// Outcomes processed after the decision.
    pub fn post_decision_count(&self) -> u64 {
        self.decided_at_index
            .map(|i| self.highest_index - i)
            .unwrap_or(0)
    }

    /// Pure transition: returns the state after `outcome`.
    pub fn append(&self, outcome: Outcome, params: &CusumParams) -> Result<CusumState> {
        let mut next = self.clone();
        next.apply(outcome, params)?;
        Ok(next)
    }

    /// Closes this decided cycle and returns a fresh one for the same key.
    pub fn reset(&self) -> Result<CusumState> {
        if !self.is_decided() {
            return Err(CusumError::CycleStillOpen { cycle: self.cycle });
        }
        Ok(CusumState::new(
            self.trainee.clone(),
            self.procedure.clone(),
            self.cycle + 1,
        ))
    }

    /// In-place step. Validates before touching any field.
    pub(crate) fn apply(&mut self, outcome: Outcome, params: &CusumParams) -> Result<Applied> {
        if outcome.index <= self.highest_index {
            return Ok(Applied::Replayed);
        }
        engine::check_next(self.highest_index, outcome.index)?;

        let running = self.trajectory.last().copied().unwrap_or(0.0);
        let sum = engine::step(running, outcome.success, params);
        self.trajectory.push(sum);
        self.highest_index = outcome.index;

        if self.is_decided() {
            return Ok(Applied::PostDecision);
        }
        self.cumulative_sum = sum;
        let status = engine::classify(sum, params.h());
        if status.is_decided() {
            self.status = status;
            self.decided_at_index = Some(outcome.index);
        }
        Ok(Applied::Stepped)
    }
}

// ---------------------------------------------------------------------------
// Chart data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub attempt: u64,
    pub score: f64,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Pairs each trajectory entry with the record that produced it.
pub fn chart_points(state: &CusumState, records: &[OutcomeRecord]) -> Vec<ChartPoint> {
    records
        .iter()
        .filter(|r| r.cycle == state.cycle && r.index >= 1)
        .filter_map(|r| {
            let score = *state.trajectory.get((r.index - 1) as usize)?;
            Some(ChartPoint {
                attempt: r.index,
                score,
                success: r.success(),
                recorded_at: r.recorded_at,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// LearningCurveTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCurveTracker {
    rates: ResolvedRates,
    current: CusumState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    closed: Vec<CusumState>,
}

impl LearningCurveTracker {
    /// Opens cycle 1 for `(trainee, procedure)`.
    pub fn start(
        trainee: impl Into<String>,
        procedure: impl Into<String>,
        rates: ResolvedRates,
    ) -> Result<Self> {
        rates.params()?;
        Ok(Self {
            rates,
            current: CusumState::new(trainee, procedure, 1),
            closed: Vec::new(),
        })
    }

    pub fn key(&self) -> TrackerKey {
        self.current.key()
    }

    pub fn state(&self) -> &CusumState {
        &self.current
    }

    pub fn rates(&self) -> &ResolvedRates {
        &self.rates
    }

    pub fn params(&self) -> Result<CusumParams> {
        self.rates.params()
    }

    pub fn closed_cycles(&self) -> &[CusumState] {
        &self.closed
    }

    /// Attempts recorded in the open cycle.
    pub fn attempts(&self) -> u64 {
        self.current.highest_index
    }

    pub fn append(&mut self, outcome: Outcome) -> Result<&CusumState> {
        let params = self.params()?;
        let was_decided = self.current.is_decided();
        match self.current.apply(outcome, &params)? {
            Applied::Replayed => {
                tracing::warn!(
                    key = %self.key(),
                    cycle = self.current.cycle,
                    index = outcome.index,
                    highest = self.current.highest_index,
                    "index already processed, ignoring replay"
                );
            }
            Applied::PostDecision => {
                tracing::debug!(
                    key = %self.key(),
                    index = outcome.index,
                    running = ?self.current.trajectory.last(),
                    "post-decision outcome recorded"
                );
            }
            Applied::Stepped => {
                if !was_decided && self.current.is_decided() {
                    tracing::info!(
                        key = %self.key(),
                        cycle = self.current.cycle,
                        status = %self.current.status,
                        index = outcome.index,
                        sum = self.current.cumulative_sum,
                        h = params.h(),
                        "boundary crossed"
                    );
                } else {
                    tracing::debug!(
                        key = %self.key(),
                        index = outcome.index,
                        sum = self.current.cumulative_sum,
                        "cusum step"
                    );
                }
            }
        }
        Ok(&self.current)
    }

    /// Rebuilds the open cycle from its full outcome history under `rates`.
    ///
    /// `cycle` names the cycle the outcomes were gathered for and must be the
    /// open one. Produces exactly what folding [`append`](Self::append) over
    /// the same outcomes from an empty cycle produces.
    pub fn recompute(
        &mut self,
        cycle: u32,
        rates: ResolvedRates,
        outcomes: &[Outcome],
    ) -> Result<&CusumState> {
        if cycle != self.current.cycle {
            return Err(CusumError::StaleCycle {
                current: self.current.cycle,
                requested: cycle,
            });
        }
        let params = rates.params()?;
        let mut rebuilt = CusumState::new(
            self.current.trainee.clone(),
            self.current.procedure.clone(),
            self.current.cycle,
        );
        for o in outcomes {
            if rebuilt.apply(*o, &params)? == Applied::Replayed {
                return Err(CusumError::sequence(
                    rebuilt.highest_index + 1,
                    o.index,
                    "index not strictly increasing",
                ));
            }
        }
        tracing::info!(
            key = %self.key(),
            cycle = rebuilt.cycle,
            outcomes = outcomes.len(),
            before = %self.current.status,
            after = %rebuilt.status,
            "cycle recomputed"
        );
        self.rates = rates;
        self.current = rebuilt;
        Ok(&self.current)
    }

    /// Closes the decided cycle and opens the next one.
    pub fn reset(&mut self) -> Result<&CusumState> {
        let fresh = self.current.reset()?;
        let closed = std::mem::replace(&mut self.current, fresh);
        tracing::info!(
            key = %self.key(),
            closed_cycle = closed.cycle,
            status = %closed.status,
            new_cycle = self.current.cycle,
            "cycle reset"
        );
        self.closed.push(closed);
        Ok(&self.current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rates() -> ResolvedRates {
        ResolvedRates::new(0.20, 0.10, 0.05, 0.20).unwrap()
    }

    fn tracker() -> LearningCurveTracker {
        LearningCurveTracker::start("m-dupont", "central-venous-catheter", rates()).unwrap()
    }

    fn fold(results: &[bool]) -> LearningCurveTracker {
        let mut t = tracker();
        for o in Outcome::sequence(results) {
            t.append(o).unwrap();
        }
        t
    }

    #[test]
    fn new_cycle_is_empty() {
        let t = tracker();
        let s = t.state();
        assert_eq!(s.cycle, 1);
        assert_eq!(s.cumulative_sum, 0.0);
        assert!(s.trajectory.is_empty());
        assert_eq!(s.status, Status::InProgress);
        assert_eq!(s.highest_index, 0);
    }

    #[test]
    fn append_tracks_invariants() {
        let t = fold(&[true, false, true]);
        let s = t.state();
        assert_eq!(s.trajectory.len() as u64, s.highest_index);
        assert_eq!(s.cumulative_sum, *s.trajectory.last().unwrap());
    }

    #[test]
    fn incremental_matches_pure_fold_on_reference_cases() {
        for results in [vec![true; 24], vec![false; 5], vec![true; 23]] {
            let t = fold(&results);
            let run = engine::compute_with_rates(&Outcome::sequence(&results), &rates()).unwrap();
            assert_eq!(t.state().trajectory, run.trajectory);
            assert_eq!(t.state().status, run.status);
            assert_eq!(t.state().decided_at_index, run.decided_at_index);
        }
    }

    #[test]
    fn replay_is_noop() {
        let mut t = fold(&[true, true, false]);
        let before = t.state().clone();
        t.append(Outcome::failure(2)).unwrap();
        t.append(Outcome::success(3)).unwrap();
        assert_eq!(t.state(), &before);
    }

    #[test]
    fn out_of_order_append_leaves_state_unchanged() {
        let mut t = fold(&[true, true]);
        let before = t.state().clone();
        let err = t.append(Outcome::success(5)).unwrap_err();
        assert!(matches!(err, CusumError::Sequence { expected: 3, got: 5, .. }));
        assert_eq!(t.state(), &before);
    }

    #[test]
    fn post_decision_outcomes_extend_trajectory_only() {
        let mut t = fold(&[false; 5]);
        assert_eq!(t.state().status, Status::NotCompetent);
        let decided_sum = t.state().cumulative_sum;

        for i in 6..=40 {
            t.append(Outcome::success(i)).unwrap();
        }
        let s = t.state();
        assert_eq!(s.trajectory.len(), 40);
        assert_eq!(s.status, Status::NotCompetent);
        assert_eq!(s.decided_at_index, Some(5));
        assert_eq!(s.cumulative_sum, decided_sum);
        assert_eq!(s.cumulative_sum, s.trajectory[4]);
        assert!(*s.trajectory.last().unwrap() < decided_sum);
        assert_eq!(s.post_decision_count(), 35);
    }

    #[test]
    fn pure_append_does_not_mutate_input() {
        let s = CusumState::new("t", "p", 1);
        let params = rates().params().unwrap();
        let next = s.append(Outcome::failure(1), &params).unwrap();
        assert!(s.trajectory.is_empty());
        assert_eq!(next.trajectory.len(), 1);
    }

    #[test]
    fn reset_requires_decision() {
        let mut t = fold(&[true; 3]);
        assert!(matches!(
            t.reset(),
            Err(CusumError::CycleStillOpen { cycle: 1 })
        ));
        assert!(t.closed_cycles().is_empty());
    }

    #[test]
    fn reset_retains_closed_cycle() {
        let mut t = fold(&[true; 24]);
        let decided = t.state().clone();
        let fresh = t.reset().unwrap().clone();
        assert_eq!(fresh.cycle, 2);
        assert_eq!(fresh.status, Status::InProgress);
        assert!(fresh.trajectory.is_empty());
        assert_eq!(t.closed_cycles(), &[decided]);

        // The new cycle restarts its indices at 1.
        t.append(Outcome::failure(1)).unwrap();
        assert_eq!(t.state().highest_index, 1);
    }

    #[test]
    fn recompute_with_new_rates() {
        let results = [false, false, false, true];
        let mut t = fold(&results);
        let stricter = ResolvedRates::new(0.30, 0.10, 0.05, 0.20).unwrap();
        let s = t
            .recompute(1, stricter, &Outcome::sequence(&results))
            .unwrap()
            .clone();
        let expected = engine::compute_with_rates(&Outcome::sequence(&results), &stricter).unwrap();
        assert_eq!(s.trajectory, expected.trajectory);
        assert_eq!(t.rates(), &stricter);
    }

    #[test]
    fn recompute_rejects_bad_history_without_mutating() {
        let mut t = fold(&[true, true]);
        let before = t.clone();
        let bad = [Outcome::success(1), Outcome::success(1)];
        assert!(t.recompute(1, rates(), &bad).is_err());
        assert_eq!(t, before);
    }

    #[test]
    fn recompute_rejects_outcomes_of_a_closed_cycle() {
        let results = [false; 5];
        let mut t = fold(&results);
        t.reset().unwrap();
        let before = t.clone();
        let err = t
            .recompute(1, rates(), &Outcome::sequence(&results))
            .unwrap_err();
        assert!(matches!(
            err,
            CusumError::StaleCycle {
                current: 2,
                requested: 1
            }
        ));
        assert_eq!(err.code(), "stale_cycle");
        assert_eq!(t, before);
    }

    #[test]
    fn chart_points_pair_records_with_scores() {
        let t = fold(&[true, false]);
        let records = vec![
            OutcomeRecord::new("m-dupont", "central-venous-catheter", 1, 1, Some(true), None)
                .unwrap(),
            OutcomeRecord::new("m-dupont", "central-venous-catheter", 1, 2, Some(false), None)
                .unwrap(),
        ];
        let points = chart_points(t.state(), &records);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].attempt, 2);
        assert_eq!(points[1].score, t.state().cumulative_sum);
        assert!(!points[1].success);
    }

    #[test]
    fn tracker_yaml_roundtrip() {
        let mut t = fold(&[false; 6]);
        t.reset().unwrap();
        t.append(Outcome::success(1)).unwrap();
        let yaml = serde_yaml::to_string(&t).unwrap();
        let parsed: LearningCurveTracker = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, t);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_recompute_equals_incremental(
            results in prop::collection::vec(any::<bool>(), 0..80),
            p1 in 0.01f64..0.4,
            ratio in 1.2f64..2.4,
        ) {
            let p0 = (p1 * ratio).min(0.95);
            let rates = ResolvedRates::new(p0, p1, 0.05, 0.20).unwrap();
            let outcomes = Outcome::sequence(&results);

            let mut incremental = LearningCurveTracker::start("t", "p", rates).unwrap();
            for o in &outcomes {
                incremental.append(*o).unwrap();
            }

            let mut rebuilt = LearningCurveTracker::start("t", "p", rates).unwrap();
            rebuilt.recompute(1, rates, &outcomes).unwrap();
            prop_assert_eq!(incremental.state(), rebuilt.state());

            let run = engine::compute_with_rates(&outcomes, &rates).unwrap();
            prop_assert_eq!(&incremental.state().trajectory, &run.trajectory);
            prop_assert_eq!(incremental.state().status, run.status);
            prop_assert_eq!(incremental.state().decided_at_index, run.decided_at_index);
        }

        #[test]
        fn prop_decision_never_changes(
            results in prop::collection::vec(any::<bool>(), 1..120),
        ) {
            let mut t = tracker();
            let mut first: Option<(Status, Option<u64>)> = None;
            for o in Outcome::sequence(&results) {
                let s = t.append(o).unwrap();
                prop_assert_eq!(s.trajectory.len() as u64, s.highest_index);
                if let Some(prev) = first {
                    prop_assert_eq!((s.status, s.decided_at_index), prev);
                } else if s.is_decided() {
                    first = Some((s.status, s.decided_at_index));
                }
            }
        }
    }
}
