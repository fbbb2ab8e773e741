//! The LC-CUSUM fold.
//!
//! `S_0 = 0`, `S_i = S_{i-1} + w(outcome_i)`. After each step the sum is
//! checked against `-h` (competent) first, then `+h` (not competent). The
//! first crossing is final; later outcomes still extend the trajectory but
//! never change the decision.
//!
//! A sum that lands on a boundary within [`BOUNDARY_TIE_EPSILON`] does not
//! cross it. With the reference configuration (`p0 = 0.20`, `p1 = 0.10`,
//! `α = 0.05`, `β = 0.20`) four failures sum to `4·ln 2 = ln 16 = h` exactly,
//! and the decision is taken at the fifth failure.

use crate::error::{CusumError, Result};
use crate::rates::ResolvedRates;
use crate::threshold::decision_boundary;
use crate::types::Status;
use crate::weights::Weights;
use serde::{Deserialize, Serialize};

pub const BOUNDARY_TIE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// CusumParams
// ---------------------------------------------------------------------------

/// Validated weights and boundary for one resolved configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CusumParams {
    weights: Weights,
    h: f64,
}

impl CusumParams {
    pub fn new(weights: Weights, h: f64) -> Result<Self> {
        if !h.is_finite() || h <= 0.0 {
            return Err(CusumError::domain(format!(
                "decision boundary must be positive and finite, got {h}"
            )));
        }
        if !weights.is_finite() {
            return Err(CusumError::domain(format!(
                "weights must be finite, got success={} failure={}",
                weights.success, weights.failure
            )));
        }
        Ok(Self { weights, h })
    }

    pub fn from_rates(rates: &ResolvedRates) -> Result<Self> {
        let h = decision_boundary(rates.alpha, rates.beta)?;
        Self::new(Weights::from_rates(rates.p0, rates.p1), h)
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn h(&self) -> f64 {
        self.h
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The part of an outcome record the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub index: u64,
    pub success: bool,
}

impl Outcome {
    pub fn success(index: u64) -> Self {
        Self {
            index,
            success: true,
        }
    }

    pub fn failure(index: u64) -> Self {
        Self {
            index,
            success: false,
        }
    }

    /// Build a 1-indexed sequence from booleans.
    pub fn sequence(results: &[bool]) -> Vec<Outcome> {
        results
            .iter()
            .enumerate()
            .map(|(i, &success)| Outcome {
                index: i as u64 + 1,
                success,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Single step
// ---------------------------------------------------------------------------

pub fn step(sum: f64, success: bool, params: &CusumParams) -> f64 {
    sum + params.weights.for_outcome(success)
}

/// Boundary check in fixed precedence: competent before not competent.
pub fn classify(sum: f64, h: f64) -> Status {
    if sum <= -(h + BOUNDARY_TIE_EPSILON) {
        Status::Competent
    } else if sum >= h + BOUNDARY_TIE_EPSILON {
        Status::NotCompetent
    } else {
        Status::InProgress
    }
}

/// Checks that `index` is the next one after `last`.
pub(crate) fn check_next(last: u64, index: u64) -> Result<()> {
    let expected = last + 1;
    if index == expected {
        return Ok(());
    }
    let reason = if index == last && last > 0 {
        "duplicate index"
    } else if index < expected {
        "index not strictly increasing"
    } else {
        "gap in sequence"
    };
    Err(CusumError::sequence(expected, index, reason))
}

// ---------------------------------------------------------------------------
// Fold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CusumRun {
    pub trajectory: Vec<f64>,
    pub status: Status,
    pub decided_at_index: Option<u64>,
}

impl CusumRun {
    pub fn final_sum(&self) -> f64 {
        self.trajectory.last().copied().unwrap_or(0.0)
    }
}

/// Pure fold over `outcomes`, which must be indexed `1, 2, 3, …`.
pub fn compute(outcomes: &[Outcome], weights: Weights, h: f64) -> Result<CusumRun> {
    let params = CusumParams::new(weights, h)?;
    run(outcomes, &params)
}

pub fn compute_with_rates(outcomes: &[Outcome], rates: &ResolvedRates) -> Result<CusumRun> {
    run(outcomes, &CusumParams::from_rates(rates)?)
}

pub fn run(outcomes: &[Outcome], params: &CusumParams) -> Result<CusumRun> {
    let mut last = 0;
    for o in outcomes {
        check_next(last, o.index)?;
        last = o.index;
    }

    let mut sum = 0.0;
    let mut status = Status::InProgress;
    let mut decided_at_index = None;
    let mut trajectory = Vec::with_capacity(outcomes.len());

    for o in outcomes {
        sum = step(sum, o.success, params);
        trajectory.push(sum);
        if status == Status::InProgress {
            status = classify(sum, params.h);
            if status.is_decided() {
                decided_at_index = Some(o.index);
            }
        }
    }

    tracing::trace!(
        n = outcomes.len(),
        %status,
        ?decided_at_index,
        "cusum fold complete"
    );
    Ok(CusumRun {
        trajectory,
        status,
        decided_at_index,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> CusumParams {
        let rates = ResolvedRates::new(0.20, 0.10, 0.05, 0.20).unwrap();
        CusumParams::from_rates(&rates).unwrap()
    }

    #[test]
    fn twenty_four_successes_reach_competence() {
        let p = reference();
        let run = run(&Outcome::sequence(&[true; 24]), &p).unwrap();
        assert!((run.final_sum() - (-2.827)).abs() < 1e-3);
        assert_eq!(run.status, Status::Competent);
        assert_eq!(run.decided_at_index, Some(24));
    }

    #[test]
    fn twenty_three_successes_still_in_progress() {
        let p = reference();
        let run = run(&Outcome::sequence(&[true; 23]), &p).unwrap();
        assert_eq!(run.status, Status::InProgress);
        assert_eq!(run.decided_at_index, None);
        assert_eq!(run.trajectory.len(), 23);
    }

    #[test]
    fn failures_decide_at_fifth_not_fourth() {
        let p = reference();
        let four = run(&Outcome::sequence(&[false; 4]), &p).unwrap();
        assert!((four.final_sum() - 2.772).abs() < 1e-3);
        assert_eq!(four.status, Status::InProgress);

        let five = run(&Outcome::sequence(&[false; 5]), &p).unwrap();
        assert!((five.final_sum() - 3.466).abs() < 1e-3);
        assert_eq!(five.status, Status::NotCompetent);
        assert_eq!(five.decided_at_index, Some(5));
    }

    #[test]
    fn decision_frozen_but_trajectory_continues() {
        let p = reference();
        let mut results = vec![false; 5];
        results.extend([true; 60]);
        let run = run(&Outcome::sequence(&results), &p).unwrap();
        assert_eq!(run.trajectory.len(), 65);
        // The sum later falls far below -h, yet the first decision stands.
        assert!(run.final_sum() < -p.h());
        assert_eq!(run.status, Status::NotCompetent);
        assert_eq!(run.decided_at_index, Some(5));
    }

    #[test]
    fn mixed_sequence_matches_hand_sum() {
        let p = reference();
        let w = p.weights();
        let run = run(&Outcome::sequence(&[true, false, true, true]), &p).unwrap();
        let expected = [
            w.success,
            w.success + w.failure,
            w.success + w.failure + w.success,
            w.success + w.failure + w.success + w.success,
        ];
        assert_eq!(run.trajectory, expected);
    }

    #[test]
    fn empty_sequence_is_in_progress() {
        let run = run(&[], &reference()).unwrap();
        assert!(run.trajectory.is_empty());
        assert_eq!(run.final_sum(), 0.0);
        assert_eq!(run.status, Status::InProgress);
    }

    #[test]
    fn out_of_order_and_duplicate_indices_rejected() {
        let p = reference();
        let swapped = [Outcome::success(2), Outcome::success(1)];
        assert!(matches!(
            run(&swapped, &p),
            Err(CusumError::Sequence { expected: 1, got: 2, .. })
        ));

        let dup = [Outcome::success(1), Outcome::failure(1)];
        match run(&dup, &p) {
            Err(CusumError::Sequence { reason, .. }) => assert_eq!(reason, "duplicate index"),
            other => panic!("expected sequence error, got {other:?}"),
        }

        let gap = [Outcome::success(1), Outcome::success(3)];
        assert!(matches!(run(&gap, &p), Err(CusumError::Sequence { .. })));
    }

    #[test]
    fn malformed_params_are_domain_errors() {
        let w = Weights::from_rates(0.2, 0.1);
        assert!(matches!(compute(&[], w, 0.0), Err(CusumError::Domain(_))));
        assert!(matches!(compute(&[], w, -1.0), Err(CusumError::Domain(_))));
        let bad = Weights {
            success: f64::NEG_INFINITY,
            failure: 0.5,
        };
        assert!(matches!(compute(&[], bad, 2.0), Err(CusumError::Domain(_))));
    }

    #[test]
    fn classify_precedence_and_ties() {
        let h = 2.0;
        assert_eq!(classify(-2.5, h), Status::Competent);
        assert_eq!(classify(2.5, h), Status::NotCompetent);
        assert_eq!(classify(2.0, h), Status::InProgress);
        assert_eq!(classify(-2.0, h), Status::InProgress);
        assert_eq!(classify(0.0, h), Status::InProgress);
    }
}
