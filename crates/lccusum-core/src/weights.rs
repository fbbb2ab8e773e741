use serde::{Deserialize, Serialize};

/// Per-outcome log-likelihood-ratio increments for one rate pair.
///
/// `success` is strictly negative and pulls the sum toward the competent
/// boundary; `failure` is strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub success: f64,
    pub failure: f64,
}

impl Weights {
    /// `p0` is the unacceptable rate, `p1` the acceptable one. Inputs are
    /// expected to be validated already (`0 < p1 < p0 < 1`).
    pub fn from_rates(p0: f64, p1: f64) -> Self {
        Self {
            success: ((1.0 - p0) / (1.0 - p1)).ln(),
            failure: (p0 / p1).ln(),
        }
    }

    pub fn for_outcome(&self, success: bool) -> f64 {
        if success {
            self.success
        } else {
            self.failure
        }
    }

    pub fn is_finite(&self) -> bool {
        self.success.is_finite() && self.failure.is_finite()
    }
}
