use crate::error::{CusumError, Result};

/// Symmetric decision boundary `h = ln((1 − β) / α)`.
///
/// The same `±h` is used for both decisions. Recompute whenever `α` or `β`
/// change; nothing here is cached.
pub fn decision_boundary(alpha: f64, beta: f64) -> Result<f64> {
    for (name, v) in [("alpha", alpha), ("beta", beta)] {
        if !(v.is_finite() && v > 0.0 && v < 1.0) {
            return Err(CusumError::domain(format!(
                "{name} must be in the open interval (0, 1), got {v}"
            )));
        }
    }
    let h = ((1.0 - beta) / alpha).ln();
    if !h.is_finite() || h <= 0.0 {
        return Err(CusumError::domain(format!(
            "decision boundary must be positive and finite, got {h} (alpha={alpha}, beta={beta})"
        )));
    }
    Ok(h)
}
