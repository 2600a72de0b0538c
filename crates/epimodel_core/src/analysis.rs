use crate::error::ModelError;
use crate::models::Compartment;
use crate::trajectory::Trajectory;
use serde::Serialize;

/// Pointwise `candidate − baseline` for one compartment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationSeries {
    pub compartment: Compartment,
    pub times: Vec<f64>,
    pub signed: Vec<f64>,
}

impl DeviationSeries {
    pub fn absolute(&self) -> Vec<f64> {
        self.signed.iter().map(|v| v.abs()).collect()
    }

    /// Largest absolute deviation, NaN if any sample is NaN.
    pub fn max_abs(&self) -> f64 {
        self.signed
            .iter()
            .map(|v| v.abs())
            .fold(0.0, |acc, v| if v.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(v) })
    }
}

/// Deviation of `candidate` from `baseline`. Both must be sampled at the same times.
pub fn deviation(
    candidate: &Trajectory,
    baseline: &Trajectory,
    compartment: Compartment,
) -> Result<DeviationSeries, ModelError> {
    if candidate.len() != baseline.len() {
        return Err(ModelError::InvalidTimeGrid(format!(
            "cannot compare trajectories of {} and {} samples",
            candidate.len(),
            baseline.len()
        )));
    }
    for (idx, (a, b)) in candidate.times().iter().zip(baseline.times()).enumerate() {
        if (a - b).abs() > 1e-9 * a.abs().max(b.abs()).max(1.0) {
            return Err(ModelError::InvalidTimeGrid(format!(
                "sample {idx} is at t = {a} in one trajectory and t = {b} in the other"
            )));
        }
    }
    let missing = || {
        ModelError::InvalidState(format!("compartment {compartment} is not in both trajectories"))
    };
    let lhs = candidate.series(compartment).ok_or_else(missing)?;
    let rhs = baseline.series(compartment).ok_or_else(missing)?;

    Ok(DeviationSeries {
        compartment,
        times: candidate.times().to_vec(),
        signed: lhs.iter().zip(rhs).map(|(a, b)| a - b).collect(),
    })
}

/// `total(t) − expected_total` at every sample.
pub fn conservation_drift(trajectory: &Trajectory, expected_total: f64) -> Vec<f64> {
    trajectory
        .totals()
        .into_iter()
        .map(|total| total - expected_total)
        .collect()
}

/// Convergence order implied by errors at step sizes `h` and `h / refinement`.
pub fn observed_order(coarse_error: f64, fine_error: f64, refinement: f64) -> f64 {
    (coarse_error / fine_error).ln() / refinement.ln()
}

/// Fraction of the population ever infected in an SIR epidemic started from a
/// fully susceptible population: the root in (0, 1) of `z = 1 − e^(−R₀ z)`.
/// Zero at or below threshold.
pub fn final_size(reproduction_number: f64) -> Result<f64, ModelError> {
    if !reproduction_number.is_finite() || reproduction_number <= 0.0 {
        return Err(ModelError::parameter(
            "reproduction_number",
            format!("must be positive and finite, got {reproduction_number}"),
        ));
    }
    if reproduction_number <= 1.0 {
        return Ok(0.0);
    }

    // g is convex and increasing to the right of its positive root, so Newton
    // from z = 1 descends monotonically onto it.
    let r0 = reproduction_number;
    let mut z = 1.0f64;
    for _ in 0..100 {
        let decay = (-r0 * z).exp();
        let g = z - 1.0 + decay;
        let dg = 1.0 - r0 * decay;
        let next = z - g / dg;
        if (next - z).abs() <= 1e-15 {
            return Ok(next);
        }
        z = next;
    }
    Ok(z)
}
