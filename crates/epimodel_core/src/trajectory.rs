//! Time grids and the trajectories sampled on them.

use crate::error::ModelError;
use crate::models::Compartment;
use serde::Serialize;

/// Strictly increasing, finite time points in days.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> Result<Self, ModelError> {
        if points.is_empty() {
            return Err(ModelError::InvalidTimeGrid(
                "grid must contain at least one point".to_string(),
            ));
        }
        if let Some(bad) = points.iter().find(|t| !t.is_finite()) {
            return Err(ModelError::InvalidTimeGrid(format!(
                "grid points must be finite, got {bad}"
            )));
        }
        if let Some(idx) = points.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ModelError::InvalidTimeGrid(format!(
                "grid must be strictly increasing (t[{}] = {} >= t[{}] = {})",
                idx,
                points[idx],
                idx + 1,
                points[idx + 1]
            )));
        }
        Ok(Self { points })
    }

    /// `steps + 1` points `start + k * step`.
    pub fn uniform(start: f64, step: f64, steps: usize) -> Result<Self, ModelError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(ModelError::InvalidTimeGrid(format!(
                "step must be positive and finite, got {step}"
            )));
        }
        let mut points = Vec::with_capacity(steps + 1);
        points.extend((0..=steps).map(|k| start + k as f64 * step));
        Self::new(points)
    }

    /// `count` evenly spaced points covering `[start, end]`, both ends included.
    pub fn linspace(start: f64, end: f64, count: usize) -> Result<Self, ModelError> {
        match count {
            0 => Err(ModelError::InvalidTimeGrid(
                "linspace needs at least one point".to_string(),
            )),
            1 => Self::new(vec![start]),
            _ => {
                let step = (end - start) / (count - 1) as f64;
                let mut points = Vec::with_capacity(count);
                points.extend((0..count - 1).map(|k| start + k as f64 * step));
                points.push(end);
                Self::new(points)
            }
        }
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.points[0]
    }

    pub fn end(&self) -> f64 {
        self.points[self.points.len() - 1]
    }
}

/// Compartment time series aligned to a shared sequence of times.
///
/// Stored column-wise: one `Vec` per compartment, all sized up front.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    compartments: Vec<Compartment>,
    times: Vec<f64>,
    series: Vec<Vec<f64>>,
}

impl Trajectory {
    pub(crate) fn with_capacity(compartments: &[Compartment], capacity: usize) -> Self {
        Self {
            compartments: compartments.to_vec(),
            times: Vec::with_capacity(capacity),
            series: compartments
                .iter()
                .map(|_| Vec::with_capacity(capacity))
                .collect(),
        }
    }

    pub(crate) fn push(&mut self, t: f64, state: &[f64]) {
        debug_assert_eq!(state.len(), self.series.len());
        self.times.push(t);
        for (column, &value) in self.series.iter_mut().zip(state) {
            column.push(value);
        }
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn series(&self, compartment: Compartment) -> Option<&[f64]> {
        self.compartments
            .iter()
            .position(|&c| c == compartment)
            .map(|idx| self.series[idx].as_slice())
    }

    /// Full state at sample `index`, in compartment order.
    pub fn state_at(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        Some(self.series.iter().map(|column| column[index]).collect())
    }

    pub fn final_state(&self) -> Option<Vec<f64>> {
        self.len().checked_sub(1).and_then(|idx| self.state_at(idx))
    }

    /// Sum over compartments at every sample.
    pub fn totals(&self) -> Vec<f64> {
        (0..self.len())
            .map(|idx| self.series.iter().map(|column| column[idx]).sum())
            .collect()
    }

    /// Largest value of a compartment and the time it occurs, found after the run.
    pub fn peak(&self, compartment: Compartment) -> Option<(f64, f64)> {
        let values = self.series(compartment)?;
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, &value)| (self.times[idx], value))
    }

    /// Smallest value of a compartment. Negative results expose integrator misuse.
    pub fn minimum(&self, compartment: Compartment) -> Option<f64> {
        self.series(compartment)?
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .min_by(f64::total_cmp)
    }

    /// True when every value is finite and non-negative.
    pub fn is_physical(&self) -> bool {
        self.series
            .iter()
            .flatten()
            .all(|v| v.is_finite() && *v >= 0.0)
    }

    /// Pairs `(x(t), y(t))` for a phase-plane plot of two compartments.
    pub fn phase_portrait(&self, x: Compartment, y: Compartment) -> Option<Vec<(f64, f64)>> {
        let xs = self.series(x)?;
        let ys = self.series(y)?;
        Some(xs.iter().copied().zip(ys.iter().copied()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trajectory {
        let mut traj =
            Trajectory::with_capacity(&[Compartment::Susceptible, Compartment::Infected], 3);
        traj.push(0.0, &[99.0, 1.0]);
        traj.push(1.0, &[90.0, 10.0]);
        traj.push(2.0, &[95.0, 5.0]);
        traj
    }

    #[test]
    fn grid_rejects_non_increasing_points() {
        assert!(TimeGrid::new(Vec::new()).is_err());
        assert!(TimeGrid::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(TimeGrid::new(vec![0.0, f64::NAN]).is_err());
        assert!(TimeGrid::new(vec![0.0, 0.5, 2.0]).is_ok());
        assert!(TimeGrid::uniform(0.0, 0.0, 10).is_err());
    }

    #[test]
    fn linspace_includes_both_endpoints() {
        let grid = TimeGrid::linspace(0.0, 300.0, 7).expect("grid");
        assert_eq!(grid.len(), 7);
        assert_eq!(grid.start(), 0.0);
        assert_eq!(grid.end(), 300.0);
        assert!((grid.points()[1] - 50.0).abs() < 1e-12);
        assert!(TimeGrid::linspace(0.0, 1.0, 0).is_err());
        assert_eq!(TimeGrid::linspace(3.0, 9.0, 1).expect("grid").points(), &[3.0]);
    }

    #[test]
    fn uniform_grid_does_not_accumulate_drift() {
        let grid = TimeGrid::uniform(0.0, 0.1, 1000).expect("grid");
        assert_eq!(grid.len(), 1001);
        assert!((grid.end() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn trajectory_queries() {
        let traj = sample();
        assert_eq!(traj.len(), 3);
        assert_eq!(traj.series(Compartment::Infected), Some(&[1.0, 10.0, 5.0][..]));
        assert_eq!(traj.series(Compartment::Recovered), None);
        assert_eq!(traj.state_at(1), Some(vec![90.0, 10.0]));
        assert_eq!(traj.state_at(3), None);
        assert_eq!(traj.final_state(), Some(vec![95.0, 5.0]));
        assert_eq!(traj.totals(), vec![100.0, 100.0, 100.0]);
        assert_eq!(traj.peak(Compartment::Infected), Some((1.0, 10.0)));
        assert_eq!(traj.minimum(Compartment::Susceptible), Some(90.0));
        assert!(traj.is_physical());
    }

    #[test]
    fn phase_portrait_pairs_compartments() {
        let traj = sample();
        let portrait = traj
            .phase_portrait(Compartment::Susceptible, Compartment::Infected)
            .expect("portrait");
        assert_eq!(portrait, vec![(99.0, 1.0), (90.0, 10.0), (95.0, 5.0)]);
        assert!(traj
            .phase_portrait(Compartment::Susceptible, Compartment::Exposed)
            .is_none());
    }

    #[test]
    fn negative_values_are_reported_as_unphysical() {
        let mut traj = Trajectory::with_capacity(&[Compartment::Infected], 2);
        traj.push(0.0, &[1.0]);
        traj.push(1.0, &[-0.5]);
        assert!(!traj.is_physical());
        assert_eq!(traj.minimum(Compartment::Infected), Some(-0.5));
    }
}
