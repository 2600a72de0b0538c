//! Fixed-step RK4 integration of a model into a [`Trajectory`].

use crate::error::ModelError;
use crate::models::{CompartmentState, EpidemicModel};
use crate::solvers::RK4;
use crate::traits::Steppable;
use crate::trajectory::Trajectory;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedStepSettings {
    pub step_size: f64,
    pub steps: usize,
    /// Keep every n-th step in the trajectory. The final step is always kept.
    pub record_every: usize,
    pub start_time: f64,
}

impl FixedStepSettings {
    pub fn new(step_size: f64, steps: usize) -> Self {
        Self {
            step_size,
            steps,
            record_every: 1,
            start_time: 0.0,
        }
    }

    /// Settings spanning `[0, horizon]` with step `step_size`, recording
    /// samples `sample_spacing` days apart.
    pub fn covering(
        horizon: f64,
        step_size: f64,
        sample_spacing: f64,
    ) -> Result<Self, ModelError> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(ModelError::InvalidSettings(format!(
                "step_size must be positive and finite, got {step_size}"
            )));
        }
        let steps = whole_ratio(horizon, step_size, "horizon")?;
        let record_every = whole_ratio(sample_spacing, step_size, "sample_spacing")?;
        Ok(Self {
            step_size,
            steps,
            record_every: record_every.max(1),
            start_time: 0.0,
        })
    }

    pub fn with_record_every(self, record_every: usize) -> Self {
        Self {
            record_every,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(ModelError::InvalidSettings(format!(
                "step_size must be positive and finite, got {}",
                self.step_size
            )));
        }
        if !self.start_time.is_finite() {
            return Err(ModelError::InvalidSettings(
                "start_time must be finite".to_string(),
            ));
        }
        if self.record_every == 0 {
            return Err(ModelError::InvalidSettings(
                "record_every must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of samples the trajectory will hold, initial state included.
    pub fn sample_count(&self) -> usize {
        let every = self.record_every.max(1);
        let trailing = usize::from(self.steps % every != 0);
        self.steps / every + 1 + trailing
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.steps as f64 * self.step_size
    }
}

fn whole_ratio(span: f64, step: f64, name: &str) -> Result<usize, ModelError> {
    if !span.is_finite() || span < 0.0 {
        return Err(ModelError::InvalidSettings(format!(
            "{name} must be finite and non-negative, got {span}"
        )));
    }
    let ratio = span / step;
    let rounded = ratio.round();
    if (ratio - rounded).abs() > 1e-6 * rounded.max(1.0) {
        return Err(ModelError::InvalidSettings(format!(
            "{name} = {span} is not a whole multiple of the step size {step}"
        )));
    }
    Ok(rounded as usize)
}

/// Advances `initial` with classical RK4 and returns the recorded samples.
///
/// The result depends only on the inputs. States are never clamped: if the
/// step size is too large for the parameters, negative or non-finite values
/// show up in the trajectory as they were computed.
pub fn integrate_rk4(
    model: &EpidemicModel,
    initial: &CompartmentState,
    settings: &FixedStepSettings,
) -> Result<Trajectory, ModelError> {
    settings.validate()?;
    model.validate_state(initial)?;

    let dim = initial.len();
    let h = settings.step_size;
    let t0 = settings.start_time;
    let mut trajectory = Trajectory::with_capacity(model.compartments(), settings.sample_count());
    let mut stepper = RK4::new(dim);
    let mut state = initial.values().to_vec();
    let mut t = t0;
    let mut warned = false;

    debug!(
        "RK4 {}: h = {}, {} steps, {} samples",
        model.kind(),
        h,
        settings.steps,
        settings.sample_count()
    );

    trajectory.push(t0, &state);
    for k in 1..=settings.steps {
        stepper.step(model, &mut t, &mut state, h);
        // t_k = t0 + k·h, not an accumulated sum.
        t = t0 + k as f64 * h;

        if !warned && state.iter().any(|v| !v.is_finite() || *v < 0.0) {
            warn!(
                "RK4 {} left the physical region at t = {t} (h = {h}): {state:?}",
                model.kind()
            );
            warned = true;
        }

        if k % settings.record_every == 0 || k == settings.steps {
            trajectory.push(t, &state);
        }
    }

    Ok(trajectory)
}
