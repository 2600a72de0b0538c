//! Independent trajectories for cross-checking the RK4 integrator.

use crate::error::ModelError;
use crate::models::{CompartmentState, EpidemicModel};
use crate::solvers::{integrate_adaptive, AdaptiveSettings};
use crate::trajectory::{TimeGrid, Trajectory};

/// An ODE solver that reports a model's state at exactly the requested times.
pub trait ReferenceSolver {
    fn solve(
        &self,
        model: &EpidemicModel,
        initial: &CompartmentState,
        grid: &TimeGrid,
    ) -> Result<Trajectory, ModelError>;
}

/// Adapter over the adaptive Tsitouras 5(4) integrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveReference {
    settings: AdaptiveSettings,
}

impl AdaptiveReference {
    pub fn new(settings: AdaptiveSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }
}

impl ReferenceSolver for AdaptiveReference {
    fn solve(
        &self,
        model: &EpidemicModel,
        initial: &CompartmentState,
        grid: &TimeGrid,
    ) -> Result<Trajectory, ModelError> {
        model.validate_state(initial)?;
        let mut trajectory = Trajectory::with_capacity(model.compartments(), grid.len());
        integrate_adaptive(
            model,
            initial.values(),
            grid.points(),
            &self.settings,
            |t, state| trajectory.push(t, state),
        )?;
        Ok(trajectory)
    }
}
