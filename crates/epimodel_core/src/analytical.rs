//! Closed-form SIS solution.
//!
//! With S = N − I the SIS infected count obeys the logistic equation
//! dI/dt = (β − γ)·I·(1 − I / I∞), whose solution is
//! `I(t) = I∞ / (1 + V·e^(−ξt))` with `I∞ = N(1 − γ/β)`, `ξ = β − γ` and
//! `V = I∞/I₀ − 1`. The formula is only meaningful above threshold (β > γ);
//! below it the infection dies out and `I∞` would be non-positive.

use crate::error::ModelError;
use crate::models::{Compartment, ModelParameters};
use crate::trajectory::{TimeGrid, Trajectory};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SisAnalytical {
    population: f64,
    endemic_level: f64,
    growth_rate: f64,
    offset: f64,
}

impl SisAnalytical {
    pub fn new(params: &ModelParameters, initial_infected: f64) -> Result<Self, ModelError> {
        let beta = params.transmission_rate();
        let gamma = params.recovery_rate();
        if beta <= gamma {
            return Err(ModelError::Domain(format!(
                "SIS closed form requires beta > gamma (got beta = {beta}, gamma = {gamma}); \
                 the infection dies out and there is no endemic equilibrium"
            )));
        }
        if !initial_infected.is_finite() || initial_infected <= 0.0 {
            return Err(ModelError::parameter(
                "initial_infected",
                format!("must be positive and finite, got {initial_infected}"),
            ));
        }

        let population = params.population();
        let endemic_level = population * (1.0 - gamma / beta);
        Ok(Self {
            population,
            endemic_level,
            growth_rate: beta - gamma,
            offset: endemic_level / initial_infected - 1.0,
        })
    }

    /// I∞ = N(1 − γ/β).
    pub fn endemic_level(&self) -> f64 {
        self.endemic_level
    }

    pub fn infected(&self, t: f64) -> f64 {
        self.endemic_level / (1.0 + self.offset * (-self.growth_rate * t).exp())
    }

    pub fn susceptible(&self, t: f64) -> f64 {
        self.population - self.infected(t)
    }

    /// Samples S and I on `grid`.
    pub fn trajectory(&self, grid: &TimeGrid) -> Trajectory {
        let mut trajectory = Trajectory::with_capacity(
            &[Compartment::Susceptible, Compartment::Infected],
            grid.len(),
        );
        for &t in grid.points() {
            let infected = self.infected(t);
            trajectory.push(t, &[self.population - infected, infected]);
        }
        trajectory
    }
}

/// Convenience form of [`SisAnalytical::infected`] taking raw values.
pub fn sis_infected(
    t: f64,
    population: f64,
    initial_infected: f64,
    beta: f64,
    gamma: f64,
) -> Result<f64, ModelError> {
    let params = ModelParameters::new(population, beta, gamma)?;
    Ok(SisAnalytical::new(&params, initial_infected)?.infected(t))
}
