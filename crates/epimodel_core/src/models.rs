//! Compartmental models and their rate functions.
//!
//! Each model is a [`ModelKind`] tag paired with validated [`ModelParameters`].
//! Every flux between compartments is computed once and then subtracted from
//! its source and added to its target, so the derivatives always sum to zero
//! and the total population is conserved by the dynamics.

use crate::error::ModelError;
use crate::traits::{constant, DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compartment {
    Susceptible,
    Exposed,
    Infected,
    Recovered,
}

impl Compartment {
    pub fn label(self) -> &'static str {
        match self {
            Compartment::Susceptible => "Susceptible",
            Compartment::Exposed => "Exposed",
            Compartment::Infected => "Infected",
            Compartment::Recovered => "Recovered",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Exposed => "E",
            Compartment::Infected => "I",
            Compartment::Recovered => "R",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const SIS_COMPARTMENTS: [Compartment; 2] = [Compartment::Susceptible, Compartment::Infected];
const SIR_COMPARTMENTS: [Compartment; 3] = [
    Compartment::Susceptible,
    Compartment::Infected,
    Compartment::Recovered,
];
const SEIR_COMPARTMENTS: [Compartment; 4] = [
    Compartment::Susceptible,
    Compartment::Exposed,
    Compartment::Infected,
    Compartment::Recovered,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Sis,
    Sir,
    Seir,
}

impl ModelKind {
    /// Compartments in state-vector order.
    pub fn compartments(self) -> &'static [Compartment] {
        match self {
            ModelKind::Sis => &SIS_COMPARTMENTS,
            ModelKind::Sir => &SIR_COMPARTMENTS,
            ModelKind::Seir => &SEIR_COMPARTMENTS,
        }
    }

    pub fn dimension(self) -> usize {
        self.compartments().len()
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Sis => "SIS",
            ModelKind::Sir => "SIR",
            ModelKind::Seir => "SEIR",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sis" => Ok(ModelKind::Sis),
            "sir" => Ok(ModelKind::Sir),
            "seir" => Ok(ModelKind::Seir),
            other => Err(ModelError::parameter(
                "kind",
                format!("unknown model `{other}` (expected sis, sir or seir)"),
            )),
        }
    }
}

/// Immutable, validated model parameters. Rates are per day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelParameters {
    population: f64,
    transmission_rate: f64,
    recovery_rate: f64,
    incubation_rate: Option<f64>,
    contact_factor: f64,
}

impl ModelParameters {
    pub fn new(
        population: f64,
        transmission_rate: f64,
        recovery_rate: f64,
    ) -> Result<Self, ModelError> {
        if !population.is_finite() || population <= 0.0 {
            return Err(ModelError::parameter(
                "population",
                format!("must be positive and finite, got {population}"),
            ));
        }
        if population.fract() != 0.0 {
            return Err(ModelError::parameter(
                "population",
                format!("must be a whole number of individuals, got {population}"),
            ));
        }
        positive_rate("transmission_rate", transmission_rate)?;
        positive_rate("recovery_rate", recovery_rate)?;

        Ok(Self {
            population,
            transmission_rate,
            recovery_rate,
            incubation_rate: None,
            contact_factor: 1.0,
        })
    }

    /// Builds parameters from the basic reproduction number, using β = R₀·γ.
    pub fn from_reproduction_number(
        population: f64,
        reproduction_number: f64,
        recovery_rate: f64,
    ) -> Result<Self, ModelError> {
        positive_rate("reproduction_number", reproduction_number)?;
        positive_rate("recovery_rate", recovery_rate)?;
        Self::new(population, reproduction_number * recovery_rate, recovery_rate)
    }

    /// Sets the incubation rate α (1 / mean latent period).
    pub fn with_incubation_rate(self, incubation_rate: f64) -> Result<Self, ModelError> {
        positive_rate("incubation_rate", incubation_rate)?;
        Ok(Self {
            incubation_rate: Some(incubation_rate),
            ..self
        })
    }

    /// Sets the intervention factor ρ scaling the effective contact rate.
    pub fn with_contact_factor(self, contact_factor: f64) -> Result<Self, ModelError> {
        if !(0.0..=1.0).contains(&contact_factor) {
            return Err(ModelError::parameter(
                "contact_factor",
                format!("must lie in [0, 1], got {contact_factor}"),
            ));
        }
        Ok(Self {
            contact_factor,
            ..self
        })
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn transmission_rate(&self) -> f64 {
        self.transmission_rate
    }

    pub fn recovery_rate(&self) -> f64 {
        self.recovery_rate
    }

    pub fn incubation_rate(&self) -> Option<f64> {
        self.incubation_rate
    }

    pub fn contact_factor(&self) -> f64 {
        self.contact_factor
    }

    /// R₀ = β / γ.
    pub fn basic_reproduction_number(&self) -> f64 {
        self.transmission_rate / self.recovery_rate
    }

    /// ρ·β / γ, the reproduction number under intervention.
    pub fn effective_reproduction_number(&self) -> f64 {
        self.contact_factor * self.basic_reproduction_number()
    }
}

fn positive_rate(name: &'static str, value: f64) -> Result<(), ModelError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ModelError::parameter(
            name,
            format!("must be strictly positive and finite, got {value}"),
        ));
    }
    Ok(())
}

/// Compartment values in the order given by [`ModelKind::compartments`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompartmentState(Vec<f64>);

impl CompartmentState {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn sis(susceptible: f64, infected: f64) -> Self {
        Self(vec![susceptible, infected])
    }

    pub fn sir(susceptible: f64, infected: f64, recovered: f64) -> Self {
        Self(vec![susceptible, infected, recovered])
    }

    pub fn seir(susceptible: f64, exposed: f64, infected: f64, recovered: f64) -> Self {
        Self(vec![susceptible, exposed, infected, recovered])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}

/// A compartmental model: the tag selects the rate functions, the
/// parameters feed them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpidemicModel {
    kind: ModelKind,
    params: ModelParameters,
}

impl EpidemicModel {
    pub fn new(kind: ModelKind, params: ModelParameters) -> Result<Self, ModelError> {
        match kind {
            ModelKind::Seir => {
                if params.incubation_rate.is_none() {
                    return Err(ModelError::parameter(
                        "incubation_rate",
                        "the SEIR model requires an incubation rate",
                    ));
                }
            }
            ModelKind::Sis | ModelKind::Sir => {
                if params.incubation_rate.is_some() {
                    return Err(ModelError::parameter(
                        "incubation_rate",
                        format!("the {kind} model has no exposed compartment"),
                    ));
                }
                if params.contact_factor != 1.0 {
                    return Err(ModelError::parameter(
                        "contact_factor",
                        format!("the {kind} model does not take an intervention factor"),
                    ));
                }
            }
        }
        Ok(Self { kind, params })
    }

    pub fn sis(params: ModelParameters) -> Result<Self, ModelError> {
        Self::new(ModelKind::Sis, params)
    }

    pub fn sir(params: ModelParameters) -> Result<Self, ModelError> {
        Self::new(ModelKind::Sir, params)
    }

    pub fn seir(params: ModelParameters) -> Result<Self, ModelError> {
        Self::new(ModelKind::Seir, params)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn compartments(&self) -> &'static [Compartment] {
        self.kind.compartments()
    }

    pub fn index_of(&self, compartment: Compartment) -> Option<usize> {
        self.compartments().iter().position(|&c| c == compartment)
    }

    /// Checks that `state` has one finite, non-negative value per compartment.
    pub fn validate_state(&self, state: &CompartmentState) -> Result<(), ModelError> {
        let expected = self.kind.dimension();
        if state.len() != expected {
            return Err(ModelError::DimensionMismatch {
                expected,
                actual: state.len(),
            });
        }
        for (compartment, &value) in self.compartments().iter().zip(state.values()) {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::InvalidState(format!(
                    "{compartment} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Evaluates the rate functions at `state`.
    pub fn derivatives(&self, state: &[f64]) -> Result<Vec<f64>, ModelError> {
        let dim = self.kind.dimension();
        if state.len() != dim {
            return Err(ModelError::DimensionMismatch {
                expected: dim,
                actual: state.len(),
            });
        }
        let mut out = vec![0.0; dim];
        DynamicalSystem::<f64>::apply(self, 0.0, state, &mut out);
        Ok(out)
    }
}

impl<T: Scalar> DynamicalSystem<T> for EpidemicModel {
    fn dimension(&self) -> usize {
        self.kind.dimension()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let n = constant::<T>(self.params.population);
        let beta = constant::<T>(self.params.transmission_rate);
        let gamma = constant::<T>(self.params.recovery_rate);

        match self.kind {
            ModelKind::Sis => {
                let (s, i) = (x[0], x[1]);
                let infection = beta * s * i / n;
                let recovery = gamma * i;
                out[0] = recovery - infection;
                out[1] = infection - recovery;
            }
            ModelKind::Sir => {
                let (s, i) = (x[0], x[1]);
                let infection = beta * s * i / n;
                let recovery = gamma * i;
                out[0] = -infection;
                out[1] = infection - recovery;
                out[2] = recovery;
            }
            ModelKind::Seir => {
                let rho = constant::<T>(self.params.contact_factor);
                let alpha = constant::<T>(self.params.incubation_rate.unwrap_or(f64::NAN));
                let (s, e, i) = (x[0], x[1], x[2]);
                let infection = rho * beta * s * i / n;
                let onset = alpha * e;
                let recovery = gamma * i;
                out[0] = -infection;
                out[1] = infection - onset;
                out[2] = onset - recovery;
                out[3] = recovery;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T, ModelError>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn seir_model(rho: f64) -> EpidemicModel {
        let params = ModelParameters::from_reproduction_number(10_373_225.0, 4.0, 1.0 / 18.0)
            .and_then(|p| p.with_incubation_rate(1.0 / 5.2))
            .and_then(|p| p.with_contact_factor(rho))
            .expect("parameters");
        EpidemicModel::seir(params).expect("model")
    }

    #[test]
    fn parameters_reject_invalid_values() {
        assert_err_contains(ModelParameters::new(0.0, 0.2, 0.1), "population");
        assert_err_contains(ModelParameters::new(100.5, 0.2, 0.1), "whole number");
        assert_err_contains(ModelParameters::new(100.0, -0.2, 0.1), "transmission_rate");
        assert_err_contains(ModelParameters::new(100.0, 0.2, 0.0), "recovery_rate");
        assert_err_contains(ModelParameters::new(100.0, 0.2, f64::NAN), "recovery_rate");

        let params = ModelParameters::new(100.0, 0.2, 0.1).expect("params");
        assert_err_contains(params.with_incubation_rate(0.0), "incubation_rate");
        assert_err_contains(params.with_contact_factor(1.5), "contact_factor");
        assert_err_contains(params.with_contact_factor(-0.1), "contact_factor");
        assert!(params.with_contact_factor(0.0).is_ok());
    }

    #[test]
    fn transmission_rate_derives_from_reproduction_number() {
        let params = ModelParameters::from_reproduction_number(1000.0, 4.0, 1.0 / 18.0)
            .expect("params");
        assert!((params.transmission_rate() - 4.0 / 18.0).abs() < 1e-15);
        assert!((params.basic_reproduction_number() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn model_construction_checks_variant_parameters() {
        let base = ModelParameters::new(1000.0, 0.3, 0.1).expect("params");
        assert_err_contains(EpidemicModel::seir(base), "requires an incubation rate");

        let with_alpha = base.with_incubation_rate(0.2).expect("alpha");
        assert_err_contains(EpidemicModel::sir(with_alpha), "no exposed compartment");

        let with_rho = base.with_contact_factor(0.5).expect("rho");
        assert_err_contains(EpidemicModel::sis(with_rho), "intervention factor");
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("SEIR".parse::<ModelKind>().expect("kind"), ModelKind::Seir);
        assert_eq!("sis".parse::<ModelKind>().expect("kind"), ModelKind::Sis);
        assert_err_contains("sirs".parse::<ModelKind>(), "unknown model");
    }

    #[test]
    fn sis_rates_match_closed_form() {
        let params = ModelParameters::new(1000.0, 0.5, 0.1).expect("params");
        let model = EpidemicModel::sis(params).expect("model");
        let d = model.derivatives(&[900.0, 100.0]).expect("derivatives");
        let infection = 0.5 * 900.0 * 100.0 / 1000.0;
        assert!((d[0] - (10.0 - infection)).abs() < 1e-12);
        assert!((d[1] - (infection - 10.0)).abs() < 1e-12);
        assert_eq!(d[0] + d[1], 0.0);
    }

    #[test]
    fn seir_rates_scale_infection_by_contact_factor() {
        let full = seir_model(1.0).derivatives(&[1.0e7, 100.0, 50.0, 0.0]).expect("d");
        let half = seir_model(0.5).derivatives(&[1.0e7, 100.0, 50.0, 0.0]).expect("d");
        assert!((half[0] - 0.5 * full[0]).abs() < 1e-9);
        // Onset and recovery do not depend on ρ.
        assert_eq!(full[3], half[3]);
        assert!((full[2] - half[2]).abs() < 1e-12);
    }

    #[test]
    fn derivatives_conserve_population() {
        let sir = EpidemicModel::sir(
            ModelParameters::from_reproduction_number(10_373_225.0, 4.0, 1.0 / 18.0)
                .expect("params"),
        )
        .expect("model");
        let states: [&[f64]; 3] = [
            &[10_373_224.0, 8.0, 0.0],
            &[5.0e6, 3.0e6, 2.373225e6],
            &[1.0, 1.0e4, 1.0e7],
        ];
        for state in states {
            let d = sir.derivatives(state).expect("derivatives");
            let scale = d.iter().map(|v| v.abs()).fold(1.0, f64::max);
            assert!(d.iter().sum::<f64>().abs() <= 1e-12 * scale);
        }

        let seir = seir_model(0.6);
        let d = seir.derivatives(&[6.0e6, 1.0e6, 2.0e6, 1.373225e6]).expect("d");
        let scale = d.iter().map(|v| v.abs()).fold(1.0, f64::max);
        assert!(d.iter().sum::<f64>().abs() <= 1e-12 * scale);
    }

    #[test]
    fn rates_evaluate_in_single_precision() {
        let params = ModelParameters::new(100.0, 0.5, 0.25).expect("params");
        let model = EpidemicModel::sis(params).expect("model");
        let mut out = [0.0f32; 2];
        DynamicalSystem::<f32>::apply(&model, 0.0, &[80.0, 20.0], &mut out);
        assert!((out[1] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn validate_state_rejects_bad_shapes_and_values() {
        let params = ModelParameters::new(100.0, 0.5, 0.25).expect("params");
        let model = EpidemicModel::sir(params).expect("model");
        assert_err_contains(
            model.validate_state(&CompartmentState::sis(99.0, 1.0)),
            "expected 3, got 2",
        );
        assert_err_contains(
            model.validate_state(&CompartmentState::sir(99.0, -1.0, 0.0)),
            "Infected",
        );
        assert!(model
            .validate_state(&CompartmentState::sir(99.0, 1.0, 0.0))
            .is_ok());
        assert_eq!(model.index_of(Compartment::Recovered), Some(2));
        assert_eq!(model.index_of(Compartment::Exposed), None);
    }
}
