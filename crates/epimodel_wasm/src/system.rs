//! Core WASM model wrapper and low-level utilities.

use epimodel_core::equilibrium::jacobian;
use epimodel_core::integrate::{integrate_rk4, FixedStepSettings};
use epimodel_core::models::{CompartmentState, EpidemicModel, ModelKind, ModelParameters};
use epimodel_core::reference::{AdaptiveReference, ReferenceSolver};
use epimodel_core::solvers::{AdaptiveSettings, RK4};
use epimodel_core::traits::Steppable;
use epimodel_core::trajectory::TimeGrid;
use epimodel_core::ModelError;
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmModel {
    pub(crate) model: EpidemicModel,
    state: Vec<f64>,
    stepper: RK4<f64>,
}

pub(crate) fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub(crate) fn to_js<T: Serialize>(value: &T, what: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize {what}: {err}")))
}

pub(crate) fn build_model(
    kind: &str,
    population: f64,
    reproduction_number: f64,
    recovery_rate: f64,
    incubation_rate: Option<f64>,
    contact_factor: f64,
) -> Result<EpidemicModel, ModelError> {
    let kind: ModelKind = kind.parse()?;
    let mut params =
        ModelParameters::from_reproduction_number(population, reproduction_number, recovery_rate)?;
    if let Some(alpha) = incubation_rate {
        params = params.with_incubation_rate(alpha)?;
    }
    if contact_factor != 1.0 {
        params = params.with_contact_factor(contact_factor)?;
    }
    EpidemicModel::new(kind, params)
}

#[wasm_bindgen]
impl WasmModel {
    #[wasm_bindgen(constructor)]
    pub fn new(
        kind: &str,
        population: f64,
        reproduction_number: f64,
        recovery_rate: f64,
        incubation_rate: Option<f64>,
        contact_factor: f64,
    ) -> Result<WasmModel, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model(
            kind,
            population,
            reproduction_number,
            recovery_rate,
            incubation_rate,
            contact_factor,
        )
        .map_err(js_error)?;
        let dim = model.kind().dimension();

        let mut state = vec![0.0; dim];
        state[0] = population;
        Ok(WasmModel {
            model,
            state,
            stepper: RK4::new(dim),
        })
    }

    pub fn set_state(&mut self, state: &[f64]) -> Result<(), JsValue> {
        let candidate = CompartmentState::new(state.to_vec());
        self.model.validate_state(&candidate).map_err(js_error)?;
        self.state = state.to_vec();
        Ok(())
    }

    pub fn get_state(&self) -> Vec<f64> {
        self.state.clone()
    }

    /// One RK4 step of `dt` days. The models are autonomous, so no clock is kept.
    pub fn step(&mut self, dt: f64) {
        let mut t = 0.0;
        self.stepper.step(&self.model, &mut t, &mut self.state, dt);
    }

    pub fn derivatives(&self) -> Result<Vec<f64>, JsValue> {
        self.model.derivatives(&self.state).map_err(js_error)
    }

    pub fn compute_jacobian(&self) -> Result<Vec<f64>, JsValue> {
        jacobian(&self.model, &self.state).map_err(js_error)
    }

    pub fn compartment_labels(&self) -> Vec<String> {
        self.model
            .compartments()
            .iter()
            .map(|c| c.label().to_string())
            .collect()
    }

    pub fn basic_reproduction_number(&self) -> f64 {
        self.model.params().basic_reproduction_number()
    }

    pub fn effective_reproduction_number(&self) -> f64 {
        self.model.params().effective_reproduction_number()
    }

    /// RK4 from the current state over `[0, horizon]`.
    pub fn simulate(
        &self,
        horizon: f64,
        step_size: f64,
        sample_spacing: f64,
    ) -> Result<JsValue, JsValue> {
        let settings =
            FixedStepSettings::covering(horizon, step_size, sample_spacing).map_err(js_error)?;
        let initial = CompartmentState::new(self.state.clone());
        let trajectory = integrate_rk4(&self.model, &initial, &settings).map_err(js_error)?;
        to_js(&trajectory, "trajectory")
    }

    /// Reference solution from the current state at exactly `times`.
    pub fn simulate_reference(
        &self,
        times: Vec<f64>,
        rtol: f64,
        atol: f64,
    ) -> Result<JsValue, JsValue> {
        let grid = TimeGrid::new(times).map_err(js_error)?;
        let reference = AdaptiveReference::new(AdaptiveSettings {
            rtol,
            atol,
            ..AdaptiveSettings::default()
        });
        let trajectory = reference
            .solve(&self.model, &CompartmentState::new(self.state.clone()), &grid)
            .map_err(js_error)?;
        to_js(&trajectory, "trajectory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sir() -> WasmModel {
        WasmModel::new("sir", 1000.0, 3.0, 0.1, None, 1.0).expect("model")
    }

    #[test]
    fn build_model_parses_kind_and_rates() {
        let model = build_model("SEIR", 1.0e6, 2.5, 0.1, Some(0.2), 0.5).expect("model");
        assert_eq!(model.kind(), ModelKind::Seir);
        assert!((model.params().effective_reproduction_number() - 1.25).abs() < 1e-12);

        let err = build_model("sirs", 1.0e6, 2.5, 0.1, None, 1.0).expect_err("unknown kind");
        assert!(err.to_string().contains("unknown model"));
        assert!(build_model("sir", 1.0e6, 2.5, 0.1, Some(0.2), 1.0).is_err());
    }

    #[test]
    fn wasm_model_starts_fully_susceptible() {
        let model = sir();
        assert_eq!(model.get_state(), vec![1000.0, 0.0, 0.0]);
        assert_eq!(
            model.compartment_labels(),
            vec!["Susceptible", "Infected", "Recovered"]
        );
        assert!((model.basic_reproduction_number() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn wasm_model_step_advances_state() {
        let mut model = sir();
        model.set_state(&[990.0, 10.0, 0.0]).expect("state");
        model.step(0.5);

        let state = model.get_state();
        assert!(state[1] > 10.0);
        assert!(state[2] > 0.0);
        assert!((state.iter().sum::<f64>() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_steps_match_core_integration() {
        let mut model = sir();
        model.set_state(&[990.0, 10.0, 0.0]).expect("state");
        for _ in 0..20 {
            model.step(0.5);
        }

        let settings = FixedStepSettings::new(0.5, 20);
        let initial = CompartmentState::sir(990.0, 10.0, 0.0);
        let trajectory = integrate_rk4(&model.model, &initial, &settings).expect("trajectory");
        let expected = trajectory.final_state().expect("final state");
        for (a, b) in model.get_state().iter().zip(expected) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn derivatives_and_jacobian_use_current_state() {
        let mut model = sir();
        model.set_state(&[900.0, 100.0, 0.0]).expect("state");
        let rates = model.derivatives().expect("rates");
        // β = 0.3: infection 0.3·900·100/1000 = 27, recovery 0.1·100 = 10.
        assert!((rates[0] + 27.0).abs() < 1e-9);
        assert!((rates[1] - 17.0).abs() < 1e-9);
        assert!((rates[2] - 10.0).abs() < 1e-9);

        let jac = model.compute_jacobian().expect("jacobian");
        assert_eq!(jac.len(), 9);
        assert!((jac[0] + 0.03).abs() < 1e-12);
    }

    #[test]
    #[cfg(target_arch = "wasm32")]
    fn set_state_rejects_wrong_dimension() {
        let mut model = sir();
        assert!(model.set_state(&[1.0, 2.0]).is_err());
    }
}
