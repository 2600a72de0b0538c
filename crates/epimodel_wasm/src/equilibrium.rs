//! Equilibrium analysis for the wrapped model.

use crate::system::{js_error, to_js, WasmModel};
use epimodel_core::equilibrium::{
    analyze_equilibrium, disease_free_equilibrium, endemic_equilibrium, EquilibriumReport,
};
use epimodel_core::ModelError;
use wasm_bindgen::prelude::*;

impl WasmModel {
    pub(crate) fn equilibrium_reports(&self) -> Result<Vec<EquilibriumReport>, ModelError> {
        let mut states = vec![disease_free_equilibrium(&self.model)];
        states.extend(endemic_equilibrium(&self.model));
        states
            .iter()
            .map(|state| analyze_equilibrium(&self.model, state))
            .collect()
    }
}

#[wasm_bindgen]
impl WasmModel {
    /// Linearization at an arbitrary state.
    pub fn analyze_equilibrium(&self, state: Vec<f64>) -> Result<JsValue, JsValue> {
        let report = analyze_equilibrium(&self.model, &state).map_err(js_error)?;
        to_js(&report, "equilibrium")
    }

    /// The disease-free state, followed by the endemic state when one exists.
    pub fn equilibria(&self) -> Result<JsValue, JsValue> {
        let reports = self.equilibrium_reports().map_err(js_error)?;
        to_js(&reports, "equilibria")
    }
}
