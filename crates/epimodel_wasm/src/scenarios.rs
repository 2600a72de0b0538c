//! Experiment drivers exposed to JavaScript.
//!
//! Each export takes a scenario as a plain object (see
//! [`ScenarioConfig`]) and returns a serialized report. The `*_report`
//! helpers hold the logic so it can be exercised without a JS runtime.

use crate::system::to_js;
use epimodel_core::experiments::{
    convergence_study, error_analysis, single_run, sweep, Method, ScenarioConfig, SweepParameter,
    LOCKDOWN_CONTACT_FACTORS,
};
use epimodel_core::figure::{deviation_figure, phase_figure, sweep_figure, trajectory_figure, Figure};
use epimodel_core::models::Compartment;
use epimodel_core::reference::AdaptiveReference;
use epimodel_core::solvers::AdaptiveSettings;
use epimodel_core::trajectory::Trajectory;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::from_value;
use wasm_bindgen::prelude::*;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct ReferenceOptions {
    rtol: Option<f64>,
    atol: Option<f64>,
}

impl ReferenceOptions {
    fn solver(self) -> AdaptiveReference {
        let defaults = AdaptiveSettings::default();
        AdaptiveReference::new(AdaptiveSettings {
            rtol: self.rtol.unwrap_or(defaults.rtol),
            atol: self.atol.unwrap_or(defaults.atol),
            ..defaults
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub label: String,
    pub trajectory: Trajectory,
    pub peak_infected: Option<(f64, f64)>,
    pub figure: Figure,
    pub phase: Figure,
}

#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub values: Vec<f64>,
    pub peaks: Vec<Option<(f64, f64)>>,
    pub figure: Figure,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub max_abs_deviation: Vec<(String, f64)>,
    pub max_conservation_drift: f64,
    pub figure: Figure,
}

fn parse_method(name: &str) -> anyhow::Result<Method> {
    match name {
        "rk4" => Ok(Method::Rk4),
        "reference" => Ok(Method::Reference),
        other => anyhow::bail!("Unknown method `{other}` (expected rk4 or reference)."),
    }
}

fn parse_parameter(name: &str) -> anyhow::Result<SweepParameter> {
    match name {
        "rho" | "contact_factor" => Ok(SweepParameter::ContactFactor),
        "r0" | "reproduction_number" => Ok(SweepParameter::ReproductionNumber),
        "gamma" | "recovery_rate" => Ok(SweepParameter::RecoveryRate),
        "alpha" | "incubation_rate" => Ok(SweepParameter::IncubationRate),
        other => anyhow::bail!("Unknown sweep parameter `{other}`."),
    }
}

pub(crate) fn run_report(
    config: &ScenarioConfig,
    method: &str,
    reference: &AdaptiveReference,
) -> anyhow::Result<RunReport> {
    let run = single_run(config, parse_method(method)?, reference)?;
    Ok(RunReport {
        label: run.label.clone(),
        peak_infected: run.trajectory.peak(Compartment::Infected),
        figure: trajectory_figure(&run),
        phase: phase_figure(&run, Compartment::Susceptible, Compartment::Infected),
        trajectory: run.trajectory,
    })
}

pub(crate) fn sweep_report(
    config: &ScenarioConfig,
    parameter: &str,
    values: &[f64],
    method: &str,
    reference: &AdaptiveReference,
) -> anyhow::Result<SweepReport> {
    debug!(
        "sweep of `{}` over {parameter}: {} values",
        config.name,
        values.len()
    );
    let runs = sweep(
        config,
        parse_parameter(parameter)?,
        values,
        parse_method(method)?,
        reference,
    )?;
    Ok(SweepReport {
        values: runs.iter().map(|r| r.value).collect(),
        peaks: runs
            .iter()
            .map(|r| r.run.trajectory.peak(Compartment::Infected))
            .collect(),
        figure: sweep_figure(&runs, Compartment::Infected),
    })
}

pub(crate) fn error_report(
    config: &ScenarioConfig,
    reference: &AdaptiveReference,
) -> anyhow::Result<ErrorReport> {
    let analysis = error_analysis(config, reference)?;
    let max_abs_deviation = analysis
        .comparisons
        .iter()
        .filter_map(|c| {
            c.deviation(Compartment::Infected)
                .map(|d| (format!("{} vs {}", c.candidate, c.baseline), d.max_abs()))
        })
        .collect();
    let max_conservation_drift = analysis
        .rk4_conservation_drift
        .iter()
        .chain(&analysis.reference_conservation_drift)
        .fold(0.0f64, |acc, d| acc.max(d.abs()));
    Ok(ErrorReport {
        max_abs_deviation,
        max_conservation_drift,
        figure: deviation_figure(&analysis, Compartment::Infected),
    })
}

fn scenario_from(value: JsValue) -> Result<ScenarioConfig, JsValue> {
    from_value(value).map_err(|err| JsValue::from_str(&format!("Invalid scenario: {err}")))
}

fn reference_from(value: JsValue) -> Result<AdaptiveReference, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(AdaptiveReference::default());
    }
    from_value::<ReferenceOptions>(value)
        .map(ReferenceOptions::solver)
        .map_err(|err| JsValue::from_str(&format!("Invalid reference options: {err}")))
}

fn report_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

/// One of `sis`, `sir`, `seir`, `lockdown`.
#[wasm_bindgen]
pub fn default_scenario(name: &str) -> Result<JsValue, JsValue> {
    let config = ScenarioConfig::preset(name)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown scenario `{name}`.")))?;
    to_js(&config, "scenario")
}

#[wasm_bindgen]
pub fn lockdown_contact_factors() -> Vec<f64> {
    LOCKDOWN_CONTACT_FACTORS.to_vec()
}

#[wasm_bindgen]
pub fn run_single(config: JsValue, method: &str, reference: JsValue) -> Result<JsValue, JsValue> {
    let config = scenario_from(config)?;
    let reference = reference_from(reference)?;
    let report = run_report(&config, method, &reference).map_err(report_error)?;
    to_js(&report, "run")
}

#[wasm_bindgen]
pub fn run_sweep(
    config: JsValue,
    parameter: &str,
    values: Vec<f64>,
    method: &str,
    reference: JsValue,
) -> Result<JsValue, JsValue> {
    let config = scenario_from(config)?;
    let reference = reference_from(reference)?;
    let report =
        sweep_report(&config, parameter, &values, method, &reference).map_err(report_error)?;
    to_js(&report, "sweep")
}

#[wasm_bindgen]
pub fn run_error_analysis(config: JsValue, reference: JsValue) -> Result<JsValue, JsValue> {
    let config = scenario_from(config)?;
    let reference = reference_from(reference)?;
    let report = error_report(&config, &reference).map_err(report_error)?;
    to_js(&report, "error analysis")
}

#[wasm_bindgen]
pub fn run_convergence_study(
    config: JsValue,
    step_sizes: Vec<f64>,
    reference: JsValue,
) -> Result<JsValue, JsValue> {
    let config = scenario_from(config)?;
    let reference = reference_from(reference)?;
    let study = convergence_study(&config, &step_sizes, Compartment::Infected, &reference)
        .map_err(report_error)?;
    to_js(&study, "convergence study")
}
