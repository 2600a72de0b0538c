//! Plot-ready series for an external renderer.

use crate::experiments::{ErrorAnalysis, Run, SweepRun};
use crate::models::Compartment;
use crate::trajectory::Trajectory;
use serde::Serialize;

pub const MILLIONS: f64 = 1.0e-6;
pub const TIME_AXIS: &str = "Time (Days)";
pub const CASES_AXIS: &str = "Cases (Millions)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Axis labels and traces. `y` values are already multiplied by `y_scale`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub y_scale: f64,
    pub traces: Vec<Trace>,
}

impl Figure {
    pub fn new(title: impl Into<String>, x_label: &str, y_label: &str, y_scale: f64) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            y_scale,
            traces: Vec::new(),
        }
    }

    /// Adds `compartment` of `trajectory` against time; skipped if absent.
    pub fn push_series(
        &mut self,
        label: impl Into<String>,
        trajectory: &Trajectory,
        compartment: Compartment,
    ) {
        if let Some(values) = trajectory.series(compartment) {
            self.traces.push(Trace {
                label: label.into(),
                x: trajectory.times().to_vec(),
                y: values.iter().map(|v| v * self.y_scale).collect(),
            });
        }
    }

    pub fn trace(&self, label: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.label == label)
    }
}

/// Every compartment of one run, in millions of cases.
pub fn trajectory_figure(run: &Run) -> Figure {
    let title = format!("{}-model for COVID-19 - {}", run.model.kind(), params_label(run));
    let mut figure = Figure::new(title, TIME_AXIS, CASES_AXIS, MILLIONS);
    for &compartment in run.trajectory.compartments() {
        figure.push_series(compartment.label(), &run.trajectory, compartment);
    }
    figure
}

/// One trace of `compartment` per swept value.
pub fn sweep_figure(runs: &[SweepRun], compartment: Compartment) -> Figure {
    let title = match runs.first() {
        Some(first) => format!(
            "{} cases - {}-model",
            compartment.label(),
            first.run.model.kind()
        ),
        None => format!("{} cases", compartment.label()),
    };
    let mut figure = Figure::new(title, TIME_AXIS, CASES_AXIS, MILLIONS);
    for sweep in runs {
        figure.push_series(sweep.run.label.clone(), &sweep.run.trajectory, compartment);
    }
    figure
}

/// Absolute deviation of every comparison for `compartment`, in cases.
pub fn deviation_figure(analysis: &ErrorAnalysis, compartment: Compartment) -> Figure {
    let mut figure = Figure::new(
        format!("Deviation in {} cases", compartment.label()),
        TIME_AXIS,
        "Absolute deviation (Cases)",
        1.0,
    );
    for comparison in &analysis.comparisons {
        if let Some(series) = comparison.deviation(compartment) {
            figure.traces.push(Trace {
                label: format!("{} vs {}", comparison.candidate, comparison.baseline),
                x: series.times.clone(),
                y: series.absolute(),
            });
        }
    }
    figure
}

/// `y` against `x` for one run; empty if either compartment is missing.
pub fn phase_figure(run: &Run, x: Compartment, y: Compartment) -> Figure {
    let mut figure = Figure::new(
        format!("{} - Phase space diagram", run.model.kind()),
        &format!("{} (Millions)", x.label()),
        &format!("{} (Millions)", y.label()),
        MILLIONS,
    );
    if let Some(points) = run.trajectory.phase_portrait(x, y) {
        let (xs, ys): (Vec<f64>, Vec<f64>) = points
            .into_iter()
            .map(|(a, b)| (a * MILLIONS, b * MILLIONS))
            .unzip();
        figure.traces.push(Trace {
            label: run.label.clone(),
            x: xs,
            y: ys,
        });
    }
    figure
}

fn params_label(run: &Run) -> String {
    let params = run.model.params();
    let r0 = params.basic_reproduction_number();
    if params.contact_factor() != 1.0 {
        format!("R0 = {r0:.2}, rho = {}", params.contact_factor())
    } else {
        format!("R0 = {r0:.2}")
    }
}
