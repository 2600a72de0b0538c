//! Reproducible experiment drivers: single runs, parameter sweeps, error
//! analysis against the reference solver (and, for SIS, the closed form),
//! and step-size convergence studies.

use crate::analysis::{conservation_drift, deviation, observed_order, DeviationSeries};
use crate::analytical::SisAnalytical;
use crate::error::ModelError;
use crate::integrate::{integrate_rk4, FixedStepSettings};
use crate::models::{Compartment, CompartmentState, EpidemicModel, ModelKind, ModelParameters};
use crate::reference::ReferenceSolver;
use crate::trajectory::{TimeGrid, Trajectory};
use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub const SIS_POPULATION: f64 = 10_352_390.0;
pub const COVID_POPULATION: f64 = 10_373_225.0;
pub const COVID_RECOVERY_RATE: f64 = 1.0 / 18.0;
pub const COVID_INCUBATION_RATE: f64 = 1.0 / 5.2;
pub const LOCKDOWN_CONTACT_FACTORS: [f64; 6] = [0.4, 0.5, 0.6, 0.7, 0.8, 1.0];

fn default_contact_factor() -> f64 {
    1.0
}

/// Everything needed to reproduce one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub kind: ModelKind,
    pub population: f64,
    pub reproduction_number: f64,
    pub recovery_rate: f64,
    #[serde(default)]
    pub incubation_rate: Option<f64>,
    #[serde(default = "default_contact_factor")]
    pub contact_factor: f64,
    pub initial: CompartmentState,
    /// Days simulated.
    pub horizon: f64,
    /// RK4 step size in days.
    pub step_size: f64,
    /// Spacing of the recorded samples in days; a whole multiple of `step_size`.
    pub sample_spacing: f64,
}

impl ScenarioConfig {
    /// SIS with an endemic equilibrium (R₀ = 4), started from two cases.
    pub fn sis() -> Self {
        Self {
            name: "sis".to_string(),
            kind: ModelKind::Sis,
            population: SIS_POPULATION,
            reproduction_number: 4.0,
            recovery_rate: COVID_RECOVERY_RATE,
            incubation_rate: None,
            contact_factor: 1.0,
            initial: CompartmentState::sis(SIS_POPULATION - 2.0, 2.0),
            horizon: 300.0,
            step_size: 0.1,
            sample_spacing: 1.0,
        }
    }

    pub fn sir() -> Self {
        Self {
            name: "sir".to_string(),
            kind: ModelKind::Sir,
            population: COVID_POPULATION,
            reproduction_number: 4.0,
            recovery_rate: COVID_RECOVERY_RATE,
            incubation_rate: None,
            contact_factor: 1.0,
            initial: CompartmentState::sir(COVID_POPULATION - 1.0, 8.0, 0.0),
            horizon: 500.0,
            step_size: 1.0,
            sample_spacing: 1.0,
        }
    }

    pub fn seir() -> Self {
        Self {
            name: "seir".to_string(),
            kind: ModelKind::Seir,
            population: COVID_POPULATION,
            reproduction_number: 4.0,
            recovery_rate: COVID_RECOVERY_RATE,
            incubation_rate: Some(COVID_INCUBATION_RATE),
            contact_factor: 1.0,
            initial: CompartmentState::seir(COVID_POPULATION - 1.0, 0.0, 8.0, 0.0),
            horizon: 1000.0,
            step_size: 1.0,
            sample_spacing: 1.0,
        }
    }

    /// SEIR seeded with 50 000 cases; sweep `contact_factor` over
    /// [`LOCKDOWN_CONTACT_FACTORS`].
    pub fn lockdown() -> Self {
        Self {
            name: "lockdown".to_string(),
            initial: CompartmentState::seir(COVID_POPULATION - 1.0, 0.0, 50_000.0, 0.0),
            horizon: 500.0,
            ..Self::seir()
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "sis" => Some(Self::sis()),
            "sir" => Some(Self::sir()),
            "seir" => Some(Self::seir()),
            "lockdown" => Some(Self::lockdown()),
            _ => None,
        }
    }

    /// Moves a fraction `coverage` of the initially susceptible into R
    /// (SIR only).
    pub fn with_vaccination(self, coverage: f64) -> Result<Self, ModelError> {
        if self.kind != ModelKind::Sir {
            return Err(ModelError::parameter(
                "coverage",
                format!("vaccination applies to SIR scenarios, not {}", self.kind),
            ));
        }
        if !(0.0..=1.0).contains(&coverage) {
            return Err(ModelError::parameter(
                "coverage",
                format!("must lie in [0, 1], got {coverage}"),
            ));
        }
        if self.initial.len() != 3 {
            return Err(ModelError::DimensionMismatch {
                expected: 3,
                actual: self.initial.len(),
            });
        }
        let values = self.initial.values();
        let (susceptible, infected, recovered) = (values[0], values[1], values[2]);
        Ok(Self {
            initial: CompartmentState::sir(
                (1.0 - coverage) * susceptible,
                infected,
                recovered + coverage * susceptible,
            ),
            ..self
        })
    }

    pub fn params(&self) -> Result<ModelParameters, ModelError> {
        let mut params = ModelParameters::from_reproduction_number(
            self.population,
            self.reproduction_number,
            self.recovery_rate,
        )?;
        if let Some(alpha) = self.incubation_rate {
            params = params.with_incubation_rate(alpha)?;
        }
        if self.contact_factor != 1.0 {
            params = params.with_contact_factor(self.contact_factor)?;
        }
        Ok(params)
    }

    pub fn model(&self) -> Result<EpidemicModel, ModelError> {
        let model = EpidemicModel::new(self.kind, self.params()?)?;
        model.validate_state(&self.initial)?;
        Ok(model)
    }

    pub fn fixed_step(&self) -> Result<FixedStepSettings, ModelError> {
        FixedStepSettings::covering(self.horizon, self.step_size, self.sample_spacing)
    }

    /// The sample times shared by every method.
    pub fn grid(&self) -> Result<TimeGrid, ModelError> {
        let settings = self.fixed_step()?;
        let count = settings.sample_count();
        let spacing = settings.step_size * settings.record_every as f64;
        let mut points = Vec::with_capacity(count);
        points.extend((0..count - 1).map(|k| settings.start_time + k as f64 * spacing));
        points.push(settings.end_time());
        points.dedup();
        TimeGrid::new(points)
    }

    fn label(&self) -> String {
        match self.kind {
            ModelKind::Seir if self.contact_factor != 1.0 => format!(
                "{} R0 = {} rho = {}",
                self.kind, self.reproduction_number, self.contact_factor
            ),
            _ => format!("{} R0 = {}", self.kind, self.reproduction_number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Rk4,
    Reference,
}

/// One computed trajectory and the inputs that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub label: String,
    pub method: Method,
    pub model: EpidemicModel,
    pub trajectory: Trajectory,
}

pub fn single_run<R: ReferenceSolver>(
    config: &ScenarioConfig,
    method: Method,
    reference: &R,
) -> Result<Run> {
    let model = config
        .model()
        .with_context(|| format!("Invalid scenario `{}`.", config.name))?;
    let trajectory = match method {
        Method::Rk4 => {
            let settings = config.fixed_step().context("Invalid RK4 settings.")?;
            integrate_rk4(&model, &config.initial, &settings).context("RK4 integration failed.")?
        }
        Method::Reference => {
            let grid = config.grid().context("Invalid sample grid.")?;
            reference
                .solve(&model, &config.initial, &grid)
                .context("Reference solver failed.")?
        }
    };
    debug!(
        "scenario `{}` ({method:?}): {} samples",
        config.name,
        trajectory.len()
    );
    Ok(Run {
        label: config.label(),
        method,
        model,
        trajectory,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    ContactFactor,
    ReproductionNumber,
    RecoveryRate,
    IncubationRate,
}

impl SweepParameter {
    pub fn symbol(self) -> &'static str {
        match self {
            SweepParameter::ContactFactor => "rho",
            SweepParameter::ReproductionNumber => "R0",
            SweepParameter::RecoveryRate => "gamma",
            SweepParameter::IncubationRate => "alpha",
        }
    }

    fn apply(self, config: &ScenarioConfig, value: f64) -> ScenarioConfig {
        let mut varied = config.clone();
        match self {
            SweepParameter::ContactFactor => varied.contact_factor = value,
            SweepParameter::ReproductionNumber => varied.reproduction_number = value,
            SweepParameter::RecoveryRate => varied.recovery_rate = value,
            SweepParameter::IncubationRate => varied.incubation_rate = Some(value),
        }
        varied
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRun {
    pub value: f64,
    pub run: Run,
}

/// One run per value of `parameter`, everything else held fixed.
pub fn sweep<R: ReferenceSolver>(
    config: &ScenarioConfig,
    parameter: SweepParameter,
    values: &[f64],
    method: Method,
    reference: &R,
) -> Result<Vec<SweepRun>> {
    if values.is_empty() {
        bail!("Sweep over {} needs at least one value.", parameter.symbol());
    }
    values
        .iter()
        .map(|&value| {
            let varied = parameter.apply(config, value);
            let mut run = single_run(&varied, method, reference)
                .with_context(|| format!("Sweep failed at {} = {value}.", parameter.symbol()))?;
            run.label = format!("{} = {value}", parameter.symbol());
            Ok(SweepRun { value, run })
        })
        .collect()
}

/// Deviations of one trajectory from another, per compartment.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub candidate: String,
    pub baseline: String,
    pub deviations: Vec<DeviationSeries>,
}

impl Comparison {
    fn between(
        candidate: (&str, &Trajectory),
        baseline: (&str, &Trajectory),
        compartments: &[Compartment],
    ) -> Result<Self> {
        let deviations = compartments
            .iter()
            .map(|&c| deviation(candidate.1, baseline.1, c))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Cannot compare {} with {}.", candidate.0, baseline.0))?;
        Ok(Self {
            candidate: candidate.0.to_string(),
            baseline: baseline.0.to_string(),
            deviations,
        })
    }

    pub fn deviation(&self, compartment: Compartment) -> Option<&DeviationSeries> {
        self.deviations.iter().find(|d| d.compartment == compartment)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorAnalysis {
    pub rk4: Trajectory,
    pub reference: Trajectory,
    /// SIS only.
    pub analytical: Option<Trajectory>,
    pub comparisons: Vec<Comparison>,
    pub rk4_conservation_drift: Vec<f64>,
    pub reference_conservation_drift: Vec<f64>,
}

impl ErrorAnalysis {
    pub fn comparison(&self, candidate: &str, baseline: &str) -> Option<&Comparison> {
        self.comparisons
            .iter()
            .find(|c| c.candidate == candidate && c.baseline == baseline)
    }
}

/// Runs RK4 and the reference solver on the scenario's sample grid and
/// compares them; SIS scenarios are also compared with the closed form.
pub fn error_analysis<R: ReferenceSolver>(
    config: &ScenarioConfig,
    reference: &R,
) -> Result<ErrorAnalysis> {
    let model = config
        .model()
        .with_context(|| format!("Invalid scenario `{}`.", config.name))?;
    let settings = config.fixed_step().context("Invalid RK4 settings.")?;
    let grid = config.grid().context("Invalid sample grid.")?;

    let rk4 = integrate_rk4(&model, &config.initial, &settings).context("RK4 integration failed.")?;
    let reference_traj = reference
        .solve(&model, &config.initial, &grid)
        .context("Reference solver failed.")?;

    let compartments = model.compartments();
    let mut comparisons = vec![Comparison::between(
        ("rk4", &rk4),
        ("reference", &reference_traj),
        compartments,
    )?];

    let analytical = match model.kind() {
        ModelKind::Sis => {
            let solution = SisAnalytical::new(model.params(), config.initial.values()[1])
                .context("SIS closed form is not applicable to this scenario.")?;
            let exact = solution.trajectory(&grid);
            comparisons.push(Comparison::between(
                ("rk4", &rk4),
                ("analytical", &exact),
                compartments,
            )?);
            comparisons.push(Comparison::between(
                ("reference", &reference_traj),
                ("analytical", &exact),
                compartments,
            )?);
            Some(exact)
        }
        ModelKind::Sir | ModelKind::Seir => None,
    };

    let total = config.initial.total();
    Ok(ErrorAnalysis {
        rk4_conservation_drift: conservation_drift(&rk4, total),
        reference_conservation_drift: conservation_drift(&reference_traj, total),
        rk4,
        reference: reference_traj,
        analytical,
        comparisons,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceStudy {
    pub compartment: Compartment,
    pub step_sizes: Vec<f64>,
    /// Largest absolute deviation from the reference over the sample grid.
    pub errors: Vec<f64>,
    /// Order observed between consecutive step sizes.
    pub observed_orders: Vec<f64>,
}

/// RK4 at each of `step_sizes` (largest first) against the reference solver.
pub fn convergence_study<R: ReferenceSolver>(
    config: &ScenarioConfig,
    step_sizes: &[f64],
    compartment: Compartment,
    reference: &R,
) -> Result<ConvergenceStudy> {
    if step_sizes.len() < 2 {
        bail!("A convergence study needs at least two step sizes.");
    }
    if step_sizes.windows(2).any(|w| w[1] >= w[0]) {
        bail!("Step sizes must be strictly decreasing.");
    }
    let model = config
        .model()
        .with_context(|| format!("Invalid scenario `{}`.", config.name))?;
    let grid = config.grid().context("Invalid sample grid.")?;
    let baseline = reference
        .solve(&model, &config.initial, &grid)
        .context("Reference solver failed.")?;

    let mut errors = Vec::with_capacity(step_sizes.len());
    for &h in step_sizes {
        let settings = FixedStepSettings::covering(config.horizon, h, config.sample_spacing)
            .with_context(|| format!("Step size {h} does not fit the sample grid."))?;
        let candidate = integrate_rk4(&model, &config.initial, &settings)
            .with_context(|| format!("RK4 integration failed for h = {h}."))?;
        errors.push(deviation(&candidate, &baseline, compartment)?.max_abs());
    }

    let observed_orders = step_sizes
        .windows(2)
        .zip(errors.windows(2))
        .map(|(h, e)| observed_order(e[0], e[1], h[0] / h[1]))
        .collect();

    Ok(ConvergenceStudy {
        compartment,
        step_sizes: step_sizes.to_vec(),
        errors,
        observed_orders,
    })
}
