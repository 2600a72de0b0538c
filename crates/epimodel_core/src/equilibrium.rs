use crate::error::ModelError;
use crate::models::{EpidemicModel, ModelKind};
use crate::traits::DynamicalSystem;
use nalgebra::{Complex, DMatrix};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stability {
    Stable,
    Unstable,
    /// Leading eigenvalue on the imaginary axis, e.g. a continuum of
    /// disease-free states.
    Marginal,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquilibriumReport {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    /// Row-major `dim × dim`.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<ComplexNumber>,
    pub stability: Stability,
}

/// Everyone susceptible, nobody infected.
pub fn disease_free_equilibrium(model: &EpidemicModel) -> Vec<f64> {
    let mut state = vec![0.0; model.kind().dimension()];
    state[0] = model.params().population();
    state
}

/// The SIS endemic state `(Nγ/β, N(1 − γ/β))`, present only when β > γ.
/// SIR and SEIR have no reinfection and therefore no endemic equilibrium.
pub fn endemic_equilibrium(model: &EpidemicModel) -> Option<Vec<f64>> {
    let params = model.params();
    match model.kind() {
        ModelKind::Sis if params.transmission_rate() > params.recovery_rate() => {
            let n = params.population();
            let susceptible = n * params.recovery_rate() / params.transmission_rate();
            Some(vec![susceptible, n - susceptible])
        }
        _ => None,
    }
}

/// Analytic Jacobian of the rate functions at `state`, row-major.
pub fn jacobian(model: &EpidemicModel, state: &[f64]) -> Result<Vec<f64>, ModelError> {
    let dim = model.kind().dimension();
    if state.len() != dim {
        return Err(ModelError::DimensionMismatch {
            expected: dim,
            actual: state.len(),
        });
    }
    let params = model.params();
    let n = params.population();
    let gamma = params.recovery_rate();

    let jac = match model.kind() {
        ModelKind::Sis => {
            let beta = params.transmission_rate();
            let (s, i) = (state[0], state[1]);
            let ds = beta * i / n;
            let di = beta * s / n;
            vec![
                -ds, gamma - di, //
                ds, di - gamma,
            ]
        }
        ModelKind::Sir => {
            let beta = params.transmission_rate();
            let (s, i) = (state[0], state[1]);
            let ds = beta * i / n;
            let di = beta * s / n;
            vec![
                -ds, -di, 0.0, //
                ds, di - gamma, 0.0, //
                0.0, gamma, 0.0,
            ]
        }
        ModelKind::Seir => {
            let beta = params.contact_factor() * params.transmission_rate();
            let alpha = params.incubation_rate().unwrap_or(f64::NAN);
            let (s, i) = (state[0], state[2]);
            let ds = beta * i / n;
            let di = beta * s / n;
            vec![
                -ds, 0.0, -di, 0.0, //
                ds, -alpha, di, 0.0, //
                0.0, alpha, -gamma, 0.0, //
                0.0, 0.0, gamma, 0.0,
            ]
        }
    };
    Ok(jac)
}

/// Residual, linearization and stability of `model` at `state`.
///
/// Population conservation always contributes one zero eigenvalue; it is set
/// aside before classifying, so stability refers to perturbations that keep
/// the total fixed.
pub fn analyze_equilibrium(
    model: &EpidemicModel,
    state: &[f64],
) -> Result<EquilibriumReport, ModelError> {
    let dim = model.kind().dimension();
    let jac = jacobian(model, state)?;

    let mut residual = vec![0.0; dim];
    DynamicalSystem::<f64>::apply(model, 0.0, state, &mut residual);
    let residual_norm = residual.iter().map(|v| v * v).sum::<f64>().sqrt();

    let eigenvalues: Vec<Complex<f64>> = DMatrix::from_row_slice(dim, dim, &jac)
        .complex_eigenvalues()
        .iter()
        .copied()
        .collect();
    let stability = classify(&eigenvalues, rate_scale(model));

    Ok(EquilibriumReport {
        state: state.to_vec(),
        residual_norm,
        jacobian: jac,
        eigenvalues: eigenvalues.into_iter().map(ComplexNumber::from).collect(),
        stability,
    })
}

fn rate_scale(model: &EpidemicModel) -> f64 {
    let params = model.params();
    params
        .transmission_rate()
        .max(params.recovery_rate())
        .max(params.incubation_rate().unwrap_or(0.0))
}

fn classify(eigenvalues: &[Complex<f64>], scale: f64) -> Stability {
    let tol = 1e-9 * scale;
    let conserved = eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
        .map(|(idx, _)| idx);

    let leading = eigenvalues
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != conserved)
        .map(|(_, lambda)| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max);

    if leading > tol {
        Stability::Unstable
    } else if leading < -tol {
        Stability::Stable
    } else {
        Stability::Marginal
    }
}
