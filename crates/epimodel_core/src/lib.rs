pub mod analysis;
pub mod analytical;
pub mod equilibrium;
pub mod error;
pub mod experiments;
pub mod figure;
pub mod integrate;
pub mod models;
pub mod reference;
pub mod solvers;
/// The `epimodel_core` crate is the simulation engine behind the epidemic
/// model explorer. Models are generic over the scalar type so the same rate
/// functions drive `f64` runs and reduced-precision checks.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (rate functions), `Steppable` (Solvers).
/// - **Models**: SIS, SIR and SEIR compartmental models with validated parameters.
/// - **Solvers**: Fixed-step RK4 and an adaptive Tsitouras 5(4) reference integrator.
/// - **Analytical**: Closed-form SIS solution for accuracy checks.
/// - **Experiments**: Scenario presets, sweeps, error analysis and convergence studies.
pub mod traits;
pub mod trajectory;

pub use error::ModelError;
