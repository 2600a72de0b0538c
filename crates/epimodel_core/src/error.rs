use thiserror::Error;

/// Errors raised by the simulation core.
///
/// Every variant is a deterministic input or domain problem: nothing here is
/// transient, so callers should fix the input rather than retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A closed-form solution was evaluated outside its validity regime.
    #[error("outside the analytical domain: {0}")]
    Domain(String),

    #[error("state dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid initial state: {0}")]
    InvalidState(String),

    #[error("invalid time grid: {0}")]
    InvalidTimeGrid(String),

    #[error("invalid integration settings: {0}")]
    InvalidSettings(String),

    #[error("adaptive solver failed at t = {t}: {reason}")]
    SolverFailure { t: f64, reason: String },
}

impl ModelError {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        ModelError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
