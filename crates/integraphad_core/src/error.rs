//! Error types for integration runs.

use crate::integrator::Method;
use crate::newton::SolveFailure;
use thiserror::Error;

/// Errors reported by `Integrator::integrate` and `solve`.
///
/// Failures abort the whole run; no partial trajectory is returned.
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Invalid time interval: {what}")]
    InvalidInterval { what: String },

    #[error("Initial condition dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Unknown method '{name}'. Available methods: {}", .available.join(", "))]
    UnknownMethod {
        name: String,
        available: Vec<&'static str>,
    },

    #[error("Implicit solve did not converge at step {step} ({method}): {source}")]
    NonConvergence {
        step: usize,
        method: Method,
        #[source]
        source: SolveFailure,
    },

    #[error("Step function failed at step {step} ({method}): {source}")]
    StepFunction {
        step: usize,
        method: Method,
        #[source]
        source: anyhow::Error,
    },

    #[error("Non-finite state produced at step {step} ({method})")]
    NonFiniteState { step: usize, method: Method },

    #[error("Invalid solver settings: {what}")]
    InvalidSettings { what: String },

    #[error("Invalid sensitivity seed: {what}")]
    InvalidSeed { what: String },
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;
