use thiserror::Error;

use super::milp::SolveFailure;
use crate::core::io::IoError;
use crate::core::scheme::SchemeError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller-supplied arrays disagree with each other; the call aborts before
    /// any optimization starts.
    #[error("input mismatch: {0}")]
    InputMismatch(String),

    /// No assignment satisfies the discrete model's cardinality and
    /// exclusivity constraints for the requested shell sizes.
    #[error("no feasible assignment for requested shell sizes {requested:?}")]
    Infeasible { requested: Vec<usize> },

    /// The external mixed-integer solver failed outside of infeasibility.
    #[error("MILP solver failure: {0}")]
    Solver(String),

    /// A continuous optimizer produced NaN or infinite state.
    #[error("non-finite value produced by {context}")]
    NonFinite { context: &'static str },

    #[error(transparent)]
    Scheme(#[from] SchemeError),

    #[error(transparent)]
    Io(#[from] IoError),
}

// Callers that can pin infeasibility on specific shell sizes attach them via
// an explicit map_err instead of this blanket conversion.
impl From<SolveFailure> for EngineError {
    fn from(failure: SolveFailure) -> Self {
        match failure {
            SolveFailure::Infeasible => EngineError::Infeasible {
                requested: Vec::new(),
            },
            SolveFailure::Backend(message) => EngineError::Solver(message),
        }
    }
}
