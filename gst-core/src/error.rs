//! Error types for gate set tomography operations.

use thiserror::Error;

/// Errors that can occur while building models, simulating circuits or
/// handling measurement data.
#[derive(Debug, Error)]
pub enum GstError {
    /// A label referenced by a circuit is not present in the model
    #[error("Unknown label '{0}' in model")]
    UnknownLabel(String),

    /// Operator dimensions are inconsistent
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A matrix that must be inverted is singular or numerically rank-deficient
    #[error("Singular matrix in {0}")]
    SingularMatrix(String),

    /// The fiducial set does not span the full operator space
    #[error("Fiducials are not informationally complete: rank {rank} < {needed}")]
    NotInformationallyComplete { rank: usize, needed: usize },

    /// A gate label has no Clifford action, so the stabilizer simulator
    /// cannot propagate it
    #[error("Gate '{0}' is not Clifford; stabilizer simulation unavailable")]
    NonCliffordGate(String),

    /// A circuit present in an experiment design has no counts in the dataset
    #[error("No data for circuit '{0}'")]
    MissingData(String),

    /// Malformed circuit or dataset text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Parameter vector length does not match the object's parameter count
    #[error("Parameter count mismatch: object has {expected} params, vector has {actual}")]
    ParamCountMismatch { expected: usize, actual: usize },

    /// Optimization failed to produce a usable estimate
    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),
}

impl GstError {
    pub fn dim(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = GstError::UnknownLabel("Gfoo".into());
        assert!(format!("{}", err).contains("Gfoo"));

        let err = GstError::dim(4, 16);
        let msg = format!("{}", err);
        assert!(msg.contains("4") && msg.contains("16"));
    }
}
