//! Error types for planning runs.

use thiserror::Error;

/// Errors raised by the allocation engine and the planner.
///
/// Only [`PlanError::BracketingFailure`] is recoverable inside the engine (the dual
/// solver falls back to least squares). Everything else aborts the run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    /// No sign-opposite pair was found by linear or exponential probing.
    #[error("could not bracket a sign change within {max_iter} linear and {max_iter} exponential probes")]
    BracketingFailure { max_iter: usize },

    /// Neither the bracketed root-finder nor the least-squares fallback converged.
    #[error("dual multiplier solve failed{}: {reason}", round_suffix(.round))]
    DualSolveFailure { round: Option<usize>, reason: String },

    /// The scenario violates a structural requirement (dimensions, finiteness, signs).
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// The planner was asked to step beyond the last exposure.
    #[error("horizon exhausted: all {horizon} exposures are already planned")]
    HorizonExhausted { horizon: usize },

    /// A checkpoint does not match the scenario it claims to belong to.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),
}

fn round_suffix(round: &Option<usize>) -> String {
    match round {
        Some(r) => format!(" at exposure {}", r + 1),
        None => String::new(),
    }
}

impl PlanError {
    /// Returns true if this error is a bracketing failure.
    pub fn is_bracketing_failure(&self) -> bool {
        matches!(self, PlanError::BracketingFailure { .. })
    }

    /// Returns true if this error is fatal to a planning run.
    pub fn is_fatal(&self) -> bool {
        !self.is_bracketing_failure()
    }

    /// Attach the 0-indexed round to a dual-solve failure.
    pub(crate) fn at_round(self, round: usize) -> Self {
        match self {
            PlanError::DualSolveFailure { reason, .. } => PlanError::DualSolveFailure {
                round: Some(round),
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_failure_message_names_one_indexed_exposure() {
        let e = PlanError::DualSolveFailure {
            round: None,
            reason: "no convergence".to_string(),
        }
        .at_round(2);
        assert_eq!(
            e.to_string(),
            "dual multiplier solve failed at exposure 3: no convergence"
        );
        assert!(e.is_fatal());
    }

    #[test]
    fn bracketing_failure_is_recoverable() {
        let e = PlanError::BracketingFailure { max_iter: 5 };
        assert!(e.is_bracketing_failure());
        assert!(!e.is_fatal());
        // at_round leaves other variants untouched.
        assert_eq!(e.clone().at_round(7), e);
    }
}
