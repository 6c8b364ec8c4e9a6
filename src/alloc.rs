//! Round allocation: per-target probabilities and the fiber selection they induce.
//!
//! Both selection paths are deterministic: a stable descending sort with ties broken by
//! target index, so the same round inputs always yield the same mask. At equal probability
//! targets that can still be completed rank ahead of exhausted or infeasible ones.

use rayon::prelude::*;

use crate::{
    probablize_with, solve_dual, DualConfig, DualSolution, ModelConfig, PlanError, TargetCase,
    Weight,
};

/// Read-only inputs of one allocation round, derived from the usage matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundInputs {
    /// `R_i`: exposures each target still needs.
    pub remaining: Vec<u32>,
    /// `C_i = u_max_i * C(S, R_i)`.
    pub weights: Vec<Weight>,
    /// `S`: opportunities left, including this one.
    pub opportunities: u32,
    /// `K`: fibers available this round.
    pub fibers: usize,
}

impl RoundInputs {
    /// Build the weights from `u_max` and `R` for `S` opportunities.
    pub fn new(u_max: &[f64], remaining: Vec<u32>, opportunities: u32, fibers: usize) -> Self {
        let weights = u_max
            .iter()
            .zip(&remaining)
            .map(|(&u, &r)| Weight::new(u, opportunities, r))
            .collect();
        Self {
            remaining,
            weights,
            opportunities,
            fibers,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Whether this is the last opportunity (`S == 1`).
    pub fn is_terminal(&self) -> bool {
        self.opportunities == 1
    }

    /// Number of targets that can still be completed this round.
    pub fn eligible_count(&self) -> usize {
        self.remaining
            .iter()
            .filter(|&&r| TargetCase::classify(r, self.opportunities).is_eligible())
            .count()
    }

    /// Indices of targets that can still be completed, ascending.
    pub fn eligible(&self) -> Vec<usize> {
        self.remaining
            .iter()
            .enumerate()
            .filter(|(_, &r)| TargetCase::classify(r, self.opportunities).is_eligible())
            .map(|(i, _)| i)
            .collect()
    }

    /// Per-target completability flags, in index order.
    pub fn eligibility(&self) -> Vec<bool> {
        self.remaining
            .iter()
            .map(|&r| TargetCase::classify(r, self.opportunities).is_eligible())
            .collect()
    }

    /// The mask for probabilities evaluated on this round's targets.
    #[must_use]
    pub fn allocate(&self, probabilities: &[f64]) -> Vec<usize> {
        allocate(probabilities, &self.eligibility(), self.fibers)
    }

    /// `p_i(y)` for every target, evaluated as a parallel map.
    pub fn probabilities(&self, y: f64, cfg: &ModelConfig) -> Vec<f64> {
        self.remaining
            .par_iter()
            .zip(self.weights.par_iter())
            .map(|(&r, &w)| probablize_with(y, r, w, self.opportunities, cfg))
            .collect()
    }

    /// `sum_i p_i(y) - K`, non-increasing in `y`.
    ///
    /// The map is parallel but the sum runs in index order, so the residual does not
    /// depend on how the work was split.
    pub fn residual(&self, y: f64, cfg: &ModelConfig) -> f64 {
        let total: f64 = self.probabilities(y, cfg).iter().sum();
        total - self.fibers as f64
    }

    /// Solve for the multiplier that makes the probabilities sum to `K`.
    pub fn solve(&self, model: &ModelConfig, dual: &DualConfig) -> Result<DualSolution, PlanError> {
        solve_dual(|y| self.residual(y, model), dual)
    }
}

/// Take the `k` most probable targets (stable: ties keep index order).
///
/// At equal probability, targets flagged in `eligible` come first. A multiplier resolved
/// on the low side of a jump can leave every target at `p = 0`; the mask is then filled
/// from completable targets before any exhausted or infeasible one is considered.
#[must_use]
pub fn allocate(probabilities: &[f64], eligible: &[bool], k: usize) -> Vec<usize> {
    debug_assert_eq!(probabilities.len(), eligible.len());
    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| {
        probabilities[b]
            .total_cmp(&probabilities[a])
            .then_with(|| eligible[b].cmp(&eligible[a]))
    });
    order.truncate(k);
    order
}

/// Terminal-round selection: among targets exactly one exposure short, the `k` with the
/// highest `u_max` (ties keep index order). Returns fewer than `k` when fewer qualify.
#[must_use]
pub fn consume(u_max: &[f64], remaining: &[u32], k: usize) -> Vec<usize> {
    let mut eligible: Vec<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, &r)| r == 1)
        .map(|(i, _)| i)
        .collect();
    eligible.sort_by(|&a, &b| u_max[b].total_cmp(&u_max[a]));
    eligible.truncate(k);
    eligible
}
