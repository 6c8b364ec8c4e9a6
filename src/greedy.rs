//! Greedy baseline: utility per remaining exposure, tilted toward long targets early.
//!
//! The score of target `i` at round `l` (0-indexed) of `L` is
//!
//! ```text
//!   score_i = (u_max_i / R_i) * (T_target_i / sum_j T_target_j) ^ asin(1 - (l + 1) / L)
//! ```
//!
//! and `0` for targets that are already complete (`R_i == 0`) or can no longer be
//! completed (`R_i > S`). The exponent decays from about `pi/2` on the first round to `0`
//! on the last one, so long targets are favored early and the tilt vanishes at the end.
//!
//! This is a comparison policy only; it ignores the fiber budget coupling that the
//! multiplier captures.

use crate::TargetCase;

/// Per-target greedy score for round `round` of `horizon`.
///
/// `t_total` is `sum_j T_target_j`; a non-positive total disables the tilt.
pub fn greedy_score(
    u_max: f64,
    t_target: f64,
    remaining: u32,
    round: usize,
    horizon: usize,
    t_total: f64,
) -> f64 {
    let opportunities = horizon.saturating_sub(round) as u32;
    if !TargetCase::classify(remaining, opportunities).is_eligible() {
        return 0.0;
    }
    let alpha = (round + 1) as f64 / horizon as f64;
    let tilt = if t_total > 0.0 {
        (t_target / t_total).powf((1.0 - alpha).asin())
    } else {
        1.0
    };
    let s = u_max / f64::from(remaining) * tilt;
    if s.is_finite() {
        s
    } else {
        0.0
    }
}

/// Select `k` targets by descending greedy score.
///
/// Ties keep index order, except that eligible targets always precede exhausted or
/// infeasible ones. Like the dual allocator, the mask is filled to `min(k, N)` even when
/// fewer than `k` targets score above zero.
#[must_use]
pub fn greedy_select(
    u_max: &[f64],
    t_target: &[f64],
    remaining: &[u32],
    round: usize,
    horizon: usize,
    k: usize,
) -> Vec<usize> {
    let t_total: f64 = t_target.iter().sum();
    let opportunities = horizon.saturating_sub(round) as u32;
    let keyed: Vec<(bool, f64)> = remaining
        .iter()
        .enumerate()
        .map(|(i, &r)| {
            (
                TargetCase::classify(r, opportunities).is_eligible(),
                greedy_score(u_max[i], t_target[i], r, round, horizon, t_total),
            )
        })
        .collect();

    let mut order: Vec<usize> = (0..remaining.len()).collect();
    order.sort_by(|&a, &b| {
        keyed[b]
            .0
            .cmp(&keyed[a].0)
            .then_with(|| keyed[b].1.total_cmp(&keyed[a].1))
    });
    order.truncate(k);
    order
}
