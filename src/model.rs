//! Per-target selection probability under the Lagrangian relaxation.
//!
//! For one target with `R` exposures still required, `S` opportunities left and weight
//! `C = u_max * C(S, R)`, the relaxed round problem picks
//!
//! ```text
//!   p* = argmin_{p in [0, 1]}  h(p) = y*p - C * p^R * (1 - p)^(S - R)
//! ```
//!
//! where `y` is the round's multiplier on "exactly K selected". `C * p^R (1-p)^(S-R)` is
//! the weighted probability of landing exactly `R` hits in `S` tries at rate `p`; `y*p` is
//! the fiber budget it consumes. Larger `y` never raises `p*`.
//!
//! The objective is evaluated divided by `C * g(R/S)` (the weighted binomial pmf at its
//! mode), so the magnitude of `C`, which can exceed `f64::MAX`, never enters the
//! arithmetic and the minimizer is unchanged.

use crate::poly::{bisect, Polynomial};
use crate::weight::Weight;

/// Which branch of the closed form applies to a target this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetCase {
    /// Last opportunity (`S == 1`): probability is 1 iff exactly one exposure is missing.
    SingleShot { completes: bool },
    /// Requirement already met (`R == 0`).
    Exhausted,
    /// More exposures needed than remain (`R > S`).
    Infeasible,
    /// Every remaining opportunity is needed (`R == S`, `S > 1`).
    ForcedAllOpportunities,
    /// `0 < R < S`.
    General,
}

impl TargetCase {
    /// Classify `(R, S)`. The order of the checks matters: `S == 1` wins over `R == 0`.
    pub fn classify(remaining: u32, opportunities: u32) -> Self {
        if opportunities == 1 {
            TargetCase::SingleShot {
                completes: remaining == 1,
            }
        } else if remaining == 0 {
            TargetCase::Exhausted
        } else if remaining > opportunities {
            TargetCase::Infeasible
        } else if remaining == opportunities {
            TargetCase::ForcedAllOpportunities
        } else {
            TargetCase::General
        }
    }

    /// Whether a target in this case can still complete (and so may receive probability).
    pub fn is_eligible(self) -> bool {
        match self {
            TargetCase::SingleShot { completes } => completes,
            TargetCase::Exhausted | TargetCase::Infeasible => false,
            TargetCase::ForcedAllOpportunities | TargetCase::General => true,
        }
    }
}

/// How stationary points of `h` are located in the general case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RootMethod {
    /// Split `[0, 1]` at the inflection points of `p^R (1-p)^(S-R)` and bisect `h'` on
    /// each monotone piece, evaluating `h'` in factored form. Stable for any horizon.
    #[default]
    Factored,
    /// Expand `h'` into its explicit degree `S-1` coefficients and isolate real roots
    /// through the derivative chain. Loses precision once `S` reaches a few dozen.
    Monomial,
}

/// Configuration for [`probablize_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelConfig {
    pub root_method: RootMethod,
    /// Slack around `[0, 1]` inside which polynomial roots are kept (then clamped).
    pub root_tol: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            root_method: RootMethod::Factored,
            root_tol: 1e-9,
        }
    }
}

/// Optimal marginal selection probability with the default [`ModelConfig`].
pub fn probablize(y: f64, remaining: u32, weight: Weight, opportunities: u32) -> f64 {
    probablize_with(y, remaining, weight, opportunities, &ModelConfig::default())
}

/// Optimal marginal selection probability of one target for multiplier `y`.
///
/// Always returns a value in `[0, 1]`; degenerate cases return exactly `0` or `1`.
pub fn probablize_with(
    y: f64,
    remaining: u32,
    weight: Weight,
    opportunities: u32,
    cfg: &ModelConfig,
) -> f64 {
    let case = TargetCase::classify(remaining, opportunities);
    match case {
        TargetCase::SingleShot { completes } => return if completes { 1.0 } else { 0.0 },
        TargetCase::Exhausted | TargetCase::Infeasible => return 0.0,
        TargetCase::ForcedAllOpportunities | TargetCase::General => {}
    }
    if weight.is_zero() {
        // h(p) = y*p: nothing to gain, only budget to spend (or refund, for y < 0).
        return argmin_candidate(&[0.0, 1.0], |p| y * p);
    }

    let shape = Shape::new(remaining, opportunities);
    let rho = y * (-(weight.ln() + shape.ln_mode)).exp();
    if let Some(p) = saturated(rho) {
        return p;
    }

    let mut candidates = vec![0.0, 1.0];
    if case == TargetCase::ForcedAllOpportunities {
        // h'(p) = y - C S p^(S-1); the mode value is 1 here, so rho = y / C.
        let s = f64::from(opportunities);
        let interior = (rho / s).powf(1.0 / (s - 1.0));
        if interior.is_finite() && (0.0..=1.0).contains(&interior) {
            candidates.push(interior);
        }
    } else {
        match cfg.root_method {
            RootMethod::Factored => candidates.extend(shape.stationary_points(rho)),
            RootMethod::Monomial => {
                let r = weight.scale(y);
                candidates.extend(
                    Polynomial::stationary(r, remaining, opportunities)
                        .real_roots_in(-cfg.root_tol, 1.0 + cfg.root_tol, cfg.root_tol)
                        .into_iter()
                        .map(|p| p.clamp(0.0, 1.0)),
                );
            }
        }
    }
    argmin_candidate(&candidates, |p| shape.objective(rho, p))
}

/// Pick the candidate with the smallest finite objective value.
///
/// Ties keep the earliest candidate, so callers list `0` and `1` first. Returns `0` when no
/// candidate has a finite value.
pub fn argmin_candidate<F>(candidates: &[f64], objective: F) -> f64
where
    F: Fn(f64) -> f64,
{
    let mut best: Option<(f64, f64)> = None;
    for &p in candidates {
        let v = objective(p);
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, bv)) if v >= bv => {}
            _ => best = Some((p, v)),
        }
    }
    best.map_or(0.0, |(p, _)| p)
}

/// `rho = +-inf` means the weight underflowed relative to `y`: only the budget term matters.
fn saturated(rho: f64) -> Option<f64> {
    if rho.is_nan() || rho == f64::INFINITY {
        Some(0.0)
    } else if rho == f64::NEG_INFINITY {
        Some(1.0)
    } else {
        None
    }
}

/// `k * ln(x)` with `0 * ln(0) = 0`.
fn xlogy(k: u32, x: f64) -> f64 {
    if k == 0 {
        0.0
    } else {
        f64::from(k) * x.ln()
    }
}

/// `g(p) = p^R (1-p)^m`, `m = S - R`, normalized by its value at the mode `p0 = R / S`.
///
/// Dividing `h` by `C * g(p0)` (the binomial pmf at its mode, times `u_max`) keeps every
/// quantity near unit scale even when `g` itself underflows.
#[derive(Debug, Clone, Copy)]
struct Shape {
    remaining: u32,
    opportunities: u32,
    ln_mode: f64,
}

impl Shape {
    fn new(remaining: u32, opportunities: u32) -> Self {
        let m = opportunities - remaining;
        let p0 = f64::from(remaining) / f64::from(opportunities);
        Self {
            remaining,
            opportunities,
            ln_mode: xlogy(remaining, p0) + xlogy(m, 1.0 - p0),
        }
    }

    fn m(&self) -> u32 {
        self.opportunities - self.remaining
    }

    /// `h(p) / (C g(p0)) = rho*p - g(p)/g(p0)`.
    fn objective(&self, rho: f64, p: f64) -> f64 {
        let g = (xlogy(self.remaining, p) + xlogy(self.m(), 1.0 - p) - self.ln_mode).exp();
        rho * p - g
    }

    /// `h'(p) / (C g(p0)) = rho - p^(R-1) (1-p)^(m-1) (R - S p) / g(p0)`.
    fn derivative(&self, rho: f64, p: f64) -> f64 {
        let scale = (xlogy(self.remaining - 1, p) + xlogy(self.m() - 1, 1.0 - p) - self.ln_mode)
            .exp();
        rho - scale * (f64::from(self.remaining) - f64::from(self.opportunities) * p)
    }

    /// Roots of `h'` in `[0, 1]` for `0 < R < S`.
    ///
    /// `g'` has its extrema where `g'' = 0`, at `p = R/S +- sqrt(R m / (S-1)) / S`; between
    /// those points `h'` is monotone, so one sign check per piece finds every crossing.
    fn stationary_points(&self, rho: f64) -> Vec<f64> {
        let (rr, s) = (f64::from(self.remaining), f64::from(self.opportunities));
        let spread = (rr * f64::from(self.m()) / (s - 1.0)).sqrt() / s;
        let mut knots = vec![0.0];
        for k in [rr / s - spread, rr / s + spread] {
            if k > 0.0 && k < 1.0 && knots.last().map_or(true, |&last| k > last) {
                knots.push(k);
            }
        }
        knots.push(1.0);

        let dh = |p: f64| self.derivative(rho, p);
        let mut roots = Vec::new();
        for w in knots.windows(2) {
            let (lo, hi) = (w[0], w[1]);
            let (flo, fhi) = (dh(lo), dh(hi));
            if flo == 0.0 {
                roots.push(lo);
            } else if fhi != 0.0 && (flo < 0.0) != (fhi < 0.0) {
                roots.push(bisect(dh, lo, hi, flo));
            }
        }
        if dh(1.0) == 0.0 {
            roots.push(1.0);
        }
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn w(c: f64) -> Weight {
        Weight::from_value(c)
    }

    #[test]
    fn classify_order() {
        assert_eq!(
            TargetCase::classify(0, 1),
            TargetCase::SingleShot { completes: false }
        );
        assert_eq!(
            TargetCase::classify(1, 1),
            TargetCase::SingleShot { completes: true }
        );
        assert_eq!(TargetCase::classify(0, 5), TargetCase::Exhausted);
        assert_eq!(TargetCase::classify(6, 5), TargetCase::Infeasible);
        assert_eq!(TargetCase::classify(5, 5), TargetCase::ForcedAllOpportunities);
        assert_eq!(TargetCase::classify(2, 5), TargetCase::General);
        assert!(!TargetCase::classify(3, 1).is_eligible());
    }

    #[test]
    fn degenerate_cases_are_exact() {
        for y in [-1.0e6, -3.0, 0.0, 0.5, 7.0, 1.0e9] {
            for s in 1..12 {
                assert_eq!(probablize(y, 0, w(10.0), s), 0.0);
                assert_eq!(probablize(y, s + 1, w(10.0), s), 0.0);
            }
            assert_eq!(probablize(y, 1, w(10.0), 1), 1.0);
            assert_eq!(probablize(y, 2, w(10.0), 1), 0.0);
        }
    }

    #[test]
    fn general_case_single_required_has_closed_form() {
        // R = 1, S = 2: h/C = r p - p (1 - p), convex, minimizer (1 - r) / 2.
        let c = 20.0;
        for y in [-10.0, 0.0, 4.0, 10.0, 19.0] {
            let p = probablize(y, 1, w(c), 2);
            let want = ((1.0 - y / c) / 2.0).clamp(0.0, 1.0);
            assert!((p - want).abs() < 1e-9, "y={y}: {p} vs {want}");
        }
        // Past r = 1 the budget outweighs any gain.
        assert_eq!(probablize(25.0, 1, w(c), 2), 0.0);
        assert_eq!(probablize(-25.0, 1, w(c), 2), 1.0);
    }

    #[test]
    fn at_zero_multiplier_general_case_picks_the_mode() {
        // Unconstrained maximizer of p^R (1-p)^(S-R) is R / S.
        for (rr, s) in [(1u32, 4u32), (2, 5), (3, 10), (7, 9)] {
            let p = probablize(0.0, rr, w(3.0), s);
            let want = f64::from(rr) / f64::from(s);
            assert!((p - want).abs() < 1e-9, "R={rr} S={s}: {p}");
        }
    }

    #[test]
    fn forced_case_is_all_or_nothing() {
        // R = S = 2: h/C = r p - p^2 is concave, so only endpoints can win.
        let c = 5.0;
        assert_eq!(probablize(4.9, 2, w(c), 2), 1.0);
        assert_eq!(probablize(5.1, 2, w(c), 2), 0.0);
        // Exact tie h(0) = h(1) keeps p = 0.
        assert_eq!(probablize(5.0, 2, w(c), 2), 0.0);
        // Negative multipliers make the interior candidate undefined, not an error.
        assert_eq!(probablize(-3.0, 4, w(c), 4), 1.0);
    }

    #[test]
    fn zero_weight_only_follows_the_budget() {
        assert_eq!(probablize(1.0, 2, Weight::ZERO, 5), 0.0);
        assert_eq!(probablize(0.0, 2, Weight::ZERO, 5), 0.0);
        assert_eq!(probablize(-1.0, 2, Weight::ZERO, 5), 1.0);
    }

    #[test]
    fn huge_weights_do_not_overflow() {
        let big = Weight::new(1.0, 2_000, 1_000);
        assert!(big.value().is_infinite());
        let p = probablize(0.0, 1_000, big, 2_000);
        assert!((p - 0.5).abs() < 1e-9, "p={p}");
        // A small positive price pulls the probability just below the mode.
        let p = probablize(1.0e-4, 1_000, big, 2_000);
        assert!(p > 0.45 && p < 0.5, "p={p}");
        assert_eq!(probablize(f64::MAX, 1_000, big, 2_000), 0.0);
    }

    #[test]
    fn root_methods_agree_on_small_horizons() {
        let mono = ModelConfig {
            root_method: RootMethod::Monomial,
            ..ModelConfig::default()
        };
        let fact = ModelConfig::default();
        for s in 2..=12u32 {
            for rr in 1..s {
                for y in [-2.0, -0.1, 0.0, 0.05, 0.3, 1.0, 4.0] {
                    let a = probablize_with(y, rr, w(2.0), s, &fact);
                    let b = probablize_with(y, rr, w(2.0), s, &mono);
                    assert!((a - b).abs() < 1e-6, "S={s} R={rr} y={y}: {a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn argmin_keeps_first_of_ties_and_skips_nan() {
        assert_eq!(argmin_candidate(&[0.0, 1.0, 0.5], |_| 1.0), 0.0);
        assert_eq!(
            argmin_candidate(&[0.0, 1.0], |p| if p == 0.0 { f64::NAN } else { 3.0 }),
            1.0
        );
        assert_eq!(argmin_candidate(&[0.2, 0.7], |_| f64::NAN), 0.0);
        assert_eq!(argmin_candidate(&[0.0, 1.0, 0.3], |p| (p - 0.3).abs()), 0.3);
    }

    proptest! {
        #[test]
        fn probability_is_monotone_in_multiplier(
            s in 2u32..16,
            rr_frac in 0.0f64..1.0,
            c in 0.01f64..1.0e4,
        ) {
            let rr = 1 + ((f64::from(s - 1)) * rr_frac) as u32;
            let mut prev = f64::INFINITY;
            for i in -40..=40 {
                let y = c * f64::from(i) / 10.0;
                let p = probablize(y, rr, w(c), s);
                prop_assert!((0.0..=1.0).contains(&p));
                prop_assert!(p <= prev + 1e-9, "S={} R={} y={}: {} > {}", s, rr, y, p, prev);
                prev = p;
            }
        }
    }
}
