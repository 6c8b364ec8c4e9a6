//! Sign-change bracketing for monotone scalar functions.
//!
//! The dual residual is monotone but its scale is unknown up front (it depends on the
//! binomial weights of the round), so the search first walks outward linearly and then
//! doubles its reach until both signs have been seen.

use crate::PlanError;

/// Configuration for [`bracket()`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BracketConfig {
    /// Abscissa the search starts from.
    pub initial: f64,
    /// Linear step size (also the first exponential reach).
    pub step: f64,
    /// Iteration budget for each of the linear and exponential phases.
    pub max_iter: usize,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            initial: 0.0,
            step: 1.0,
            max_iter: 10_000,
        }
    }
}

/// Two abscissas where the function takes opposite signs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bracket {
    /// `(x, f(x))` with `f(x) > 0`.
    pub pos: (f64, f64),
    /// `(x, f(x))` with `f(x) < 0`.
    pub neg: (f64, f64),
}

impl Bracket {
    /// The bracket as an ordered interval `(lo, hi)`.
    pub fn interval(&self) -> (f64, f64) {
        let (a, b) = (self.pos.0, self.neg.0);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[derive(Default)]
struct Candidates {
    pos: Option<(f64, f64)>,
    neg: Option<(f64, f64)>,
}

impl Candidates {
    /// Record a probe; non-finite values (domain errors) are not matches.
    fn record(&mut self, x: f64, fx: f64) {
        if !fx.is_finite() {
            return;
        }
        if fx > 0.0 && self.pos.is_none() {
            self.pos = Some((x, fx));
        } else if fx < 0.0 && self.neg.is_none() {
            self.neg = Some((x, fx));
        }
    }

    fn done(&self) -> Option<Bracket> {
        match (self.pos, self.neg) {
            (Some(pos), Some(neg)) => Some(Bracket { pos, neg }),
            _ => None,
        }
    }
}

/// Find `x_pos`, `x_neg` with `f(x_pos) > 0` and `f(x_neg) < 0`.
///
/// Probing order:
/// - `f(initial)` (an exact zero sets neither candidate);
/// - linear: `initial + i*step`, then `initial - i*step`, for `i = 1..=max_iter`;
/// - exponential: `initial + s`, then `initial - s`, doubling `s` (starting at `step`)
///   after each of `max_iter` outer iterations.
///
/// The first positive and first negative values win. Points where `f` is non-finite are
/// skipped, so a function that is undefined everywhere probed fails like a constant-sign one.
pub fn bracket<F>(mut f: F, cfg: BracketConfig) -> Result<Bracket, PlanError>
where
    F: FnMut(f64) -> f64,
{
    let mut c = Candidates::default();
    c.record(cfg.initial, f(cfg.initial));

    for i in 1..=cfg.max_iter {
        let reach = i as f64 * cfg.step;
        for x in [cfg.initial + reach, cfg.initial - reach] {
            c.record(x, f(x));
            if let Some(b) = c.done() {
                return Ok(b);
            }
        }
    }

    let mut reach = cfg.step;
    for _ in 0..cfg.max_iter {
        for x in [cfg.initial + reach, cfg.initial - reach] {
            c.record(x, f(x));
            if let Some(b) = c.done() {
                return Ok(b);
            }
        }
        reach *= 2.0;
        if !reach.is_finite() {
            // Every further probe would be at +-inf.
            break;
        }
    }

    Err(PlanError::BracketingFailure {
        max_iter: cfg.max_iter,
    })
}
