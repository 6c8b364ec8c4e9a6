//! Solving for the round's Lagrange multiplier.
//!
//! The residual `res(y) = sum_i p_i(y) - K` is non-increasing but not continuous: a
//! target's probability drops to zero once `y` outgrows its weight. The primary path
//! brackets a sign change and runs Brent's method; when the residual never changes sign
//! (fewer eligible targets than fibers, or a flat plateau), `res(y)^2` is minimized
//! instead.

use tracing::debug;

use crate::{bracket, BracketConfig, PlanError};

/// Configuration for [`brent_root`]. Defaults follow the usual `brentq` tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BrentConfig {
    /// Absolute abscissa tolerance.
    pub xtol: f64,
    /// Relative abscissa tolerance.
    pub rtol: f64,
    /// Iteration budget. Exponential brackets can span hundreds of binary orders of
    /// magnitude, so this is larger than the customary 100.
    pub max_iter: usize,
}

impl Default for BrentConfig {
    fn default() -> Self {
        Self {
            xtol: 2e-12,
            rtol: 4.0 * f64::EPSILON,
            max_iter: 1_000,
        }
    }
}

/// Result of a converged [`brent_root`] run.
///
/// `root` is the best estimate; `other` is the opposite end of the final bracket, so the
/// two straddle the sign change (useful when the function jumps over zero).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrentRoot {
    pub root: (f64, f64),
    pub other: (f64, f64),
    pub iterations: usize,
}

/// Brent's method on `[a, b]` where `f(a)` and `f(b)` have opposite signs.
///
/// Inverse quadratic interpolation / secant steps, falling back to bisection whenever
/// the interpolated step does not shrink the bracket fast enough.
pub fn brent_root<F>(mut f: F, a: f64, b: f64, cfg: BrentConfig) -> Result<BrentRoot, PlanError>
where
    F: FnMut(f64) -> f64,
{
    let (mut xpre, mut xcur) = (a, b);
    let (mut fpre, mut fcur) = (f(xpre), f(xcur));
    if fpre == 0.0 {
        return Ok(BrentRoot {
            root: (xpre, fpre),
            other: (xpre, fpre),
            iterations: 0,
        });
    }
    if fcur == 0.0 {
        return Ok(BrentRoot {
            root: (xcur, fcur),
            other: (xcur, fcur),
            iterations: 0,
        });
    }
    if !(fpre.is_finite() && fcur.is_finite()) || (fpre < 0.0) == (fcur < 0.0) {
        return Err(PlanError::DualSolveFailure {
            round: None,
            reason: format!("brent: f({a}) = {fpre} and f({b}) = {fcur} do not bracket a root"),
        });
    }

    let (mut xblk, mut fblk) = (0.0, 0.0);
    let (mut spre, mut scur) = (0.0, 0.0);

    for i in 0..cfg.max_iter {
        if fpre != 0.0 && fcur != 0.0 && (fpre < 0.0) != (fcur < 0.0) {
            xblk = xpre;
            fblk = fpre;
            spre = xcur - xpre;
            scur = spre;
        }
        if fblk.abs() < fcur.abs() {
            xpre = xcur;
            xcur = xblk;
            xblk = xpre;
            fpre = fcur;
            fcur = fblk;
            fblk = fpre;
        }

        let delta = (cfg.xtol + cfg.rtol * xcur.abs()) / 2.0;
        let sbis = (xblk - xcur) / 2.0;
        if fcur == 0.0 || sbis.abs() < delta {
            return Ok(BrentRoot {
                root: (xcur, fcur),
                other: (xblk, fblk),
                iterations: i,
            });
        }

        if spre.abs() > delta && fcur.abs() < fpre.abs() {
            let stry = if xpre == xblk {
                // secant
                -fcur * (xcur - xpre) / (fcur - fpre)
            } else {
                // inverse quadratic interpolation
                let dpre = (fpre - fcur) / (xpre - xcur);
                let dblk = (fblk - fcur) / (xblk - xcur);
                -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
            };
            if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                spre = scur;
                scur = stry;
            } else {
                spre = sbis;
                scur = sbis;
            }
        } else {
            spre = sbis;
            scur = sbis;
        }

        xpre = xcur;
        fpre = fcur;
        if scur.abs() > delta {
            xcur += scur;
        } else {
            xcur += if sbis > 0.0 { delta } else { -delta };
        }
        fcur = f(xcur);
        if !fcur.is_finite() {
            return Err(PlanError::DualSolveFailure {
                round: None,
                reason: format!("brent: residual is not finite at y = {xcur}"),
            });
        }
    }

    Err(PlanError::DualSolveFailure {
        round: None,
        reason: format!("brent: no convergence after {} iterations", cfg.max_iter),
    })
}

/// Configuration for the least-squares fallback ([`minimize_squared`]).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeastSquaresConfig {
    /// Starting multiplier.
    pub initial_guess: f64,
    /// Gradient magnitude at which the minimizer reports success.
    pub gtol: f64,
    pub max_iter: usize,
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            initial_guess: 0.8,
            gtol: 1e-5,
            max_iter: 400,
        }
    }
}

/// Result of [`minimize_squared`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeastSquares {
    pub y: f64,
    /// `res(y)^2` at the returned point.
    pub value: f64,
    pub iterations: usize,
}

/// Minimize `res(y)^2` with a one-dimensional quasi-Newton method.
///
/// Forward-difference gradient, secant update of the inverse curvature, Armijo
/// backtracking. Success means the gradient fell below `gtol`; a failed line search or an
/// exhausted budget is a [`PlanError::DualSolveFailure`].
pub fn minimize_squared<F>(mut res: F, cfg: LeastSquaresConfig) -> Result<LeastSquares, PlanError>
where
    F: FnMut(f64) -> f64,
{
    let mut phi = |y: f64| {
        let r = res(y);
        r * r
    };
    let fail = |reason: String| PlanError::DualSolveFailure {
        round: None,
        reason,
    };

    let mut y = cfg.initial_guess;
    let mut fy = phi(y);
    if !fy.is_finite() {
        return Err(fail(format!("least squares: residual is not finite at y = {y}")));
    }
    let mut g = forward_gradient(&mut phi, y, fy);
    let mut inv_curv = 1.0;

    for k in 0..cfg.max_iter {
        if g.abs() <= cfg.gtol {
            return Ok(LeastSquares {
                y,
                value: fy,
                iterations: k,
            });
        }
        let dir = -inv_curv * g;
        let slope = g * dir;
        let mut step = 1.0;
        let (y_new, f_new) = loop {
            let cand = y + step * dir;
            let fc = phi(cand);
            if fc.is_finite() && fc <= fy + 1e-4 * step * slope {
                break (cand, fc);
            }
            step *= 0.5;
            if step < 1e-20 {
                return Err(fail(format!(
                    "least squares: line search failed at y = {y} (gradient {g})"
                )));
            }
        };
        let g_new = forward_gradient(&mut phi, y_new, f_new);
        let s = y_new - y;
        let dg = g_new - g;
        if s * dg > 0.0 {
            inv_curv = s / dg;
        }
        y = y_new;
        fy = f_new;
        g = g_new;
    }

    Err(fail(format!(
        "least squares: no convergence after {} iterations",
        cfg.max_iter
    )))
}

fn forward_gradient<F>(phi: &mut F, y: f64, fy: f64) -> f64
where
    F: FnMut(f64) -> f64,
{
    let h = f64::EPSILON.sqrt() * y.abs().max(1.0);
    (phi(y + h) - fy) / h
}

/// How the multiplier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DualMethod {
    /// Bracketing followed by Brent's method.
    Bracketed,
    /// Bracketing failed; minimized the squared residual.
    LeastSquares,
}

/// Configuration for [`solve_dual`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DualConfig {
    pub bracket: BracketConfig,
    pub brent: BrentConfig,
    pub least_squares: LeastSquaresConfig,
}

/// The solved multiplier for one round.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DualSolution {
    pub y: f64,
    /// `res(y)` at the returned multiplier.
    pub residual: f64,
    pub method: DualMethod,
    /// Residual evaluations spent (bracketing included).
    pub evaluations: usize,
}

/// Find `y*` with `res(y*) ~ 0` for a non-increasing residual.
///
/// When the residual jumps over zero, the side of the final bracket with `res <= 0` is
/// returned, so the relaxed selection never asks for more than `K` fibers.
pub fn solve_dual<F>(mut res: F, cfg: &DualConfig) -> Result<DualSolution, PlanError>
where
    F: FnMut(f64) -> f64,
{
    let mut evaluations = 0usize;
    let mut counted = |y: f64| {
        evaluations += 1;
        res(y)
    };

    match bracket(&mut counted, cfg.bracket) {
        Ok(b) => {
            let (lo, hi) = b.interval();
            let found = brent_root(&mut counted, lo, hi, cfg.brent)?;
            let (y, residual) = if found.root.1 <= 0.0 {
                found.root
            } else {
                found.other
            };
            debug!(
                y,
                residual,
                bracket_lo = lo,
                bracket_hi = hi,
                iterations = found.iterations,
                "dual solved by bracketing"
            );
            Ok(DualSolution {
                y,
                residual,
                method: DualMethod::Bracketed,
                evaluations,
            })
        }
        Err(e) if e.is_bracketing_failure() => {
            debug!(error = %e, "bracketing failed; minimizing squared residual");
            let ls = minimize_squared(&mut counted, cfg.least_squares)?;
            let residual = counted(ls.y);
            Ok(DualSolution {
                y: ls.y,
                residual,
                method: DualMethod::LeastSquares,
                evaluations,
            })
        }
        Err(e) => Err(e),
    }
}
