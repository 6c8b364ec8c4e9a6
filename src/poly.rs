//! Dense real polynomials and real-root isolation on an interval.
//!
//! Roots are isolated through the derivative chain: between consecutive real roots of
//! `p'` the polynomial is monotone, so each such piece holds at most one root and a sign
//! change is enough to bisect it. This keeps the root finder exact in structure (no
//! eigenvalue solve), which matters for the alternating, badly scaled coefficients of
//! the stationary-point polynomials built by [`Polynomial::stationary`].

use crate::weight::binomial;

/// Bisection iterations per isolated root. 80 halvings of `[0, 1]` is below `f64` spacing.
const BISECT_ITERS: usize = 80;

/// A polynomial `c[0] + c[1] x + ... + c[d] x^d`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Build from ascending coefficients; trailing exact zeros are trimmed.
    pub fn new(mut coeffs: Vec<f64>) -> Self {
        while coeffs.len() > 1 && coeffs.last() == Some(&0.0) {
            coeffs.pop();
        }
        if coeffs.is_empty() {
            coeffs.push(0.0);
        }
        Self { coeffs }
    }

    /// The stationary-point polynomial of `h(p) = r*p - p^R (1-p)^(S-R)`, i.e. `h'(p)`.
    ///
    /// `r` is the multiplier divided by the target weight, so this is the textbook
    /// construction with every weight-bearing coefficient divided by `C`:
    ///
    /// - `p^0`: `r`
    /// - `p^(R-1)`: `-R`
    /// - `p^(S-1)`: `S * (-1)^(S-R-1)`
    /// - `p^(k+R-1)`, `k = 1..S-R-1`: `(-1)^(k-1) * (S*C(S-R-1, k-1) + R*C(S-R-1, k))`
    ///
    /// Requires `0 < R < S`.
    pub fn stationary(r: f64, remaining: u32, opportunities: u32) -> Self {
        debug_assert!(remaining > 0 && remaining < opportunities);
        let (rr, s) = (remaining, opportunities);
        let m = s - rr;
        let mut c = vec![0.0; s as usize];
        c[0] += r;
        c[(rr - 1) as usize] += -f64::from(rr);
        c[(s - 1) as usize] += f64::from(s) * alternating(m - 1);
        for k in 1..m {
            let mag = f64::from(s) * binomial(m - 1, k - 1) + f64::from(rr) * binomial(m - 1, k);
            c[(k + rr - 1) as usize] += alternating(k - 1) * mag;
        }
        Self::new(c)
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Horner evaluation.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn derivative(&self) -> Self {
        if self.coeffs.len() <= 1 {
            return Self::new(vec![0.0]);
        }
        Self::new(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, &c)| c * i as f64)
                .collect(),
        )
    }

    /// All real roots in `[lo, hi]`, ascending, without duplicates closer than `tol`.
    ///
    /// Roots of even multiplicity are reported only when they land exactly on a piece
    /// boundary; callers that look for sign changes do not need them.
    pub fn real_roots_in(&self, lo: f64, hi: f64, tol: f64) -> Vec<f64> {
        if !(lo < hi) {
            return Vec::new();
        }
        match self.degree() {
            0 => Vec::new(),
            1 => {
                let x = -self.coeffs[0] / self.coeffs[1];
                if x.is_finite() && x >= lo && x <= hi {
                    vec![x]
                } else {
                    Vec::new()
                }
            }
            _ => {
                let mut knots = vec![lo];
                knots.extend(self.derivative().real_roots_in(lo, hi, tol));
                knots.push(hi);

                let mut roots: Vec<f64> = Vec::new();
                for w in knots.windows(2) {
                    let (a, b) = (w[0], w[1]);
                    let (fa, fb) = (self.eval(a), self.eval(b));
                    if fa == 0.0 {
                        push_unique(&mut roots, a, tol);
                    }
                    if fa != 0.0 && fb != 0.0 && (fa < 0.0) != (fb < 0.0) {
                        push_unique(&mut roots, bisect(|x| self.eval(x), a, b, fa), tol);
                    }
                }
                if self.eval(hi) == 0.0 {
                    push_unique(&mut roots, hi, tol);
                }
                roots
            }
        }
    }
}

fn alternating(power: u32) -> f64 {
    if power % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn push_unique(roots: &mut Vec<f64>, x: f64, tol: f64) {
    if roots.last().map_or(true, |&last| (x - last).abs() > tol) {
        roots.push(x);
    }
}

/// Bisect a sign change of `f` on `[a, b]`, given `fa = f(a)`.
pub(crate) fn bisect<F>(f: F, mut a: f64, mut b: f64, mut fa: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    for _ in 0..BISECT_ITERS {
        let mid = 0.5 * (a + b);
        if mid <= a || mid >= b {
            break;
        }
        let fm = f(mid);
        if fm == 0.0 {
            return mid;
        }
        if (fm < 0.0) == (fa < 0.0) {
            a = mid;
            fa = fm;
        } else {
            b = mid;
        }
    }
    0.5 * (a + b)
}
