//! Log-domain binomial weights.
//!
//! `C_i = u_max_i * C(S, R_i)` reaches `1e300` for horizons of a few hundred exposures, so
//! weights are carried as `ln C_i` and only ever enter the model as the ratio `y / C_i`.

/// `ln C(n, k)`; `-inf` when `k > n`.
///
/// Summed term by term over the shorter side, which is exact to rounding for any horizon
/// this crate plans.
pub fn ln_binomial(n: u32, k: u32) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let k = k.min(n - k);
    (1..=k)
        .map(|j| (f64::from(n - k + j) / f64::from(j)).ln())
        .sum()
}

/// `C(n, k)` as a float (may be `inf` for large arguments).
pub fn binomial(n: u32, k: u32) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut acc = 1.0f64;
    for j in 1..=k {
        acc = acc * f64::from(n - k + j) / f64::from(j);
    }
    acc.round()
}

/// A utility-scaled binomial weight `u_max * C(S, R)` held in log space.
///
/// Serialized as `ln C`, with `null` for the zero weight.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "Option<f64>", into = "Option<f64>"))]
pub struct Weight {
    ln: f64,
}

impl Weight {
    /// The zero weight (zero utility or `R > S`).
    pub const ZERO: Weight = Weight {
        ln: f64::NEG_INFINITY,
    };

    /// `u_max * C(opportunities, remaining)`.
    pub fn new(u_max: f64, opportunities: u32, remaining: u32) -> Self {
        if !(u_max.is_finite() && u_max > 0.0) || remaining > opportunities {
            return Self::ZERO;
        }
        Self {
            ln: u_max.ln() + ln_binomial(opportunities, remaining),
        }
    }

    /// Wrap a raw value `C >= 0`.
    pub fn from_value(c: f64) -> Self {
        if c.is_finite() && c > 0.0 {
            Self { ln: c.ln() }
        } else if c == f64::INFINITY {
            Self { ln: f64::MAX }
        } else {
            Self::ZERO
        }
    }

    /// `ln C` (`-inf` for the zero weight).
    pub fn ln(self) -> f64 {
        self.ln
    }

    pub fn is_zero(self) -> bool {
        self.ln == f64::NEG_INFINITY
    }

    /// `C` as a plain float; saturates to `inf`.
    pub fn value(self) -> f64 {
        self.ln.exp()
    }

    /// `y / C`, the multiplier measured in units of this weight.
    ///
    /// Only meaningful for non-zero weights.
    pub fn scale(self, y: f64) -> f64 {
        y * (-self.ln).exp()
    }
}

impl From<Weight> for Option<f64> {
    fn from(w: Weight) -> Self {
        (!w.is_zero()).then_some(w.ln)
    }
}

impl From<Option<f64>> for Weight {
    /// Non-finite or missing logs map to the zero weight; `+inf` saturates.
    fn from(ln: Option<f64>) -> Self {
        match ln {
            Some(ln) if ln.is_finite() => Weight { ln },
            Some(ln) if ln == f64::INFINITY => Weight { ln: f64::MAX },
            _ => Weight::ZERO,
        }
    }
}
