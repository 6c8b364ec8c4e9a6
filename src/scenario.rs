//! Planning scenarios: the target catalogue plus the instrument budget.
//!
//! A [`Scenario`] is immutable once validated. The named constructors reproduce the
//! synthetic workloads used to compare planning policies:
//!
//! - [`Scenario::edge1`]: a few long, valuable targets against a flood of cheap one-shot
//!   targets that alone could saturate every fiber.
//! - [`Scenario::edge2`]: the same shape with twice the targets and a longer horizon.
//! - [`Scenario::power_law`] (feature `stochastic`): heavy-tailed utilities with
//!   requirements roughly proportional to utility, seeded.

use crate::PlanError;

/// Target catalogue and instrument budget for one planning run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scenario {
    /// Optional label, used in logs and reports.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    /// `K`: fibers per exposure.
    pub k: usize,
    /// `L`: exposures in the horizon.
    pub l: usize,
    /// Duration of one exposure, in the same unit as `t_target`.
    pub t_exp: f64,
    /// Utility credited when a target's requirement is met exactly.
    pub u_max: Vec<f64>,
    /// Required cumulative observation time per target.
    pub t_target: Vec<f64>,
}

impl Scenario {
    /// Build and validate a scenario.
    pub fn new(
        k: usize,
        l: usize,
        t_exp: f64,
        u_max: Vec<f64>,
        t_target: Vec<f64>,
    ) -> Result<Self, PlanError> {
        let s = Self {
            name: None,
            k,
            l,
            t_exp,
            u_max,
            t_target,
        };
        s.validate()?;
        Ok(s)
    }

    /// Attach a label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// `N`: number of targets.
    pub fn n(&self) -> usize {
        self.u_max.len()
    }

    /// Check the structural requirements.
    ///
    /// Deserialized scenarios skip [`Scenario::new`], so the planner validates again.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.k == 0 {
            return Err(PlanError::InvalidScenario("K must be at least 1".to_string()));
        }
        if self.l == 0 {
            return Err(PlanError::InvalidScenario("L must be at least 1".to_string()));
        }
        if u32::try_from(self.l).is_err() {
            return Err(PlanError::InvalidScenario(format!(
                "L = {} exceeds the supported horizon",
                self.l
            )));
        }
        if !(self.t_exp.is_finite() && self.t_exp > 0.0) {
            return Err(PlanError::InvalidScenario(format!(
                "T_exp must be positive and finite, got {}",
                self.t_exp
            )));
        }
        if self.u_max.len() != self.t_target.len() {
            return Err(PlanError::InvalidScenario(format!(
                "u_max has {} entries but T_target has {}",
                self.u_max.len(),
                self.t_target.len()
            )));
        }
        let bad = |v: &f64| !(v.is_finite() && *v >= 0.0);
        if let Some(i) = self.u_max.iter().position(bad) {
            return Err(PlanError::InvalidScenario(format!(
                "u_max[{i}] = {} is not a finite non-negative value",
                self.u_max[i]
            )));
        }
        if let Some(i) = self.t_target.iter().position(bad) {
            return Err(PlanError::InvalidScenario(format!(
                "T_target[{i}] = {} is not a finite non-negative value",
                self.t_target[i]
            )));
        }
        Ok(())
    }

    /// `R_i = ceil(max(T_target_i - used * T_exp, 0) / T_exp)`.
    ///
    /// Shortfalls within the time tolerance count as met, so `R_i == 0` exactly when
    /// [`Scenario::is_sharp`] or [`Scenario::excess`] says the requirement is reached.
    pub fn remaining_exposures(&self, i: usize, used: u32) -> u32 {
        let past = f64::from(used) * self.t_exp;
        let short = (self.t_target[i] - past - self.time_tol(i)).max(0.0);
        let r = (short / self.t_exp).ceil();
        // Saturate rather than wrap; anything above L is infeasible anyway.
        if r >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            r as u32
        }
    }

    /// Whether `used` exposures deliver exactly the requirement of target `i`.
    pub fn is_sharp(&self, i: usize, used: u32) -> bool {
        (f64::from(used) * self.t_exp - self.t_target[i]).abs() <= self.time_tol(i)
    }

    /// Observation time past the requirement of target `i` (zero if not exceeded).
    pub fn excess(&self, i: usize, used: u32) -> f64 {
        let over = f64::from(used) * self.t_exp - self.t_target[i];
        if over > self.time_tol(i) {
            over
        } else {
            0.0
        }
    }

    fn time_tol(&self, i: usize) -> f64 {
        1e-9 * self.t_target[i].max(self.t_exp)
    }

    /// 60 targets worth 10 needing the whole horizon, plus 1000 one-shot targets worth 0.5.
    /// `K = 100`, `L = 10`.
    pub fn edge1() -> Self {
        Self::two_tier("edge1", 60, 1_000, 10)
    }

    /// 120 long targets plus 2000 one-shot targets, `K = 100`, `L = 25`.
    pub fn edge2() -> Self {
        Self::two_tier("edge2", 120, 2_000, 25)
    }

    fn two_tier(name: &str, long: usize, short: usize, l: usize) -> Self {
        let u_max = std::iter::repeat(10.0)
            .take(long)
            .chain(std::iter::repeat(0.5).take(short))
            .collect();
        let t_target = std::iter::repeat(10.0)
            .take(long)
            .chain(std::iter::repeat(1.0).take(short))
            .collect();
        Self {
            name: Some(name.to_string()),
            k: 100,
            l,
            t_exp: 1.0,
            u_max,
            t_target,
        }
    }

    /// 1000 targets with Lomax-distributed utilities (`shape = 10`, scaled by 100, shifted
    /// by 1). Requirements are `u / P99(u) * L` with 5% multiplicative noise, truncated
    /// to whole exposures and clamped to `[0, L]`. `K = 100`, `L = 10`.
    #[cfg(feature = "stochastic")]
    pub fn power_law(seed: u64) -> Result<Self, PlanError> {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        use rand_distr::{Distribution, Normal, Pareto};

        const N: usize = 1_000;
        const L: usize = 10;
        const SCALE: f64 = 100.0;

        let mut rng = StdRng::seed_from_u64(seed);
        let pareto = Pareto::new(1.0, 10.0)
            .map_err(|e| PlanError::InvalidScenario(format!("pareto: {e}")))?;
        let noise = Normal::new(1.0, 0.05)
            .map_err(|e| PlanError::InvalidScenario(format!("normal: {e}")))?;

        let u_max: Vec<f64> = (0..N)
            .map(|_| (pareto.sample(&mut rng) - 1.0) * SCALE + 1.0)
            .collect();
        let p99 = percentile(&u_max, 99.0);
        let t_target = u_max
            .iter()
            .map(|&u| {
                let t = u / p99 * L as f64 * noise.sample(&mut rng);
                t.trunc().clamp(0.0, L as f64)
            })
            .collect();

        let s = Self {
            name: Some("power_law".to_string()),
            k: 100,
            l: L,
            t_exp: 1.0,
            u_max,
            t_target,
        };
        s.validate()?;
        Ok(s)
    }

    /// Look up a built-in scenario by name (`seed` only affects `power_law`).
    #[cfg_attr(not(feature = "stochastic"), allow(unused_variables))]
    pub fn named(name: &str, seed: u64) -> Result<Self, PlanError> {
        match name {
            "edge1" => Ok(Self::edge1()),
            "edge2" => Ok(Self::edge2()),
            #[cfg(feature = "stochastic")]
            "power_law" => Self::power_law(seed),
            other => Err(PlanError::InvalidScenario(format!(
                "unknown scenario {other:?}"
            ))),
        }
    }
}

/// `q`-th percentile with linear interpolation between closest ranks.
#[cfg(feature = "stochastic")]
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_bad_inputs() {
        let ok = || (vec![1.0, 2.0], vec![1.0, 1.0]);
        assert!(Scenario::new(1, 2, 1.0, ok().0, ok().1).is_ok());

        let cases = [
            Scenario::new(0, 2, 1.0, ok().0, ok().1),
            Scenario::new(1, 0, 1.0, ok().0, ok().1),
            Scenario::new(1, 2, 0.0, ok().0, ok().1),
            Scenario::new(1, 2, f64::NAN, ok().0, ok().1),
            Scenario::new(1, 2, 1.0, vec![1.0], ok().1),
            Scenario::new(1, 2, 1.0, vec![-1.0, 2.0], ok().1),
            Scenario::new(1, 2, 1.0, ok().0, vec![1.0, f64::INFINITY]),
        ];
        for c in cases {
            assert!(matches!(c, Err(PlanError::InvalidScenario(_))), "{c:?}");
        }
    }

    #[test]
    fn remaining_exposures_rounds_up() {
        let s = Scenario::new(1, 5, 2.0, vec![1.0; 3], vec![5.0, 4.0, 0.0]).unwrap();
        assert_eq!(s.remaining_exposures(0, 0), 3);
        assert_eq!(s.remaining_exposures(0, 2), 1);
        assert_eq!(s.remaining_exposures(0, 3), 0);
        assert_eq!(s.remaining_exposures(1, 2), 0);
        assert_eq!(s.remaining_exposures(2, 0), 0);
    }

    #[test]
    fn fractional_exposure_length_agrees_with_sharpness() {
        // 3 * 0.7 lands a few ulps below 2.1, and 2.1 / 0.7 a few ulps above 3.
        let s = Scenario::new(1, 4, 0.7, vec![1.0], vec![2.1]).unwrap();
        assert_eq!(s.remaining_exposures(0, 0), 3);
        assert_eq!(s.remaining_exposures(0, 1), 2);
        assert_eq!(s.remaining_exposures(0, 2), 1);
        assert_eq!(s.remaining_exposures(0, 3), 0);
        assert!(s.is_sharp(0, 3));
        assert_eq!(s.excess(0, 3), 0.0);
        assert!(s.excess(0, 4) > 0.0);
        for used in 0..=4 {
            let reached = s.is_sharp(0, used) || s.excess(0, used) > 0.0;
            assert_eq!(s.remaining_exposures(0, used) == 0, reached, "used={used}");
        }
    }

    #[test]
    fn sharp_and_excess() {
        let s = Scenario::new(1, 5, 1.0, vec![1.0; 2], vec![2.0, 0.0]).unwrap();
        assert!(!s.is_sharp(0, 1));
        assert!(s.is_sharp(0, 2));
        assert_eq!(s.excess(0, 2), 0.0);
        assert_eq!(s.excess(0, 4), 2.0);
        // A zero requirement is met by doing nothing.
        assert!(s.is_sharp(1, 0));
    }

    #[test]
    fn edge_scenarios_have_documented_shape() {
        let e1 = Scenario::edge1();
        assert_eq!((e1.n(), e1.k, e1.l), (1_060, 100, 10));
        assert_eq!(e1.u_max[59], 10.0);
        assert_eq!(e1.u_max[60], 0.5);
        assert_eq!(e1.t_target[60], 1.0);
        assert!(e1.validate().is_ok());

        let e2 = Scenario::named("edge2", 0).unwrap();
        assert_eq!((e2.n(), e2.k, e2.l), (2_120, 100, 25));
        assert!(Scenario::named("nope", 0).is_err());
    }

    #[test]
    fn named_power_law_follows_the_feature() {
        #[cfg(feature = "stochastic")]
        assert_eq!(
            Scenario::named("power_law", 5).unwrap(),
            Scenario::power_law(5).unwrap()
        );
        #[cfg(not(feature = "stochastic"))]
        assert!(matches!(
            Scenario::named("power_law", 5),
            Err(PlanError::InvalidScenario(_))
        ));
    }

    #[cfg(feature = "stochastic")]
    #[test]
    fn power_law_is_seeded_and_bounded() {
        let a = Scenario::power_law(7).unwrap();
        let b = Scenario::power_law(7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n(), 1_000);
        assert!(a.u_max.iter().all(|&u| u >= 1.0));
        assert!(a
            .t_target
            .iter()
            .all(|&t| (0.0..=10.0).contains(&t) && t.fract() == 0.0));
        assert_ne!(a, Scenario::power_law(8).unwrap());
    }

    #[cfg(feature = "stochastic")]
    #[test]
    fn percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 50.0), 3.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 99.0) - 4.96).abs() < 1e-12);
    }
}
