//! `fiberplan`: exposure-by-exposure fiber allocation for all-or-nothing targets.
//!
//! `N` targets compete for `K` fibers on each of `L` exposures. Target `i` pays
//! `u_max_i` only if its cumulative observation time ends up exactly equal to
//! `T_target_i` ("sharp" utility), so fibers spent on a target that never completes, or
//! past its requirement, are wasted.
//!
//! Each round is planned by relaxing "exactly `K` selected" with a Lagrange multiplier
//! `y`. Given `y`, every target has a closed-form optimal marginal probability
//! ([`probablize`]); the multiplier is the root of `sum_i p_i(y) - K`
//! ([`solve_dual`]); the `K` most probable targets get the fibers ([`allocate`]). The
//! last exposure is planned greedily by utility ([`consume`]).
//!
//! **Layout (leaves first):**
//! - [`bracket()`]: linear then exponential probing for a sign change.
//! - [`solve_dual`]: bracket + Brent, with a least-squares fallback.
//! - [`probablize`] / [`TargetCase`] / [`Weight`]: the per-target model.
//! - [`RoundInputs`] / [`allocate`] / [`consume`]: one round's selection.
//! - [`Planner`]: drives the rounds, owns the [`UsageMatrix`], reports
//!   [`PlanReport`], notifies [`RoundObserver`]s, snapshots with [`PlanSnapshot`].
//! - [`Scenario`]: validated inputs and the built-in synthetic workloads.
//! - [`greedy_select`]: a utility-per-exposure baseline policy.
//!
//! **Determinism:** all selections are stable sorts with ties broken by target index;
//! the same scenario and config always yield the same plan. The per-target model is
//! evaluated as a `rayon` parallel map, which does not affect results.
//!
//! **Non-goals:**
//! - Not a real-time scheduler: the horizon is fixed and known.
//! - No fiber positioning or collision constraints.
//!
//! ```
//! use fiberplan::{Planner, PlannerConfig, Scenario};
//!
//! let scenario = Scenario::new(2, 2, 1.0, vec![10.0, 5.0, 1.0], vec![1.0, 2.0, 2.0])?;
//! let report = Planner::new(scenario, PlannerConfig::default())?.run()?;
//! assert_eq!(report.final_sharp_utility, 15.0);
//! # Ok::<(), fiberplan::PlanError>(())
//! ```

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod bracket;
pub use bracket::*;

mod weight;
pub use weight::*;

pub mod poly;

mod model;
pub use model::*;

mod dual;
pub use dual::*;

mod alloc;
pub use alloc::*;

mod greedy;
pub use greedy::*;

mod scenario;
pub use scenario::*;

mod plan;
pub use plan::*;
