//! Exposure sequencing: drive allocation rounds across the horizon.
//!
//! A [`Planner`] owns the usage matrix and moves strictly forward, one exposure per
//! [`Planner::step`]. Each round derives the remaining requirement of every target from
//! the columns already written, selects at most `K` targets with the configured
//! [`Policy`], and writes the selection into the next column.
//!
//! Round selection with [`Policy::Dual`]:
//!
//! - last exposure (`S == 1`): [`consume`], greedy by utility among targets one short;
//! - at most `K` eligible targets: select all of them without solving for a multiplier;
//! - otherwise: solve the multiplier, then [`allocate`] the `K` most probable targets.
//!
//! A run can be paused with [`Planner::snapshot`] and resumed with
//! [`Planner::from_snapshot`]; the resumed run produces the same report as an
//! uninterrupted one.

use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    consume, greedy_select, DualConfig, DualSolution, ModelConfig, PlanError, RoundInputs,
    Scenario,
};

/// Binary `N x L` record of which target received a fiber on which exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsageMatrix {
    n: usize,
    horizon: usize,
    /// Row-major, one row per target.
    cells: Vec<bool>,
}

impl UsageMatrix {
    pub fn new(n: usize, horizon: usize) -> Self {
        Self {
            n,
            horizon,
            cells: vec![false; n * horizon],
        }
    }

    /// Number of targets (rows).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of exposures (columns).
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn get(&self, target: usize, round: usize) -> bool {
        self.cells[target * self.horizon + round]
    }

    /// Exposures received by `target`, one flag per round.
    pub fn row(&self, target: usize) -> &[bool] {
        &self.cells[target * self.horizon..(target + 1) * self.horizon]
    }

    /// Targets selected on `round`, ascending.
    pub fn column(&self, round: usize) -> Vec<usize> {
        (0..self.n).filter(|&i| self.get(i, round)).collect()
    }

    /// Exposures each target received strictly before `round`.
    pub fn counts_before(&self, round: usize) -> Vec<u32> {
        (0..self.n)
            .map(|i| self.row(i)[..round].iter().filter(|&&b| b).count() as u32)
            .collect()
    }

    /// Exposures each target received over the whole horizon.
    pub fn totals(&self) -> Vec<u32> {
        self.counts_before(self.horizon)
    }

    fn write_column(&mut self, round: usize, mask: &[usize]) {
        for &i in mask {
            self.cells[i * self.horizon + round] = true;
        }
    }

    fn column_is_empty(&self, round: usize) -> bool {
        (0..self.n).all(|i| !self.get(i, round))
    }
}

/// Which rule picks the targets of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Policy {
    /// Lagrangian relaxation with a per-round multiplier.
    #[default]
    Dual,
    /// Utility-per-exposure baseline ([`greedy_select`]).
    Greedy,
}

/// Configuration for a [`Planner`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlannerConfig {
    pub policy: Policy,
    pub model: ModelConfig,
    pub dual: DualConfig,
}

/// What happened on one exposure.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundRecord {
    /// 0-indexed exposure.
    pub round: usize,
    /// `S = L - round`.
    pub remaining_opportunities: u32,
    /// The solved multiplier; `None` on terminal, under-filled and greedy rounds.
    pub multiplier: Option<DualSolution>,
    /// Selected targets, ascending.
    pub mask: Vec<usize>,
    pub fibers_used: usize,
    /// Sharp utility after this exposure.
    pub sharp_utility: f64,
    /// Targets whose usage now exceeds their requirement.
    pub over_allocated: Vec<usize>,
}

/// Outcome of a planning run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanReport {
    pub usage: UsageMatrix,
    /// Sharp utility after each exposure (length `L`).
    pub sharp_utility: Vec<f64>,
    /// Observation time spent past each target's requirement (length `N`).
    pub waste: Vec<f64>,
    pub total_waste: f64,
    /// Sharp utility at the end of the horizon.
    pub final_sharp_utility: f64,
    /// Records of the rounds stepped by this planner (not those restored from a snapshot).
    pub rounds: Vec<RoundRecord>,
}

/// Serializable pause point of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlanSnapshot {
    pub scenario: Scenario,
    pub usage: UsageMatrix,
    /// First exposure not yet planned.
    pub next_round: usize,
}

/// Hooks called synchronously at round boundaries.
pub trait RoundObserver {
    /// A run (or run segment) begins at `round`.
    fn on_start(&mut self, _scenario: &Scenario, _round: usize) {}

    /// `record` has just been written into `usage`.
    fn on_round(&mut self, _record: &RoundRecord, _usage: &UsageMatrix) {}

    fn on_finish(&mut self, _report: &PlanReport) {}
}

/// Logs every boundary at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RoundObserver for TracingObserver {
    fn on_start(&mut self, scenario: &Scenario, round: usize) {
        info!(
            scenario = scenario.name.as_deref().unwrap_or("custom"),
            n = scenario.n(),
            k = scenario.k,
            l = scenario.l,
            exposure = round + 1,
            "planning started"
        );
    }

    fn on_round(&mut self, record: &RoundRecord, _usage: &UsageMatrix) {
        info!(
            exposure = record.round + 1,
            fibers_used = record.fibers_used,
            sharp_utility = record.sharp_utility,
            multiplier = record.multiplier.map(|m| m.y),
            over_allocated = record.over_allocated.len(),
            "exposure planned"
        );
    }

    fn on_finish(&mut self, report: &PlanReport) {
        info!(
            final_sharp_utility = report.final_sharp_utility,
            total_waste = report.total_waste,
            "planning finished"
        );
    }
}

/// Forward-only planner over one scenario.
pub struct Planner {
    scenario: Scenario,
    config: PlannerConfig,
    usage: UsageMatrix,
    next_round: usize,
    records: Vec<RoundRecord>,
    observers: Vec<Box<dyn RoundObserver>>,
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("scenario", &self.scenario.name)
            .field("config", &self.config)
            .field("next_round", &self.next_round)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Planner {
    /// Start a run at exposure 0.
    pub fn new(scenario: Scenario, config: PlannerConfig) -> Result<Self, PlanError> {
        scenario.validate()?;
        let usage = UsageMatrix::new(scenario.n(), scenario.l);
        Ok(Self {
            scenario,
            config,
            usage,
            next_round: 0,
            records: Vec::new(),
            observers: Vec::new(),
        })
    }

    /// Resume a paused run.
    pub fn from_snapshot(snapshot: PlanSnapshot, config: PlannerConfig) -> Result<Self, PlanError> {
        let PlanSnapshot {
            scenario,
            usage,
            next_round,
        } = snapshot;
        scenario.validate()?;
        if usage.n() != scenario.n() || usage.horizon() != scenario.l {
            return Err(PlanError::SnapshotMismatch(format!(
                "usage is {}x{} but the scenario has {} targets over {} exposures",
                usage.n(),
                usage.horizon(),
                scenario.n(),
                scenario.l
            )));
        }
        if usage.cells.len() != usage.n() * usage.horizon() {
            return Err(PlanError::SnapshotMismatch(format!(
                "usage holds {} cells, expected {}",
                usage.cells.len(),
                usage.n() * usage.horizon()
            )));
        }
        if next_round > scenario.l {
            return Err(PlanError::SnapshotMismatch(format!(
                "next round {next_round} is past the horizon {}",
                scenario.l
            )));
        }
        if let Some(r) = (next_round..scenario.l).find(|&r| !usage.column_is_empty(r)) {
            return Err(PlanError::SnapshotMismatch(format!(
                "exposure {} is already filled but the snapshot resumes at {}",
                r + 1,
                next_round + 1
            )));
        }
        if let Some(r) = (0..next_round).find(|&r| usage.column(r).len() > scenario.k) {
            return Err(PlanError::SnapshotMismatch(format!(
                "exposure {} uses more than {} fibers",
                r + 1,
                scenario.k
            )));
        }
        Ok(Self {
            scenario,
            config,
            usage,
            next_round,
            records: Vec::new(),
            observers: Vec::new(),
        })
    }

    /// Attach an observer; observers are called in insertion order.
    pub fn with_observer(mut self, observer: impl RoundObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn RoundObserver>) {
        self.observers.push(observer);
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn usage(&self) -> &UsageMatrix {
        &self.usage
    }

    /// First exposure not yet planned.
    pub fn next_round(&self) -> usize {
        self.next_round
    }

    pub fn is_finished(&self) -> bool {
        self.next_round >= self.scenario.l
    }

    /// Records of the rounds stepped so far.
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Capture the state needed to resume.
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            scenario: self.scenario.clone(),
            usage: self.usage.clone(),
            next_round: self.next_round,
        }
    }

    /// Plan the next exposure.
    pub fn step(&mut self) -> Result<RoundRecord, PlanError> {
        if self.is_finished() {
            return Err(PlanError::HorizonExhausted {
                horizon: self.scenario.l,
            });
        }
        let round = self.next_round;
        let horizon = self.scenario.l;
        let k = self.scenario.k;
        // Validated: L fits in u32.
        let opportunities = (horizon - round) as u32;

        let counts = self.usage.counts_before(round);
        let remaining: Vec<u32> = counts
            .iter()
            .enumerate()
            .map(|(i, &c)| self.scenario.remaining_exposures(i, c))
            .collect();

        let (mut mask, multiplier) = match self.config.policy {
            Policy::Greedy => (
                greedy_select(
                    &self.scenario.u_max,
                    &self.scenario.t_target,
                    &remaining,
                    round,
                    horizon,
                    k,
                ),
                None,
            ),
            Policy::Dual if opportunities == 1 => {
                (consume(&self.scenario.u_max, &remaining, k), None)
            }
            Policy::Dual => {
                let inputs = RoundInputs::new(&self.scenario.u_max, remaining, opportunities, k);
                let eligible = inputs.eligible();
                if eligible.len() <= k {
                    debug!(
                        exposure = round + 1,
                        eligible = eligible.len(),
                        fibers = k,
                        "at most K eligible targets; selecting all of them"
                    );
                    (eligible, None)
                } else {
                    let sol = inputs
                        .solve(&self.config.model, &self.config.dual)
                        .map_err(|e| e.at_round(round))?;
                    let p = inputs.probabilities(sol.y, &self.config.model);
                    (inputs.allocate(&p), Some(sol))
                }
            }
        };
        mask.sort_unstable();
        self.usage.write_column(round, &mask);

        let totals = self.usage.counts_before(round + 1);
        let sharp_utility = self.sharp_utility_of(&totals);
        let over_allocated: Vec<usize> = totals
            .iter()
            .enumerate()
            .filter(|&(i, &used)| self.scenario.excess(i, used) > 0.0)
            .map(|(i, _)| i)
            .collect();
        if !over_allocated.is_empty() {
            warn!(
                exposure = round + 1,
                count = over_allocated.len(),
                first = over_allocated[0],
                "targets observed past their requirement"
            );
        }
        info!(
            exposure = round + 1,
            fibers_used = mask.len(),
            sharp_utility,
            "fibers used"
        );

        let record = RoundRecord {
            round,
            remaining_opportunities: opportunities,
            multiplier,
            fibers_used: mask.len(),
            mask,
            sharp_utility,
            over_allocated,
        };
        self.next_round += 1;
        self.records.push(record.clone());
        for obs in &mut self.observers {
            obs.on_round(&record, &self.usage);
        }
        Ok(record)
    }

    /// Plan exposures `start..stop` (0-indexed, `stop` exclusive).
    ///
    /// `start` must be the planner's current round: rounds are never skipped or replayed.
    pub fn run_range(&mut self, start: usize, stop: usize) -> Result<Vec<RoundRecord>, PlanError> {
        if start != self.next_round {
            return Err(PlanError::SnapshotMismatch(format!(
                "planner is at exposure {} but was asked to start at {}",
                self.next_round + 1,
                start + 1
            )));
        }
        if stop > self.scenario.l {
            return Err(PlanError::HorizonExhausted {
                horizon: self.scenario.l,
            });
        }
        for obs in &mut self.observers {
            obs.on_start(&self.scenario, start);
        }
        let mut out = Vec::with_capacity(stop.saturating_sub(start));
        while self.next_round < stop {
            out.push(self.step()?);
        }
        Ok(out)
    }

    /// Plan every remaining exposure and report.
    pub fn run(&mut self) -> Result<PlanReport, PlanError> {
        self.run_range(self.next_round, self.scenario.l)?;
        let report = self.report();
        for obs in &mut self.observers {
            obs.on_finish(&report);
        }
        Ok(report)
    }

    /// Report on the usage written so far. Unplanned exposures contribute no usage.
    pub fn report(&self) -> PlanReport {
        let horizon = self.scenario.l;
        let sharp_utility = (1..=horizon)
            .map(|r| self.sharp_utility_of(&self.usage.counts_before(r)))
            .collect::<Vec<_>>();
        let totals = self.usage.totals();
        let waste: Vec<f64> = totals
            .iter()
            .enumerate()
            .map(|(i, &used)| self.scenario.excess(i, used))
            .collect();
        PlanReport {
            usage: self.usage.clone(),
            final_sharp_utility: sharp_utility.last().copied().unwrap_or(0.0),
            sharp_utility,
            total_waste: waste.iter().fold(0.0, |a, w| a + w),
            waste,
            rounds: self.records.clone(),
        }
    }

    fn sharp_utility_of(&self, used: &[u32]) -> f64 {
        used.iter()
            .enumerate()
            .filter(|&(i, &u)| self.scenario.is_sharp(i, u))
            .fold(0.0, |a, (i, _)| a + self.scenario.u_max[i])
    }
}
