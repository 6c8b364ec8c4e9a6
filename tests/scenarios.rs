use fiberplan::{
    BrentConfig, DualConfig, DualMethod, PlanError, PlanReport, Planner, PlannerConfig, Policy,
    Scenario,
};

fn golden() -> Scenario {
    Scenario::new(2, 2, 1.0, vec![10.0, 5.0, 1.0], vec![1.0, 2.0, 2.0])
        .unwrap()
        .with_name("golden")
}

fn greedy() -> PlannerConfig {
    PlannerConfig {
        policy: Policy::Greedy,
        ..PlannerConfig::default()
    }
}

fn assert_well_formed(s: &Scenario, report: &PlanReport) {
    assert_eq!(report.usage.n(), s.n());
    assert_eq!(report.usage.horizon(), s.l);
    assert_eq!(report.sharp_utility.len(), s.l);
    assert_eq!(report.waste.len(), s.n());
    for l in 0..s.l {
        assert!(report.usage.column(l).len() <= s.k, "exposure {}", l + 1);
    }
    let bound: f64 = s.u_max.iter().sum();
    assert!(report.final_sharp_utility >= 0.0 && report.final_sharp_utility <= bound);
    assert!((report.total_waste - report.waste.iter().sum::<f64>()).abs() < 1e-9);
}

#[test]
fn golden_plan_completes_the_two_valuable_targets() {
    let s = golden();
    let report = Planner::new(s.clone(), PlannerConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_well_formed(&s, &report);

    let masks: Vec<Vec<usize>> = report.rounds.iter().map(|r| r.mask.clone()).collect();
    assert_eq!(masks, vec![vec![0, 1], vec![1]]);

    let first = report.rounds[0].multiplier.expect("round 1 solves the dual");
    assert_eq!(first.method, DualMethod::Bracketed);
    assert!(first.residual <= 0.0);

    assert_eq!(report.final_sharp_utility, 15.0);
    assert_eq!(report.usage.totals(), vec![1, 2, 0]);
    assert_eq!(report.total_waste, 0.0);
}

#[test]
fn solver_failure_names_the_exposure() {
    let cfg = PlannerConfig {
        dual: DualConfig {
            brent: BrentConfig {
                max_iter: 0,
                ..BrentConfig::default()
            },
            ..DualConfig::default()
        },
        ..PlannerConfig::default()
    };
    let mut planner = Planner::new(golden(), cfg).unwrap();
    let err = planner.run().unwrap_err();
    assert!(matches!(
        err,
        PlanError::DualSolveFailure { round: Some(0), .. }
    ));
    assert!(err.to_string().contains("exposure 1"));
    assert_eq!(planner.next_round(), 0);
}

#[test]
fn invalid_scenarios_are_rejected_before_planning() {
    let mut s = golden();
    s.t_exp = -1.0;
    assert!(matches!(
        Planner::new(s, PlannerConfig::default()),
        Err(PlanError::InvalidScenario(_))
    ));
}

#[test]
fn greedy_baseline_fills_edge1_exactly() {
    // Long targets always outrank short ones, leaving 40 fibers per exposure for fresh
    // one-shot targets: 60 * 10 + 400 * 0.5.
    let s = Scenario::edge1();
    let report = Planner::new(s.clone(), greedy()).unwrap().run().unwrap();
    assert_well_formed(&s, &report);
    assert_eq!(report.final_sharp_utility, 800.0);
    assert_eq!(report.total_waste, 0.0);
    for r in &report.rounds {
        assert_eq!(r.fibers_used, 100);
        assert!(r.mask[..60].iter().copied().eq(0..60));
    }
}

#[test]
fn dual_policy_fills_edge1_exactly() {
    // Every fiber does useful work: 60 * 10 + 400 * 0.5.
    let s = Scenario::edge1();
    let report = Planner::new(s.clone(), PlannerConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_well_formed(&s, &report);
    assert_eq!(report.final_sharp_utility, 800.0);
    assert_eq!(report.total_waste, 0.0);
    for r in &report.rounds {
        let mut sorted = r.mask.clone();
        sorted.dedup();
        assert_eq!(sorted, r.mask, "mask must be sorted and distinct");
        assert_eq!(r.fibers_used, 100);
    }
}

#[test]
fn dual_policy_fills_edge2_exactly() {
    // 120 * 10 long-target exposures leave 1300 fibers for one-shot targets:
    // 120 * 10 + 1300 * 0.5.
    let s = Scenario::edge2();
    let report = Planner::new(s.clone(), PlannerConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_well_formed(&s, &report);
    assert_eq!(report.final_sharp_utility, 1850.0);
    assert_eq!(report.total_waste, 0.0);
}

#[test]
fn fractional_exposures_complete_without_an_extra_pass() {
    // 2.1 / 0.7 is three exposures even though the float quotient rounds above 3.
    let s = Scenario::new(1, 4, 0.7, vec![1.0], vec![2.1]).unwrap();
    let report = Planner::new(s.clone(), PlannerConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_well_formed(&s, &report);
    assert_eq!(report.usage.totals(), vec![3]);
    assert_eq!(report.final_sharp_utility, 1.0);
    assert_eq!(report.total_waste, 0.0);
    assert!(report.rounds[3].mask.is_empty());
}

#[cfg(feature = "stochastic")]
#[test]
fn power_law_runs_reproducibly() {
    let s = Scenario::power_law(3).unwrap();
    let a = Planner::new(s.clone(), PlannerConfig::default())
        .unwrap()
        .run()
        .unwrap();
    let b = Planner::new(s.clone(), PlannerConfig::default())
        .unwrap()
        .run()
        .unwrap();
    assert_well_formed(&s, &a);
    assert_eq!(a, b);
}

#[cfg(feature = "serde")]
mod resume {
    use super::*;
    use fiberplan::PlanSnapshot;

    fn resumed(s: Scenario, cfg: PlannerConfig, pause_at: usize) -> PlanReport {
        let mut first = Planner::new(s, cfg).unwrap();
        first.run_range(0, pause_at).unwrap();
        let json = serde_json::to_string(&first.snapshot()).unwrap();

        let snapshot: PlanSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.next_round, pause_at);
        let mut second = Planner::from_snapshot(snapshot, cfg).unwrap();
        second.run().unwrap()
    }

    fn strip_records(mut r: PlanReport) -> PlanReport {
        r.rounds.clear();
        r
    }

    #[test]
    fn resuming_golden_matches_an_uninterrupted_run() {
        let cfg = PlannerConfig::default();
        let full = Planner::new(golden(), cfg).unwrap().run().unwrap();
        let resumed = resumed(golden(), cfg, 1);
        assert_eq!(resumed.rounds.len(), 1);
        assert_eq!(strip_records(resumed), strip_records(full));
    }

    #[test]
    fn resuming_edge1_matches_an_uninterrupted_run() {
        for cfg in [PlannerConfig::default(), greedy()] {
            let full = Planner::new(Scenario::edge1(), cfg).unwrap().run().unwrap();
            let resumed = resumed(Scenario::edge1(), cfg, 4);
            assert_eq!(
                resumed.rounds.as_slice(),
                &full.rounds[4..],
                "{:?}",
                cfg.policy
            );
            assert_eq!(strip_records(resumed), strip_records(full));
        }
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = Planner::new(golden(), PlannerConfig::default())
            .unwrap()
            .run()
            .unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: PlanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
