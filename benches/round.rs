use criterion::{criterion_group, criterion_main, Criterion};
use fiberplan::{DualConfig, ModelConfig, Planner, PlannerConfig, Policy, RoundInputs, Scenario};
use std::hint::black_box;

fn bench_round(c: &mut Criterion) {
    let s = Scenario::edge1();
    let remaining: Vec<u32> = (0..s.n()).map(|i| s.remaining_exposures(i, 0)).collect();
    let inputs = RoundInputs::new(&s.u_max, remaining, s.l as u32, s.k);
    let model = ModelConfig::default();
    let dual = DualConfig::default();

    c.bench_function("round/edge1/solve", |b| {
        b.iter(|| black_box(inputs.solve(&model, &dual)))
    });

    let mut group = c.benchmark_group("plan/edge1");
    group.sample_size(10);
    for (label, policy) in [("dual", Policy::Dual), ("greedy", Policy::Greedy)] {
        let cfg = PlannerConfig {
            policy,
            ..PlannerConfig::default()
        };
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut p = Planner::new(s.clone(), cfg).expect("valid scenario");
                black_box(p.run().expect("plan"))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_round);
criterion_main!(benches);
