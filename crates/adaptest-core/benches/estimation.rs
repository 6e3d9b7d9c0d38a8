use criterion::{black_box, criterion_group, criterion_main, Criterion};

use adaptest_core::estimator::AbilityEstimator;
use adaptest_core::model::Observation;

fn history(n: usize) -> Vec<Observation> {
    (0..n)
        .map(|i| {
            let b = -3.0 + 6.0 * i as f64 / n as f64;
            Observation::new(b, i % 3 != 0)
        })
        .collect()
}

fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate");
    let estimator = AbilityEstimator::default();

    for n in [5, 15, 30] {
        let obs = history(n);
        group.bench_function(format!("mixed n={n}"), |b| {
            b.iter(|| estimator.estimate(black_box(&obs)))
        });
    }

    group.bench_function("all correct n=30", |b| {
        let obs: Vec<Observation> = (0..30).map(|_| Observation::new(0.5, true)).collect();
        b.iter(|| estimator.estimate(black_box(&obs)))
    });

    group.finish();
}

criterion_group!(benches, bench_estimate);
criterion_main!(benches);
