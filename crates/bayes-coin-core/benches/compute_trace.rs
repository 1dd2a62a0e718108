use bayes_coin_core::{HypothesisGrid, LikelihoodMode, ObservationSequence, PosteriorUpdater, Prior};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn compute_trace_bench(c: &mut Criterion) {
    let observations = ObservationSequence::default_sample();
    let mut group = c.benchmark_group("compute_trace");
    for points in [200usize, 2_000] {
        let grid = HypothesisGrid::new(points).expect("grid");
        let prior = Prior::uniform(&grid);
        for mode in [LikelihoodMode::Direct, LikelihoodMode::LogSpace] {
            let updater = PosteriorUpdater::new(mode);
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), points),
                &points,
                |b, _| {
                    b.iter(|| {
                        black_box(
                            updater
                                .compute_trace(&observations, &grid, &prior)
                                .expect("trace"),
                        )
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, compute_trace_bench);
criterion_main!(benches);
