//! Benchmarks for paired bootstrap resampling

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mt_pairwise_eval::{
    AlignedCorpus, BootstrapConfig, BootstrapEngine, LanguagePair, PairwiseComparator, ZeroEdit,
};

fn create_corpus(n: usize) -> AlignedCorpus {
    let source = (0..n).map(|i| format!("source sentence {i}")).collect();
    let reference: Vec<String> = (0..n).map(|i| format!("reference {i}")).collect();
    let x = (0..n)
        .map(|i| if i % 3 == 0 { format!("x {i}") } else { reference[i].clone() })
        .collect();
    let y = (0..n)
        .map(|i| if i % 2 == 0 { format!("y {i}") } else { reference[i].clone() })
        .collect();
    AlignedCorpus::paired(source, x, y, reference, LanguagePair::new("en", "de"))
        .unwrap_or_else(|e| panic!("benchmark corpus: {e}"))
}

fn benchmark_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap");

    for size in &[100, 1000, 5000] {
        let corpus = create_corpus(*size);
        let precomputed = PairwiseComparator::new()
            .compare(&ZeroEdit, &corpus)
            .unwrap_or_else(|e| panic!("benchmark scores: {e}"));
        let engine = BootstrapEngine::new(BootstrapConfig {
            num_samples: 100,
            ..BootstrapConfig::default()
        })
        .unwrap_or_else(|e| panic!("benchmark engine: {e}"));

        group.bench_function(format!("segment_mean_{size}"), |b| {
            b.iter(|| engine.run(black_box(&corpus), &ZeroEdit, Some(&precomputed)));
        });
        group.bench_function(format!("recompute_{size}"), |b| {
            b.iter(|| engine.run(black_box(&corpus), &ZeroEdit, None));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_bootstrap);
criterion_main!(benches);
