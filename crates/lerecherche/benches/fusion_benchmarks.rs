// Benchmarks for rank fusion and run finalization
//
// Run with: cargo bench --bench fusion_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lerecherche::{finalize, reciprocal_rank_fusion, DEFAULT_RRF_K};
use lestockage::SearchResult;

fn ranking(prefix: &str, len: usize, stride: usize) -> Vec<SearchResult> {
    (0..len)
        .map(|i| SearchResult::new(format!("{}{}", prefix, (i * stride) % (len * 2)), (len - i) as f64))
        .collect()
}

fn bench_reciprocal_rank_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("reciprocal_rank_fusion");

    for top_n in [10, 100, 1000].iter() {
        let lexical = ranking("d", *top_n, 1);
        let vector = ranking("d", *top_n, 3);
        group.bench_with_input(BenchmarkId::from_parameter(top_n), top_n, |b, &top_n| {
            b.iter(|| black_box(reciprocal_rank_fusion(&lexical, &vector, DEFAULT_RRF_K, top_n)));
        });
    }

    group.finish();
}

fn bench_finalize(c: &mut Criterion) {
    let per_query: Vec<(String, Vec<SearchResult>)> = (0..200)
        .rev()
        .map(|q| (format!("q{}", q), ranking("d", 100, 1)))
        .collect();

    c.bench_function("finalize_200_queries", |b| {
        b.iter(|| black_box(finalize(per_query.clone(), "bench")));
    });
}

criterion_group!(benches, bench_reciprocal_rank_fusion, bench_finalize);
criterion_main!(benches);
