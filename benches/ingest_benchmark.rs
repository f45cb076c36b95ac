use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use argus::core::now_millis;
use argus::engine::Engine;
use argus::parsing::PatternParser;

fn engine_with_queries(query_count: usize) -> Engine<String, String> {
    let engine: Engine<String, String> = Engine::new();
    let parser = PatternParser::new().unwrap();
    for i in 0..query_count {
        engine
            .register(
                format!("q{}", i),
                parser.parse(&format!("?x <p{}> ?y ; ?y <p{}> ?z", i, i)).unwrap(),
                0,
                |_, _| {},
            )
            .unwrap();
    }
    engine
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    for query_count in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("standing_queries", query_count),
            &query_count,
            |b, &query_count| {
                let engine = engine_with_queries(query_count);
                let mut i = 0u64;
                b.iter(|| {
                    let tuple = vec![
                        format!("s{}", i % 1000),
                        format!("p{}", i % query_count.max(1) as u64),
                        format!("o{}", i % 2000),
                    ];
                    engine.ingest(&tuple, 60);
                    i += 1;
                });
            },
        );
    }
    group.finish();
}

fn bench_eviction(c: &mut Criterion) {
    c.bench_function("evict_10k_expired", |b| {
        b.iter_batched(
            || {
                let engine = engine_with_queries(1);
                let now = now_millis();
                for i in 0..10_000u64 {
                    let tuple =
                        vec![format!("s{}", i), "p0".to_string(), format!("o{}", i)];
                    engine.ingest_at(&tuple, now + 1);
                }
                (engine, now)
            },
            |(engine, now)| {
                engine.evict_expired(now + 10_000);
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_ingest, bench_eviction);
criterion_main!(benches);
