use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::{Duration, Utc};
use docembed_core::DocumentId;
use docembed_infra::documents::InMemoryDocumentStore;
use docembed_infra::embedding::{BatchEmbedder, HashingProvider};
use docembed_infra::jobs::{
    Dispatcher, InMemoryJobStore, Job, JobProcessor, JobStore, StatsAggregator,
};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn seeded_store(rt: &Runtime, jobs: usize) -> Arc<InMemoryJobStore> {
    let store = InMemoryJobStore::arc();
    let base = Utc::now() - Duration::hours(1);
    rt.block_on(async {
        for i in 0..jobs {
            let job = Job::new(DocumentId::new(), (i % 10) as i32, 3)
                .created_at(base + Duration::milliseconds(i as i64));
            store.insert_job(job).await.unwrap();
        }
    });
    store
}

fn bench_fetch_eligible(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_eligible_jobs");
    let rt = runtime();

    for queue_depth in [100, 1_000, 10_000].iter() {
        let store = seeded_store(&rt, *queue_depth);
        group.bench_with_input(
            BenchmarkId::new("in_memory", queue_depth),
            queue_depth,
            |b, _| {
                b.iter(|| black_box(rt.block_on(store.fetch_eligible_jobs(5)).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_stats_snapshot(c: &mut Criterion) {
    let rt = runtime();
    let store = seeded_store(&rt, 10_000);
    let stats = StatsAggregator::new(store);

    c.bench_function("stats_snapshot_10k", |b| {
        b.iter(|| black_box(rt.block_on(stats.snapshot()).unwrap()));
    });
}

fn bench_dispatch_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_cycle");
    let rt = runtime();

    for chunks in [1, 10, 50].iter() {
        group.throughput(Throughput::Elements(*chunks as u64 * 5));
        group.bench_with_input(BenchmarkId::new("hashing_provider", chunks), chunks, |b, &n| {
            b.iter_batched(
                || {
                    let jobs = InMemoryJobStore::arc();
                    let docs = InMemoryDocumentStore::arc();
                    rt.block_on(async {
                        for _ in 0..5 {
                            let doc = DocumentId::new();
                            docs.insert_document(doc).unwrap();
                            for i in 0..n {
                                docs.add_chunk(doc, format!("chunk {i} of the benchmark document"))
                                    .unwrap();
                            }
                            jobs.create_job(doc, 0, 3).await.unwrap();
                        }
                    });
                    let processor = Arc::new(JobProcessor::new(
                        jobs.clone(),
                        docs,
                        BatchEmbedder::new(Arc::new(HashingProvider::default())),
                    ));
                    Dispatcher::new(jobs, processor)
                },
                |dispatcher| black_box(rt.block_on(dispatcher.dispatch()).unwrap()),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fetch_eligible,
    bench_stats_snapshot,
    bench_dispatch_cycle
);
criterion_main!(benches);
