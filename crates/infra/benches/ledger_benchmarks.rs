use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use bagforge_core::{ComponentId, JobId, MaterialId, OrderId};
use bagforge_events::InMemoryEventBus;
use bagforge_infra::posting::{PostingService, consumption_movements};
use bagforge_infra::reversal::ReversalService;
use bagforge_infra::stock_store::{InMemoryStockStore, StockStore};
use bagforge_inventory::{LedgerEntry, NewMaterial, StockEvent, plan_reversal};
use bagforge_production::{Component, Job, OrderQuantity};
use rust_decimal::Decimal;
use std::sync::Arc;

type Store = Arc<InMemoryStockStore>;
type Bus = Arc<InMemoryEventBus<StockEvent>>;

fn setup() -> (PostingService<Store, Bus>, ReversalService<Store, Bus>, Store) {
    let store: Store = Arc::new(InMemoryStockStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    (
        PostingService::new(store.clone(), bus.clone()),
        ReversalService::new(store.clone(), bus),
        store,
    )
}

fn material(posting: &PostingService<Store, Bus>) -> MaterialId {
    posting
        .onboard_material(NewMaterial::new("PP fabric", "m").with_opening_quantity(Decimal::from(1_000_000)))
        .unwrap()
        .id()
}

/// A job with `size` components sharing `materials` round-robin.
fn job(materials: &[MaterialId], size: usize) -> Job {
    let order = OrderId::new();
    let kinds = ["cutting", "printing", "stitching", "handle", "zip"];
    (0..size).fold(Job::new(JobId::new(), order, "JC-BENCH"), |job, i| {
        job.with_component(
            Component::manual(
                ComponentId::new(),
                order,
                kinds[i % kinds.len()],
                Some(materials[i % materials.len()]),
                Decimal::new(125, 1),
                OrderQuantity::try_from(1u32).unwrap(),
            )
            .unwrap(),
        )
    })
}

fn bench_post_consumption_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("post_consumption_latency");
    group.sample_size(1000);

    group.bench_function("single_component", |b| {
        let (posting, _, _) = setup();
        let m = material(&posting);
        b.iter(|| {
            posting
                .post_consumption(
                    black_box(m),
                    ComponentId::new(),
                    "cutting".into(),
                    Decimal::ONE,
                    OrderId::new(),
                    JobId::new(),
                )
                .unwrap()
        });
    });

    group.finish();
}

fn bench_job_post_and_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_post_and_reverse");

    for size in [1usize, 5, 20].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (posting, reversal, _) = setup();
            let materials: Vec<MaterialId> = (0..3).map(|_| material(&posting)).collect();
            b.iter(|| {
                let job = job(&materials, size);
                posting.post_job_consumption(&job).unwrap();
                black_box(reversal.reverse_job_consumption(&job).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_reversal_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("reversal_planning");

    for postings in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*postings as u64));
        group.bench_with_input(BenchmarkId::from_parameter(postings), postings, |b, &postings| {
            let (posting, _, store) = setup();
            let materials: Vec<MaterialId> = (0..3).map(|_| material(&posting)).collect();
            let job = job(&materials, 5);
            // Re-posting the same job builds up history the planner has to sort through.
            for _ in 0..postings {
                store.commit(consumption_movements(&job)).unwrap();
            }
            let entries: Vec<LedgerEntry> = store.entries_for_reference(job.id.into()).unwrap();

            b.iter(|| black_box(plan_reversal(black_box(&job), black_box(&entries))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_post_consumption_latency,
    bench_job_post_and_reverse,
    bench_reversal_planning
);
criterion_main!(benches);
