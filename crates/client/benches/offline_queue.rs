use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use marketsync_client::OfflineQueue;
use marketsync_core::{BidMutation, MutationKind};
use marketsync_infra::InMemoryKvStore;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

fn bid(n: usize) -> BidMutation {
    BidMutation {
        service_id: format!("svc-{n}"),
        amount: 25.0 + n as f64,
        message: "Available this week".to_string(),
        duration_days: 2,
    }
}

fn bench_enqueue_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("enqueue_latency");
    group.throughput(Throughput::Elements(1));

    group.bench_function("bid_in_memory", |b| {
        let queue = OfflineQueue::new(Arc::new(InMemoryKvStore::new()));
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            let id = rt.block_on(queue.enqueue(bid(n))).expect("enqueue");
            black_box(id);
        });
    });

    group.finish();
}

fn bench_pending_snapshot(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("pending_snapshot");

    for queued in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*queued as u64));
        group.bench_with_input(BenchmarkId::from_parameter(queued), queued, |b, &queued| {
            let queue = OfflineQueue::new(Arc::new(InMemoryKvStore::new()));
            rt.block_on(async {
                for n in 0..queued {
                    queue.enqueue(bid(n)).await.expect("enqueue");
                }
            });

            b.iter(|| {
                let pending = rt
                    .block_on(queue.all_pending(MutationKind::Bid))
                    .expect("snapshot");
                black_box(pending.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_enqueue_latency, bench_pending_snapshot);
criterion_main!(benches);
