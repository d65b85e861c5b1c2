use checkpoint_store::{CheckpointStore, Metadata, TransactionId};
use criterion::{Criterion, criterion_group, criterion_main};

fn make_state(rows: usize) -> serde_json::Value {
    serde_json::json!({
        "rows": (0..rows)
            .map(|i| serde_json::json!({"id": i, "name": format!("row-{i}")}))
            .collect::<Vec<_>>()
    })
}

fn bench_create_checkpoint(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let state = make_state(10);

    c.bench_function("checkpoint_store/create_checkpoint", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = CheckpointStore::default();
                let tx = TransactionId::new("bench-txn");
                store
                    .create_checkpoint(&tx, 1, &state, Metadata::new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_create_100_checkpoints(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let state = make_state(10);

    c.bench_function("checkpoint_store/create_100_checkpoints", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = CheckpointStore::default();
                let tx = TransactionId::new("bench-txn");
                for index in 0..100 {
                    store
                        .create_checkpoint(&tx, index, &state, Metadata::new())
                        .await
                        .unwrap();
                }
            });
        });
    });
}

fn bench_sweep_expired(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let state = make_state(1);

    c.bench_function("checkpoint_store/sweep_1000_expired", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = CheckpointStore::default();
                for t in 0..100 {
                    let tx = TransactionId::new(format!("bench-txn-{t}"));
                    for index in 0..10 {
                        store
                            .create_checkpoint(&tx, index, &state, Metadata::new())
                            .await
                            .unwrap();
                    }
                }
                let cutoff = chrono::Utc::now() + chrono::Duration::seconds(1);
                store.sweep_expired_before(cutoff).await;
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_checkpoint,
    bench_create_100_checkpoints,
    bench_sweep_expired
);
criterion_main!(benches);
