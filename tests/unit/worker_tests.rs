//! Worker pool offload tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_conduit::worker::{DeterministicPool, TokioPool, WorkerPool};
use std::sync::Mutex;

#[tokio::test]
async fn deterministic_pool_runs_tasks_in_spawn_order() {
    let pool = DeterministicPool::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = Arc::clone(&order);
        pool.spawn(Box::pin(async move {
            order.lock().unwrap().push(i);
        }));
    }

    assert_eq!(pool.pending(), 3);
    pool.run_all().await;
    assert_eq!(pool.pending(), 0);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn deterministic_pool_holds_tasks_until_driven() {
    let pool = DeterministicPool::new();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    pool.spawn(Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    pool.run_all().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tokio_pool_executes_spawned_tasks() {
    let pool = TokioPool;
    let (tx, rx) = tokio::sync::oneshot::channel();
    pool.spawn(Box::pin(async move {
        let _ = tx.send(41 + 1);
    }));
    assert_eq!(rx.await.unwrap(), 42);
}
