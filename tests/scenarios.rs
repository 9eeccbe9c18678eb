//! End-to-end scenarios against the coordinator, a real `MemStore`, and fake transports — no real
//! sockets, no real wall-clock waiting. These exercise the cross-cutting invariants (P1-P3, P6-P8)
//! that no single module's unit tests can see on their own.

mod support;

use std::sync::Arc;

use cluster_master::config::MasterConfig;
use cluster_master::coordinator::Coordinator;
use cluster_master::crypto::MasterKeypair;
use cluster_master::model::{CompletionType, Node};
use cluster_master::store::MemStore;
use support::{AlwaysFailDialer, FakeNodeTransport, FakeWorkerTransport, TestClock};

async fn admitted_node(
    coordinator: &Arc<Coordinator<TestClock>>,
    id: u32,
    cores: u32,
) -> Node {
    let node = Node::new(id, format!("10.0.0.{id}"), 9000);
    let transport = Arc::new(FakeNodeTransport::new(vec![id as u8; 32], cores));
    coordinator.on_connected(node, transport).await.expect("admission should succeed")
}

fn new_coordinator() -> Arc<Coordinator<TestClock>> {
    Coordinator::new(
        Arc::new(MemStore::new()),
        MasterKeypair::generate().unwrap(),
        MasterConfig::default(),
        TestClock::default(),
        Arc::new(AlwaysFailDialer),
        "127.0.0.1".to_string(),
        7070,
    )
}

/// Scenario 1: one node with 2 cores admitted, then a single task queued, dispatches to exactly
/// one of the two idle workers and leaves the other idle.
#[tokio::test]
async fn submit_on_empty_cluster_dispatches_to_one_idle_worker() {
    let coordinator = new_coordinator();
    let node = admitted_node(&coordinator, 1, 2).await;

    let w0 = Arc::new(FakeWorkerTransport::idle());
    let w1 = Arc::new(FakeWorkerTransport::idle());
    coordinator.on_worker_connected(node.worker_key(0), w0.clone()).await;
    coordinator.on_worker_connected(node.worker_key(1), w1.clone()).await;

    let instance = coordinator
        .queue_task("T".to_string(), serde_json::json!({"x": 1}), None)
        .await
        .unwrap();

    assert_eq!(instance.id, 1);

    let statuses = coordinator.task_statuses().await;
    let status = statuses.get(&instance.id).expect("instance should be tracked");
    assert_eq!(status.s, CompletionType::Running);

    let dispatched_to_w0 = !w0.calls.lock().unwrap().run_task.is_empty();
    let dispatched_to_w1 = !w1.calls.lock().unwrap().run_task.is_empty();
    assert!(dispatched_to_w0 ^ dispatched_to_w1, "exactly one worker should receive run_task");

    let run_task = if dispatched_to_w0 {
        w0.calls.lock().unwrap().run_task[0].clone()
    } else {
        w1.calls.lock().unwrap().run_task[0].clone()
    };
    assert_eq!(run_task.task_key, "T");
    assert_eq!(run_task.subtask_key, None);
    assert_eq!(run_task.available_workers, 2);
}

/// Scenario 2: one idle worker, three tasks submitted in order. The first runs; the rest queue in
/// FIFO order and advance one at a time as the running task completes.
#[tokio::test]
async fn backpressure_preserves_fifo_order() {
    let coordinator = new_coordinator();
    let node = admitted_node(&coordinator, 1, 1).await;
    let worker = Arc::new(FakeWorkerTransport::idle());
    coordinator.on_worker_connected(node.worker_key(0), worker.clone()).await;

    let a = coordinator.queue_task("A".to_string(), serde_json::json!({}), None).await.unwrap();
    let b = coordinator.queue_task("B".to_string(), serde_json::json!({}), None).await.unwrap();
    let c = coordinator.queue_task("C".to_string(), serde_json::json!({}), None).await.unwrap();

    let statuses = coordinator.task_statuses().await;
    assert_eq!(statuses[&a.id].s, CompletionType::Running);
    assert_eq!(statuses[&b.id].s, CompletionType::Stopped);
    assert_eq!(statuses[&c.id].s, CompletionType::Stopped);
    assert_eq!(worker.calls.lock().unwrap().run_task.len(), 1);

    coordinator.send_results(node.worker_key(0), serde_json::json!({"ok": true}), None).await;

    let statuses = coordinator.task_statuses().await;
    assert_eq!(statuses[&b.id].s, CompletionType::Running);
    assert_eq!(statuses[&c.id].s, CompletionType::Stopped);
    assert_eq!(worker.calls.lock().unwrap().run_task.len(), 2);
    assert!(!statuses.contains_key(&a.id), "completed instance should no longer be reported");
}

/// Scenario 3: a main worker requests a sub-work-unit; the peer it gets assigned then disconnects.
/// The Master returns the unit to the main worker and the peer is fully removed from bookkeeping.
#[tokio::test]
async fn sub_unit_is_returned_to_main_worker_on_peer_loss() {
    let coordinator = new_coordinator();
    let node = admitted_node(&coordinator, 1, 2).await;
    let main_worker = Arc::new(FakeWorkerTransport::idle());
    let peer_worker = Arc::new(FakeWorkerTransport::idle());
    coordinator.on_worker_connected(node.worker_key(0), main_worker.clone()).await;
    coordinator.on_worker_connected(node.worker_key(1), peer_worker.clone()).await;

    let a = coordinator.queue_task("A".to_string(), serde_json::json!({}), None).await.unwrap();
    assert_eq!(main_worker.calls.lock().unwrap().run_task.len(), 1);

    coordinator
        .request_worker(
            node.worker_key(0),
            "s".to_string(),
            serde_json::json!({"i": 7}),
            "u".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(peer_worker.calls.lock().unwrap().run_task.len(), 1);

    // The peer's transport drops.
    coordinator.on_worker_disconnected(node.worker_key(1)).await;

    let returned = main_worker.calls.lock().unwrap().return_work.clone();
    assert_eq!(returned, vec![("s".to_string(), "u".to_string())]);

    let statuses = coordinator.task_statuses().await;
    assert_eq!(statuses[&a.id].s, CompletionType::Running, "the main task itself is untouched");
}

/// Scenario 4: a sub-worker reports `task_failed`. The whole instance is FAILED and every other
/// worker still assigned to it (here, the main worker) is told to stop.
#[tokio::test]
async fn failure_on_sub_unit_fails_the_whole_instance_and_stops_siblings() {
    let coordinator = new_coordinator();
    let node = admitted_node(&coordinator, 1, 2).await;
    let main_worker = Arc::new(FakeWorkerTransport::idle());
    let peer_worker = Arc::new(FakeWorkerTransport::idle());
    coordinator.on_worker_connected(node.worker_key(0), main_worker.clone()).await;
    coordinator.on_worker_connected(node.worker_key(1), peer_worker.clone()).await;

    let a = coordinator.queue_task("A".to_string(), serde_json::json!({}), None).await.unwrap();
    coordinator
        .request_worker(node.worker_key(0), "s".to_string(), serde_json::json!({}), "u".to_string())
        .await
        .unwrap();

    coordinator
        .task_failed(node.worker_key(1), serde_json::json!({"error": "boom"}), Some("u".to_string()))
        .await;

    let statuses = coordinator.task_statuses().await;
    assert!(!statuses.contains_key(&a.id), "failed instance is terminal, no longer reported");
    assert_eq!(main_worker.calls.lock().unwrap().stop_task, 1);
}

/// Scenario 5: cancelling a running task wins over a result that arrives afterwards for the same
/// instance — the instance stays CANCELLED, never flips to COMPLETE.
#[tokio::test]
async fn cancel_wins_over_a_late_result() {
    let coordinator = new_coordinator();
    let node = admitted_node(&coordinator, 1, 1).await;
    let worker = Arc::new(FakeWorkerTransport::idle());
    coordinator.on_worker_connected(node.worker_key(0), worker.clone()).await;

    let d = coordinator.queue_task("D".to_string(), serde_json::json!({}), None).await.unwrap();

    let cancelled = coordinator.cancel_task(d.id).await.unwrap();
    assert!(cancelled);
    assert_eq!(worker.calls.lock().unwrap().stop_task, 1);

    // The worker's acknowledgement races with (or simply ignores) the stop request and reports
    // a result anyway.
    coordinator.send_results(node.worker_key(0), serde_json::json!({"ok": true}), None).await;

    let instance = coordinator
        .task_statuses()
        .await
        .get(&d.id)
        .cloned();
    assert!(instance.is_none(), "cancelled instance is terminal and is never reported again");

    let run_task_calls = worker.calls.lock().unwrap().run_task.len();
    assert_eq!(run_task_calls, 1, "no re-dispatch should happen to the same worker for a cancelled task");
}

/// `send_results` always frees the worker back to idle, even for a cancelled instance's late
/// result — so a subsequent `queue_task` can still dispatch to it. This is the worker-availability
/// half of P7, checked directly rather than just inferred.
#[tokio::test]
async fn worker_returns_to_idle_after_late_result_on_cancelled_task() {
    let coordinator = new_coordinator();
    let node = admitted_node(&coordinator, 1, 1).await;
    let worker = Arc::new(FakeWorkerTransport::idle());
    coordinator.on_worker_connected(node.worker_key(0), worker.clone()).await;

    let d = coordinator.queue_task("D".to_string(), serde_json::json!({}), None).await.unwrap();
    coordinator.cancel_task(d.id).await.unwrap();
    coordinator.send_results(node.worker_key(0), serde_json::json!({}), None).await;

    let e = coordinator.queue_task("E".to_string(), serde_json::json!({}), None).await.unwrap();
    let statuses = coordinator.task_statuses().await;
    assert_eq!(statuses[&e.id].s, CompletionType::Running, "the freed worker should pick up the next task");
}

/// A node presenting a public key already bound to a different, already-paired node is rejected
/// as a duplicate and its record deleted (TOFU's documented failure mode).
#[tokio::test]
async fn duplicate_node_key_is_rejected() {
    let coordinator = new_coordinator();
    let _first = admitted_node(&coordinator, 1, 1).await;

    let second = Node::new(2, "10.0.0.2".to_string(), 9000);
    let dup_transport = Arc::new(FakeNodeTransport::new(vec![1u8; 32], 1));
    let err = coordinator.on_connected(second, dup_transport).await.unwrap_err();
    assert!(matches!(err, cluster_master::error::MasterError::DuplicateNodeKey(_, _)));
}
