#![allow(dead_code)]

// Test-only fakes for the coordinator's dependency-injected collaborators: a `NodeTransport` and
// `WorkerTransport` pair that never touch a real socket, a `NodeDialer` that hands back
// pre-registered fakes, and a `Clock` whose `sleep` returns immediately while recording the
// requested durations, so the reconnect backoff sequence can be asserted without waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cluster_master::clock::Clock;
use cluster_master::conn::NodeDialer;
use cluster_master::error::MasterResult;
use cluster_master::rpc::{NodeInfo, NodeTransport, RunTask, WorkerStatus, WorkerTransport};

pub struct FakeNodeTransport {
    pub key: Vec<u8>,
    pub cores: u32,
}

impl FakeNodeTransport {
    pub fn new(key: Vec<u8>, cores: u32) -> Self {
        Self { key, cores }
    }
}

#[async_trait]
impl NodeTransport for FakeNodeTransport {
    async fn login(&self, _username: String, _password: String) -> MasterResult<bool> {
        Ok(true)
    }

    async fn get_key(&self) -> MasterResult<Vec<u8>> {
        Ok(self.key.clone())
    }

    async fn info(&self) -> MasterResult<NodeInfo> {
        Ok(NodeInfo { cores: self.cores, cpu: 2400, memory: 16 * 1024 * 1024 * 1024 })
    }

    async fn init(&self, _master_host: String, _master_port: u16, _node_key: Vec<u8>) -> MasterResult<()> {
        Ok(())
    }
}

/// A [`NodeDialer`] that always fails; used to drive the connection manager's retry/backoff path
/// without a real listener to refuse the connection.
pub struct AlwaysFailDialer;

#[async_trait]
impl NodeDialer for AlwaysFailDialer {
    async fn dial(&self, _host: &str, _port: u16) -> MasterResult<Arc<dyn NodeTransport>> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into())
    }
}

#[derive(Default)]
pub struct WorkerCalls {
    pub run_task: Vec<RunTask>,
    pub stop_task: u32,
    pub return_work: Vec<(String, String)>,
    pub receive_results: Vec<(serde_json::Value, String, String)>,
}

/// A worker transport whose every call is recorded into `calls` for assertions, and whose
/// `status()` reply is configurable up front (idle workers are the common case).
pub struct FakeWorkerTransport {
    pub status: WorkerStatus,
    pub calls: Mutex<WorkerCalls>,
}

impl FakeWorkerTransport {
    pub fn idle() -> Self {
        Self { status: WorkerStatus::Idle, calls: Mutex::new(WorkerCalls::default()) }
    }
}

#[async_trait]
impl WorkerTransport for FakeWorkerTransport {
    async fn status(&self) -> MasterResult<WorkerStatus> {
        Ok(self.status)
    }

    async fn run_task(&self, task: RunTask) -> MasterResult<()> {
        self.calls.lock().unwrap().run_task.push(task);
        Ok(())
    }

    async fn stop_task(&self) -> MasterResult<()> {
        self.calls.lock().unwrap().stop_task += 1;
        Ok(())
    }

    async fn task_status(&self) -> MasterResult<i64> {
        Ok(42)
    }

    async fn return_work(&self, subtask_key: String, workunit_key: String) -> MasterResult<()> {
        self.calls.lock().unwrap().return_work.push((subtask_key, workunit_key));
        Ok(())
    }

    async fn receive_results(
        &self,
        results: serde_json::Value,
        subtask_key: String,
        workunit_key: String,
    ) -> MasterResult<()> {
        self.calls.lock().unwrap().receive_results.push((results, subtask_key, workunit_key));
        Ok(())
    }

    async fn fetch_finished_results(&self) -> MasterResult<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}

/// A [`Clock`] for deterministic tests: `now_unix` is a monotonically increasing counter advanced
/// one tick per call, and `sleep` never actually waits — it just appends the requested duration to
/// `slept`, so a test can assert the exact backoff sequence in milliseconds of real time.
#[derive(Clone, Default)]
pub struct TestClock {
    tick: Arc<AtomicU64>,
    pub slept: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Clock for TestClock {
    fn now_unix(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

