// Copyright 2023 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire-level interfaces. These are plain `async_trait`s rather than generated gRPC
//! stubs: the transport is a length-delimited, JSON-encoded request/response stream (see
//! [`codec`]), which keeps the protocol easy to drive from tests without standing up real
//! sockets.

pub mod codec;
pub mod tcp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MasterResult;

/// Reply to the worker-facing `status()` call made right after a worker authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Working,
    Finished,
    Idle,
}

/// Reply to the node-facing `info()` call, made once pairing completes so the Master can size
/// its scheduling decisions against the node's real capacity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    pub cores: u32,
    pub cpu: u32,
    pub memory: u64,
}

/// The payload of a `run_task` message: everything a worker needs to start either a main
/// task or a sub-work-unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunTask {
    pub task_instance_id: u64,
    pub task_key: String,
    pub args: serde_json::Value,
    pub subtask_key: Option<String>,
    pub workunit_key: Option<String>,
    pub available_workers: usize,
}

/// Master -> Node control RPC. The Master dials the node; the node is the RPC server.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// The trivial username/password login performed right after dialing, ahead of the real RSA
    /// pairing in [`crate::admission`]. A placeholder per the design: it establishes nothing about
    /// trust, only that something answering the node protocol is listening.
    async fn login(&self, username: String, password: String) -> MasterResult<bool>;
    async fn get_key(&self) -> MasterResult<Vec<u8>>;
    async fn info(&self) -> MasterResult<NodeInfo>;
    async fn init(&self, master_host: String, master_port: u16, node_key: Vec<u8>) -> MasterResult<()>;
}

/// Master -> Worker RPC. The worker dials the Master, but once connected the Master still
/// drives it with these calls over the same stream.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn status(&self) -> MasterResult<WorkerStatus>;
    async fn run_task(&self, task: RunTask) -> MasterResult<()>;
    async fn stop_task(&self) -> MasterResult<()>;
    async fn task_status(&self) -> MasterResult<i64>;
    async fn return_work(&self, subtask_key: String, workunit_key: String) -> MasterResult<()>;
    async fn receive_results(
        &self,
        results: serde_json::Value,
        subtask_key: String,
        workunit_key: String,
    ) -> MasterResult<()>;
    /// A worker found `Finished` at admission is asked for the result it is holding, so it can
    /// be routed exactly like a live `send_results` instead of being silently dropped.
    async fn fetch_finished_results(&self) -> MasterResult<serde_json::Value>;
}

/// The worker's unprompted first message on a freshly accepted connection, authenticating itself
/// against the credential the Master registered for this slot at node admission time (§4.2 step
/// 5). Anything else arriving first is a protocol violation and the connection is dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerHello {
    pub worker_key: String,
    pub secret: String,
}

/// Worker -> Master callbacks, delivered by the worker-facing listener into the coordinator.
/// Unlike the two traits above, these are not dispatched through a trait object: the listener
/// decodes one of these off the wire and calls the matching `Coordinator` method directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WorkerCallback {
    SendResults {
        worker_key: String,
        results: serde_json::Value,
        workunit_key: Option<String>,
    },
    TaskFailed {
        worker_key: String,
        results: serde_json::Value,
        workunit_key: Option<String>,
    },
    WorkerStopped {
        worker_key: String,
    },
    RequestWorker {
        worker_key: String,
        subtask_key: String,
        args: serde_json::Value,
        workunit_key: String,
    },
}
