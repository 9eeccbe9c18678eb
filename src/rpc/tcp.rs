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

//! TCP-backed implementations of [`NodeTransport`] and [`WorkerTransport`], each multiplexing
//! request/response pairs over one [`codec::spawn_link`] connection with a simple pending-request
//! map keyed by a monotonic id — there is no HOL-blocking: several calls may be in flight on one
//! connection at once, and replies are matched back to their caller out of order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::codec::{spawn_link, LinkHandle};
use super::{NodeInfo, NodeTransport, RunTask, WorkerCallback, WorkerHello, WorkerStatus, WorkerTransport};
use crate::error::{MasterError, MasterResult};

fn next_id(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed)
}

fn closed() -> MasterError {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed before reply").into()
}

// ---------------------------------------------------------------------------
// Node control RPC (Master dials out to the node)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
enum NodeRequestBody {
    Login { username: String, password: String },
    GetKey,
    Info,
    Init { master_host: String, master_port: u16, node_key: Vec<u8> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum NodeResponseBody {
    LoginOk(bool),
    Key(Vec<u8>),
    Info(NodeInfo),
    Ack,
    Err(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum NodeWireMessage {
    Request { id: u64, body: NodeRequestBody },
    Response { id: u64, body: NodeResponseBody },
}

type NodePending = Arc<Mutex<HashMap<u64, oneshot::Sender<NodeResponseBody>>>>;

/// The Master's end of a connection dialed to a node's control endpoint.
pub struct TcpNodeTransport {
    handle: LinkHandle<NodeWireMessage>,
    pending: NodePending,
    next_id: AtomicU64,
}

impl TcpNodeTransport {
    /// Dial `host:port` and return a ready-to-use transport. The caller (connection manager)
    /// treats any error here as a transport failure subject to reconnect backoff.
    pub async fn connect(host: &str, port: u16) -> MasterResult<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        let (handle, mut in_rx) = spawn_link::<TcpStream, NodeWireMessage>(stream);
        let pending: NodePending = Arc::new(Mutex::new(HashMap::new()));

        let pending_for_task = pending.clone();
        tokio::spawn(async move {
            while let Some(msg) = in_rx.recv().await {
                if let NodeWireMessage::Response { id, body } = msg {
                    if let Some(tx) = pending_for_task.lock().await.remove(&id) {
                        let _ = tx.send(body);
                    }
                }
            }
        });

        Ok(Self {
            handle,
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, body: NodeRequestBody) -> MasterResult<NodeResponseBody> {
        let id = next_id(&self.next_id);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        self.handle.send(&NodeWireMessage::Request { id, body }).await?;
        rx.await.map_err(|_| closed())
    }
}

#[async_trait]
impl NodeTransport for TcpNodeTransport {
    async fn login(&self, username: String, password: String) -> MasterResult<bool> {
        match self.call(NodeRequestBody::Login { username, password }).await? {
            NodeResponseBody::LoginOk(ok) => Ok(ok),
            NodeResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to login".into())),
        }
    }

    async fn get_key(&self) -> MasterResult<Vec<u8>> {
        match self.call(NodeRequestBody::GetKey).await? {
            NodeResponseBody::Key(key) => Ok(key),
            NodeResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to get_key".into())),
        }
    }

    async fn info(&self) -> MasterResult<NodeInfo> {
        match self.call(NodeRequestBody::Info).await? {
            NodeResponseBody::Info(info) => Ok(info),
            NodeResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to info".into())),
        }
    }

    async fn init(&self, master_host: String, master_port: u16, node_key: Vec<u8>) -> MasterResult<()> {
        match self
            .call(NodeRequestBody::Init { master_host, master_port, node_key })
            .await?
        {
            NodeResponseBody::Ack => Ok(()),
            NodeResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to init".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker RPC (worker dials in; Master still drives it over the accepted socket)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum WorkerRequestBody {
    Status,
    RunTask(RunTask),
    StopTask,
    TaskStatus,
    ReturnWork { subtask_key: String, workunit_key: String },
    ReceiveResults { results: serde_json::Value, subtask_key: String, workunit_key: String },
    FetchFinishedResults,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum WorkerResponseBody {
    Status(WorkerStatus),
    Progress(i64),
    Results(serde_json::Value),
    Ack,
    Err(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum WorkerWireMessage {
    Hello(WorkerHello),
    Request { id: u64, body: WorkerRequestBody },
    Response { id: u64, body: WorkerResponseBody },
    Callback(WorkerCallback),
}

type WorkerPending = Arc<Mutex<HashMap<u64, oneshot::Sender<WorkerResponseBody>>>>;

/// The Master's end of an accepted worker connection. `callbacks` yields every
/// [`WorkerCallback`] the worker sends, for the listener loop to route into the coordinator.
pub struct TcpWorkerTransport {
    handle: LinkHandle<WorkerWireMessage>,
    pending: WorkerPending,
    next_id: AtomicU64,
}

impl TcpWorkerTransport {
    /// Wrap an accepted socket. Returns the transport, a channel of callbacks the worker sends
    /// unprompted (`send_results`, `task_failed`, `worker_stopped`, `request_worker`), and a
    /// one-shot yielding the worker's login [`WorkerHello`], which must be the first frame it
    /// sends. The caller awaits the hello, checks it against the credential registry, and only
    /// then proceeds to admission; nothing here enforces that ordering itself.
    pub fn new(stream: TcpStream) -> (Self, mpsc::Receiver<WorkerCallback>, oneshot::Receiver<WorkerHello>) {
        let (handle, mut in_rx) = spawn_link::<TcpStream, WorkerWireMessage>(stream);
        let pending: WorkerPending = Arc::new(Mutex::new(HashMap::new()));
        let (cb_tx, cb_rx) = mpsc::channel(64);
        let (hello_tx, hello_rx) = oneshot::channel();

        let pending_for_task = pending.clone();
        tokio::spawn(async move {
            let mut hello_tx = Some(hello_tx);
            while let Some(msg) = in_rx.recv().await {
                match msg {
                    WorkerWireMessage::Hello(hello) => {
                        if let Some(tx) = hello_tx.take() {
                            let _ = tx.send(hello);
                        } else {
                            tracing::warn!("worker sent a second hello; ignoring");
                        }
                    }
                    WorkerWireMessage::Response { id, body } => {
                        if let Some(tx) = pending_for_task.lock().await.remove(&id) {
                            let _ = tx.send(body);
                        }
                    }
                    WorkerWireMessage::Callback(callback) => {
                        if cb_tx.send(callback).await.is_err() {
                            break;
                        }
                    }
                    WorkerWireMessage::Request { .. } => {
                        tracing::warn!("worker sent a request; workers never initiate requests");
                    }
                }
            }
        });

        (
            Self {
                handle,
                pending,
                next_id: AtomicU64::new(1),
            },
            cb_rx,
            hello_rx,
        )
    }

    async fn call(&self, body: WorkerRequestBody) -> MasterResult<WorkerResponseBody> {
        let id = next_id(&self.next_id);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        self.handle.send(&WorkerWireMessage::Request { id, body }).await?;
        rx.await.map_err(|_| closed())
    }
}

#[async_trait]
impl WorkerTransport for TcpWorkerTransport {
    async fn status(&self) -> MasterResult<WorkerStatus> {
        match self.call(WorkerRequestBody::Status).await? {
            WorkerResponseBody::Status(status) => Ok(status),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to status".into())),
        }
    }

    async fn run_task(&self, task: RunTask) -> MasterResult<()> {
        match self.call(WorkerRequestBody::RunTask(task)).await? {
            WorkerResponseBody::Ack => Ok(()),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to run_task".into())),
        }
    }

    async fn stop_task(&self) -> MasterResult<()> {
        match self.call(WorkerRequestBody::StopTask).await? {
            WorkerResponseBody::Ack => Ok(()),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to stop_task".into())),
        }
    }

    async fn task_status(&self) -> MasterResult<i64> {
        match self.call(WorkerRequestBody::TaskStatus).await? {
            WorkerResponseBody::Progress(value) => Ok(value),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to task_status".into())),
        }
    }

    async fn return_work(&self, subtask_key: String, workunit_key: String) -> MasterResult<()> {
        match self
            .call(WorkerRequestBody::ReturnWork { subtask_key, workunit_key })
            .await?
        {
            WorkerResponseBody::Ack => Ok(()),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to return_work".into())),
        }
    }

    async fn receive_results(
        &self,
        results: serde_json::Value,
        subtask_key: String,
        workunit_key: String,
    ) -> MasterResult<()> {
        match self
            .call(WorkerRequestBody::ReceiveResults { results, subtask_key, workunit_key })
            .await?
        {
            WorkerResponseBody::Ack => Ok(()),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to receive_results".into())),
        }
    }

    async fn fetch_finished_results(&self) -> MasterResult<serde_json::Value> {
        match self.call(WorkerRequestBody::FetchFinishedResults).await? {
            WorkerResponseBody::Results(results) => Ok(results),
            WorkerResponseBody::Err(err) => Err(MasterError::Crypto(err)),
            _ => Err(MasterError::Crypto("unexpected reply to fetch_finished_results".into())),
        }
    }
}
