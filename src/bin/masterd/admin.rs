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

//! The administrative RPC gateway exposed to a controller UI: a thin, unauthenticated pass-through
//! over the three coordinator operations named in the spec (`queue_task`, `cancel_task`,
//! `task_statuses`). Real authentication and a real wire protocol for a controller UI are out of
//! scope (§1); this is the stand-in the spec calls for.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use cluster_master::coordinator::Coordinator;
use cluster_master::model::{CompletionType, TaskInstanceId};
use cluster_master::status::TaskStatus;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Clone, Debug, Serialize, Deserialize)]
enum AdminRequest {
    QueueTask { task_key: String, args: serde_json::Value, subtask_key: Option<String> },
    CancelTask { id: TaskInstanceId },
    TaskStatuses,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum AdminResponse {
    Queued { id: TaskInstanceId, completion_type: CompletionType },
    Cancelled(bool),
    Statuses(HashMap<TaskInstanceId, TaskStatus>),
    Err(String),
}

pub async fn run_admin_listener(addr: SocketAddr, coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin listener bound");

    loop {
        let (stream, peer) = listener.accept().await?;
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_admin_connection(stream, coordinator).await {
                tracing::debug!(%peer, error = %err, "admin connection ended");
            }
        });
    }
}

async fn handle_admin_connection(stream: TcpStream, coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let request: AdminRequest = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed admin request");
                continue;
            }
        };

        let response = match request {
            AdminRequest::QueueTask { task_key, args, subtask_key } => {
                match coordinator.queue_task(task_key, args, subtask_key).await {
                    Ok(instance) => AdminResponse::Queued { id: instance.id, completion_type: instance.completion_type },
                    Err(err) => AdminResponse::Err(err.to_string()),
                }
            }
            AdminRequest::CancelTask { id } => match coordinator.cancel_task(id).await {
                Ok(found) => AdminResponse::Cancelled(found),
                Err(err) => AdminResponse::Err(err.to_string()),
            },
            AdminRequest::TaskStatuses => AdminResponse::Statuses(coordinator.task_statuses().await),
        };

        let encoded = serde_json::to_vec(&response)?;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encoded);
        framed.send(Bytes::from(buf)).await?;
    }
    Ok(())
}
