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

mod mem;

pub use mem::MemStore;

use async_trait::async_trait;

use crate::error::MasterResult;
use crate::model::{Node, NodeId, TaskInstance, TaskInstanceId};

/// Opaque CRUD over [`Node`] and [`TaskInstance`] records. The coordinator never reaches past
/// this trait into a concrete storage engine; production deployments would back it with a real
/// database (out of scope here), and tests back it with [`MemStore`].
///
/// Store errors are fatal to the enclosing coordinator operation and are surfaced to the caller
/// rather than retried, per the error handling design.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn put_node(&self, node: Node) -> MasterResult<()>;
    async fn get_node(&self, id: NodeId) -> MasterResult<Option<Node>>;
    async fn delete_node(&self, id: NodeId) -> MasterResult<()>;
    async fn list_nodes(&self) -> MasterResult<Vec<Node>>;

    async fn put_task_instance(&self, instance: TaskInstance) -> MasterResult<()>;
    async fn get_task_instance(&self, id: TaskInstanceId) -> MasterResult<Option<TaskInstance>>;
    async fn list_task_instances(&self) -> MasterResult<Vec<TaskInstance>>;

    /// Atomically allocate the next task instance id. Mirrors the teacher's `IdGeneratorManager`:
    /// a store-backed counter rather than an in-process `AtomicU64`, so ids stay unique even if
    /// the coordinator is later split across processes.
    async fn next_task_instance_id(&self) -> MasterResult<TaskInstanceId>;

    /// Atomically allocate the next node id, for nodes created by discovery rather than by an
    /// admin request that already names an id.
    async fn next_node_id(&self) -> MasterResult<NodeId>;
}
