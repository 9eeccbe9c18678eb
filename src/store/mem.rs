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

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Store;
use crate::error::MasterResult;
use crate::model::{Node, NodeId, TaskInstance, TaskInstanceId};

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    task_instances: HashMap<TaskInstanceId, TaskInstance>,
    next_id: TaskInstanceId,
    next_node_id: NodeId,
}

/// A non-distributed, in-memory [`Store`]. Good enough for the coordinator's own correctness
/// (it hands out a unique, increasing id per task instance and keeps every record it is given),
/// but it is not durable: a process restart loses everything, which is acceptable since the spec
/// explicitly treats real persistence as an external collaborator.
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn put_node(&self, node: Node) -> MasterResult<()> {
        self.inner.lock().await.nodes.insert(node.id, node);
        Ok(())
    }

    async fn get_node(&self, id: NodeId) -> MasterResult<Option<Node>> {
        Ok(self.inner.lock().await.nodes.get(&id).cloned())
    }

    async fn delete_node(&self, id: NodeId) -> MasterResult<()> {
        self.inner.lock().await.nodes.remove(&id);
        Ok(())
    }

    async fn list_nodes(&self) -> MasterResult<Vec<Node>> {
        Ok(self.inner.lock().await.nodes.values().cloned().collect())
    }

    async fn put_task_instance(&self, instance: TaskInstance) -> MasterResult<()> {
        self.inner
            .lock()
            .await
            .task_instances
            .insert(instance.id, instance);
        Ok(())
    }

    async fn get_task_instance(&self, id: TaskInstanceId) -> MasterResult<Option<TaskInstance>> {
        Ok(self.inner.lock().await.task_instances.get(&id).cloned())
    }

    async fn list_task_instances(&self) -> MasterResult<Vec<TaskInstance>> {
        Ok(self.inner.lock().await.task_instances.values().cloned().collect())
    }

    async fn next_task_instance_id(&self) -> MasterResult<TaskInstanceId> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        Ok(inner.next_id)
    }

    async fn next_node_id(&self) -> MasterResult<NodeId> {
        let mut inner = self.inner.lock().await;
        inner.next_node_id += 1;
        Ok(inner.next_node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_increase_and_never_repeat() {
        let store = MemStore::new();
        let a = store.next_task_instance_id().await.unwrap();
        let b = store.next_task_instance_id().await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn node_round_trips() {
        let store = MemStore::new();
        let node = Node::new(1, "10.0.0.1", 9000);
        store.put_node(node.clone()).await.unwrap();
        let fetched = store.get_node(1).await.unwrap().unwrap();
        assert_eq!(fetched.host, "10.0.0.1");
        store.delete_node(1).await.unwrap();
        assert!(store.get_node(1).await.unwrap().is_none());
    }
}
