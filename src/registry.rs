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

//! The state guarded by the coordinator's single global lock: the worker registry (idle pool,
//! working map, credential table), live connection handles, and the connection manager's gate and
//! attempt counter. Grouping all of this under one `RwLock` is deliberate — the invariant that a
//! worker key is in exactly one of {idle, working, absent} only holds if both pools move under
//! one critical section, and the same is true of "at most one live connection handle per node".

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::conn::ConnState;
use crate::model::{NodeId, WorkAssignment, WorkerKey};
use crate::rpc::{NodeTransport, WorkerTransport};

#[derive(Default)]
pub(crate) struct RegistryCore {
    pub idle: VecDeque<WorkerKey>,
    pub working: HashMap<WorkerKey, WorkAssignment>,
    /// Shared secret registered for each worker slot at node admission, before the node is told
    /// to init — so a worker's very first login already has a valid credential waiting for it.
    pub credentials: HashMap<WorkerKey, String>,
    pub worker_handles: HashMap<WorkerKey, Arc<dyn WorkerTransport>>,
    pub node_handles: HashMap<NodeId, Arc<dyn NodeTransport>>,
    /// The connection manager's per-node state machine; purely informational (logging, tests),
    /// never consulted to decide whether a handle is live — `node_handles` is the one source of
    /// truth for "at most one live connection handle per node" (I5/P9).
    pub conn_states: HashMap<NodeId, ConnState>,
    /// Endpoints discovery has surfaced but that have not been registered as nodes, because
    /// `multicast_all` is off. Held for admin-driven promotion (§6).
    pub known_nodes: HashSet<(String, u16)>,
    pub connecting: bool,
    pub attempt: u32,
    pub reconnect_timer: Option<JoinHandle<()>>,
}

impl RegistryCore {
    /// A worker key is idle XOR working XOR absent; this asserts the first half on debug builds
    /// at the few places state changes, rather than trusting it silently everywhere.
    pub fn is_known(&self, key: &WorkerKey) -> bool {
        self.working.contains_key(key) || self.idle.contains(key)
    }

    pub fn remove_idle(&mut self, key: &WorkerKey) -> bool {
        if let Some(pos) = self.idle.iter().position(|k| k == key) {
            self.idle.remove(pos);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_moves_cleanly_between_idle_and_working() {
        let mut core = RegistryCore::default();
        core.idle.push_back("h:1:0".to_string());
        assert!(core.is_known(&"h:1:0".to_string()));
        assert!(core.remove_idle(&"h:1:0".to_string()));
        assert!(!core.is_known(&"h:1:0".to_string()));
    }
}
