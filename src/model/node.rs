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

use serde::{Deserialize, Serialize};

pub type NodeId = u32;

/// A machine in the cluster running a worker-host process. A node pairs with the Master exactly
/// once, trust-on-first-use: the first public key it presents is accepted and persisted, and a
/// second node presenting an already-known key is treated as a duplicate and dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub cores: u32,
    pub cpu_speed: u32,
    pub memory: u64,
    /// Empty until the node has completed its first handshake (TOFU).
    pub pub_key: Vec<u8>,
}

impl Node {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            cores: 0,
            cpu_speed: 0,
            memory: 0,
            pub_key: Vec::new(),
        }
    }

    pub fn is_paired(&self) -> bool {
        !self.pub_key.is_empty()
    }

    pub fn worker_key(&self, index: u32) -> String {
        format!("{}:{}:{}", self.host, self.port, index)
    }
}
