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

use thiserror::Error;

pub type MasterResult<T> = std::result::Result<T, MasterError>;

#[derive(Error, Debug)]
pub enum MasterError {
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("node {0} is unknown")]
    UnknownNode(u32),

    #[error("node at {0}:{1} presented a public key already bound to a different node; duplicate suppressed")]
    DuplicateNodeKey(String, u16),

    #[error("worker {0} is unknown")]
    UnknownWorker(String),

    #[error("task instance {0} is unknown")]
    UnknownTaskInstance(u64),

    #[error("task instance {0} is not running")]
    TaskInstanceNotRunning(u64),

    #[error("no idle worker available")]
    NoWorkerAvailable,

    #[error("crypto error: {0}")]
    Crypto(String),
}

impl From<std::io::Error> for MasterError {
    fn from(err: std::io::Error) -> Self {
        MasterError::Transport(err)
    }
}

impl MasterError {
    /// Transport errors are always retryable by the connection manager; everything else
    /// is either fatal to the one call or fatal to the node/worker involved.
    pub fn is_transport(&self) -> bool {
        matches!(self, MasterError::Transport(_))
    }
}
