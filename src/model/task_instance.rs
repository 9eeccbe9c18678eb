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

pub type TaskInstanceId = u64;

/// The terminal tag on a [`TaskInstance`]. `Stopped` is the queued state; `Running` and the three
/// terminal variants follow the lifecycle `Stopped -> Running -> {Complete, Cancelled, Failed}`.
/// Once terminal, a task instance is immutable: its completion type and timestamp never change
/// again, and no further worker assignment is made against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompletionType {
    Stopped,
    Running,
    Complete,
    Cancelled,
    Failed,
}

impl CompletionType {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CompletionType::Complete | CompletionType::Cancelled | CompletionType::Failed
        )
    }
}

/// A persisted record of a single queued or running task. `started`/`completed` are Unix
/// timestamps in seconds; `args` is an opaque, round-trippable JSON object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskInstanceId,
    pub task_key: String,
    pub subtask_key: Option<String>,
    pub args: serde_json::Value,
    pub started: Option<u64>,
    pub completed: Option<u64>,
    pub completion_type: CompletionType,
    /// The main worker running this instance, set once a worker picks it up. Never cleared: it
    /// names the worker that *was* running it even after the instance goes terminal.
    pub worker: Option<String>,
}

impl TaskInstance {
    pub fn new(id: TaskInstanceId, task_key: String, args: serde_json::Value, subtask_key: Option<String>) -> Self {
        Self {
            id,
            task_key,
            subtask_key,
            args,
            started: None,
            completed: None,
            completion_type: CompletionType::Stopped,
            worker: None,
        }
    }
}
