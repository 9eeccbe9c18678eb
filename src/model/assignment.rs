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

use crate::model::task_instance::TaskInstanceId;

/// The work bound to a worker in the working map. Present iff the worker is not idle. A main
/// assignment has `subtask_key == None`; a sub-assignment is owned by the main worker of the same
/// `task_instance_id` and additionally carries a `workunit_key`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub task_instance_id: TaskInstanceId,
    pub task_key: String,
    pub args: serde_json::Value,
    pub subtask_key: Option<String>,
    pub workunit_key: Option<String>,
}

impl WorkAssignment {
    pub fn is_main(&self) -> bool {
        self.subtask_key.is_none()
    }
}
