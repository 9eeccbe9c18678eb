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

mod assignment;
mod node;
mod task_instance;
mod worker;

pub use assignment::WorkAssignment;
pub use node::{Node, NodeId};
pub use task_instance::{CompletionType, TaskInstance, TaskInstanceId};
pub use worker::WorkerKey;
