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

//! Status aggregation: a snapshot of queue and running state for the admin surface, and a
//! rate-limited background poll of main workers' reported progress.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::model::{CompletionType, TaskInstanceId};

pub(crate) struct StatusState {
    pub progress: HashMap<TaskInstanceId, i64>,
    pub next_allowed: Option<Instant>,
}

impl Default for StatusState {
    fn default() -> Self {
        Self { progress: HashMap::new(), next_allowed: None }
    }
}

/// One entry of [`Coordinator::task_statuses`].
#[derive(Clone, Debug, Serialize)]
pub struct TaskStatus {
    pub s: CompletionType,
    pub t: Option<u64>,
    pub p: Option<i64>,
}

impl<C: Clock> Coordinator<C> {
    /// Snapshot of every non-terminal task instance: queued ones report `STOPPED` with no
    /// timestamp or progress, running ones report their start time and last-known progress.
    /// Terminal instances never appear here — once `advance_queue`/`send_results`/`task_failed`
    /// move an instance out of the running set it simply stops being reported.
    pub async fn task_statuses(&self) -> HashMap<TaskInstanceId, TaskStatus> {
        let queue_guard = self.queue.lock().await;
        let status_guard = self.status.lock().await;

        let mut out = HashMap::new();
        for inst in &queue_guard.queue {
            out.insert(inst.id, TaskStatus { s: CompletionType::Stopped, t: None, p: None });
        }
        for (id, inst) in &queue_guard.running {
            let progress = status_guard.progress.get(id).copied().unwrap_or(-1);
            out.insert(*id, TaskStatus { s: CompletionType::Running, t: inst.started, p: Some(progress) });
        }
        out
    }

    /// Refreshes `progress` for every main working assignment, provided at least
    /// [`crate::config::MasterConfig::status_refresh_interval_secs`] has elapsed since the last
    /// refresh. Replies from workers may land after this returns; that is fine, reads are always
    /// served from the last stored value.
    pub async fn fetch_task_status(&self) {
        {
            let mut status_guard = self.status.lock().await;
            let now = Instant::now();
            if let Some(next_allowed) = status_guard.next_allowed {
                if now < next_allowed {
                    return;
                }
            }
            let interval = Duration::from_secs(self.config.status_refresh_interval_secs);
            status_guard.next_allowed = Some(now + interval);
        }

        let registry_guard = self.registry.read().await;
        let mut targets = Vec::new();
        for (worker_key, assignment) in &registry_guard.working {
            if assignment.is_main() {
                if let Some(handle) = registry_guard.worker_handles.get(worker_key) {
                    targets.push((assignment.task_instance_id, handle.clone()));
                }
            }
        }
        drop(registry_guard);

        for (task_instance_id, handle) in targets {
            let coordinator_status = &self.status;
            match handle.task_status().await {
                Ok(value) => {
                    coordinator_status.lock().await.progress.insert(task_instance_id, value);
                }
                Err(err) => {
                    tracing::debug!(task_instance_id, error = %err, "status poll failed, keeping last known value");
                }
            }
        }
    }
}
