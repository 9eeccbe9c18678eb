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

//! Routes the three worker-originated callbacks (`send_results`, `task_failed`, `worker_stopped`)
//! into registry and queue mutations. These are the only places a completed or failed unit of work
//! re-enters coordinator state, so the cancel-wins-over-late-result and sub-unit-forwarding rules
//! all live here.

use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::model::{CompletionType, TaskInstanceId, WorkerKey};

impl<C: Clock> Coordinator<C> {
    /// Marks a running instance FAILED and signals every worker still assigned to it (other than
    /// `exclude`, typically the worker that just reported or caused the failure) to stop. Shared
    /// by [`Self::task_failed`] and the main-worker-loss path in [`crate::admission`].
    pub(crate) async fn fail_running_instance(&self, task_instance_id: TaskInstanceId, exclude: Option<&str>) {
        let siblings = {
            let registry_guard = self.registry.read().await;
            registry_guard
                .working
                .iter()
                .filter(|(key, a)| {
                    a.task_instance_id == task_instance_id && exclude.map_or(true, |ex| key.as_str() != ex)
                })
                .filter_map(|(key, _)| registry_guard.worker_handles.get(key).cloned())
                .collect::<Vec<_>>()
        };

        let now = self.clock.now_unix();
        let instance = {
            let mut queue_guard = self.queue.lock().await;
            queue_guard.running.remove(&task_instance_id)
        };
        if let Some(mut inst) = instance {
            inst.completion_type = CompletionType::Failed;
            inst.completed = Some(now);
            if let Err(err) = self.store.put_task_instance(inst).await {
                tracing::error!(error = %err, "failed to persist failed task instance");
            }
        }

        for handle in siblings {
            if let Err(err) = handle.stop_task().await {
                tracing::warn!(error = %err, "failed to signal stop_task to sibling worker");
            }
        }
    }

    /// `worker_key` reports a completed unit of work. The worker is freed to idle before anything
    /// else happens, so a main worker immediately re-requesting a peer is never starved by its own
    /// previous sub-worker still appearing busy.
    pub async fn send_results(
        &self,
        worker_key: WorkerKey,
        results: serde_json::Value,
        workunit_key: Option<String>,
    ) {
        let assignment = {
            let mut registry_guard = self.registry.write().await;
            let Some(assignment) = registry_guard.working.remove(&worker_key) else {
                tracing::debug!(worker_key, "send_results for a worker that is no longer tracked");
                return;
            };
            registry_guard.idle.push_back(worker_key.clone());
            assignment
        };

        if assignment.is_main() {
            let now = self.clock.now_unix();
            let mut queue_guard = self.queue.lock().await;
            if let Some(mut inst) = queue_guard.running.remove(&assignment.task_instance_id) {
                inst.completion_type = CompletionType::Complete;
                inst.completed = Some(now);
                drop(queue_guard);
                if let Err(err) = self.store.put_task_instance(inst).await {
                    tracing::error!(error = %err, "failed to persist completed task instance");
                }
            }
        } else {
            let main_worker = {
                let queue_guard = self.queue.lock().await;
                queue_guard
                    .running
                    .get(&assignment.task_instance_id)
                    .and_then(|inst| inst.worker.clone())
            };
            match main_worker {
                Some(main_worker) => {
                    let handle = self.registry.read().await.worker_handles.get(&main_worker).cloned();
                    if let Some(handle) = handle {
                        let subtask_key = assignment.subtask_key.clone().unwrap_or_default();
                        let workunit_key = workunit_key.or(assignment.workunit_key.clone()).unwrap_or_default();
                        if let Err(err) = handle.receive_results(results, subtask_key, workunit_key).await {
                            tracing::warn!(error = %err, "failed to forward sub-unit results to main worker");
                        }
                    }
                }
                None => {
                    tracing::debug!(
                        task_instance_id = assignment.task_instance_id,
                        "discarding sub-unit result for an instance that is no longer running"
                    );
                }
            }
        }

        self.advance_queue().await;
    }

    /// `worker_key` reports a fatal error. Regardless of whether it was running the main task or a
    /// sub-work-unit, the whole instance is FAILED and every other worker assigned to it is told to
    /// stop.
    pub async fn task_failed(
        &self,
        worker_key: WorkerKey,
        results: serde_json::Value,
        _workunit_key: Option<String>,
    ) {
        let _ = results;

        let assignment = {
            let mut registry_guard = self.registry.write().await;
            let Some(assignment) = registry_guard.working.remove(&worker_key) else {
                tracing::debug!(worker_key, "task_failed for a worker that is no longer tracked");
                return;
            };
            registry_guard.idle.push_back(worker_key.clone());
            assignment
        };

        let siblings = {
            let registry_guard = self.registry.read().await;
            registry_guard
                .working
                .iter()
                .filter(|(key, a)| **key != worker_key && a.task_instance_id == assignment.task_instance_id)
                .filter_map(|(key, _)| registry_guard.worker_handles.get(key).cloned())
                .collect::<Vec<_>>()
        };

        let now = self.clock.now_unix();
        let instance = {
            let mut queue_guard = self.queue.lock().await;
            queue_guard.running.remove(&assignment.task_instance_id)
        };
        if let Some(mut inst) = instance {
            inst.completion_type = CompletionType::Failed;
            inst.completed = Some(now);
            if let Err(err) = self.store.put_task_instance(inst).await {
                tracing::error!(error = %err, "failed to persist failed task instance");
            }
        }

        for handle in siblings {
            if let Err(err) = handle.stop_task().await {
                tracing::warn!(error = %err, "failed to signal stop_task to sibling worker");
            }
        }

        self.advance_queue().await;
    }

    /// Acknowledgement of a previously-sent `stop_task`. The worker is freed to idle; the task's
    /// terminal state was already set by whichever call (`cancel_task`/`task_failed`) triggered the
    /// stop, so no task-level state changes here.
    pub async fn worker_stopped(&self, worker_key: WorkerKey) {
        {
            let mut registry_guard = self.registry.write().await;
            if registry_guard.working.remove(&worker_key).is_some() {
                registry_guard.idle.push_back(worker_key);
            }
        }
        self.advance_queue().await;
    }
}
