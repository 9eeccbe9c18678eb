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

//! The state guarded by the queue lock: the pending FIFO and the set of currently-running task
//! instances. Kept as an in-memory cache of [`TaskInstance`] (rather than bare ids) so the
//! scheduler never has to await the store mid-critical-section — the cache is the source of truth
//! for scheduling decisions, and the store is a downstream record of it.

use std::collections::{HashMap, VecDeque};

use crate::clock::Clock;
use crate::coordinator::Coordinator;
use crate::error::{MasterError, MasterResult};
use crate::model::{CompletionType, TaskInstance, TaskInstanceId, WorkAssignment, WorkerKey};
use crate::rpc::RunTask;

#[derive(Default)]
pub(crate) struct QueueCore {
    pub queue: VecDeque<TaskInstance>,
    pub running: HashMap<TaskInstanceId, TaskInstance>,
}

impl QueueCore {
    pub fn remove_queued(&mut self, id: TaskInstanceId) -> Option<TaskInstance> {
        let pos = self.queue.iter().position(|inst| inst.id == id)?;
        self.queue.remove(pos)
    }
}

impl<C: Clock> Coordinator<C> {
    /// Persists a new instance, appends it to the FIFO tail, and immediately tries to dispatch it.
    pub async fn queue_task(
        &self,
        task_key: String,
        args: serde_json::Value,
        subtask_key: Option<String>,
    ) -> MasterResult<TaskInstance> {
        let id = self.store.next_task_instance_id().await?;
        let instance = TaskInstance::new(id, task_key, args, subtask_key);
        self.store.put_task_instance(instance.clone()).await?;

        self.queue.lock().await.queue.push_back(instance.clone());
        self.advance_queue().await;
        Ok(instance)
    }

    /// While the queue head can be matched to an idle worker, dispatches it and repeats.
    /// Multiple concurrent callers race harmlessly: each iteration pops at most one worker and
    /// one instance under both locks held together, so no instance or worker is claimed twice.
    pub async fn advance_queue(&self) {
        loop {
            let dispatch = {
                let mut registry_guard = self.registry.write().await;
                let mut queue_guard = self.queue.lock().await;

                let worker_key = match registry_guard.idle.pop_front() {
                    Some(key) => key,
                    None => break,
                };
                let mut inst = match queue_guard.queue.pop_front() {
                    Some(inst) => inst,
                    None => {
                        registry_guard.idle.push_front(worker_key);
                        break;
                    }
                };

                inst.started = Some(self.clock.now_unix());
                inst.completion_type = CompletionType::Running;
                inst.worker = Some(worker_key.clone());

                let available_workers = registry_guard.idle.len() + 1;
                let handle = registry_guard.worker_handles.get(&worker_key).cloned();

                registry_guard.working.insert(
                    worker_key.clone(),
                    WorkAssignment {
                        task_instance_id: inst.id,
                        task_key: inst.task_key.clone(),
                        args: inst.args.clone(),
                        subtask_key: None,
                        workunit_key: None,
                    },
                );
                queue_guard.running.insert(inst.id, inst.clone());

                (worker_key, inst, available_workers, handle)
            };
            let (worker_key, inst, available_workers, handle) = dispatch;

            if let Err(err) = self.store.put_task_instance(inst.clone()).await {
                tracing::error!(task_instance_id = inst.id, error = %err, "failed to persist dispatched task instance");
            }

            let Some(handle) = handle else {
                tracing::error!(worker_key, "idle worker had no registered transport handle");
                continue;
            };

            let run_task = RunTask {
                task_instance_id: inst.id,
                task_key: inst.task_key,
                args: inst.args,
                subtask_key: None,
                workunit_key: None,
                available_workers,
            };
            if let Err(err) = handle.run_task(run_task).await {
                tracing::error!(worker_key, error = %err, "failed to dispatch run_task");
            }
        }
    }

    /// Sub-work-unit dispatch requested by a main worker. Does not enqueue: a missing idle worker
    /// or a task instance that has already left the running set (cancellation race) is rejected
    /// outright, leaving the caller to decide whether to wait or compute the unit itself.
    pub async fn request_worker(
        &self,
        from_worker: WorkerKey,
        subtask_key: String,
        args: serde_json::Value,
        workunit_key: String,
    ) -> MasterResult<()> {
        let (task_instance_id, task_key) = {
            let registry_guard = self.registry.read().await;
            match registry_guard.working.get(&from_worker) {
                Some(assignment) if assignment.is_main() => {
                    (assignment.task_instance_id, assignment.task_key.clone())
                }
                _ => return Err(MasterError::UnknownWorker(from_worker)),
            }
        };

        if !self.queue.lock().await.running.contains_key(&task_instance_id) {
            return Err(MasterError::NoWorkerAvailable);
        }

        let dispatch = {
            let mut registry_guard = self.registry.write().await;
            let worker_key = match registry_guard.idle.pop_front() {
                Some(key) => key,
                None => return Err(MasterError::NoWorkerAvailable),
            };
            let available_workers = registry_guard.idle.len() + 1;
            let handle = registry_guard.worker_handles.get(&worker_key).cloned();
            registry_guard.working.insert(
                worker_key.clone(),
                WorkAssignment {
                    task_instance_id,
                    task_key: task_key.clone(),
                    args: args.clone(),
                    subtask_key: Some(subtask_key.clone()),
                    workunit_key: Some(workunit_key.clone()),
                },
            );
            (worker_key, available_workers, handle)
        };
        let (worker_key, available_workers, handle) = dispatch;

        let Some(handle) = handle else {
            tracing::error!(worker_key, "idle worker had no registered transport handle");
            return Err(MasterError::NoWorkerAvailable);
        };

        let run_task = RunTask {
            task_instance_id,
            task_key,
            args,
            subtask_key: Some(subtask_key),
            workunit_key: Some(workunit_key),
            available_workers,
        };
        handle.run_task(run_task).await
    }

    /// Removes `id` from the queue, or signals every worker running it to stop if it is already
    /// in flight. Either way the instance is marked `CANCELLED`; the cancellation is idempotent
    /// against a result that later arrives for the same instance (see [`crate::router`]).
    pub async fn cancel_task(&self, id: TaskInstanceId) -> MasterResult<bool> {
        let affected = {
            let registry_guard = self.registry.read().await;
            registry_guard
                .working
                .iter()
                .filter(|(_, assignment)| assignment.task_instance_id == id)
                .filter_map(|(key, _)| registry_guard.worker_handles.get(key).cloned())
                .collect::<Vec<_>>()
        };

        let now = self.clock.now_unix();
        let mut queue_guard = self.queue.lock().await;
        let found = if let Some(mut inst) = queue_guard.remove_queued(id) {
            drop(queue_guard);
            inst.completion_type = CompletionType::Cancelled;
            self.store.put_task_instance(inst).await?;
            true
        } else if let Some(inst) = queue_guard.running.get_mut(&id) {
            inst.completion_type = CompletionType::Cancelled;
            inst.completed = Some(now);
            let persisted = inst.clone();
            queue_guard.running.remove(&id);
            drop(queue_guard);
            self.store.put_task_instance(persisted).await?;
            true
        } else {
            false
        };

        for handle in &affected {
            if let Err(err) = handle.stop_task().await {
                tracing::warn!(task_instance_id = id, error = %err, "failed to signal stop_task during cancel");
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompletionType;

    #[test]
    fn remove_queued_preserves_fifo_order_of_the_rest() {
        let mut core = QueueCore::default();
        core.queue.push_back(TaskInstance::new(1, "a".to_string(), serde_json::json!({}), None));
        core.queue.push_back(TaskInstance::new(2, "b".to_string(), serde_json::json!({}), None));
        core.queue.push_back(TaskInstance::new(3, "c".to_string(), serde_json::json!({}), None));

        let removed = core.remove_queued(2).unwrap();
        assert_eq!(removed.task_key, "b");
        assert_eq!(core.queue.len(), 2);
        assert_eq!(core.queue[0].id, 1);
        assert_eq!(core.queue[1].id, 3);
        assert_eq!(removed.completion_type, CompletionType::Stopped);
    }
}
