//! Batch migration coordinator.
//!
//! Runs many engines under bounded concurrency. Permits are acquired from
//! a semaphore before spawning, so submission order is preserved and a
//! raised stop flag guarantees queued tasks never start. One task's
//! failure never touches a sibling's state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use dbferry_conn::ConnectionManager;

use crate::config::OperationOptions;
use crate::engine::MigrationEngine;
use crate::mapping::MigrationTask;
use crate::ops::DatabaseOperations;
use crate::report::{BatchReport, BatchSummary, TaskFailure, TaskSkipped, TaskSuccess};
use crate::secrets::SecretStore;

/// Coordinator-level phases, distinct from per-task engine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Batch setup.
    Initialization,
    /// Task-list validation.
    Validation,
    /// Bounded-concurrency execution.
    Execution,
    /// Result classification and retry merging.
    Consolidation,
    /// Final report assembly.
    Reporting,
}

impl std::fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorPhase::Initialization => write!(f, "Initialization"),
            CoordinatorPhase::Validation => write!(f, "Validation"),
            CoordinatorPhase::Execution => write!(f, "Execution"),
            CoordinatorPhase::Consolidation => write!(f, "Consolidation"),
            CoordinatorPhase::Reporting => write!(f, "Reporting"),
        }
    }
}

/// Progress callback: `(phase, index, total, status)`.
pub type ProgressCallback = Arc<dyn Fn(CoordinatorPhase, usize, usize, &str) + Send + Sync>;

/// Internal classification of one finished task.
enum TaskResult {
    Success(TaskSuccess),
    Failure(TaskFailure),
}

/// Coordinator for a batch of migration tasks.
pub struct BatchCoordinator {
    connections: Arc<ConnectionManager>,
    operations: Arc<dyn DatabaseOperations>,
    secrets: Arc<dyn SecretStore>,
    options: OperationOptions,
    progress: Option<ProgressCallback>,
}

impl BatchCoordinator {
    /// Create a coordinator over shared collaborators.
    pub fn new(
        connections: Arc<ConnectionManager>,
        operations: Arc<dyn DatabaseOperations>,
        secrets: Arc<dyn SecretStore>,
        options: OperationOptions,
    ) -> Self {
        Self {
            connections,
            operations,
            secrets,
            options,
            progress: None,
        }
    }

    /// Attach a coordinator-level progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report(&self, phase: CoordinatorPhase, index: usize, total: usize, status: &str) {
        if let Some(callback) = &self.progress {
            callback(phase, index, total, status);
        }
    }

    /// Run the batch and assemble the final report.
    pub async fn run(&self, tasks: Vec<MigrationTask>) -> BatchReport {
        let started = Instant::now();
        let total = tasks.len();

        self.report(CoordinatorPhase::Initialization, 0, total, "batch starting");
        tracing::info!(
            tasks = total,
            max_parallel = self.options.max_parallel,
            stop_on_error = self.options.stop_on_error,
            "starting batch migration"
        );

        self.report(CoordinatorPhase::Validation, 0, total, "task list validated");

        let indices: Vec<usize> = (0..total).collect();
        let (mut successful, mut failed, mut skipped) = self
            .execute_pass(&tasks, &indices, self.options.stop_on_error)
            .await;

        if self.options.retry_failed && !failed.is_empty() {
            self.report(
                CoordinatorPhase::Execution,
                total - failed.len(),
                total,
                "retrying failed tasks",
            );
            let retry_indices: Vec<usize> = failed.iter().map(|f| f.index).collect();
            tracing::info!(tasks = retry_indices.len(), "retry pass over failed tasks");

            // The retry pass is explicitly about failures; it never stops early.
            let (retried_ok, retried_failed, _) =
                self.execute_pass(&tasks, &retry_indices, false).await;

            let recovered: Vec<usize> = retried_ok.iter().map(|s| s.index).collect();
            failed.retain(|f| !recovered.contains(&f.index));
            successful.extend(retried_ok);
            // A task that failed twice keeps its most recent error.
            for failure in retried_failed {
                failed.retain(|f| f.index != failure.index);
                failed.push(failure);
            }
        }

        self.report(CoordinatorPhase::Consolidation, total, total, "classifying results");
        successful.sort_by_key(|s| s.index);
        failed.sort_by_key(|f| f.index);
        skipped.sort_by_key(|s| s.index);

        let summary = BatchSummary {
            duration: started.elapsed(),
            total_tasks: total,
            succeeded: successful.len(),
            failed: failed.len(),
            skipped: skipped.len(),
            total_size_bytes: successful
                .iter()
                .map(|s| s.outcome.metrics.processed_size)
                .sum(),
        };

        self.report(CoordinatorPhase::Reporting, total, total, "report ready");
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration.as_millis() as u64,
            "batch migration finished"
        );

        BatchReport {
            successful,
            failed,
            skipped,
            summary,
        }
    }

    /// One bounded-concurrency pass over the given task indices.
    async fn execute_pass(
        &self,
        tasks: &[MigrationTask],
        indices: &[usize],
        stop_on_error: bool,
    ) -> (Vec<TaskSuccess>, Vec<TaskFailure>, Vec<TaskSkipped>) {
        let total = indices.len();
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel.max(1)));
        let stop = Arc::new(AtomicBool::new(false));
        let mut join_set: JoinSet<TaskResult> = JoinSet::new();
        let mut skipped = Vec::new();

        for (position, &index) in indices.iter().enumerate() {
            let task = tasks[index].clone();

            // Acquire before spawning: bounds concurrency and preserves
            // submission order, so a raised stop flag cleanly skips the
            // rest of the queue.
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            if stop.load(Ordering::SeqCst) {
                skipped.push(TaskSkipped {
                    index,
                    source: task.source.label(),
                    target: task.target.label(),
                    reason: "not started: stopped after earlier failure".to_string(),
                });
                tracing::info!(index, source = %task.source.label(), "task skipped");
                continue;
            }

            self.report(
                CoordinatorPhase::Execution,
                position,
                total,
                &format!("task {} started", index + 1),
            );

            let connections = Arc::clone(&self.connections);
            let operations = Arc::clone(&self.operations);
            let secrets = Arc::clone(&self.secrets);
            let options = self.options.clone();
            let stop_flag = Arc::clone(&stop);

            join_set.spawn(async move {
                let _permit = permit;
                let source = task.source.label();
                let target = task.target.label();
                let mut engine =
                    MigrationEngine::new(task, options, connections, operations, secrets);

                match engine.run().await {
                    Ok(outcome) => TaskResult::Success(TaskSuccess {
                        index,
                        source,
                        target,
                        outcome,
                    }),
                    Err(e) => {
                        if stop_on_error {
                            stop_flag.store(true, Ordering::SeqCst);
                        }
                        TaskResult::Failure(TaskFailure {
                            index,
                            source,
                            target,
                            phase: e.phase(),
                            error: e.to_string(),
                        })
                    }
                }
            });
        }

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut done = skipped.len();

        while let Some(joined) = join_set.join_next().await {
            done += 1;
            match joined {
                Ok(TaskResult::Success(success)) => {
                    self.report(
                        CoordinatorPhase::Execution,
                        done,
                        total,
                        &format!("task {} completed", success.index + 1),
                    );
                    successful.push(success);
                }
                Ok(TaskResult::Failure(failure)) => {
                    self.report(
                        CoordinatorPhase::Execution,
                        done,
                        total,
                        &format!("task {} failed", failure.index + 1),
                    );
                    failed.push(failure);
                }
                Err(join_error) => {
                    // A panicked task is a bug in the engine, not the batch.
                    tracing::error!(error = %join_error, "migration task aborted");
                }
            }
        }

        (successful, failed, skipped)
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("max_parallel", &self.options.max_parallel)
            .field("stop_on_error", &self.options.stop_on_error)
            .finish()
    }
}
