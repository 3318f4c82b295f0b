//! Outcome and report types.
//!
//! The final batch report always separates successful, failed, and skipped
//! tasks, with phase-attributed error messages; the external shell renders
//! these shapes directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::MigrationPhase;

/// Status of one database within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseStatus {
    /// Discovered, not yet exported.
    Pending,
    /// Dumped from the source.
    Exported,
    /// Restored on the target.
    Completed,
    /// Export or import failed.
    Failed,
    /// Skipped by a dry run.
    Simulated,
}

impl std::fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseStatus::Pending => write!(f, "pending"),
            DatabaseStatus::Exported => write!(f, "exported"),
            DatabaseStatus::Completed => write!(f, "completed"),
            DatabaseStatus::Failed => write!(f, "failed"),
            DatabaseStatus::Simulated => write!(f, "simulated"),
        }
    }
}

/// Per-database detail record, updated as phases progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDetail {
    /// Database name on the source.
    pub name: String,
    /// Current status.
    pub status: DatabaseStatus,
    /// Size on the source, in bytes.
    pub original_size: u64,
    /// Dump artifact path, once exported.
    pub backup_file: Option<String>,
}

impl DatabaseDetail {
    /// Create a pending detail record.
    pub fn new(name: impl Into<String>, original_size: u64) -> Self {
        Self {
            name: name.into(),
            status: DatabaseStatus::Pending,
            original_size,
            backup_file: None,
        }
    }
}

/// Size and throughput metrics carried in an outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeMetrics {
    /// Total bytes discovered for transfer.
    pub total_size: u64,
    /// Bytes transferred.
    pub processed_size: u64,
    /// Observed throughput in bytes per second.
    pub throughput: Option<f64>,
}

/// Result of one successfully driven task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    /// Whether the task succeeded.
    pub success: bool,
    /// Unique migration id.
    pub migration_id: String,
    /// Wall-clock duration of the task.
    pub duration: Duration,
    /// Size and throughput metrics.
    pub metrics: OutcomeMetrics,
    /// Number of databases processed.
    pub processed_databases: usize,
    /// Per-database detail records.
    pub database_details: Vec<DatabaseDetail>,
}

/// A task that completed successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSuccess {
    /// Position in the expanded task list.
    pub index: usize,
    /// Source label (`project:instance`).
    pub source: String,
    /// Target label (`project:instance`).
    pub target: String,
    /// The task's outcome.
    pub outcome: MigrationOutcome,
}

/// A task that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    /// Position in the expanded task list.
    pub index: usize,
    /// Source label (`project:instance`).
    pub source: String,
    /// Target label (`project:instance`).
    pub target: String,
    /// Phase the failure is attributed to, when known.
    pub phase: Option<MigrationPhase>,
    /// Error message.
    pub error: String,
}

/// A task that never started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSkipped {
    /// Position in the expanded task list.
    pub index: usize,
    /// Source label (`project:instance`).
    pub source: String,
    /// Target label (`project:instance`).
    pub target: String,
    /// Why the task was skipped.
    pub reason: String,
}

/// Aggregate figures for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Wall-clock duration of the whole batch.
    pub duration: Duration,
    /// Number of tasks in the batch.
    pub total_tasks: usize,
    /// Tasks that succeeded.
    pub succeeded: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Tasks that never started.
    pub skipped: usize,
    /// Total bytes transferred across successful tasks.
    pub total_size_bytes: u64,
}

/// Final report for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Tasks that completed successfully.
    pub successful: Vec<TaskSuccess>,
    /// Tasks that failed, with phase attribution.
    pub failed: Vec<TaskFailure>,
    /// Tasks that never started.
    pub skipped: Vec<TaskSkipped>,
    /// Aggregate figures.
    pub summary: BatchSummary,
}

impl BatchReport {
    /// Whether every task succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}
