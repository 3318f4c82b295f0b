//! Per-task migration engine.
//!
//! Drives one migration task through a strict, never-skipped phase order:
//! Validation → Discovery → Pre-flight Checks → Export → Import →
//! Post-migration Validation → Cleanup. Each phase is wrapped uniformly;
//! failures carry phase attribution. Cleanup always runs, even after an
//! earlier phase error or a cancellation, and its failures are downgraded
//! to warnings so they never mask the original error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dbferry_conn::{ConnectTarget, ConnectionManager, ConnectionRole, Credentials};

use crate::config::{unique_id, OperationOptions};
use crate::error::EngineError;
use crate::mapping::{DatabaseAssignment, MigrationTask};
use crate::ops::{DatabaseOperations, DumpOptions};
use crate::progress::ProgressEstimator;
use crate::report::{DatabaseDetail, DatabaseStatus, MigrationOutcome, OutcomeMetrics};
use crate::secrets::{SecretStore, StaticSecrets};
use crate::state::ExecutionState;

/// System databases never migrated.
pub const SYSTEM_DATABASES: &[&str] = &["postgres", "template0", "template1"];

/// Maintenance database used for discovery and pre-flight probes.
const ADMIN_DATABASE: &str = "postgres";

/// A named, ordered step within one task's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationPhase {
    /// Structural configuration checks.
    Validation,
    /// Source database enumeration and sizing.
    Discovery,
    /// Connectivity probes before any destructive action.
    Preflight,
    /// Per-database dump from the source.
    Export,
    /// Per-database restore into the target.
    Import,
    /// Reconnect to every migrated database on the target.
    PostValidation,
    /// Close pooled connections; never fails the task.
    Cleanup,
}

impl MigrationPhase {
    /// The strict phase order. Cleanup is last and always runs.
    pub const ORDERED: [MigrationPhase; 7] = [
        MigrationPhase::Validation,
        MigrationPhase::Discovery,
        MigrationPhase::Preflight,
        MigrationPhase::Export,
        MigrationPhase::Import,
        MigrationPhase::PostValidation,
        MigrationPhase::Cleanup,
    ];
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::Validation => write!(f, "Validation"),
            MigrationPhase::Discovery => write!(f, "Discovery"),
            MigrationPhase::Preflight => write!(f, "Pre-flight Checks"),
            MigrationPhase::Export => write!(f, "Export"),
            MigrationPhase::Import => write!(f, "Import"),
            MigrationPhase::PostValidation => write!(f, "Post-migration Validation"),
            MigrationPhase::Cleanup => write!(f, "Cleanup"),
        }
    }
}

/// Cloneable cooperative cancellation handle.
///
/// Cancellation is observed at phase boundaries; in-flight external
/// operations are not killed.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine driving one migration task through its phases.
pub struct MigrationEngine {
    task: MigrationTask,
    options: OperationOptions,
    connections: Arc<ConnectionManager>,
    operations: Arc<dyn DatabaseOperations>,
    secrets: Arc<dyn SecretStore>,
    migration_id: String,
    state: ExecutionState,
    cancel: CancelHandle,
    source_credentials: Option<Credentials>,
    target_credentials: Option<Credentials>,
    details: Vec<DatabaseDetail>,
    assignments: Vec<DatabaseAssignment>,
}

impl MigrationEngine {
    /// Create an engine for one task.
    pub fn new(
        task: MigrationTask,
        options: OperationOptions,
        connections: Arc<ConnectionManager>,
        operations: Arc<dyn DatabaseOperations>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        let migration_id = unique_id("mig");
        let state = ExecutionState::new(migration_id.clone(), MigrationPhase::ORDERED.to_vec());
        Self {
            task,
            options,
            connections,
            operations,
            secrets,
            migration_id,
            state,
            cancel: CancelHandle::default(),
            source_credentials: None,
            target_credentials: None,
            details: Vec::new(),
            assignments: Vec::new(),
        }
    }

    /// Convenience constructor with an inline secret store.
    pub fn with_static_secrets(
        task: MigrationTask,
        options: OperationOptions,
        connections: Arc<ConnectionManager>,
        operations: Arc<dyn DatabaseOperations>,
        secrets: StaticSecrets,
    ) -> Self {
        Self::new(task, options, connections, operations, Arc::new(secrets))
    }

    /// This task's unique migration id.
    pub fn migration_id(&self) -> &str {
        &self.migration_id
    }

    /// Current execution state.
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Handle for cooperative cancellation.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drive the task through all phases.
    ///
    /// On failure the error is re-thrown after best-effort Cleanup, with
    /// the failing phase attributed.
    pub async fn run(&mut self) -> Result<MigrationOutcome, EngineError> {
        self.state.start();
        tracing::info!(
            migration_id = %self.migration_id,
            source = %self.task.source.label(),
            target = %self.task.target.label(),
            dry_run = self.options.dry_run,
            "starting migration task"
        );

        let run_result = self.execute_phases().await;

        // Cleanup always runs, exactly once, and never fails the task.
        self.run_cleanup().await;

        match run_result {
            Ok(()) => {
                let outcome = self.build_outcome();
                self.state.result = Some(outcome.clone());
                self.state.complete();
                tracing::info!(
                    migration_id = %self.migration_id,
                    databases = outcome.processed_databases,
                    duration_ms = outcome.duration.as_millis() as u64,
                    "migration task completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, EngineError::Cancelled { .. }) {
                    self.state.cancel();
                    tracing::warn!(migration_id = %self.migration_id, "migration task cancelled");
                } else {
                    let phase = e
                        .phase()
                        .or(self.state.current_phase)
                        .unwrap_or(MigrationPhase::Validation);
                    self.state.fail(phase, e.to_string());
                    tracing::warn!(
                        migration_id = %self.migration_id,
                        phase = %phase,
                        error = %e,
                        "migration task failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute_phases(&mut self) -> Result<(), EngineError> {
        for phase in [
            MigrationPhase::Validation,
            MigrationPhase::Discovery,
            MigrationPhase::Preflight,
            MigrationPhase::Export,
            MigrationPhase::Import,
            MigrationPhase::PostValidation,
        ] {
            self.check_cancelled()?;
            self.state.set_current_phase(phase);
            tracing::debug!(migration_id = %self.migration_id, phase = %phase, "phase starting");

            let result = match phase {
                MigrationPhase::Validation => self.phase_validation().await,
                MigrationPhase::Discovery => self.phase_discovery().await,
                MigrationPhase::Preflight => self.phase_preflight().await,
                MigrationPhase::Export => self.phase_export().await,
                MigrationPhase::Import => self.phase_import().await,
                MigrationPhase::PostValidation => self.phase_post_validation().await,
                MigrationPhase::Cleanup => Ok(()),
            };

            match result {
                Ok(()) => {
                    self.state.complete_current_phase();
                    tracing::debug!(migration_id = %self.migration_id, phase = %phase, "phase completed");
                }
                Err(e) => {
                    self.state.abandon_current_phase();
                    return Err(e.in_phase(phase));
                }
            }
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                migration_id: self.migration_id.clone(),
            });
        }
        Ok(())
    }

    /// Structural checks and credential resolution; fails fast.
    async fn phase_validation(&mut self) -> Result<(), EngineError> {
        if self.options.schema_only && self.options.data_only {
            return Err(EngineError::ConfigValidation(
                "schemaOnly and dataOnly are mutually exclusive".to_string(),
            ));
        }
        for (side, spec) in [("source", &self.task.source), ("target", &self.task.target)] {
            if spec.project.is_empty() || spec.instance.is_empty() {
                return Err(EngineError::ConfigValidation(format!(
                    "{side} project and instance are required"
                )));
            }
        }
        if self.options.jobs == 0 {
            return Err(EngineError::ConfigValidation(
                "jobs must be at least 1".to_string(),
            ));
        }

        self.source_credentials = Some(self.resolve_credentials(true).await?);
        self.target_credentials = Some(self.resolve_credentials(false).await?);
        Ok(())
    }

    async fn resolve_credentials(&self, source: bool) -> Result<Credentials, EngineError> {
        let spec = if source { &self.task.source } else { &self.task.target };
        self.secrets
            .credentials(&spec.project, &spec.instance)
            .await
            .map_err(|e| EngineError::ConfigValidation(e.to_string()))?
            .ok_or_else(|| {
                EngineError::ConfigValidation(format!(
                    "no credentials available for {}",
                    spec.label()
                ))
            })
    }

    /// Enumerate source databases, excluding system ones, and size the run.
    async fn phase_discovery(&mut self) -> Result<(), EngineError> {
        let rows = self
            .connections
            .list_databases(&self.source_target(ADMIN_DATABASE))
            .await?;

        let catalog: Vec<_> = rows
            .into_iter()
            .filter(|row| !SYSTEM_DATABASES.contains(&row.name.as_str()))
            .collect();

        let explicit: Vec<String> = if self.task.databases.is_empty() {
            self.task.source.databases.clone()
        } else {
            self.task.databases.iter().map(|a| a.source_name.clone()).collect()
        };

        let mut details = Vec::new();
        if self.options.include_all || explicit.is_empty() {
            for row in &catalog {
                details.push(DatabaseDetail::new(&row.name, row.size_bytes));
            }
        } else {
            for name in &explicit {
                match catalog.iter().find(|row| &row.name == name) {
                    Some(row) => details.push(DatabaseDetail::new(name, row.size_bytes)),
                    None => {
                        // Trust the explicit list; the catalog may lag.
                        self.state
                            .add_warning(format!("database {name} not visible in catalog"));
                        details.push(DatabaseDetail::new(name, 0));
                    }
                }
            }
        }

        if details.is_empty() {
            return Err(EngineError::EmptyDiscovery {
                instance: self.task.source.instance.clone(),
            });
        }

        self.assignments = details
            .iter()
            .map(|detail| {
                self.task
                    .databases
                    .iter()
                    .find(|a| a.source_name == detail.name)
                    .cloned()
                    .unwrap_or_else(|| DatabaseAssignment::direct(&detail.name))
            })
            .collect();

        self.state.metrics.total_size = details.iter().map(|d| d.original_size).sum();
        tracing::info!(
            migration_id = %self.migration_id,
            databases = details.len(),
            total_bytes = self.state.metrics.total_size,
            "discovery complete"
        );
        self.details = details;
        Ok(())
    }

    /// Probe both sides before any destructive action.
    async fn phase_preflight(&mut self) -> Result<(), EngineError> {
        futures::future::try_join(
            self.connections.test_connection(&self.source_target(ADMIN_DATABASE)),
            self.connections.test_connection(&self.target_db_target(ADMIN_DATABASE)),
        )
        .await?;
        Ok(())
    }

    /// Dump each database, tracking predictive progress.
    async fn phase_export(&mut self) -> Result<(), EngineError> {
        if self.options.dry_run {
            for detail in &mut self.details {
                detail.status = DatabaseStatus::Simulated;
            }
            self.state
                .add_warning("dry run: export and import simulated".to_string());
            return Ok(());
        }

        let mut details = std::mem::take(&mut self.details);
        let result = self.export_all(&mut details).await;
        self.details = details;
        result
    }

    async fn export_all(&mut self, details: &mut [DatabaseDetail]) -> Result<(), EngineError> {
        let dump_options = DumpOptions::from_options(&self.options);
        let mut estimator = ProgressEstimator::new(self.state.metrics.total_size);
        let mut processed: u64 = 0;

        for detail in details.iter_mut() {
            let artifact = self
                .operations
                .export_database(
                    &self.task.source.project,
                    &self.task.source.instance,
                    &detail.name,
                    &dump_options,
                )
                .await?;

            detail.status = DatabaseStatus::Exported;
            detail.backup_file = Some(artifact.backup_file);

            processed += detail.original_size;
            estimator.record(processed);
            self.state.metrics.processed_size = processed;
            self.state.metrics.estimated_duration = estimator.estimated_remaining();
            tracing::info!(
                migration_id = %self.migration_id,
                database = %detail.name,
                percent = estimator.percent(),
                "database exported"
            );
        }

        estimator.finish();
        self.state.metrics.throughput = estimator.throughput_bytes_per_sec();
        Ok(())
    }

    /// Restore each exported database into the target.
    async fn phase_import(&mut self) -> Result<(), EngineError> {
        if self.options.dry_run {
            return Ok(());
        }

        let mut details = std::mem::take(&mut self.details);
        let result = self.import_all(&mut details).await;
        self.details = details;
        result
    }

    async fn import_all(&mut self, details: &mut [DatabaseDetail]) -> Result<(), EngineError> {
        let dump_options = DumpOptions::from_options(&self.options);

        for (detail, assignment) in details.iter_mut().zip(&self.assignments) {
            if detail.status != DatabaseStatus::Exported {
                continue;
            }
            let backup_file = detail.backup_file.clone().unwrap_or_default();
            self.operations
                .import_database(
                    &self.task.target.project,
                    &self.task.target.instance,
                    &assignment.target_name,
                    &backup_file,
                    &dump_options,
                )
                .await?;
            detail.status = DatabaseStatus::Completed;
            tracing::info!(
                migration_id = %self.migration_id,
                database = %assignment.target_name,
                "database imported"
            );
        }
        Ok(())
    }

    /// Reconnect to every migrated database on the target.
    ///
    /// Any failure here is fatal even though data already moved: an
    /// unreachable target is not a successful migration.
    async fn phase_post_validation(&mut self) -> Result<(), EngineError> {
        if self.options.dry_run {
            return Ok(());
        }

        for (detail, assignment) in self.details.iter().zip(&self.assignments) {
            if detail.status != DatabaseStatus::Completed {
                continue;
            }
            self.connections
                .test_connection(&self.target_db_target(&assignment.target_name))
                .await
                .map_err(|e| EngineError::PostValidation {
                    database: assignment.target_name.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Close pooled connections; failures become warnings, never errors.
    async fn run_cleanup(&mut self) {
        self.state.set_current_phase(MigrationPhase::Cleanup);
        for failure in self.connections.close_all().await {
            self.state.add_warning(format!("cleanup: {failure}"));
        }
        self.state.complete_current_phase();
        tracing::debug!(migration_id = %self.migration_id, "cleanup complete");
    }

    fn build_outcome(&self) -> MigrationOutcome {
        let processed_databases = self
            .details
            .iter()
            .filter(|d| matches!(d.status, DatabaseStatus::Completed | DatabaseStatus::Simulated))
            .count();

        MigrationOutcome {
            success: true,
            migration_id: self.migration_id.clone(),
            duration: self.state.duration().unwrap_or(Duration::ZERO),
            metrics: OutcomeMetrics {
                total_size: self.state.metrics.total_size,
                processed_size: self.state.metrics.processed_size,
                throughput: self.state.metrics.throughput,
            },
            processed_databases,
            database_details: self.details.clone(),
        }
    }

    fn source_target(&self, database: &str) -> ConnectTarget {
        ConnectTarget::new(
            &self.task.source.project,
            &self.task.source.instance,
            database,
            ConnectionRole::Source,
            self.source_credentials.clone().unwrap_or_else(|| {
                Credentials::new(String::new(), String::new())
            }),
        )
    }

    fn target_db_target(&self, database: &str) -> ConnectTarget {
        ConnectTarget::new(
            &self.task.target.project,
            &self.task.target.instance,
            database,
            ConnectionRole::Target,
            self.target_credentials.clone().unwrap_or_else(|| {
                Credentials::new(String::new(), String::new())
            }),
        )
    }
}

impl std::fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("migration_id", &self.migration_id)
            .field("source", &self.task.source.label())
            .field("target", &self.task.target.label())
            .field("status", &self.state.status.to_string())
            .finish()
    }
}
