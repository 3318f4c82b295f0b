//! Migration orchestration engine for dbferry.
//!
//! This crate moves relational databases between managed instances, from a
//! single transfer up to complex batch topologies (one-to-many, many-to-one,
//! many-to-many). It provides:
//! - Topology pattern detection and strategy recommendation
//! - Mapping expansion of a strategy into concrete migration tasks
//! - A per-task engine with a strict, never-skipped phase order and
//!   guaranteed cleanup
//! - A batch coordinator with bounded concurrency, stop-on-error, and an
//!   optional retry pass
//!
//! Terminal UI, argument parsing, credential caching, and the dump/restore
//! subprocesses are external collaborators consumed through trait seams.
//!
//! # Phase order
//!
//! | Phase | Purpose |
//! |-------|---------|
//! | Validation | structural config checks, credential resolution |
//! | Discovery | enumerate and size source databases |
//! | Pre-flight Checks | probe both sides before any destructive action |
//! | Export | per-database dump |
//! | Import | per-database restore |
//! | Post-migration Validation | reconnect to every migrated database |
//! | Cleanup | close pooled connections; always runs |
//!
//! # Example
//!
//! ```ignore
//! use dbferry_core::{
//!     BatchCoordinator, InstanceSpec, MigrationMapping, MigrationStrategy, OperationOptions,
//! };
//!
//! // Three production instances consolidated into one.
//! let mapping = MigrationMapping::builder(MigrationStrategy::Consolidate)
//!     .sources(sources)
//!     .target(InstanceSpec::new("acme-staging", "warehouse"))
//!     .build()?;
//!
//! let tasks = mapping.expand()?;
//! let report = BatchCoordinator::new(connections, operations, secrets, options)
//!     .run(tasks)
//!     .await;
//!
//! println!(
//!     "{} succeeded, {} failed, {} skipped",
//!     report.summary.succeeded, report.summary.failed, report.summary.skipped
//! );
//! ```

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod ops;
pub mod pattern;
pub mod progress;
pub mod report;
pub mod secrets;
pub mod state;

// Configuration types
pub use config::{
    generate_execution_id, EndpointConfig, OperationConfig, OperationMetadata, OperationOptions,
};

// Pattern and strategy resolution
pub use pattern::{
    CompatibilityReport, ConflictResolution, MigrationPattern, MigrationStrategy, PatternResolver,
};

// Mapping types
pub use mapping::{
    DatabaseAssignment, InstanceSpec, MappingBuilder, MappingMetadata, MappingSummary,
    MigrationMapping, MigrationTask,
};

// Execution state
pub use state::{ExecutionMetrics, ExecutionState, ExecutionStatus, PhaseFailure};

// Progress estimation
pub use progress::ProgressEstimator;

// Engine types
pub use engine::{CancelHandle, MigrationEngine, MigrationPhase, SYSTEM_DATABASES};

// Coordinator types
pub use coordinator::{BatchCoordinator, CoordinatorPhase, ProgressCallback};

// Reports
pub use report::{
    BatchReport, BatchSummary, DatabaseDetail, DatabaseStatus, MigrationOutcome, OutcomeMetrics,
    TaskFailure, TaskSkipped, TaskSuccess,
};

// Error types
pub use error::{EngineError, MappingError, OpsError};

// Collaborator seams
pub use catalog::{CatalogError, CatalogProvider, InstanceDetails};
pub use ops::{DatabaseOperations, DumpOptions, ExportArtifact};
pub use secrets::{Credentials, SecretError, SecretStore, StaticSecrets};

/// Re-export the connection layer.
pub use dbferry_conn as conn;
