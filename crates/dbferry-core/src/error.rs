//! Error types for the orchestration engine.

use thiserror::Error;

use crate::engine::MigrationPhase;
use crate::pattern::MigrationStrategy;
use dbferry_conn::ConnectionError;

/// Errors raised while building or expanding a migration mapping.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The mapping has no sources.
    #[error("mapping has no sources")]
    EmptySources,

    /// The mapping has no targets.
    #[error("mapping has no targets")]
    EmptyTargets,

    /// The strategy requires a different source/target arity.
    #[error("strategy {strategy} expects {expected}, got {actual}")]
    StrategyArity {
        /// The strategy being validated.
        strategy: MigrationStrategy,
        /// Human description of the expected arity.
        expected: String,
        /// Human description of the actual arity.
        actual: String,
    },

    /// Two sources carry the same database name and resolution is `fail`.
    #[error("database {database} exists on multiple sources: {instances:?}")]
    DatabaseConflict {
        /// The conflicting database name.
        database: String,
        /// The source instances carrying it.
        instances: Vec<String>,
    },

    /// A manual strategy was chosen but no explicit pairs were supplied.
    #[error("strategy {strategy} requires explicit source/target pairs")]
    MissingPairs {
        /// The strategy that needs pairs.
        strategy: MigrationStrategy,
    },

    /// An explicit pair references a source or target out of range.
    #[error("pair ({}, {}) out of range: {sources} sources, {targets} targets", pair.0, pair.1)]
    PairOutOfRange {
        /// The offending (source, target) index pair.
        pair: (usize, usize),
        /// Number of sources in the mapping.
        sources: usize,
        /// Number of targets in the mapping.
        targets: usize,
    },

    /// A strategy name could not be parsed.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// Errors raised by the dump/restore primitives.
#[derive(Debug, Error)]
pub enum OpsError {
    /// A database export failed.
    #[error("export failed for {database}: {reason}")]
    ExportFailed {
        /// The database being exported.
        database: String,
        /// Why the export failed.
        reason: String,
    },

    /// A database import failed.
    #[error("import failed for {database}: {reason}")]
    ImportFailed {
        /// The database being imported.
        database: String,
        /// Why the import failed.
        reason: String,
    },
}

/// Errors raised while driving one migration task.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural configuration problem; fails fast, never retried.
    #[error("configuration invalid: {0}")]
    ConfigValidation(String),

    /// Classified connection failure, surfaced after local retries.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Mapping construction or expansion failure.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Dump/restore primitive failure.
    #[error(transparent)]
    Ops(#[from] OpsError),

    /// Discovery found zero databases to migrate.
    #[error("no databases to migrate on instance {instance}")]
    EmptyDiscovery {
        /// The source instance that came up empty.
        instance: String,
    },

    /// Data moved but the target is unreachable afterwards.
    #[error("post-migration validation failed for {database}: {reason}")]
    PostValidation {
        /// The migrated database that failed validation.
        database: String,
        /// Why validation failed.
        reason: String,
    },

    /// A phase failed; wraps the underlying error with phase attribution.
    #[error("phase {phase} failed: {source}")]
    Phase {
        /// The phase that failed.
        phase: MigrationPhase,
        /// The underlying error.
        source: Box<EngineError>,
    },

    /// The task was cancelled at a phase boundary.
    #[error("migration {migration_id} cancelled")]
    Cancelled {
        /// The cancelled migration's id.
        migration_id: String,
    },
}

impl EngineError {
    /// Attribute an error to a phase, unless it already carries one.
    pub fn in_phase(self, phase: MigrationPhase) -> Self {
        match self {
            already @ (EngineError::Phase { .. } | EngineError::Cancelled { .. }) => already,
            other => EngineError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The phase this error is attributed to, if any.
    pub fn phase(&self) -> Option<MigrationPhase> {
        match self {
            EngineError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
