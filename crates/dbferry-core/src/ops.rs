//! Black-box dump/restore primitives.
//!
//! The engine invokes these through a trait seam; the subprocess-driven
//! implementations live with the external shell.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OperationOptions;
use crate::error::OpsError;

/// Options forwarded to the dump/restore tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpOptions {
    /// Transfer schema definitions only.
    pub schema_only: bool,
    /// Transfer row data only.
    pub data_only: bool,
    /// Parallel workers for the restore side.
    pub jobs: u32,
}

impl DumpOptions {
    /// Derive dump options from the operation options.
    pub fn from_options(options: &OperationOptions) -> Self {
        Self {
            schema_only: options.schema_only,
            data_only: options.data_only,
            jobs: options.jobs,
        }
    }
}

/// Result of one database export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    /// The exported database.
    pub database: String,
    /// Path of the produced dump artifact.
    pub backup_file: String,
}

/// Export/import primitives invoked by the engine.
#[async_trait]
pub trait DatabaseOperations: Send + Sync {
    /// Dump one database from an instance.
    async fn export_database(
        &self,
        project: &str,
        instance: &str,
        database: &str,
        options: &DumpOptions,
    ) -> Result<ExportArtifact, OpsError>;

    /// Restore one dump artifact into a database on an instance.
    async fn import_database(
        &self,
        project: &str,
        instance: &str,
        database: &str,
        backup_file: &str,
        options: &DumpOptions,
    ) -> Result<(), OpsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_options_from_operation_options() {
        let mut options = OperationOptions::default();
        options.schema_only = true;
        options.jobs = 8;

        let dump = DumpOptions::from_options(&options);
        assert!(dump.schema_only);
        assert!(!dump.data_only);
        assert_eq!(dump.jobs, 8);
    }
}
