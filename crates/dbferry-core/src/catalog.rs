//! Cloud catalog interface.
//!
//! Instance listings feed discovery and pattern detection in the external
//! shell; the core consumes the interface only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dbferry_conn::DatabaseInfo;

/// Catalog lookup errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The instance is not present in the project.
    #[error("instance not found in catalog: {name}")]
    NotFound {
        /// The missing instance name.
        name: String,
    },

    /// Provider-side failure.
    #[error("catalog provider error: {0}")]
    Provider(String),
}

/// Catalog row describing one managed instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    /// Instance name.
    pub name: String,
    /// Detected engine version (e.g. `POSTGRES_13`).
    pub engine_version: Option<String>,
    /// Region the instance runs in.
    pub region: Option<String>,
    /// Machine tier.
    pub tier: Option<String>,
    /// Lifecycle state as reported by the provider.
    pub state: Option<String>,
}

impl InstanceDetails {
    /// Create a minimal catalog row.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine_version: None,
            region: None,
            tier: None,
            state: None,
        }
    }

    /// Set the engine version.
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = Some(version.into());
        self
    }
}

/// Cloud catalog listing interface.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// All instances visible in a project.
    async fn list_all_instances(&self, project: &str)
        -> Result<Vec<InstanceDetails>, CatalogError>;

    /// Details for one instance.
    async fn instance_details(
        &self,
        project: &str,
        name: &str,
    ) -> Result<InstanceDetails, CatalogError>;

    /// Databases on one instance, with size metadata.
    async fn instance_databases(
        &self,
        project: &str,
        name: &str,
    ) -> Result<Vec<DatabaseInfo>, CatalogError>;
}
