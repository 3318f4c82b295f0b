//! Operation configuration.
//!
//! Configs arrive as a normalized shape from the external CLI/UI shell and
//! its instance/file parsers; they are built once and immutable after
//! validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dbferry_conn::Credentials;

use crate::error::EngineError;
use crate::mapping::{InstanceSpec, MigrationTask};
use crate::pattern::ConflictResolution;
use crate::secrets::StaticSecrets;

/// One side of a migration: a managed instance and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Cloud project owning the instance.
    pub project: String,
    /// Instance name within the project.
    pub instance: String,
    /// Explicit database list; `None` defers to discovery.
    #[serde(default)]
    pub databases: Option<Vec<String>>,
    /// Database user.
    pub user: String,
    /// Password for the user.
    pub password: String,
}

impl EndpointConfig {
    /// Create an endpoint with discovery-driven database selection.
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            databases: None,
            user: user.into(),
            password: password.into(),
        }
    }

    /// Restrict the endpoint to an explicit database list.
    pub fn with_databases(mut self, databases: Vec<String>) -> Self {
        self.databases = Some(databases);
        self
    }
}

/// Recognized operation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperationOptions {
    /// Migrate every non-system database instead of an explicit list.
    pub include_all: bool,
    /// Retry budget for connection attempts.
    pub retry_attempts: u32,
    /// Parallel restore workers per database.
    pub jobs: u32,
    /// Simulate export/import while still validating and probing.
    pub dry_run: bool,
    /// Verbose progress reporting.
    pub verbose: bool,
    /// Transfer schema definitions only.
    pub schema_only: bool,
    /// Transfer row data only.
    pub data_only: bool,
    /// Proceed despite advisory compatibility warnings.
    pub force_compatibility: bool,
    /// Upper bound on concurrently running tasks in a batch.
    pub max_parallel: usize,
    /// Stop launching new tasks after the first failure.
    pub stop_on_error: bool,
    /// Run one extra bounded pass over failed tasks.
    pub retry_failed: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            include_all: false,
            retry_attempts: 3,
            jobs: 4,
            dry_run: false,
            verbose: false,
            schema_only: false,
            data_only: false,
            force_compatibility: false,
            max_parallel: 2,
            stop_on_error: false,
            retry_failed: false,
        }
    }
}

/// Metadata stamped on every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    /// Name of the invoking tool.
    pub tool_name: String,
    /// Unique id for this execution.
    pub execution_id: String,
    /// When the operation was created.
    pub timestamp: DateTime<Utc>,
}

impl OperationMetadata {
    /// Stamp metadata for the named tool.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            execution_id: generate_execution_id(),
            timestamp: Utc::now(),
        }
    }
}

/// Generate a unique execution id.
pub fn generate_execution_id() -> String {
    unique_id("exec")
}

/// Timestamp-derived unique id with the given prefix.
pub(crate) fn unique_id(prefix: &str) -> String {
    let ts = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let hash = ts.wrapping_mul(0x517cc1b727220a95);
    format!("{prefix}-{ts:x}-{:08x}", (hash >> 32) as u32)
}

/// A complete, validated operation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Where data comes from.
    pub source: EndpointConfig,
    /// Where data goes; absent only for read-only tools.
    pub target: Option<EndpointConfig>,
    /// Operation options.
    #[serde(default)]
    pub options: OperationOptions,
    /// Execution metadata.
    pub metadata: OperationMetadata,
}

impl OperationConfig {
    /// Create a configuration for the named tool.
    pub fn new(tool_name: impl Into<String>, source: EndpointConfig) -> Self {
        Self {
            source,
            target: None,
            options: OperationOptions::default(),
            metadata: OperationMetadata::new(tool_name),
        }
    }

    /// Set the target endpoint.
    pub fn with_target(mut self, target: EndpointConfig) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the operation options.
    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    /// Structural validation; fails fast, never retried.
    ///
    /// `read_only_tool` relaxes the target requirement for tools that only
    /// inspect the source.
    pub fn validate(&self, read_only_tool: bool) -> Result<(), EngineError> {
        if self.options.schema_only && self.options.data_only {
            return Err(EngineError::ConfigValidation(
                "schemaOnly and dataOnly are mutually exclusive".to_string(),
            ));
        }
        if self.source.project.is_empty() || self.source.instance.is_empty() {
            return Err(EngineError::ConfigValidation(
                "source project and instance are required".to_string(),
            ));
        }
        match &self.target {
            None if !read_only_tool => Err(EngineError::ConfigValidation(
                "target is required for this tool".to_string(),
            )),
            Some(target) if target.project.is_empty() || target.instance.is_empty() => {
                Err(EngineError::ConfigValidation(
                    "target project and instance are required".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Expand into the single concrete task this config describes.
    pub fn to_task(&self) -> Result<MigrationTask, EngineError> {
        self.validate(false)?;
        let target = self.target.as_ref().ok_or_else(|| {
            EngineError::ConfigValidation("target is required for this tool".to_string())
        })?;

        let mut source = InstanceSpec::new(&self.source.project, &self.source.instance);
        if let Some(databases) = &self.source.databases {
            source.databases = databases.clone();
        }

        Ok(MigrationTask {
            source,
            target: InstanceSpec::new(&target.project, &target.instance),
            databases: Vec::new(),
            conflict_resolution: ConflictResolution::Fail,
        })
    }

    /// In-memory secret store seeded with this config's inline credentials.
    pub fn secret_store(&self) -> StaticSecrets {
        let secrets = StaticSecrets::new();
        secrets.insert(
            &self.source.project,
            &self.source.instance,
            Credentials::new(&self.source.user, &self.source.password),
        );
        if let Some(target) = &self.target {
            secrets.insert(
                &target.project,
                &target.instance,
                Credentials::new(&target.user, &target.password),
            );
        }
        secrets
    }
}
