//! Transport seam for managed-instance connections.
//!
//! The actual cloud driver lives outside this crate. A [`Connector`]
//! implementation opens live links; everything above it (pooling, retry,
//! classification) is driver-agnostic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

/// Which side of a migration a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionRole {
    /// Connection to a migration source.
    Source,
    /// Connection to a migration target.
    Target,
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionRole::Source => write!(f, "source"),
            ConnectionRole::Target => write!(f, "target"),
        }
    }
}

/// Database credentials, as resolved by the external secret store.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Database user.
    pub user: String,
    /// Password for the user.
    pub password: String,
    /// Whether the external cache is allowed to persist these credentials.
    pub save_enabled: bool,
}

impl Credentials {
    /// Create credentials that may not be persisted by the external cache.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            save_enabled: false,
        }
    }

    /// Allow the external cache to persist these credentials.
    pub fn with_save_enabled(mut self, enabled: bool) -> Self {
        self.save_enabled = enabled;
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("save_enabled", &self.save_enabled)
            .finish()
    }
}

/// Everything a connector needs to open one link.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// Cloud project owning the instance.
    pub project: String,
    /// Instance name within the project.
    pub instance: String,
    /// Database to connect to.
    pub database: String,
    /// Source or target side.
    pub role: ConnectionRole,
    /// Credentials for the link.
    pub credentials: Credentials,
}

impl ConnectTarget {
    /// Create a new connect target.
    pub fn new(
        project: impl Into<String>,
        instance: impl Into<String>,
        database: impl Into<String>,
        role: ConnectionRole,
        credentials: Credentials,
    ) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            database: database.into(),
            role,
            credentials,
        }
    }

    /// Pool key for this target: `project:instance:database`.
    pub fn pool_key(&self) -> String {
        format!("{}:{}:{}", self.project, self.instance, self.database)
    }
}

/// A catalog row describing one database on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// On-disk size in bytes.
    pub size_bytes: u64,
    /// Owning role, if the catalog reports one.
    pub owner: Option<String>,
}

impl DatabaseInfo {
    /// Create a catalog row.
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            owner: None,
        }
    }
}

/// A live connection to one database on a managed instance.
#[async_trait]
pub trait ManagedConnection: Send + Sync {
    /// Lightweight liveness probe.
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// List databases visible on the connected instance, with size metadata.
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, ConnectionError>;

    /// Whether the link is still usable.
    fn is_connected(&self) -> bool;

    /// Release the underlying link. Must tolerate being called twice.
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Opens live links to managed instances.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the given target.
    async fn open(&self, target: &ConnectTarget)
        -> Result<Box<dyn ManagedConnection>, ConnectionError>;
}
