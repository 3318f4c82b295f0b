//! dbferry connection layer - pooled, retrying connections to managed instances.
//!
//! This crate provides the driver-agnostic connection plumbing for dbferry:
//! a [`Connector`] seam the real cloud driver plugs into, and a
//! [`ConnectionManager`] that pools links per `project:instance:database`,
//! retries transient failures with exponential backoff, and classifies
//! driver errors into typed subtypes.
//!
//! # Quick Start
//!
//! ```ignore
//! use dbferry_conn::{ConnectionManager, ConnectTarget, ConnectionRole, Credentials, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ConnectionManager::new(driver, ManagerConfig::default());
//!
//!     let target = ConnectTarget::new(
//!         "acme-prod",
//!         "orders-db",
//!         "orders",
//!         ConnectionRole::Source,
//!         Credentials::new("migrator", password),
//!     );
//!
//!     // Pre-flight probe
//!     manager.test_connection(&target).await?;
//!
//!     // Discovery
//!     for db in manager.list_databases(&target).await? {
//!         println!("{} ({} bytes)", db.name, db.size_bytes);
//!     }
//!
//!     manager.close_all().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod manager;

pub use config::ManagerConfig;
pub use connector::{
    ConnectTarget, ConnectionRole, Connector, Credentials, DatabaseInfo, ManagedConnection,
};
pub use error::ConnectionError;
pub use manager::{ConnectionManager, PooledConnection};
