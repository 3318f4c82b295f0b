//! Credential resolution seam.
//!
//! The TTL'd credential/project cache (and its encryption) is an external
//! collaborator; the core only resolves credentials through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

pub use dbferry_conn::Credentials;

/// Secret store errors.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Store-side failure.
    #[error("secret store error: {0}")]
    Store(String),
}

/// Resolves credentials for an instance.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Credentials for `(project, instance)`, if the store has them.
    async fn credentials(
        &self,
        project: &str,
        instance: &str,
    ) -> Result<Option<Credentials>, SecretError>;
}

/// In-memory secret store for embedding and tests.
#[derive(Default)]
pub struct StaticSecrets {
    entries: RwLock<HashMap<(String, String), Credentials>>,
}

impl StaticSecrets {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert credentials for `(project, instance)`.
    pub fn insert(
        &self,
        project: impl Into<String>,
        instance: impl Into<String>,
        credentials: Credentials,
    ) {
        self.entries
            .write()
            .insert((project.into(), instance.into()), credentials);
    }
}

#[async_trait]
impl SecretStore for StaticSecrets {
    async fn credentials(
        &self,
        project: &str,
        instance: &str,
    ) -> Result<Option<Credentials>, SecretError> {
        Ok(self
            .entries
            .read()
            .get(&(project.to_string(), instance.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_secrets_roundtrip() {
        let store = StaticSecrets::new();
        store.insert(
            "acme-prod",
            "orders-db",
            Credentials::new("migrator", "pw").with_save_enabled(true),
        );

        let found = store.credentials("acme-prod", "orders-db").await.unwrap();
        assert_eq!(found.unwrap().user, "migrator");

        let missing = store.credentials("acme-prod", "other").await.unwrap();
        assert!(missing.is_none());
    }
}
