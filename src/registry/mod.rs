// ABOUTME: Named lookup-list registry capability (image hashes, regional repositories).
// ABOUTME: Rows are string-keyed column maps; unknown names or ids are NotFound.

mod file;

pub use file::FileRegistry;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

/// One row of a lookup list: column name to cell text.
pub type Row = BTreeMap<String, String>;

/// Opaque identifier of a list inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId(pub usize);

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("list \"{0}\" does not exist in the registry")]
    NotFound(String),

    #[error("list id {0} does not exist in the registry")]
    UnknownId(ListId),

    #[error("failed to read registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A store of named lookup lists.
#[async_trait]
pub trait ListRegistry: Send + Sync {
    async fn list_by_name(&self, name: &str) -> Result<ListId, RegistryError>;

    async fn rows(&self, id: ListId) -> Result<Vec<Row>, RegistryError>;

    /// Convenience: resolve a list by name and fetch its rows.
    async fn rows_by_name(&self, name: &str) -> Result<Vec<Row>, RegistryError> {
        let id = self.list_by_name(name).await.inspect_err(|e| {
            tracing::error!("{e}");
        })?;
        self.rows(id).await
    }
}
