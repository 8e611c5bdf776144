// ABOUTME: Registry backed by a YAML document of named lists.
// ABOUTME: Scalar cells are stringified so sizes may be written with or without quotes.

use super::{ListId, ListRegistry, RegistryError, Row};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    #[serde(default)]
    rows: Vec<BTreeMap<String, Value>>,
}

/// In-memory registry loaded from YAML.
///
/// ```yaml
/// - name: Cisco OS SW Hashes
///   rows:
///     - Filename: c3560cx-universalk9-mz.152-7.E7.bin
///       Size: "15,728,640"
///       MD5: 0123456789abcdef0123456789abcdef
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    lists: Vec<(String, Vec<Row>)>,
}

impl FileRegistry {
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let entries: Vec<ListEntry> = serde_yaml::from_str(yaml)?;
        let lists = entries
            .into_iter()
            .map(|entry| {
                let rows = entry.rows.into_iter().map(stringify_row).collect();
                (entry.name, rows)
            })
            .collect();
        Ok(Self { lists })
    }

    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.lists.iter().map(|(name, _)| name.as_str())
    }
}

fn stringify_row(row: BTreeMap<String, Value>) -> Row {
    row.into_iter()
        .filter_map(|(column, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                _ => return None,
            };
            Some((column, text))
        })
        .collect()
}

#[async_trait]
impl ListRegistry for FileRegistry {
    async fn list_by_name(&self, name: &str) -> Result<ListId, RegistryError> {
        self.lists
            .iter()
            .position(|(n, _)| n == name)
            .map(ListId)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    async fn rows(&self, id: ListId) -> Result<Vec<Row>, RegistryError> {
        self.lists
            .get(id.0)
            .map(|(_, rows)| rows.clone())
            .ok_or(RegistryError::UnknownId(id))
    }
}
