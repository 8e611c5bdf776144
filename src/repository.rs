// ABOUTME: Repository resolver: maps a region and network view to a source address.
// ABOUTME: An operator override bypasses the lookup entirely.

use crate::registry::Row;

pub const REGION_COLUMN: &str = "Region";
pub const NETWORK_VIEW_COLUMN: &str = "Network View";
pub const ADDRESS_COLUMN: &str = "Address";

/// Default name of the regional repository list.
pub const DEFAULT_REPOSITORY_LIST: &str = "Cisco OS SW Regional Repos";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("unable to find repo for region \"{region}\", view \"{network_view}\"")]
    NotFound {
        region: String,
        network_view: String,
    },
}

/// Where the source repository address comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySource {
    /// Operator-supplied address.
    Override(String),
    /// Look up `list` in the registry for `region` and the device network view.
    Region { list: String, region: String },
}

/// Return the address of the first row matching both region and network view.
pub fn resolve(rows: &[Row], region: &str, network_view: &str) -> Result<String, RepositoryError> {
    let found = rows.iter().find(|row| {
        row.get(REGION_COLUMN).is_some_and(|r| r == region)
            && row.get(NETWORK_VIEW_COLUMN).is_some_and(|v| v == network_view)
    });

    match found.and_then(|row| row.get(ADDRESS_COLUMN)) {
        Some(address) => {
            tracing::info!(%address, "selected repo");
            Ok(address.clone())
        }
        None => {
            let err = RepositoryError::NotFound {
                region: region.to_string(),
                network_view: network_view.to_string(),
            };
            tracing::error!("{err}");
            Err(err)
        }
    }
}
