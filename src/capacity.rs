// ABOUTME: Capacity validator: compares required bytes with free bytes per storage area.
// ABOUTME: Advisory logging plus a boolean gate; performs no mutation.

use crate::device::StorageArea;

/// Outcome of a capacity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityCheck {
    /// Names of failing storage areas, in input order.
    pub failing: Vec<String>,
}

impl CapacityCheck {
    /// True iff no storage area failed.
    pub fn passed(&self) -> bool {
        self.failing.is_empty()
    }
}

/// Check that `required` bytes fit on every storage area.
pub fn validate(required: u64, areas: &[StorageArea]) -> CapacityCheck {
    let mut failing = Vec::new();
    for area in areas {
        if required > area.free_bytes {
            let deficit = required - area.free_bytes;
            tracing::warn!(
                "  [FAIL] {}: target image exceeds the available space by {deficit} bytes",
                area.name
            );
            failing.push(area.name.clone());
        } else {
            let remaining = area.free_bytes - required;
            tracing::info!("  [PASS] {}: {remaining} bytes free after transfer", area.name);
        }
    }
    CapacityCheck { failing }
}
