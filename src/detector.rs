// 🔎 Version Detector - Which template layout does this workbook use?
// One generic matcher applied to the registry's rules in priority order.
// Pure function of the grid: detecting twice gives the same answer.

use crate::grid::GridReader;
use crate::layout::{LayoutRegistry, Version};
use serde::{Deserialize, Serialize};

/// Detection outcome. Undetermined is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Detection {
    Detected { version: Version, rule_id: String },
    Undetermined,
}

impl Detection {
    pub fn version(&self) -> Option<Version> {
        match self {
            Detection::Detected { version, .. } => Some(*version),
            Detection::Undetermined => None,
        }
    }
}

pub struct VersionDetector<'a> {
    registry: &'a LayoutRegistry,
}

impl<'a> VersionDetector<'a> {
    pub fn new(registry: &'a LayoutRegistry) -> Self {
        VersionDetector { registry }
    }

    /// Detect the layout version of a source workbook
    pub fn detect<G: GridReader + ?Sized>(&self, grid: &G) -> Detection {
        for rule in self.registry.rules() {
            if let Some(version) = rule.evaluate(grid) {
                tracing::debug!(rule = %rule.id, %version, "detection rule matched");
                return Detection::Detected {
                    version,
                    rule_id: rule.id.clone(),
                };
            }
        }

        tracing::debug!("no detection rule matched");
        Detection::Undetermined
    }

    /// Detect the version of an empty output template by its title label
    pub fn detect_template<G: GridReader + ?Sized>(&self, grid: &G) -> Option<Version> {
        let first = grid.sheet_names().into_iter().next()?;
        self.registry
            .layouts()
            .iter()
            .find(|layout| layout.template_marker.matches(grid, &first))
            .map(|layout| layout.version)
    }
}

// ============================================================================
// TESTS
// ============================================================================
