// ⚖️ Cross-Total Validator - Activity hours must match both control tables
//
//   activities_total == control_total_a == control_total_b
//
// A mismatch is reported but never aborts the file: the output is still
// produced, with the mismatch surfaced prominently.

use crate::diagnostics::{Diagnostics, IssueCategory};
use crate::extractor::Activity;
use crate::grid::{column_index, CellRef, GridReader};
use crate::layout::Layout;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONTROL RANGE
// ============================================================================

/// ControlRange - a single-column block of hour counts (1-based rows)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRange {
    pub label: String,
    pub sheet: String,
    pub column: String,
    pub first_row: u32,
    pub last_row: u32,
}

impl ControlRange {
    pub fn new(label: &str, sheet: &str, column: &str, first_row: u32, last_row: u32) -> Self {
        ControlRange {
            label: label.to_string(),
            sheet: sheet.to_string(),
            column: column.to_string(),
            first_row,
            last_row,
        }
    }

    /// Hours grouped by form of activity (SDP!C4:C10)
    pub fn form_table() -> Self {
        ControlRange::new("form", "SDP", "C", 4, 10)
    }

    /// Hours grouped by topic (SDP!C12:C28)
    pub fn topic_table() -> Self {
        ControlRange::new("topic", "SDP", "C", 12, 28)
    }

    pub fn validate(&self) -> Result<()> {
        if column_index(&self.column).is_none() {
            bail!("Control range '{}' has an invalid column: {}", self.label, self.column);
        }
        if self.first_row == 0 || self.first_row > self.last_row {
            bail!(
                "Control range '{}' has invalid rows {}..{}",
                self.label,
                self.first_row,
                self.last_row
            );
        }
        Ok(())
    }

    /// Sum of the integer parts of every numeric cell; blanks count as 0
    pub fn sum<G: GridReader + ?Sized>(&self, grid: &G) -> i64 {
        let col = match column_index(&self.column) {
            Some(col) => col,
            None => return 0,
        };
        (self.first_row.max(1)..=self.last_row)
            .filter_map(|row| grid.cell_at(&self.sheet, row - 1, col).as_integer())
            .sum()
    }

    /// "SDP!C4:C10"
    pub fn reference(&self) -> String {
        let col = column_index(&self.column).unwrap_or(0);
        format!(
            "{}!{}:{}",
            self.sheet,
            CellRef::new(&self.sheet, self.first_row.saturating_sub(1), col),
            CellRef::new(&self.sheet, self.last_row.saturating_sub(1), col)
        )
    }
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub activities_total: i64,
    pub control_total_a: i64,
    pub control_total_b: i64,
    pub matched: bool,
}

impl ValidationReport {
    pub fn from_totals(activities_total: i64, control_total_a: i64, control_total_b: i64) -> Self {
        ValidationReport {
            activities_total,
            control_total_a,
            control_total_b,
            matched: activities_total == control_total_a && control_total_a == control_total_b,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "activities {} h, control A {} h, control B {} h: {}",
            self.activities_total,
            self.control_total_a,
            self.control_total_b,
            if self.matched { "match" } else { "MISMATCH" }
        )
    }
}

/// Total hours of an activity list
pub fn activities_total(activities: &[Activity]) -> i64 {
    activities.iter().map(|a| a.hours as i64).sum()
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct CrossTotalValidator {
    range_a: ControlRange,
    range_b: ControlRange,
}

impl CrossTotalValidator {
    pub fn new(range_a: ControlRange, range_b: ControlRange) -> Self {
        CrossTotalValidator { range_a, range_b }
    }

    /// Sum both control ranges from `grid` and compare
    pub fn validate<G: GridReader + ?Sized>(
        &self,
        grid: &G,
        activities: &[Activity],
        diags: &mut Diagnostics,
    ) -> ValidationReport {
        for range in [&self.range_a, &self.range_b] {
            if !grid.has_sheet(&range.sheet) {
                diags.warning(
                    IssueCategory::SumCheck,
                    format!(
                        "Control sheet '{}' not found, the {} table counts as 0 hours",
                        range.sheet, range.label
                    ),
                );
            }
        }

        let report = self.validate_totals(
            activities_total(activities),
            self.range_a.sum(grid),
            self.range_b.sum(grid),
            diags,
        );
        tracing::debug!(summary = %report.summary(), "cross-total check");
        report
    }

    /// Compare already computed totals (also used for writer confirmation)
    pub fn validate_totals(
        &self,
        activities_total: i64,
        control_total_a: i64,
        control_total_b: i64,
        diags: &mut Diagnostics,
    ) -> ValidationReport {
        let report = ValidationReport::from_totals(activities_total, control_total_a, control_total_b);

        if report.matched {
            diags.info(
                IssueCategory::SumCheck,
                format!(
                    "Hour totals match: {} h in activities, the {} table and the {} table",
                    activities_total, self.range_a.label, self.range_b.label
                ),
            );
        } else {
            diags.error(
                IssueCategory::SumMismatch,
                format!(
                    "Hour totals do not match: activities {} h, {} table ({}) {} h, {} table ({}) {} h",
                    activities_total,
                    self.range_a.label,
                    self.range_a.reference(),
                    control_total_a,
                    self.range_b.label,
                    self.range_b.reference(),
                    control_total_b
                ),
            );
            diags.warning(
                IssueCategory::SumMismatch,
                "Inspect the activity list against the control tables before using the output",
            );
        }

        report
    }
}

impl Default for CrossTotalValidator {
    fn default() -> Self {
        CrossTotalValidator::new(ControlRange::form_table(), ControlRange::topic_table())
    }
}

/// Warn when the extracted hours differ from the template's nominal size
pub fn check_template_size(activities: &[Activity], layout: &Layout, diags: &mut Diagnostics) -> bool {
    let total = activities_total(activities);
    if total == layout.total_hours as i64 {
        return true;
    }
    diags.warning(
        IssueCategory::TemplateHours,
        format!(
            "Activities add up to {} h but the {} template expects {} h",
            total, layout.version, layout.total_hours
        ),
    );
    false
}

// ============================================================================
// TESTS
// ============================================================================
