// 📥 Activity Grid Extractor - Walk the attendance grid column by column
//
// Columns are scanned left to right from the layout's start column. The
// first column whose hours cell is not a positive integer ends the scan.
// Dates are all-or-nothing: one unusable date aborts the whole file.

use crate::date_completer::{DateCompleter, DateRepairOutcome};
use crate::diagnostics::Diagnostics;
use crate::error::ProcessError;
use crate::grid::{column_letters, CellRef, GridReader, MAX_COLUMNS};
use crate::layout::Layout;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel used when a descriptive field is left empty
pub const DEFAULT_UNSPECIFIED: &str = "Unspecified";

/// Participant scan stops after this many empty name cells in a row
const PARTICIPANT_GAP_LIMIT: u32 = 2;

// ============================================================================
// ACTIVITY
// ============================================================================

/// Activity - one dated session; `hours` is always positive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Activity {
    pub date: NaiveDate,
    pub hours: u32,
    pub form: String,
    pub topic: String,
    pub teacher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl Activity {
    /// Date as written in the templates ("17.06.2024")
    pub fn date_text(&self) -> String {
        self.date.format("%d.%m.%Y").to_string()
    }
}

/// Date cell as seen during the first pass
enum DateSource {
    Native(NaiveDate),
    Token,
}

// ============================================================================
// EXTRACTOR
// ============================================================================

pub struct ActivityGridExtractor<'a> {
    completer: &'a DateCompleter,
    unspecified_text: String,
}

impl<'a> ActivityGridExtractor<'a> {
    pub fn new(completer: &'a DateCompleter) -> Self {
        ActivityGridExtractor {
            completer,
            unspecified_text: DEFAULT_UNSPECIFIED.to_string(),
        }
    }

    /// Builder pattern: sentinel for empty form/topic/teacher cells
    pub fn with_unspecified_text(mut self, text: &str) -> Self {
        self.unspecified_text = text.to_string();
        self
    }

    /// Extract the ordered activity list from `sheet`
    pub fn extract<G: GridReader + ?Sized>(
        &self,
        grid: &G,
        layout: &Layout,
        sheet: &str,
        diags: &mut Diagnostics,
    ) -> Result<Vec<Activity>, ProcessError> {
        let column_limit = self.check_structure(grid, layout, sheet)?;

        // Pass 1: hours decide which columns exist
        let mut columns: Vec<(u32, u32)> = Vec::new();
        let mut col = layout.data_start_col;
        while col < column_limit {
            match grid.cell_at(sheet, layout.hours_row, col).as_positive_hours() {
                Some(hours) => columns.push((col, hours)),
                None => break,
            }
            col += 1;
        }
        tracing::debug!(
            sheet,
            columns = columns.len(),
            stop = %format!("{}{}", column_letters(col), layout.hours_row + 1),
            "hours scan finished"
        );

        if columns.is_empty() {
            return Err(ProcessError::StructuralShortfall {
                reason: format!(
                    "no activity with positive hours found from cell {} of sheet '{}'",
                    CellRef::new(sheet, layout.hours_row, layout.data_start_col),
                    sheet
                ),
            });
        }

        // Pass 2: resolve every date before anything is reported
        let mut sources = Vec::with_capacity(columns.len());
        let mut tokens = Vec::with_capacity(columns.len());
        for (col, _) in &columns {
            let cell = grid.cell_at(sheet, layout.dates_row, *col);
            match cell.as_native_date() {
                Some(date) => {
                    tokens.push(date.format("%d.%m.%Y").to_string());
                    sources.push(DateSource::Native(date));
                }
                None => {
                    tokens.push(cell.as_text().unwrap_or_default());
                    sources.push(DateSource::Token);
                }
            }
        }

        let mut resolved: Vec<(NaiveDate, Option<DateRepairOutcome>)> =
            Vec::with_capacity(columns.len());
        for (index, ((col, _), source)) in columns.iter().zip(&sources).enumerate() {
            match source {
                DateSource::Native(date) => resolved.push((*date, None)),
                DateSource::Token => {
                    let outcome = self.completer.complete(index, &tokens);
                    match outcome.resolved {
                        Some(date) => resolved.push((date, Some(outcome))),
                        None => {
                            return Err(ProcessError::MissingOrUnparseableDate {
                                cell: CellRef::new(sheet, layout.dates_row, *col),
                                value: outcome.original,
                            });
                        }
                    }
                }
            }
        }

        // Pass 3: assemble
        let mut activities = Vec::with_capacity(columns.len());
        for ((col, hours), (date, outcome)) in columns.iter().zip(resolved) {
            if let Some(outcome) = &outcome {
                let cell = CellRef::new(sheet, layout.dates_row, *col);
                self.completer.report(outcome, &cell, diags);
            }

            activities.push(Activity {
                date,
                hours: *hours,
                form: self.text_or_sentinel(grid, sheet, layout.form_row, *col),
                topic: self.text_or_sentinel(grid, sheet, layout.topic_row, *col),
                teacher: self.text_or_sentinel(grid, sheet, layout.teacher_row, *col),
                time: layout
                    .time_row
                    .and_then(|row| grid.cell_at(sheet, row, *col).as_text()),
            });
        }

        Ok(activities)
    }

    /// Participant names below the activity block, stopping at a gap of two
    pub fn extract_participants<G: GridReader + ?Sized>(
        &self,
        grid: &G,
        layout: &Layout,
        sheet: &str,
        scan_limit: u32,
    ) -> Vec<String> {
        let start = layout.participant_start_row;
        let end = match grid.dimensions(sheet) {
            Some((rows, _)) => rows,
            None => start.saturating_add(scan_limit),
        };

        let mut names = Vec::new();
        let mut gap = 0;
        for row in start..end {
            match grid.cell_at(sheet, row, layout.participant_col).as_text() {
                Some(name) => {
                    gap = 0;
                    names.push(name);
                }
                None => {
                    gap += 1;
                    if gap >= PARTICIPANT_GAP_LIMIT {
                        break;
                    }
                }
            }
        }
        names
    }

    /// Reject grids that cannot hold the layout; returns the column scan limit
    fn check_structure<G: GridReader + ?Sized>(
        &self,
        grid: &G,
        layout: &Layout,
        sheet: &str,
    ) -> Result<u32, ProcessError> {
        if !grid.has_sheet(sheet) {
            return Err(ProcessError::StructuralShortfall {
                reason: format!("sheet '{}' is missing", sheet),
            });
        }

        match grid.dimensions(sheet) {
            Some((rows, cols)) => {
                if rows <= layout.hours_row || cols <= layout.data_start_col {
                    return Err(ProcessError::StructuralShortfall {
                        reason: format!(
                            "sheet '{}' spans {} rows and {} columns, the {} layout needs data in {}",
                            sheet,
                            rows,
                            cols,
                            layout.version,
                            CellRef::new(sheet, layout.hours_row, layout.data_start_col)
                        ),
                    });
                }
                Ok(cols)
            }
            None => Ok(MAX_COLUMNS),
        }
    }

    fn text_or_sentinel<G: GridReader + ?Sized>(
        &self,
        grid: &G,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> String {
        grid.cell_at(sheet, row, col)
            .as_text()
            .unwrap_or_else(|| self.unspecified_text.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::IssueCategory;
    use crate::grid::{MemoryGrid, RawCell};
    use crate::layout::{LayoutRegistry, Version};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    const SHEET: &str = "zdroj-dochazka";

    /// Grid wrapper that records every (row, col) read
    struct RecordingGrid {
        inner: MemoryGrid,
        reads: RefCell<Vec<(u32, u32)>>,
    }

    impl GridReader for RecordingGrid {
        fn sheet_names(&self) -> Vec<String> {
            self.inner.sheet_names()
        }

        fn cell_at(&self, sheet: &str, row: u32, col: u32) -> RawCell {
            self.reads.borrow_mut().push((row, col));
            self.inner.cell_at(sheet, row, col)
        }

        fn dimensions(&self, sheet: &str) -> Option<(u32, u32)> {
            self.inner.dimensions(sheet)
        }
    }

    fn layout(version: Version) -> Layout {
        LayoutRegistry::builtin().layout(version).cloned().unwrap()
    }

    fn sixteen_hour_grid(hours: &[f64], dates: &[&str]) -> MemoryGrid {
        let l = layout(Version::SixteenHour);
        let mut grid = MemoryGrid::new().with_sheet(SHEET);
        for (i, (h, d)) in hours.iter().zip(dates).enumerate() {
            let col = l.data_start_col + i as u32;
            grid.set(SHEET, l.hours_row, col, *h);
            grid.set(SHEET, l.dates_row, col, *d);
            grid.set(SHEET, l.time_row.unwrap(), col, "16:00");
            grid.set(SHEET, l.form_row, col, "Workshop");
            grid.set(SHEET, l.topic_row, col, "Digital literacy");
            grid.set(SHEET, l.teacher_row, col, "Novák");
        }
        grid
    }

    #[test]
    fn test_extracts_contiguous_columns_in_order() {
        let grid = sixteen_hour_grid(&[2.0, 3.0], &["14.5.2024", "16.6.2024"]);
        let completer = DateCompleter::new();
        let mut diags = Diagnostics::new();

        let activities = ActivityGridExtractor::new(&completer)
            .extract(&grid, &layout(Version::SixteenHour), SHEET, &mut diags)
            .unwrap();

        assert_eq!(
            activities[1],
            Activity {
                date: NaiveDate::from_ymd_opt(2024, 6, 16).unwrap(),
                hours: 3,
                form: "Workshop".to_string(),
                topic: "Digital literacy".to_string(),
                teacher: "Novák".to_string(),
                time: Some("16:00".to_string()),
            }
        );
        assert_eq!(activities.len(), 2);
        assert!(diags.snapshot().info.is_empty());
    }

    #[test]
    fn test_termination_column_is_not_read_further() {
        let inner = sixteen_hour_grid(
            &[2.0, 3.0, 2.0, 0.0],
            &["1.9.2024", "2.9.2024", "3.9.2024", "4.9.2024"],
        );
        let grid = RecordingGrid {
            inner,
            reads: RefCell::new(Vec::new()),
        };
        let l = layout(Version::SixteenHour);
        let completer = DateCompleter::new();
        let mut diags = Diagnostics::new();

        let activities = ActivityGridExtractor::new(&completer)
            .extract(&grid, &l, SHEET, &mut diags)
            .unwrap();
        assert_eq!(activities.len(), 3);

        let stop_col = l.data_start_col + 3;
        let reads = grid.reads.borrow();
        assert!(reads.contains(&(l.hours_row, stop_col)));
        assert!(reads
            .iter()
            .all(|(row, col)| *col != stop_col || *row == l.hours_row));
        assert!(reads.iter().all(|(_, col)| *col <= stop_col));
    }

    #[test]
    fn test_missing_siblings_use_sentinel() {
        let l = layout(Version::ThirtyTwoHour);
        let mut grid = MemoryGrid::new().with_sheet(SHEET);
        grid.set(SHEET, l.hours_row, 2, 4.0);
        grid.set(SHEET, l.dates_row, 2, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        let completer = DateCompleter::new();
        let mut diags = Diagnostics::new();
        let activities = ActivityGridExtractor::new(&completer)
            .with_unspecified_text("Neuvedeno")
            .extract(&grid, &l, SHEET, &mut diags)
            .unwrap();

        assert_eq!(activities[0].form, "Neuvedeno");
        assert_eq!(activities[0].teacher, "Neuvedeno");
        assert_eq!(activities[0].time, None);
        assert_eq!(activities[0].date_text(), "01.03.2025");
    }

    #[test]
    fn test_missing_date_is_fatal_and_names_cell() {
        let l = layout(Version::ThirtyTwoHour);
        let mut grid = MemoryGrid::new().with_sheet(SHEET);
        for col in 2..5 {
            grid.set(SHEET, l.hours_row, col, 2.0);
        }
        grid.set(SHEET, l.dates_row, 2, "1.10.2024");
        grid.set(SHEET, l.dates_row, 4, "3.10.");

        let completer = DateCompleter::new();
        let mut diags = Diagnostics::new();
        let err = ActivityGridExtractor::new(&completer)
            .extract(&grid, &l, SHEET, &mut diags)
            .unwrap_err();

        assert_eq!(err.cell().map(|c| c.a1()), Some("D6".to_string()));
        // Repairs of other columns are not reported for a failed file
        assert!(diags.snapshot().info.is_empty());
    }

    #[test]
    fn test_repairs_are_reported_with_cell() {
        let grid = sixteen_hour_grid(&[2.0, 2.0, 2.0], &["14.5.2024", "17.6.", "19,7,2024"]);
        let completer = DateCompleter::new();
        let mut diags = Diagnostics::new();

        ActivityGridExtractor::new(&completer)
            .extract(&grid, &layout(Version::SixteenHour), SHEET, &mut diags)
            .unwrap();

        let report = diags.snapshot();
        let repairs = report.by_category(IssueCategory::DateRepaired);
        assert_eq!(repairs.len(), 2);
        assert_eq!(repairs[0].cell.as_ref().map(|c| c.a1()), Some("D6".to_string()));
        assert_eq!(repairs[0].fixed.as_deref(), Some("17.6.2024"));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_structural_shortfalls() {
        let l = layout(Version::SixteenHour);
        let completer = DateCompleter::new();
        let extractor = ActivityGridExtractor::new(&completer);
        let mut diags = Diagnostics::new();

        let grid = MemoryGrid::new().with_sheet("Other");
        let err = extractor.extract(&grid, &l, SHEET, &mut diags).unwrap_err();
        assert!(matches!(err, ProcessError::StructuralShortfall { .. }));

        let mut grid = MemoryGrid::new();
        grid.set(SHEET, 3, 1, "title");
        let err = extractor.extract(&grid, &l, SHEET, &mut diags).unwrap_err();
        assert!(err.to_string().contains("C11"));

        let mut grid = MemoryGrid::new();
        grid.set(SHEET, l.hours_row, 2, "x");
        let err = extractor.extract(&grid, &l, SHEET, &mut diags).unwrap_err();
        assert!(matches!(err, ProcessError::StructuralShortfall { .. }));
    }

    #[test]
    fn test_participants_stop_after_two_gaps() {
        let l = layout(Version::SixteenHour);
        let mut grid = MemoryGrid::new();
        let start = l.participant_start_row;
        grid.set(SHEET, start, 1, " Jana Dvořáková ");
        grid.set(SHEET, start + 1, 1, "Petr Svoboda");
        grid.set(SHEET, start + 3, 1, "Eva Malá");
        grid.set(SHEET, start + 6, 1, "Too far");

        let completer = DateCompleter::new();
        let names = ActivityGridExtractor::new(&completer).extract_participants(&grid, &l, SHEET, 1000);
        assert_eq!(names, vec!["Jana Dvořáková", "Petr Svoboda", "Eva Malá"]);
    }
}
