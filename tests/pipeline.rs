// 🧪 Pipeline Tests - Source grid to validated activities, end to end

use attendance_ledger::{
    AttendanceProcessor, Confidence, DateCompleter, FileStatus, IssueCategory, MemoryGrid,
    Version, VersionDetector, LayoutRegistry,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;

const SHEET: &str = "zdroj-dochazka";

fn tokens(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Source sheet with the 32h layout; control tables hold `form_total` and `topic_total`
fn source_32h(dates: &[&str], hours: &[f64], form_total: f64, topic_total: f64) -> MemoryGrid {
    let mut grid = MemoryGrid::new().with_sheet(SHEET).with_sheet("SDP");
    grid.set_a1(SHEET, "B6", "Datum aktivity").unwrap();
    grid.set_a1(SHEET, "B7", "Forma").unwrap();
    grid.set_a1(SHEET, "B10", "Počet hodin").unwrap();

    for (i, h) in hours.iter().enumerate() {
        let col = 2 + i as u32;
        if let Some(date) = dates.get(i).filter(|d| !d.is_empty()) {
            grid.set(SHEET, 5, col, *date);
        }
        grid.set(SHEET, 6, col, "Workshop");
        grid.set(SHEET, 7, col, "Čtenářská gramotnost");
        grid.set(SHEET, 8, col, "Mgr. Nováková");
        grid.set(SHEET, 9, col, *h);
    }
    grid.set(SHEET, 10, 1, "Jana Dvořáková");
    grid.set(SHEET, 11, 1, "Petr Svoboda");

    grid.set("SDP", 3, 2, form_total);
    grid.set("SDP", 11, 2, topic_total);
    grid
}

fn source_16h(start_label: &str) -> MemoryGrid {
    let mut grid = MemoryGrid::new().with_sheet(SHEET).with_sheet("SDP");
    grid.set_a1(SHEET, "B6", "Datum aktivity").unwrap();
    grid.set_a1(SHEET, "B7", start_label).unwrap();

    for (i, date) in ["3.10.2024", "10.10.2024"].iter().enumerate() {
        let col = 2 + i as u32;
        grid.set(SHEET, 5, col, *date);
        grid.set(SHEET, 6, col, "14:00");
        grid.set(SHEET, 7, col, "Seminář");
        grid.set(SHEET, 8, col, "Matematika");
        grid.set(SHEET, 9, col, "Bc. Král");
        grid.set(SHEET, 10, col, 8.0);
    }
    grid.set(SHEET, 11, 1, "Eva Malá");

    grid.set("SDP", 3, 2, 16.0);
    grid.set("SDP", 11, 2, 16.0);
    grid
}

#[test]
fn test_clean_32h_file_matches() {
    let grid = source_32h(
        &["2.9.2024", "9.9.2024", "16.9.2024", "23.9.2024"],
        &[8.0, 8.0, 8.0, 8.0],
        32.0,
        32.0,
    );

    let mut processor = AttendanceProcessor::default();
    let outcome = processor.process_grid("dochazka.xlsx", &grid);

    assert_eq!(outcome.status, FileStatus::Success);
    assert_eq!(outcome.version, Some(Version::ThirtyTwoHour));
    assert_eq!(outcome.activities.len(), 4);
    assert_eq!(outcome.total_hours(), 32);

    let validation = outcome.validation.as_ref().unwrap();
    assert!(validation.matched);
    assert_eq!(
        (validation.activities_total, validation.control_total_a, validation.control_total_b),
        (32, 32, 32)
    );
    assert!(outcome.diagnostics.errors.is_empty());
    assert_eq!(outcome.diagnostics.by_category(IssueCategory::SumCheck).len(), 1);
}

#[test]
fn test_processing_is_idempotent() {
    let grid = source_32h(&["2.9.2024", "9.9.", "16.9.2024"], &[8.0, 8.0, 16.0], 32.0, 32.0);

    let first = AttendanceProcessor::default().process_grid("a.xlsx", &grid);
    let second = AttendanceProcessor::default().process_grid("a.xlsx", &grid);

    assert_eq!(first.activities, second.activities);
    assert_eq!(first.participants, second.participants);
    assert_eq!(first.validation, second.validation);
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn test_extraction_stops_at_first_non_positive_hours() {
    let grid = source_32h(
        &["2.9.2024", "9.9.2024", "16.9.2024", "23.9.2024"],
        &[2.0, 3.0, 2.0, 0.0],
        7.0,
        7.0,
    );

    let outcome = AttendanceProcessor::default().process_grid("a.xlsx", &grid);

    assert_eq!(outcome.activities.len(), 3);
    assert_eq!(
        outcome.activities.iter().map(|a| a.hours).collect::<Vec<_>>(),
        vec![2, 3, 2]
    );
    assert!(outcome.validation.as_ref().unwrap().matched);
}

#[test]
fn test_year_less_date_between_same_year_neighbours() {
    let completer = DateCompleter::new();
    let outcome = completer.complete(1, &tokens(&["16.6.2024", "17.6.", "19.6.2024"]));

    assert_eq!(outcome.fixed.as_deref(), Some("17.6.2024"));
    assert_eq!(outcome.resolved, NaiveDate::from_ymd_opt(2024, 6, 17));
    assert_eq!(outcome.confidence, Confidence::High);
}

#[test]
fn test_noisy_neighbour_still_dates_year_less_token() {
    let completer = DateCompleter::new();
    let outcome = completer.complete(1, &tokens(&["24 .1.2025", "15.2."]));

    assert_eq!(outcome.fixed.as_deref(), Some("15.2.2025"));
    assert_eq!(outcome.confidence, Confidence::High);
}

#[test]
fn test_repaired_dates_are_reported_per_cell() {
    let grid = source_32h(&["2.9.2024", "9.9.", "16.9.2024"], &[8.0, 8.0, 16.0], 32.0, 32.0);
    let outcome = AttendanceProcessor::default().process_grid("a.xlsx", &grid);

    assert_eq!(outcome.status, FileStatus::Success);
    assert_eq!(outcome.activities[1].date, NaiveDate::from_ymd_opt(2024, 9, 9).unwrap());

    let repairs = outcome.diagnostics.by_category(IssueCategory::DateRepaired);
    assert_eq!(repairs.len(), 1);
    assert_eq!(repairs[0].cell.as_ref().map(|c| c.a1()), Some("D6".to_string()));
    assert_eq!(repairs[0].fixed.as_deref(), Some("9.9.2024"));
}

#[test]
fn test_start_time_label_selects_16h_in_any_case() {
    let registry = LayoutRegistry::builtin();
    let detector = VersionDetector::new(&registry);

    assert_eq!(detector.detect(&source_16h("ČAS ZAHÁJENÍ")).version(), Some(Version::SixteenHour));
    assert_eq!(detector.detect(&source_16h("čas Zahájení aktivity")).version(), Some(Version::SixteenHour));
    assert_eq!(detector.detect(&source_16h("Forma")).version(), Some(Version::ThirtyTwoHour));

    let outcome = AttendanceProcessor::default().process_grid("a.xlsx", &source_16h("Čas zahájení"));
    assert_eq!(outcome.status, FileStatus::Success);
    assert_eq!(outcome.activities[0].time.as_deref(), Some("14:00"));
}

#[test]
fn test_missing_date_fails_file_with_one_error() {
    let grid = source_32h(&["2.9.2024", "", "16.9.2024"], &[8.0, 8.0, 16.0], 32.0, 32.0);
    let outcome = AttendanceProcessor::default().process_grid("a.xlsx", &grid);

    assert_eq!(outcome.status, FileStatus::Failed);
    assert!(outcome.activities.is_empty());
    assert_eq!(outcome.diagnostics.errors.len(), 1);

    let error = &outcome.diagnostics.errors[0];
    assert_eq!(error.category, IssueCategory::MissingOrUnparseableDate);
    assert!(error.message.contains("D6"), "{}", error.message);
    assert!(outcome.diagnostics.by_category(IssueCategory::DateRepaired).is_empty());
}

#[test]
fn test_total_mismatch_lists_all_three_totals() {
    let grid = source_32h(&["2.9.2024", "9.9.2024"], &[16.0, 14.0], 32.0, 30.0);
    let outcome = AttendanceProcessor::default().process_grid("a.xlsx", &grid);

    let validation = outcome.validation.as_ref().unwrap();
    assert!(!validation.matched);
    assert_eq!(
        (validation.activities_total, validation.control_total_a, validation.control_total_b),
        (30, 32, 30)
    );

    let mismatches: Vec<_> = outcome
        .diagnostics
        .errors
        .iter()
        .filter(|d| d.category == IssueCategory::SumMismatch)
        .collect();
    assert_eq!(mismatches.len(), 1);
    let message = &mismatches[0].message;
    assert!(message.contains("activities 30 h"), "{}", message);
    assert!(message.contains("32 h"), "{}", message);
    assert!(message.contains("(SDP!C12:C28) 30 h"), "{}", message);
    assert_eq!(outcome.status, FileStatus::CompletedWithIssues);
}
