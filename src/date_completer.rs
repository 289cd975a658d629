// 📅 Date Completer - Repair incomplete or mistyped activity dates
//
// Pipeline per token:
//   1. Normalize: commas → periods, whitespace around periods, 2-digit years
//   2. Classify: fully specified / missing year / unrecognizable
//   3. Missing year → infer it from dated neighbours (±3 columns)
//
// Confidence is a first-class value so reporting can pick a severity
// without re-reading message text.

use crate::diagnostics::{Diagnostic, Diagnostics, IssueCategory};
use crate::grid::CellRef;
use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Columns inspected on each side of the token being repaired
pub const NEIGHBOR_WINDOW: usize = 3;

/// Share of neighbour years the majority needs for Medium confidence
pub const MEDIUM_CONFIDENCE_SHARE: f64 = 0.7;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        write!(f, "{}", label)
    }
}

/// One change applied to a token on its way to a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairStep {
    CommaReplaced,
    WhitespaceCollapsed,
    TwoDigitYearExpanded,
    YearInferred,
}

/// Plausible years for dated neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        self.min <= year && year <= self.max
    }
}

impl Default for YearRange {
    fn default() -> Self {
        YearRange { min: 2000, max: 2099 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRepairOutcome {
    pub original: String,
    pub normalized: String,
    pub resolved: Option<NaiveDate>,
    /// Repaired text ("17.6.2024"), present only when something changed
    pub fixed: Option<String>,
    pub confidence: Confidence,
    pub note: String,
    pub steps: Vec<RepairStep>,
}

impl DateRepairOutcome {
    pub fn was_repaired(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// Result of looking at the neighbours of a year-less token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearInference {
    pub year: i32,
    pub confidence: Confidence,
    /// Years of dated neighbours in window order
    pub neighbor_years: Vec<i32>,
    pub escalated: bool,
}

enum TokenShape {
    Complete(NaiveDate),
    MissingYear { day: String, month: String },
    Unrecognized,
}

// ============================================================================
// PATTERNS
// ============================================================================

struct DatePatterns {
    complete: Regex,
    missing_year: Regex,
    two_digit_year: Regex,
    period_spacing: Regex,
}

fn patterns() -> &'static DatePatterns {
    static PATTERNS: OnceLock<DatePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| DatePatterns {
        complete: Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("static date pattern"),
        missing_year: Regex::new(r"^(\d{1,2})\.(\d{1,2})\.?$").expect("static date pattern"),
        two_digit_year: Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{2})$").expect("static date pattern"),
        period_spacing: Regex::new(r"\s*\.\s*").expect("static date pattern"),
    })
}

/// Other complete spellings accepted as-is
const ALTERNATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

// ============================================================================
// DATE COMPLETER
// ============================================================================

pub struct DateCompleter {
    reference_year: Option<i32>,
    year_range: YearRange,
}

impl DateCompleter {
    pub fn new() -> Self {
        DateCompleter {
            reference_year: None,
            year_range: YearRange::default(),
        }
    }

    /// Builder pattern: fixed fallback year instead of the calendar year
    pub fn with_reference_year(mut self, year: Option<i32>) -> Self {
        self.reference_year = year;
        self
    }

    /// Builder pattern: plausible neighbour years
    pub fn with_year_range(mut self, range: YearRange) -> Self {
        self.year_range = range;
        self
    }

    fn fallback_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Local::now().year())
    }

    /// Repair `tokens[index]` using the rest of the row as context
    pub fn complete(&self, index: usize, tokens: &[String]) -> DateRepairOutcome {
        let original = tokens.get(index).cloned().unwrap_or_default();
        let (normalized, mut steps) = self.normalize(&original);

        match classify(&normalized) {
            TokenShape::Complete(date) => {
                let fixed = if steps.is_empty() {
                    None
                } else {
                    Some(normalized.clone())
                };
                let note = if steps.is_empty() {
                    "date is complete".to_string()
                } else {
                    "typing error corrected".to_string()
                };
                DateRepairOutcome {
                    original,
                    normalized,
                    resolved: Some(date),
                    fixed,
                    confidence: Confidence::High,
                    note,
                    steps,
                }
            }
            TokenShape::MissingYear { day, month } => {
                let inference = self.infer_year(index, tokens, month.parse().unwrap_or(0));
                let resolved = match (day.parse::<u32>(), month.parse::<u32>()) {
                    (Ok(d), Ok(m)) => NaiveDate::from_ymd_opt(inference.year, m, d),
                    _ => None,
                };

                let note = if inference.neighbor_years.is_empty() {
                    format!("no dated neighbours, assumed {}", inference.year)
                } else {
                    format!(
                        "year {} inferred from {} neighbouring date(s)",
                        inference.year,
                        inference.neighbor_years.len()
                    )
                };

                match resolved {
                    Some(date) => {
                        steps.push(RepairStep::YearInferred);
                        DateRepairOutcome {
                            original,
                            normalized,
                            resolved: Some(date),
                            fixed: Some(format!("{}.{}.{}", day, month, inference.year)),
                            confidence: inference.confidence,
                            note,
                            steps,
                        }
                    }
                    None => unresolved(original, normalized, steps, "day or month out of range"),
                }
            }
            TokenShape::Unrecognized => {
                unresolved(original, normalized, steps, "not a recognizable date")
            }
        }
    }

    /// Apply typo fixes; returns the cleaned token and what was changed
    pub fn normalize(&self, token: &str) -> (String, Vec<RepairStep>) {
        let p = patterns();
        let mut steps = Vec::new();
        let mut text = token.trim().to_string();

        if text.contains(',') {
            text = text.replace(',', ".");
            steps.push(RepairStep::CommaReplaced);
        }

        let collapsed = p.period_spacing.replace_all(&text, ".").into_owned();
        if collapsed != text {
            text = collapsed;
            steps.push(RepairStep::WhitespaceCollapsed);
        }

        let expanded = p.two_digit_year.captures(&text).and_then(|caps| {
            let year: i32 = caps[3].parse().ok()?;
            let full = if year < 30 { 2000 + year } else { 1900 + year };
            Some(format!("{}.{}.{}", &caps[1], &caps[2], full))
        });
        if let Some(expanded) = expanded {
            text = expanded;
            steps.push(RepairStep::TwoDigitYearExpanded);
        }

        (text, steps)
    }

    /// Infer the year of a year-less token from dated neighbours
    pub fn infer_year(&self, index: usize, tokens: &[String], month: u32) -> YearInference {
        let start = index.saturating_sub(NEIGHBOR_WINDOW);
        let end = (index + NEIGHBOR_WINDOW).min(tokens.len().saturating_sub(1));

        let mut neighbor_years = Vec::new();
        for i in start..=end {
            if i == index {
                continue;
            }
            if let Some(date) = self.complete_neighbor(tokens, i) {
                if self.year_range.contains(date.year()) {
                    neighbor_years.push(date.year());
                }
            }
        }

        if neighbor_years.is_empty() {
            return YearInference {
                year: self.fallback_year(),
                confidence: Confidence::Low,
                neighbor_years,
                escalated: false,
            };
        }

        // (year, count) in order of first appearance
        let mut counts: Vec<(i32, usize)> = Vec::new();
        for year in &neighbor_years {
            match counts.iter_mut().find(|(y, _)| y == year) {
                Some(entry) => entry.1 += 1,
                None => counts.push((*year, 1)),
            }
        }

        let mut majority = counts[0];
        for entry in &counts[1..] {
            if entry.1 > majority.1 {
                majority = *entry;
            }
        }
        let (year, count) = majority;

        let mut confidence = if counts.len() == 1 {
            Confidence::High
        } else if count as f64 >= neighbor_years.len() as f64 * MEDIUM_CONFIDENCE_SHARE {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        let previous_fits = index
            .checked_sub(1)
            .and_then(|i| self.complete_neighbor(tokens, i))
            .map(|d| d.year() == year && d.month() < month)
            .unwrap_or(false);
        let next_fits = self
            .complete_neighbor(tokens, index + 1)
            .map(|d| d.year() == year && d.month() > month)
            .unwrap_or(false);

        let escalated = (previous_fits || next_fits) && confidence != Confidence::High;
        if previous_fits || next_fits {
            confidence = Confidence::High;
        }

        YearInference {
            year,
            confidence,
            neighbor_years,
            escalated,
        }
    }

    fn complete_neighbor(&self, tokens: &[String], i: usize) -> Option<NaiveDate> {
        let token = tokens.get(i)?;
        match classify(&self.normalize(token).0) {
            TokenShape::Complete(date) => Some(date),
            _ => None,
        }
    }

    /// Turn a repair into diagnostics for `cell`.
    /// Untouched tokens stay silent; unresolved ones are the caller's to report.
    pub fn report(&self, outcome: &DateRepairOutcome, cell: &CellRef, diags: &mut Diagnostics) {
        let fixed = match (&outcome.resolved, &outcome.fixed) {
            (Some(_), Some(fixed)) => fixed,
            _ => return,
        };

        diags.push(
            Diagnostic::info(
                IssueCategory::DateRepaired,
                format!(
                    "Date repaired in cell {}: '{}' → '{}' ({})",
                    cell, outcome.original, fixed, outcome.note
                ),
            )
            .with_cell(cell.clone())
            .with_values(outcome.original.clone(), fixed.clone()),
        );

        if outcome.confidence != Confidence::High {
            diags.push(
                Diagnostic::warning(
                    IssueCategory::LowConfidenceDateRepair,
                    format!(
                        "Date in cell {} completed with {} confidence: '{}' → '{}'. Verify it, fix the source file if needed and process it again",
                        cell, outcome.confidence, outcome.original, fixed
                    ),
                )
                .with_cell(cell.clone())
                .with_values(outcome.original.clone(), fixed.clone()),
            );
        }
    }
}

impl Default for DateCompleter {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(text: &str) -> TokenShape {
    let p = patterns();

    if let Some(caps) = p.complete.captures(text) {
        let parts = (
            caps[1].parse::<u32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<i32>(),
        );
        return match parts {
            (Ok(d), Ok(m), Ok(y)) => NaiveDate::from_ymd_opt(y, m, d)
                .map(TokenShape::Complete)
                .unwrap_or(TokenShape::Unrecognized),
            _ => TokenShape::Unrecognized,
        };
    }

    if let Some(caps) = p.missing_year.captures(text) {
        return TokenShape::MissingYear {
            day: caps[1].to_string(),
            month: caps[2].to_string(),
        };
    }

    ALTERNATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(TokenShape::Complete)
        .unwrap_or(TokenShape::Unrecognized)
}

fn unresolved(
    original: String,
    normalized: String,
    steps: Vec<RepairStep>,
    note: &str,
) -> DateRepairOutcome {
    DateRepairOutcome {
        original,
        normalized,
        resolved: None,
        fixed: None,
        confidence: Confidence::Low,
        note: note.to_string(),
        steps,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn completer() -> DateCompleter {
        DateCompleter::new().with_reference_year(Some(2023))
    }

    #[test]
    fn test_complete_token_is_untouched() {
        let row = tokens(&["14.5.2024"]);
        let outcome = completer().complete(0, &row);

        assert_eq!(outcome.normalized, "14.5.2024");
        assert_eq!(outcome.resolved, NaiveDate::from_ymd_opt(2024, 5, 14));
        assert_eq!(outcome.confidence, Confidence::High);
        assert_eq!(outcome.fixed, None);
        assert!(!outcome.was_repaired());

        let mut diags = Diagnostics::new();
        completer().report(&outcome, &CellRef::new("S", 5, 2), &mut diags);
        assert!(diags.snapshot().info.is_empty());
    }

    #[test]
    fn test_year_inferred_between_agreeing_neighbours() {
        let row = tokens(&["14.5.2024", "16.6.2024", "17.6.", "19.7.2024"]);
        let outcome = completer().complete(2, &row);

        assert_eq!(outcome.fixed.as_deref(), Some("17.6.2024"));
        assert_eq!(outcome.resolved, NaiveDate::from_ymd_opt(2024, 6, 17));
        assert_eq!(outcome.confidence, Confidence::High);
        assert_eq!(outcome.steps, vec![RepairStep::YearInferred]);
    }

    #[test]
    fn test_noisy_neighbour_is_normalized_first() {
        let c = completer();
        let (normalized, steps) = c.normalize("24 .1.2025");
        assert_eq!(normalized, "24.1.2025");
        assert_eq!(steps, vec![RepairStep::WhitespaceCollapsed]);

        let row = tokens(&["24 .1.2025", "15.2.", "20.3.2025"]);
        let outcome = c.complete(1, &row);
        assert_eq!(outcome.fixed.as_deref(), Some("15.2.2025"));
        assert_eq!(outcome.confidence, Confidence::High);
    }

    #[test]
    fn test_typo_fixes() {
        let c = completer();

        let outcome = c.complete(0, &tokens(&["17,6,2024"]));
        assert_eq!(outcome.fixed.as_deref(), Some("17.6.2024"));
        assert_eq!(outcome.steps, vec![RepairStep::CommaReplaced]);
        assert_eq!(outcome.confidence, Confidence::High);

        let outcome = c.complete(0, &tokens(&["25 . 6 . 25"]));
        assert_eq!(outcome.fixed.as_deref(), Some("25.6.2025"));
        assert_eq!(
            outcome.steps,
            vec![RepairStep::WhitespaceCollapsed, RepairStep::TwoDigitYearExpanded]
        );

        let outcome = c.complete(0, &tokens(&["1.1.95"]));
        assert_eq!(outcome.resolved, NaiveDate::from_ymd_opt(1995, 1, 1));
    }

    #[test]
    fn test_medium_confidence_majority() {
        let row = tokens(&["1.9.2024", "2.9.2024", "3.9.2024", "4.1.", "5.1.2025"]);
        let inference = completer().infer_year(3, &row, 1);

        assert_eq!(inference.neighbor_years, vec![2024, 2024, 2024, 2025]);
        assert_eq!(inference.year, 2024);
        assert_eq!(inference.confidence, Confidence::Medium);
        assert!(!inference.escalated);
    }

    #[test]
    fn test_medium_confidence_repair_is_flagged() {
        let row = tokens(&["1.9.2024", "2.9.2024", "3.9.2024", "4.1.", "5.1.2025"]);
        let outcome = completer().complete(3, &row);

        assert_eq!(outcome.fixed.as_deref(), Some("4.1.2024"));
        assert_eq!(outcome.confidence, Confidence::Medium);

        let mut diags = Diagnostics::new();
        completer().report(&outcome, &CellRef::new("S", 5, 5), &mut diags);
        assert_eq!(diags.infos().len(), 1);
        assert_eq!(diags.infos()[0].category, IssueCategory::DateRepaired);
        assert_eq!(diags.warnings().len(), 1);
        assert_eq!(diags.warnings()[0].category, IssueCategory::LowConfidenceDateRepair);
        assert!(diags.warnings()[0].message.contains("medium confidence"));
        assert_eq!(diags.warnings()[0].cell.as_ref().map(|c| c.a1()), Some("F6".to_string()));
    }

    #[test]
    fn test_low_confidence_tie_takes_first_seen_year() {
        let row = tokens(&["1.3.2024", "2.3.2025", "3.3.", "4.3.2024", "5.3.2025"]);
        let outcome = completer().complete(2, &row);

        assert_eq!(outcome.fixed.as_deref(), Some("3.3.2024"));
        assert_eq!(outcome.confidence, Confidence::Low);

        let mut diags = Diagnostics::new();
        completer().report(&outcome, &CellRef::new("S", 5, 4), &mut diags);
        assert_eq!(diags.infos().len(), 1);
        assert_eq!(diags.warnings().len(), 1);
        assert_eq!(diags.warnings()[0].category, IssueCategory::LowConfidenceDateRepair);
    }

    #[test]
    fn test_escalation_from_previous_neighbour() {
        // Mixed years would give Low; the earlier neighbour's month fits
        let row = tokens(&["1.3.2025", "2.3.2024", "9.4.2025", "10.5.", "11.3.2024"]);
        let inference = completer().infer_year(3, &row, 5);

        assert_eq!(inference.year, 2025);
        assert_eq!(inference.confidence, Confidence::High);
        assert!(inference.escalated);
    }

    #[test]
    fn test_no_neighbours_uses_reference_year() {
        let outcome = completer().complete(0, &tokens(&["12.5."]));
        assert_eq!(outcome.resolved, NaiveDate::from_ymd_opt(2023, 5, 12));
        assert_eq!(outcome.confidence, Confidence::Low);

        // Neighbours outside the plausible range do not count
        let outcome = completer().complete(1, &tokens(&["1.1.1999", "2.1."]));
        assert_eq!(outcome.resolved, NaiveDate::from_ymd_opt(2023, 1, 2));
        assert_eq!(outcome.confidence, Confidence::Low);
    }

    #[test]
    fn test_alternate_spellings_and_failures() {
        let c = completer();
        assert_eq!(
            c.complete(0, &tokens(&["2024-06-17"])).resolved,
            NaiveDate::from_ymd_opt(2024, 6, 17)
        );
        assert_eq!(
            c.complete(0, &tokens(&["17/06/2024"])).resolved,
            NaiveDate::from_ymd_opt(2024, 6, 17)
        );

        assert_eq!(c.complete(0, &tokens(&["31.2.2024"])).resolved, None);
        assert_eq!(c.complete(0, &tokens(&["abc"])).resolved, None);
        assert_eq!(c.complete(0, &tokens(&[""])).resolved, None);
        assert_eq!(c.complete(0, &tokens(&["17-6"])).resolved, None);
    }
}
