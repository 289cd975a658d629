// 🧮 Grid Model - Cells, coordinates and the reader seam
// Everything the extraction core knows about a workbook goes through GridReader.
//
// Coordinates are 0-based (row, col) internally and rendered A1-style ("C6")
// whenever they reach a user.

use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Excel's hard column limit (XFD), used as a scan guard when a reader
/// cannot report sheet dimensions.
pub const MAX_COLUMNS: u32 = 16_384;

// ============================================================================
// RAW CELL
// ============================================================================

/// RawCell - one heterogeneous value read from a grid position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl RawCell {
    /// Empty cells and whitespace-only text are both blank
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering used for labels, sibling fields and date tokens.
    /// Returns None for blank cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawCell::Empty => None,
            RawCell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            RawCell::Number(n) => Some(format_number(*n)),
            RawCell::Date(dt) => Some(format_datetime(dt)),
        }
    }

    /// Hours value: numeric cells and numeric text are truncated to an
    /// integer, anything that does not truncate to a positive value is None.
    pub fn as_positive_hours(&self) -> Option<u32> {
        let value = match self {
            RawCell::Number(n) => *n,
            RawCell::Text(s) => s.trim().parse::<f64>().ok()?,
            RawCell::Empty | RawCell::Date(_) => return None,
        };

        if !value.is_finite() {
            return None;
        }

        let truncated = value.trunc();
        if truncated < 1.0 || truncated > u32::MAX as f64 {
            return None;
        }

        Some(truncated as u32)
    }

    /// Integer contribution of a control cell (blank/non-numeric = None)
    pub fn as_integer(&self) -> Option<i64> {
        let value = match self {
            RawCell::Number(n) => *n,
            RawCell::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if value.is_finite() {
            Some(value.trunc() as i64)
        } else {
            None
        }
    }

    /// Calendar date held natively by the cell, if any
    pub fn as_native_date(&self) -> Option<NaiveDate> {
        match self {
            RawCell::Date(dt) => Some(dt.date()),
            _ => None,
        }
    }
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        RawCell::Text(value.to_string())
    }
}

impl From<String> for RawCell {
    fn from(value: String) -> Self {
        RawCell::Text(value)
    }
}

impl From<f64> for RawCell {
    fn from(value: f64) -> Self {
        RawCell::Number(value)
    }
}

impl From<i64> for RawCell {
    fn from(value: i64) -> Self {
        RawCell::Number(value as f64)
    }
}

impl From<NaiveDate> for RawCell {
    fn from(value: NaiveDate) -> Self {
        RawCell::Date(value.and_time(NaiveTime::MIN))
    }
}

impl From<NaiveDateTime> for RawCell {
    fn from(value: NaiveDateTime) -> Self {
        RawCell::Date(value)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    // Time-only values land on Excel's day zero
    if dt.date().year() < 1900 {
        return dt.format("%H:%M").to_string();
    }
    if dt.time() == NaiveTime::MIN {
        dt.format("%d.%m.%Y").to_string()
    } else {
        dt.format("%d.%m.%Y %H:%M").to_string()
    }
}

// ============================================================================
// COORDINATES
// ============================================================================

/// Column index → spreadsheet letters (0 → "A", 26 → "AA")
pub fn column_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Spreadsheet letters → column index ("C" → 2)
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut n: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}

/// CellPos - sheet-less position, serialized as an A1 string ("B7")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellPos {
    pub row: u32,
    pub col: u32,
}

impl CellPos {
    pub fn new(row: u32, col: u32) -> Self {
        CellPos { row, col }
    }

    /// Parse "B7" into row 6, col 1
    pub fn parse_a1(reference: &str) -> Option<CellPos> {
        let reference = reference.trim();
        let split = reference.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = reference.split_at(split);
        let col = column_index(letters)?;
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(CellPos { row: row - 1, col })
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellPos {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        CellPos::parse_a1(s).ok_or_else(|| anyhow!("Invalid cell reference: {}", s))
    }
}

impl TryFrom<String> for CellPos {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        CellPos::parse_a1(&value).ok_or_else(|| format!("invalid cell reference '{}'", value))
    }
}

impl From<CellPos> for String {
    fn from(pos: CellPos) -> Self {
        pos.to_string()
    }
}

/// CellRef - a position qualified by its sheet (diagnostic provenance)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(sheet: &str, row: u32, col: u32) -> Self {
        CellRef {
            sheet: sheet.to_string(),
            row,
            col,
        }
    }

    pub fn pos(&self) -> CellPos {
        CellPos::new(self.row, self.col)
    }

    /// "C6"
    pub fn a1(&self) -> String {
        self.pos().to_string()
    }

    /// "zdroj-dochazka!C6"
    pub fn qualified(&self) -> String {
        format!("{}!{}", self.sheet, self.a1())
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.a1())
    }
}

// ============================================================================
// GRID READER
// ============================================================================

/// GridReader - the only way the core touches a workbook
///
/// Implementations must be side-effect free and must return
/// `RawCell::Empty` (never fail) for cells that hold nothing or lie
/// outside the sheet.
pub trait GridReader {
    /// Sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Value at (row, col) of the named sheet
    fn cell_at(&self, sheet: &str, row: u32, col: u32) -> RawCell;

    /// Used extent as (rows, cols), when the reader knows it
    fn dimensions(&self, _sheet: &str) -> Option<(u32, u32)> {
        None
    }

    fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    fn cell_at_pos(&self, sheet: &str, pos: CellPos) -> RawCell {
        self.cell_at(sheet, pos.row, pos.col)
    }
}

// ============================================================================
// IN-MEMORY GRID
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemorySheet {
    name: String,
    cells: BTreeMap<(u32, u32), RawCell>,
}

/// MemoryGrid - ordered sheets of sparse cells
///
/// Backing store for the file readers and the grid builder used in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryGrid {
    sheets: Vec<MemorySheet>,
}

impl MemoryGrid {
    pub fn new() -> Self {
        MemoryGrid { sheets: Vec::new() }
    }

    /// Append an empty sheet (no-op if it already exists)
    pub fn add_sheet(&mut self, name: &str) {
        if !self.sheets.iter().any(|s| s.name == name) {
            self.sheets.push(MemorySheet {
                name: name.to_string(),
                cells: BTreeMap::new(),
            });
        }
    }

    /// Builder pattern: add a sheet
    pub fn with_sheet(mut self, name: &str) -> Self {
        self.add_sheet(name);
        self
    }

    /// Set a cell, creating the sheet on first use. Blank values are
    /// stored as removals so dimensions stay tight.
    pub fn set(&mut self, sheet: &str, row: u32, col: u32, value: impl Into<RawCell>) {
        self.add_sheet(sheet);
        let value = value.into();
        if let Some(target) = self.sheets.iter_mut().find(|s| s.name == sheet) {
            if value == RawCell::Empty {
                target.cells.remove(&(row, col));
            } else {
                target.cells.insert((row, col), value);
            }
        }
    }

    /// Set a cell by A1 reference
    pub fn set_a1(&mut self, sheet: &str, reference: &str, value: impl Into<RawCell>) -> Result<()> {
        let pos: CellPos = reference.parse()?;
        self.set(sheet, pos.row, pos.col, value);
        Ok(())
    }

    fn sheet(&self, name: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

impl GridReader for MemoryGrid {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn cell_at(&self, sheet: &str, row: u32, col: u32) -> RawCell {
        self.sheet(sheet)
            .and_then(|s| s.cells.get(&(row, col)))
            .cloned()
            .unwrap_or(RawCell::Empty)
    }

    fn dimensions(&self, sheet: &str) -> Option<(u32, u32)> {
        let sheet = self.sheet(sheet)?;
        let rows = sheet.cells.keys().map(|(r, _)| r + 1).max().unwrap_or(0);
        let cols = sheet.cells.keys().map(|(_, c)| c + 1).max().unwrap_or(0);
        Some((rows, cols))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters_roundtrip_edges() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(2), "C");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(16_383), "XFD");
        assert_eq!(column_index("xfd"), Some(16_383));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("C3"), None);
    }

    #[test]
    fn test_parse_a1() {
        assert_eq!(CellPos::parse_a1("B7"), Some(CellPos::new(6, 1)));
        assert_eq!(CellPos::parse_a1("AA10"), Some(CellPos::new(9, 26)));
        assert_eq!(CellPos::parse_a1("B0"), None);
        assert_eq!(CellPos::parse_a1("7B"), None);
        assert_eq!(CellPos::new(5, 3).to_string(), "D6");
    }

    #[test]
    fn test_cell_pos_serializes_as_a1() {
        let json = serde_json::to_string(&CellPos::new(6, 1)).unwrap();
        assert_eq!(json, "\"B7\"");

        let back: CellPos = serde_json::from_str("\"C12\"").unwrap();
        assert_eq!(back, CellPos::new(11, 2));

        assert!(serde_json::from_str::<CellPos>("\"12\"").is_err());
    }

    #[test]
    fn test_positive_hours() {
        assert_eq!(RawCell::Number(2.0).as_positive_hours(), Some(2));
        assert_eq!(RawCell::Number(3.7).as_positive_hours(), Some(3));
        assert_eq!(RawCell::from(" 4 ").as_positive_hours(), Some(4));
        assert_eq!(RawCell::Number(0.0).as_positive_hours(), None);
        assert_eq!(RawCell::Number(0.5).as_positive_hours(), None);
        assert_eq!(RawCell::Number(-2.0).as_positive_hours(), None);
        assert_eq!(RawCell::from("dvě").as_positive_hours(), None);
        assert_eq!(RawCell::Empty.as_positive_hours(), None);
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(RawCell::from("  Workshop ").as_text(), Some("Workshop".to_string()));
        assert_eq!(RawCell::from("   ").as_text(), None);
        assert_eq!(RawCell::Number(4.0).as_text(), Some("4".to_string()));
        assert_eq!(RawCell::Number(17.6).as_text(), Some("17.6".to_string()));

        let date = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        assert_eq!(RawCell::from(date).as_text(), Some("14.05.2024".to_string()));

        let time = NaiveDate::from_ymd_opt(1899, 12, 31)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(RawCell::Date(time).as_text(), Some("08:30".to_string()));
    }

    #[test]
    fn test_memory_grid_reads_and_dimensions() {
        let mut grid = MemoryGrid::new().with_sheet("List1");
        grid.set_a1("List1", "C11", 2.0).unwrap();
        grid.set("List1", 0, 0, "header");

        assert_eq!(grid.sheet_names(), vec!["List1".to_string()]);
        assert_eq!(grid.cell_at("List1", 10, 2), RawCell::Number(2.0));
        assert_eq!(grid.cell_at("List1", 99, 99), RawCell::Empty);
        assert_eq!(grid.cell_at("Missing", 0, 0), RawCell::Empty);
        assert_eq!(grid.dimensions("List1"), Some((11, 3)));
        assert_eq!(grid.dimensions("Missing"), None);

        grid.set("List1", 10, 2, RawCell::Empty);
        assert_eq!(grid.dimensions("List1"), Some((1, 1)));
    }
}
