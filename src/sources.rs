// 📂 Workbook Sources - Turn files on disk into grids
//
// Supported inputs:
//   - spreadsheet files (.xlsx, .xlsm, .xls, .xlsb, .ods) via calamine
//   - a single .csv file (one sheet named after the file stem)
//   - a directory of .csv files (one sheet per file, in file-name order)
//
// Everything is loaded eagerly into a MemoryGrid so the core never
// touches the disk.

use crate::error::ProcessError;
use crate::grid::{GridReader, MemoryGrid, RawCell};
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions read through calamine
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

// ============================================================================
// SOURCE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Spreadsheet,
    CsvFile,
    CsvDirectory,
}

impl SourceKind {
    /// Decide how to read `path` from its extension (or directory-ness)
    pub fn detect(path: &Path) -> Option<SourceKind> {
        if path.is_dir() {
            return Some(SourceKind::CsvDirectory);
        }
        let ext = path.extension()?.to_str()?.to_lowercase();
        if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::Spreadsheet)
        } else if ext == "csv" {
            Some(SourceKind::CsvFile)
        } else {
            None
        }
    }
}

// ============================================================================
// LOADED WORKBOOK
// ============================================================================

/// LoadedWorkbook - grid plus provenance of where it came from
#[derive(Debug, Clone)]
pub struct LoadedWorkbook {
    pub path: PathBuf,
    pub kind: SourceKind,
    /// SHA-256 of the source bytes (for directories: of all files in order)
    pub fingerprint: String,
    pub grid: MemoryGrid,
}

impl GridReader for LoadedWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.grid.sheet_names()
    }

    fn cell_at(&self, sheet: &str, row: u32, col: u32) -> RawCell {
        self.grid.cell_at(sheet, row, col)
    }

    fn dimensions(&self, sheet: &str) -> Option<(u32, u32)> {
        self.grid.dimensions(sheet)
    }
}

/// Open any supported source
pub fn open_workbook(path: &Path) -> Result<LoadedWorkbook, ProcessError> {
    match SourceKind::detect(path) {
        Some(SourceKind::Spreadsheet) => XlsxWorkbook::open(path),
        Some(SourceKind::CsvFile) => CsvWorkbook::open_file(path),
        Some(SourceKind::CsvDirectory) => CsvWorkbook::open_dir(path),
        None => Err(ProcessError::StructuralShortfall {
            reason: format!("unsupported source file type: {}", path.display()),
        }),
    }
}

fn sha256_hex(hasher: Sha256) -> String {
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// SPREADSHEET (calamine)
// ============================================================================

pub struct XlsxWorkbook;

impl XlsxWorkbook {
    pub fn open(path: &Path) -> Result<LoadedWorkbook, ProcessError> {
        let bytes = fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);

        let mut workbook = open_workbook_auto(path)?;
        let mut grid = MemoryGrid::new();

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        for name in &sheet_names {
            grid.add_sheet(name);
            let range = workbook.worksheet_range(name)?;

            // used_cells() is relative to the range start
            let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
            for (row, col, value) in range.used_cells() {
                let cell = convert_cell(value);
                if !cell.is_blank() {
                    grid.set(name, row_offset + row as u32, col_offset + col as u32, cell);
                }
            }
        }

        tracing::debug!(path = %path.display(), sheets = sheet_names.len(), "spreadsheet loaded");

        Ok(LoadedWorkbook {
            path: path.to_path_buf(),
            kind: SourceKind::Spreadsheet,
            fingerprint: sha256_hex(hasher),
            grid,
        })
    }
}

fn convert_cell(value: &Data) -> RawCell {
    match value {
        Data::Empty => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.clone()),
        Data::Float(n) => RawCell::Number(*n),
        Data::Int(n) => RawCell::Number(*n as f64),
        Data::Bool(b) => RawCell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => RawCell::Text(format!("#{:?}", e)),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => RawCell::Date(datetime),
            None => RawCell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => RawCell::Text(s.clone()),
        Data::DurationIso(s) => RawCell::Text(s.clone()),
    }
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvWorkbook;

impl CsvWorkbook {
    /// One CSV file = one sheet named after the file stem
    pub fn open_file(path: &Path) -> Result<LoadedWorkbook, ProcessError> {
        let mut hasher = Sha256::new();
        let mut grid = MemoryGrid::new();
        load_csv_sheet(path, &mut grid, &mut hasher)?;

        Ok(LoadedWorkbook {
            path: path.to_path_buf(),
            kind: SourceKind::CsvFile,
            fingerprint: sha256_hex(hasher),
            grid,
        })
    }

    /// Every `*.csv` in `dir` becomes a sheet; sheet order = file-name order
    pub fn open_dir(dir: &Path) -> Result<LoadedWorkbook, ProcessError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(ProcessError::StructuralShortfall {
                reason: format!("directory {} holds no CSV sheets", dir.display()),
            });
        }

        let mut hasher = Sha256::new();
        let mut grid = MemoryGrid::new();
        for file in &files {
            load_csv_sheet(file, &mut grid, &mut hasher)?;
        }

        Ok(LoadedWorkbook {
            path: dir.to_path_buf(),
            kind: SourceKind::CsvDirectory,
            fingerprint: sha256_hex(hasher),
            grid,
        })
    }
}

fn load_csv_sheet(path: &Path, grid: &mut MemoryGrid, hasher: &mut Sha256) -> Result<(), ProcessError> {
    use csv::ReaderBuilder;

    let bytes = fs::read(path)?;
    hasher.update(&bytes);

    let sheet = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    grid.add_sheet(&sheet);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (col, value) in record.iter().enumerate() {
            if !value.trim().is_empty() {
                grid.set(&sheet, row as u32, col as u32, value);
            }
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
