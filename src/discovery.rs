// 🗂️ Folder Discovery - Find attendance workbooks worth processing
// Skips lock files, previous outputs and blank templates, then keeps only
// files whose version is detectable (and compatible when the batch is pinned).

use crate::detector::VersionDetector;
use crate::error::ProcessError;
use crate::layout::{LayoutRegistry, Version};
use crate::sources::open_workbook;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions considered during a folder scan
pub const SCAN_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xls"];

/// File-name prefixes of files this tool (or its predecessors) produced
pub const OUTPUT_PREFIXES: [&str; 4] = [
    "16h_inv_",
    "32h_inv_",
    "16_hodin_inovativniho_vzdelavani_",
    "32_hodin_inovativniho_vzdelavani_",
];

const TEMPLATE_HINTS: [&str; 2] = ["sablona", "template"];

// ============================================================================
// OUTPUT NAMING
// ============================================================================

fn fold_char(c: char) -> &'static str {
    match c {
        'á' | 'ä' | 'à' | 'â' => "a",
        'Á' | 'Ä' | 'À' | 'Â' => "A",
        'č' | 'ç' => "c",
        'Č' | 'Ç' => "C",
        'ď' => "d",
        'Ď' => "D",
        'é' | 'ě' | 'ë' | 'è' | 'ê' => "e",
        'É' | 'Ě' | 'Ë' | 'È' | 'Ê' => "E",
        'í' | 'ï' | 'î' => "i",
        'Í' | 'Ï' | 'Î' => "I",
        'ľ' | 'ĺ' => "l",
        'Ľ' | 'Ĺ' => "L",
        'ň' => "n",
        'Ň' => "N",
        'ó' | 'ö' | 'ô' | 'ò' => "o",
        'Ó' | 'Ö' | 'Ô' | 'Ò' => "O",
        'ř' | 'ŕ' => "r",
        'Ř' | 'Ŕ' => "R",
        'š' => "s",
        'Š' => "S",
        'ť' => "t",
        'Ť' => "T",
        'ú' | 'ů' | 'ü' | 'ù' | 'û' => "u",
        'Ú' | 'Ů' | 'Ü' | 'Ù' | 'Û' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ž' => "z",
        'Ž' => "Z",
        _ => "",
    }
}

/// Strip diacritics, map every non-word character to `_`, collapse runs
pub fn normalize_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for c in stem.chars() {
        let folded = fold_char(c);
        let piece = if !folded.is_empty() {
            folded.to_string()
        } else if c.is_ascii_alphanumeric() || c == '_' {
            c.to_string()
        } else {
            "_".to_string()
        };

        for ch in piece.chars() {
            if ch == '_' && out.ends_with('_') {
                continue;
            }
            out.push(ch);
        }
    }
    out.trim_matches('_').to_string()
}

/// "{16|32}h_inv_{normalized stem}_MSMT"
pub fn output_name(source: &Path, version: Version) -> String {
    // CSV sources may be directories whose names contain dots
    let name = if source.is_dir() {
        source.file_name()
    } else {
        source.file_stem()
    };
    let stem = name
        .and_then(|s| s.to_str())
        .map(normalize_stem)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "source".to_string());
    format!("{}h_inv_{}_MSMT", version.hours(), stem)
}

// ============================================================================
// SCAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    LockFile,
    PreviousOutput,
    Template,
    NotAttendance,
    VersionMismatch { detected: Version },
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: PathBuf,
    pub version: Version,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

impl ScanReport {
    pub fn summary(&self) -> String {
        format!(
            "{} compatible file(s), {} skipped",
            self.candidates.len(),
            self.skipped.len()
        )
    }
}

/// Name-only filter; None means "worth opening"
pub fn skip_by_name(file_name: &str) -> Option<SkipReason> {
    let lower = file_name.to_lowercase();
    if file_name.starts_with("~$") {
        Some(SkipReason::LockFile)
    } else if OUTPUT_PREFIXES.iter().any(|p| file_name.starts_with(p)) {
        Some(SkipReason::PreviousOutput)
    } else if TEMPLATE_HINTS.iter().any(|hint| lower.contains(hint)) {
        Some(SkipReason::Template)
    } else {
        None
    }
}

/// Scan `dir` (non-recursive) for attendance workbooks
pub fn scan_folder(
    dir: &Path,
    registry: &LayoutRegistry,
    expected: Option<Version>,
) -> Result<ScanReport, ProcessError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| SCAN_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let detector = VersionDetector::new(registry);
    let mut report = ScanReport::default();

    for path in paths {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        if let Some(reason) = skip_by_name(&file_name) {
            tracing::debug!(file = %file_name, ?reason, "skipping by name");
            report.skipped.push((path, reason));
            continue;
        }

        let workbook = match open_workbook(&path) {
            Ok(workbook) => workbook,
            Err(err) => {
                tracing::warn!(file = %file_name, error = %err, "cannot open workbook");
                report.skipped.push((path, SkipReason::Unreadable(err.to_string())));
                continue;
            }
        };

        match detector.detect(&workbook).version() {
            None => report.skipped.push((path, SkipReason::NotAttendance)),
            Some(detected) if expected.is_some_and(|e| e != detected) => {
                report.skipped.push((path, SkipReason::VersionMismatch { detected }));
            }
            Some(version) => report.candidates.push(Candidate { path, version }),
        }
    }

    tracing::info!(dir = %dir.display(), summary = %report.summary(), "folder scanned");
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_stem() {
        assert_eq!(normalize_stem("Docházka ZŠ Čáslav 2024"), "Dochazka_ZS_Caslav_2024");
        assert_eq!(normalize_stem("  třída--8.A  "), "trida_8_A");
        assert_eq!(normalize_stem("___"), "");
        assert_eq!(normalize_stem("Žluťoučký kůň"), "Zlutoucky_kun");
    }

    #[test]
    fn test_output_name() {
        assert_eq!(
            output_name(Path::new("in/Docházka září.xlsx"), Version::ThirtyTwoHour),
            "32h_inv_Dochazka_zari_MSMT"
        );
        assert_eq!(output_name(Path::new("in/!!!.xlsx"), Version::SixteenHour), "16h_inv_source_MSMT");
    }

    #[test]
    fn test_skip_by_name() {
        assert_eq!(skip_by_name("~$dochazka.xlsx"), Some(SkipReason::LockFile));
        assert_eq!(skip_by_name("16h_inv_skola_MSMT.xlsx"), Some(SkipReason::PreviousOutput));
        assert_eq!(skip_by_name("Sablona_32h.xlsx"), Some(SkipReason::Template));
        assert_eq!(skip_by_name("MSMT_Template.xlsx"), Some(SkipReason::Template));
        assert_eq!(skip_by_name("dochazka_rijen.xlsx"), None);
    }

    #[test]
    fn test_scan_skips_by_name_and_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("~$lock.xlsx"), b"").unwrap();
        fs::write(dir.path().join("32h_inv_old_MSMT.xlsx"), b"").unwrap();
        fs::write(dir.path().join("broken.xlsx"), b"not a zip").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let registry = LayoutRegistry::builtin();
        let report = scan_folder(dir.path(), &registry, None).unwrap();

        assert!(report.candidates.is_empty());
        assert_eq!(report.skipped.len(), 3);
        assert!(report
            .skipped
            .iter()
            .any(|(_, reason)| matches!(reason, SkipReason::Unreadable(_))));
    }

    #[test]
    fn test_scan_missing_dir_is_io_error() {
        let registry = LayoutRegistry::builtin();
        let err = scan_folder(Path::new("/nonexistent/dir"), &registry, None).unwrap_err();
        assert!(matches!(err, ProcessError::Io(_)));
    }
}
