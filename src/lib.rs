// Attendance Ledger - Core Library
// Template detection, grid extraction, date repair and cross-total checks
// for attendance workbooks. Used by the CLI and the integration tests.

pub mod grid;
pub mod error;
pub mod diagnostics;
pub mod layout;
pub mod detector;
pub mod date_completer;
pub mod extractor;
pub mod validator;
pub mod config;
pub mod sources;
pub mod writer;
pub mod discovery;
pub mod processor;

// Re-export commonly used types
pub use grid::{
    CellPos, CellRef, GridReader, MemoryGrid, RawCell,
    column_index, column_letters,
};
pub use error::ProcessError;
pub use diagnostics::{
    Diagnostic, DiagnosticReport, Diagnostics, IssueCategory, Severity,
};
pub use layout::{
    DetectionRule, Layout, LayoutRegistry, Marker, SheetSelector, Version,
};
pub use detector::{Detection, VersionDetector};
pub use date_completer::{
    Confidence, DateCompleter, DateRepairOutcome, RepairStep, YearInference, YearRange,
};
pub use extractor::{Activity, ActivityGridExtractor};
pub use validator::{
    ControlRange, CrossTotalValidator, ValidationReport,
    activities_total, check_template_size,
};
pub use config::ProcessorConfig;
pub use sources::{CsvWorkbook, LoadedWorkbook, SourceKind, XlsxWorkbook, open_workbook};
pub use writer::{
    CsvExportWriter, OverviewRow, TemplatePayload, TemplateWriter, WriteOutcome,
    ensure_platform, overview_rows,
};
pub use discovery::{
    Candidate, ScanReport, SkipReason,
    normalize_stem, output_name, scan_folder,
};
pub use processor::{
    AttendanceProcessor, BatchReport, FileOutcome, FileStatus, OutputTarget,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
