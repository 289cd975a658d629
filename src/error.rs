// 🚨 Error Taxonomy - Why a file produced no output
//
// Fatal conditions abort the current file only; the batch moves on.
// Non-fatal conditions (low-confidence date repairs, sum mismatches) never
// become Err values, they live on as diagnostics.

use crate::diagnostics::IssueCategory;
use crate::grid::CellRef;
use crate::layout::Version;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// No detection rule matched the workbook's marker cells
    #[error("could not detect the template version of the workbook")]
    VersionUndetermined,

    /// The file is a valid instance of another layout than the batch expects
    #[error("version mismatch: the file is a {detected} layout but the batch expects {expected}")]
    VersionMismatch { detected: Version, expected: Version },

    /// An activity column with valid hours has no usable date
    #[error("missing or unparseable activity date in cell {cell} ('{value}')")]
    MissingOrUnparseableDate { cell: CellRef, value: String },

    /// The grid cannot be an instance of the expected layout
    #[error("workbook does not have the expected structure: {reason}")]
    StructuralShortfall { reason: String },

    /// The output writer needs a platform this process is not running on
    #[error("output writer requires {required}, but the current platform is {platform}")]
    PlatformUnsupported { required: String, platform: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProcessError {
    /// Diagnostic category used when the error is surfaced to the user
    pub fn category(&self) -> IssueCategory {
        match self {
            ProcessError::VersionUndetermined => IssueCategory::VersionUndetermined,
            ProcessError::VersionMismatch { .. } => IssueCategory::VersionMismatch,
            ProcessError::MissingOrUnparseableDate { .. } => IssueCategory::MissingOrUnparseableDate,
            ProcessError::StructuralShortfall { .. } => IssueCategory::StructuralShortfall,
            ProcessError::PlatformUnsupported { .. } => IssueCategory::PlatformUnsupported,
            ProcessError::Config(_) => IssueCategory::Configuration,
            ProcessError::Io(_)
            | ProcessError::Workbook(_)
            | ProcessError::Csv(_)
            | ProcessError::Json(_) => IssueCategory::Io,
        }
    }

    /// Errors the user can fix by editing the source file and rerunning
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ProcessError::MissingOrUnparseableDate { .. } | ProcessError::StructuralShortfall { .. }
        )
    }

    /// The offending cell, when the error is tied to one
    pub fn cell(&self) -> Option<&CellRef> {
        match self {
            ProcessError::MissingOrUnparseableDate { cell, .. } => Some(cell),
            _ => None,
        }
    }
}
