// 📋 Diagnostics Sink - Provenance-tagged messages for the end user
//
// Two layers:
//   - batch note: the "version detected" message, set once per batch run
//     and never mutated afterwards
//   - file lists: info / warning / error, discarded at the start of every file
//
// Each message carries enough context (cell, before/after value, category)
// to be rendered without looking anything up again.

use crate::error::ProcessError;
use crate::grid::CellRef;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SEVERITY & CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// What a message is about, so callers can filter without parsing text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCategory {
    VersionDetected,
    VersionUndetermined,
    VersionMismatch,
    DateRepaired,
    LowConfidenceDateRepair,
    MissingOrUnparseableDate,
    StructuralShortfall,
    SumCheck,
    SumMismatch,
    TemplateHours,
    PlatformUnsupported,
    Configuration,
    Io,
    Summary,
    Output,
}

// ============================================================================
// DIAGNOSTIC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<CellRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, category: IssueCategory, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            category,
            message: message.into(),
            cell: None,
            original: None,
            fixed: None,
        }
    }

    pub fn info(category: IssueCategory, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    pub fn warning(category: IssueCategory, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    pub fn error(category: IssueCategory, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    /// Builder pattern: attach the cell the message is about
    pub fn with_cell(mut self, cell: CellRef) -> Self {
        self.cell = Some(cell);
        self
    }

    /// Builder pattern: attach before/after values
    pub fn with_values(mut self, original: impl Into<String>, fixed: impl Into<String>) -> Self {
        self.original = Some(original.into());
        self.fixed = Some(fixed.into());
        self
    }

    /// Error diagnostic describing a fatal processing error
    pub fn from_error(err: &ProcessError) -> Self {
        let diagnostic = Self::error(err.category(), err.to_string());
        match err {
            ProcessError::MissingOrUnparseableDate { cell, value } => {
                let mut d = diagnostic.with_cell(cell.clone());
                d.original = Some(value.clone());
                d
            }
            _ => diagnostic,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            Some(cell) => write!(f, "[{}] {} ({})", self.severity.as_str(), self.message, cell.qualified()),
            None => write!(f, "[{}] {}", self.severity.as_str(), self.message),
        }
    }
}

// ============================================================================
// REPORT (what external consumers receive)
// ============================================================================

/// Ordered (info, warning, error) triple handed to diagnostics consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub info: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn by_category(&self, category: IssueCategory) -> Vec<&Diagnostic> {
        self.info
            .iter()
            .chain(self.warnings.iter())
            .chain(self.errors.iter())
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} info, {} warnings, {} errors",
            self.info.len(),
            self.warnings.len(),
            self.errors.len()
        )
    }
}

// ============================================================================
// DIAGNOSTICS SINK
// ============================================================================

/// Diagnostics - per-processor accumulator
///
/// Not shared across threads: every concurrent caller owns its own
/// processor and therefore its own sink.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    batch_note: Option<Diagnostic>,
    info: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message in the file-scoped layer (mirrored to tracing)
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => {
                tracing::info!(category = ?diagnostic.category, "{}", diagnostic);
                self.info.push(diagnostic);
            }
            Severity::Warning => {
                tracing::warn!(category = ?diagnostic.category, "{}", diagnostic);
                self.warnings.push(diagnostic);
            }
            Severity::Error => {
                tracing::error!(category = ?diagnostic.category, "{}", diagnostic);
                self.errors.push(diagnostic);
            }
        }
    }

    pub fn info(&mut self, category: IssueCategory, message: impl Into<String>) {
        self.push(Diagnostic::info(category, message));
    }

    pub fn warning(&mut self, category: IssueCategory, message: impl Into<String>) {
        self.push(Diagnostic::warning(category, message));
    }

    pub fn error(&mut self, category: IssueCategory, message: impl Into<String>) {
        self.push(Diagnostic::error(category, message));
    }

    /// Surface a fatal error as exactly one error diagnostic
    pub fn record_failure(&mut self, err: &ProcessError) {
        self.push(Diagnostic::from_error(err));
    }

    /// Set the batch-scoped note. Returns false (and keeps the existing
    /// note) when one was already set.
    pub fn set_batch_note(&mut self, note: Diagnostic) -> bool {
        if self.batch_note.is_some() {
            return false;
        }
        tracing::info!("{}", note);
        self.batch_note = Some(note);
        true
    }

    pub fn batch_note(&self) -> Option<&Diagnostic> {
        self.batch_note.as_ref()
    }

    /// Clear the file-scoped layer; the batch note survives
    pub fn reset_file(&mut self) {
        self.info.clear();
        self.warnings.clear();
        self.errors.clear();
    }

    pub fn infos(&self) -> &[Diagnostic] {
        &self.info
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Current view for consumers: the batch note leads the info list
    pub fn snapshot(&self) -> DiagnosticReport {
        let mut info = Vec::with_capacity(self.info.len() + 1);
        if let Some(note) = &self.batch_note {
            info.push(note.clone());
        }
        info.extend(self.info.iter().cloned());

        DiagnosticReport {
            info,
            warnings: self.warnings.clone(),
            errors: self.errors.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
