// 🏭 Attendance Processor - Per-file pipeline and batch runs
//
// Per file:
//   reset diagnostics → detect → check pinned version → extract → dedupe →
//   participants → template size → cross totals → (write output)
//
// Any fatal error ends the current file with exactly one error diagnostic;
// the batch continues with the next file. One processor = one batch; it is
// not meant to be shared between threads.

use crate::config::ProcessorConfig;
use crate::date_completer::DateCompleter;
use crate::detector::{Detection, VersionDetector};
use crate::diagnostics::{Diagnostic, DiagnosticReport, Diagnostics, IssueCategory};
use crate::discovery::output_name;
use crate::error::ProcessError;
use crate::extractor::{Activity, ActivityGridExtractor};
use crate::grid::GridReader;
use crate::layout::{LayoutRegistry, Version};
use crate::sources::open_workbook;
use crate::validator::{activities_total, check_template_size, CrossTotalValidator, ValidationReport};
use crate::writer::{ensure_platform, TemplatePayload, TemplateWriter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// Output-ready, nothing to review
    Success,
    /// Completed, but warnings or non-fatal errors need a look
    CompletedWithIssues,
    /// A fatal error stopped the file
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub version: Option<Version>,
    pub status: FileStatus,
    pub activities: Vec<Activity>,
    pub participants: Vec<String>,
    pub validation: Option<ValidationReport>,
    pub output: Option<PathBuf>,
    pub fingerprint: Option<String>,
    pub diagnostics: DiagnosticReport,
}

impl FileOutcome {
    fn new(source: &Path) -> Self {
        FileOutcome {
            source: source.to_path_buf(),
            version: None,
            status: FileStatus::Success,
            activities: Vec::new(),
            participants: Vec::new(),
            validation: None,
            output: None,
            fingerprint: None,
            diagnostics: DiagnosticReport::default(),
        }
    }

    pub fn total_hours(&self) -> i64 {
        activities_total(&self.activities)
    }

    pub fn summary(&self) -> String {
        let version = self
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());
        format!(
            "{} [{}]: {} activities, {} h, {} participants ({})",
            self.source.display(),
            version,
            self.activities.len(),
            self.total_hours(),
            self.participants.len(),
            self.diagnostics.summary()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Version the batch was pinned to (`--expect` or a template)
    pub version: Option<Version>,
    /// The batch-scoped "version detected" note
    pub version_note: Option<Diagnostic>,
    pub files: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} file(s): {} ok, {} with issues, {} failed",
            self.files.len(),
            self.count(FileStatus::Success),
            self.count(FileStatus::CompletedWithIssues),
            self.count(FileStatus::Failed)
        )
    }
}

/// Where and how to materialize outputs
pub struct OutputTarget<'a> {
    pub writer: &'a dyn TemplateWriter,
    pub directory: &'a Path,
}

// ============================================================================
// PROCESSOR
// ============================================================================

pub struct AttendanceProcessor {
    registry: LayoutRegistry,
    config: ProcessorConfig,
    completer: DateCompleter,
    validator: CrossTotalValidator,
    expected: Option<Version>,
    diags: Diagnostics,
}

impl AttendanceProcessor {
    pub fn new(registry: LayoutRegistry, config: ProcessorConfig) -> Self {
        let completer = DateCompleter::new()
            .with_reference_year(config.reference_year)
            .with_year_range(config.neighbor_year_range);
        let [range_a, range_b] = config.control_ranges.clone();

        AttendanceProcessor {
            registry,
            completer,
            validator: CrossTotalValidator::new(range_a, range_b),
            config,
            expected: None,
            diags: Diagnostics::new(),
        }
    }

    /// Builder pattern: pin the batch to a known version up front
    pub fn with_expected_version(mut self, version: Version) -> Self {
        self.pin(version, format!("Batch pinned to the {} template", version));
        self
    }

    /// Pin the batch to the version of an empty output template
    pub fn pin_to_template<G: GridReader + ?Sized>(&mut self, template: &G) -> Result<Version, ProcessError> {
        let version = VersionDetector::new(&self.registry)
            .detect_template(template)
            .ok_or(ProcessError::VersionUndetermined)?;
        self.pin(version, format!("Template version detected: {}", version));
        Ok(version)
    }

    fn pin(&mut self, version: Version, note: String) {
        if self.expected.is_none() {
            self.expected = Some(version);
            self.diags
                .set_batch_note(Diagnostic::info(IssueCategory::VersionDetected, note));
        }
    }

    pub fn expected_version(&self) -> Option<Version> {
        self.expected
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    /// Process one in-memory grid without producing output
    pub fn process_grid<G: GridReader + ?Sized>(&mut self, source: impl AsRef<Path>, grid: &G) -> FileOutcome {
        self.process_with_writer(source, grid, None)
    }

    /// Process one grid and hand the result to `target` when given
    pub fn process_with_writer<G: GridReader + ?Sized>(
        &mut self,
        source: impl AsRef<Path>,
        grid: &G,
        target: Option<&OutputTarget<'_>>,
    ) -> FileOutcome {
        let source = source.as_ref();
        let _span = tracing::info_span!("file", source = %source.display()).entered();

        self.diags.reset_file();
        let mut outcome = FileOutcome::new(source);
        let result = self.run_file(grid, target, &mut outcome);
        self.finish(outcome, result)
    }

    /// Load and process files one at a time, in the given order
    pub fn process_paths(&mut self, paths: &[PathBuf], target: Option<&OutputTarget<'_>>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, files = paths.len(), "batch started");

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = match open_workbook(path) {
                Ok(workbook) => {
                    let mut outcome = self.process_with_writer(path, &workbook, target);
                    outcome.fingerprint = Some(workbook.fingerprint.clone());
                    outcome
                }
                Err(err) => {
                    self.diags.reset_file();
                    self.finish(FileOutcome::new(path), Err(err))
                }
            };
            tracing::info!("{}", outcome.summary());
            files.push(outcome);
        }

        let report = BatchReport {
            run_id,
            started_at,
            version: self.expected,
            version_note: self.diags.batch_note().cloned(),
            files,
        };
        tracing::info!(%run_id, summary = %report.summary(), "batch finished");
        report
    }

    fn finish(&mut self, mut outcome: FileOutcome, result: Result<(), ProcessError>) -> FileOutcome {
        let failed = match result {
            Ok(()) => false,
            Err(err) => {
                self.diags.record_failure(&err);
                if err.is_data_error() {
                    self.diags.info(
                        IssueCategory::Summary,
                        "Check the source file, fix it and run the processing again",
                    );
                }
                true
            }
        };

        outcome.diagnostics = self.diags.snapshot();
        outcome.status = if failed {
            FileStatus::Failed
        } else if outcome.diagnostics.has_errors() || outcome.diagnostics.has_warnings() {
            FileStatus::CompletedWithIssues
        } else {
            FileStatus::Success
        };
        outcome
    }

    fn run_file<G: GridReader + ?Sized>(
        &mut self,
        grid: &G,
        target: Option<&OutputTarget<'_>>,
        outcome: &mut FileOutcome,
    ) -> Result<(), ProcessError> {
        // Detection
        let (version, rule_id) = match VersionDetector::new(&self.registry).detect(grid) {
            Detection::Detected { version, rule_id } => (version, rule_id),
            Detection::Undetermined => return Err(ProcessError::VersionUndetermined),
        };
        outcome.version = Some(version);

        let pinned = self.expected;
        match pinned {
            Some(expected) if expected != version => {
                return Err(ProcessError::VersionMismatch {
                    detected: version,
                    expected,
                });
            }
            Some(_) => {}
            // Unpinned batches accept both versions; only the note is kept
            None => {
                self.diags.set_batch_note(Diagnostic::info(
                    IssueCategory::VersionDetected,
                    format!("Detected version: {} template (rule '{}')", version, rule_id),
                ));
            }
        }

        let layout = self
            .registry
            .layout(version)
            .cloned()
            .ok_or_else(|| ProcessError::Config(format!("no layout registered for {}", version)))?;
        let sheet = layout
            .resolve_sheet(grid)
            .ok_or_else(|| ProcessError::StructuralShortfall {
                reason: "workbook has no sheets".to_string(),
            })?;

        // Extraction
        let extractor = ActivityGridExtractor::new(&self.completer)
            .with_unspecified_text(&self.config.unspecified_text);
        let mut activities = extractor.extract(grid, &layout, &sheet, &mut self.diags)?;

        if self.config.dedupe_activities {
            let before = activities.len();
            let mut seen = HashSet::new();
            activities.retain(|a| seen.insert(a.clone()));
            let removed = before - activities.len();
            if removed > 0 {
                self.diags.info(
                    IssueCategory::Summary,
                    format!("Removed {} duplicate activities", removed),
                );
            }
        }

        let participants =
            extractor.extract_participants(grid, &layout, &sheet, self.config.participant_scan_limit);

        self.diags.info(
            IssueCategory::Summary,
            format!("Loaded {} activities", activities.len()),
        );
        self.diags.info(
            IssueCategory::Summary,
            format!("Total hours: {}", activities_total(&activities)),
        );
        self.diags.info(
            IssueCategory::Summary,
            format!("Loaded {} participants", participants.len()),
        );

        check_template_size(&activities, &layout, &mut self.diags);

        // Cross totals (non-fatal)
        let validation = self.validator.validate(grid, &activities, &mut self.diags);
        outcome.activities = activities;
        outcome.participants = participants;
        outcome.validation = Some(validation);

        // Output
        if let Some(target) = target {
            ensure_platform(target.writer)?;
            let destination = target.directory.join(output_name(&outcome.source, version));
            let payload = TemplatePayload {
                activities: outcome.activities.clone(),
                participants: outcome.participants.clone(),
            };
            let written = target.writer.write(&payload, &destination)?;

            if written.confirmation.matched {
                self.diags.info(
                    IssueCategory::Output,
                    format!(
                        "Output written to {}; its form and topic groupings add up to {} h",
                        written.location.display(),
                        written.confirmation.activities_total
                    ),
                );
            } else {
                self.diags.error(
                    IssueCategory::Output,
                    format!(
                        "Output written to {} does not reproduce the totals: {}",
                        written.location.display(),
                        written.confirmation.summary()
                    ),
                );
            }
            outcome.output = Some(written.location);
        }

        Ok(())
    }
}

impl Default for AttendanceProcessor {
    fn default() -> Self {
        AttendanceProcessor::new(LayoutRegistry::builtin(), ProcessorConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
