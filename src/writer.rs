// 📤 Template Writers - Hand extracted data to an output document
//
// The processor gives a writer the activities and participant names; the
// writer fills three regions (participants, activities, per-student
// overview) and recomputes the control totals from what it wrote.

use crate::error::ProcessError;
use crate::extractor::Activity;
use crate::validator::{activities_total, ValidationReport};
use csv::{ReaderBuilder, Writer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const PARTICIPANTS_FILE: &str = "participants.csv";
pub const ACTIVITIES_FILE: &str = "activities.csv";
pub const OVERVIEW_FILE: &str = "overview.csv";

// ============================================================================
// PAYLOAD & OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePayload {
    pub activities: Vec<Activity>,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub location: PathBuf,
    pub hours_by_form: BTreeMap<String, i64>,
    pub hours_by_topic: BTreeMap<String, i64>,
    /// Round-trip check: activities total vs. the form and topic groupings
    /// read back from the output. It only fails when the output lost or
    /// altered hours; the source's control tables are checked elsewhere.
    pub confirmation: ValidationReport,
}

/// One row of the per-student/per-activity cross table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewRow {
    pub activity_number: usize,
    pub participant: String,
}

/// Every participant attends every activity (1-based activity numbers)
pub fn overview_rows(activity_count: usize, participants: &[String]) -> Vec<OverviewRow> {
    (1..=activity_count)
        .flat_map(|number| {
            participants.iter().map(move |p| OverviewRow {
                activity_number: number,
                participant: p.clone(),
            })
        })
        .collect()
}

// ============================================================================
// WRITER TRAIT
// ============================================================================

pub trait TemplateWriter {
    fn name(&self) -> &str;

    /// Operating system the writer needs (`std::env::consts::OS` value)
    fn required_platform(&self) -> Option<&str> {
        None
    }

    fn write(&self, payload: &TemplatePayload, destination: &Path) -> Result<WriteOutcome, ProcessError>;
}

/// Refuse to run a writer on a platform it does not support
pub fn ensure_platform(writer: &dyn TemplateWriter) -> Result<(), ProcessError> {
    match writer.required_platform() {
        Some(required) if required != std::env::consts::OS => Err(ProcessError::PlatformUnsupported {
            required: format!("{} ({})", required, writer.name()),
            platform: std::env::consts::OS.to_string(),
        }),
        _ => Ok(()),
    }
}

// ============================================================================
// CSV EXPORT WRITER
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ParticipantRow {
    number: usize,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActivityRow {
    number: usize,
    date: String,
    time: String,
    hours: u32,
    form: String,
    topic: String,
    teacher: String,
}

/// Writes the three regions as CSV files into a destination directory
pub struct CsvExportWriter;

impl CsvExportWriter {
    pub fn new() -> Self {
        CsvExportWriter
    }

    /// Group written activity hours by form and by topic, read back from disk
    fn regroup(activities_csv: &Path) -> Result<(BTreeMap<String, i64>, BTreeMap<String, i64>), ProcessError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(activities_csv)?;

        let mut by_form = BTreeMap::new();
        let mut by_topic = BTreeMap::new();
        for row in reader.deserialize() {
            let row: ActivityRow = row?;
            *by_form.entry(row.form).or_insert(0) += row.hours as i64;
            *by_topic.entry(row.topic).or_insert(0) += row.hours as i64;
        }
        Ok((by_form, by_topic))
    }
}

impl Default for CsvExportWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateWriter for CsvExportWriter {
    fn name(&self) -> &str {
        "csv-export"
    }

    fn write(&self, payload: &TemplatePayload, destination: &Path) -> Result<WriteOutcome, ProcessError> {
        fs::create_dir_all(destination)?;

        let mut participants = Writer::from_path(destination.join(PARTICIPANTS_FILE))?;
        for (i, name) in payload.participants.iter().enumerate() {
            participants.serialize(ParticipantRow {
                number: i + 1,
                name: name.clone(),
            })?;
        }
        participants.flush()?;

        let activities_path = destination.join(ACTIVITIES_FILE);
        let mut activities = Writer::from_path(&activities_path)?;
        for (i, activity) in payload.activities.iter().enumerate() {
            activities.serialize(ActivityRow {
                number: i + 1,
                date: activity.date_text(),
                time: activity.time.clone().unwrap_or_default(),
                hours: activity.hours,
                form: activity.form.clone(),
                topic: activity.topic.clone(),
                teacher: activity.teacher.clone(),
            })?;
        }
        activities.flush()?;

        let mut overview = Writer::from_path(destination.join(OVERVIEW_FILE))?;
        for row in overview_rows(payload.activities.len(), &payload.participants) {
            overview.serialize(row)?;
        }
        overview.flush()?;

        let (hours_by_form, hours_by_topic) = Self::regroup(&activities_path)?;
        let confirmation = ValidationReport::from_totals(
            activities_total(&payload.activities),
            hours_by_form.values().sum(),
            hours_by_topic.values().sum(),
        );

        tracing::debug!(location = %destination.display(), summary = %confirmation.summary(), "csv export written");

        Ok(WriteOutcome {
            location: destination.to_path_buf(),
            hours_by_form,
            hours_by_topic,
            confirmation,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
