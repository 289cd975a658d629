// ⚙️ Processor Configuration - Knobs the templates do not fix
// Loaded from JSON; every field has a default so partial files work.

use crate::date_completer::YearRange;
use crate::extractor::DEFAULT_UNSPECIFIED;
use crate::validator::ControlRange;
use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// The two independently maintained hour tables
    pub control_ranges: [ControlRange; 2],

    /// Text used for empty form/topic/teacher cells
    pub unspecified_text: String,

    /// Years accepted from dated neighbours during year inference
    pub neighbor_year_range: YearRange,

    /// Fallback year when no neighbour is dated (None = calendar year)
    pub reference_year: Option<i32>,

    /// Drop exact duplicate activities after extraction
    pub dedupe_activities: bool,

    /// Max rows scanned for participant names when the sheet size is unknown
    pub participant_scan_limit: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            control_ranges: [ControlRange::form_table(), ControlRange::topic_table()],
            unspecified_text: DEFAULT_UNSPECIFIED.to_string(),
            neighbor_year_range: YearRange::default(),
            reference_year: None,
            dedupe_activities: false,
            participant_scan_limit: 1000,
        }
    }
}

impl ProcessorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ProcessorConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for range in &self.control_ranges {
            range.validate()?;
        }
        if self.neighbor_year_range.min > self.neighbor_year_range.max {
            bail!(
                "neighbor_year_range is empty: {} > {}",
                self.neighbor_year_range.min,
                self.neighbor_year_range.max
            );
        }
        if self.unspecified_text.trim().is_empty() {
            bail!("unspecified_text must not be blank");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.control_ranges[0].reference(), "SDP!C4:C10");
        assert_eq!(config.control_ranges[1].reference(), "SDP!C12:C28");
        assert_eq!(config.unspecified_text, "Unspecified");
        assert_eq!(config.neighbor_year_range, YearRange { min: 2000, max: 2099 });
        assert!(!config.dedupe_activities);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dedupe_activities": true, "reference_year": 2024}}"#).unwrap();

        let config = ProcessorConfig::from_file(file.path()).unwrap();
        assert!(config.dedupe_activities);
        assert_eq!(config.reference_year, Some(2024));
        assert_eq!(config.participant_scan_limit, 1000);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"neighbor_year_range": {{"min": 2030, "max": 2020}}}}"#).unwrap();
        let err = ProcessorConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("neighbor_year_range"));

        assert!(ProcessorConfig::from_file("/nonexistent/config.json").is_err());
    }
}
