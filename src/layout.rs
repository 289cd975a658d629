// 🗺️ Layout Registry - Template layouts as data
// Every supported template version is one Layout value plus the detection
// rules that recognize it. Adding a variant means adding entries here,
// not adding branches to the detector.

use crate::grid::{CellPos, GridReader};
use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Canonical attendance source sheet
pub const SOURCE_SHEET: &str = "zdroj-dochazka";
/// Fallback sheet name used by older exports
pub const FALLBACK_SHEET: &str = "List1";
/// Sheet of the oldest 16-hour layout
pub const LEGACY_SHEET: &str = "Seznam aktivit";

// ============================================================================
// VERSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    SixteenHour,
    ThirtyTwoHour,
}

impl Version {
    /// Nominal template size in hours
    pub fn hours(&self) -> u32 {
        match self {
            Version::SixteenHour => 16,
            Version::ThirtyTwoHour => 32,
        }
    }

    pub fn all() -> [Version; 2] {
        [Version::SixteenHour, Version::ThirtyTwoHour]
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours())
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "16" | "16h" | "sixteenhour" => Ok(Version::SixteenHour),
            "32" | "32h" | "thirtytwohour" => Ok(Version::ThirtyTwoHour),
            other => Err(anyhow!("Unknown template version: {} (expected 16h or 32h)", other)),
        }
    }
}

// ============================================================================
// MARKERS & RULES
// ============================================================================

/// Marker - expected label text at a fixed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub cell: CellPos,
    pub text: String,
}

impl Marker {
    pub fn new(cell: &str, text: &str) -> Result<Self> {
        Ok(Marker {
            cell: cell.parse()?,
            text: text.to_string(),
        })
    }

    /// Case-insensitive substring match against the cell's text
    pub fn matches<G: GridReader + ?Sized>(&self, grid: &G, sheet: &str) -> bool {
        let needle = self.text.to_lowercase();
        grid.cell_at_pos(sheet, self.cell)
            .as_text()
            .map(|value| value.to_lowercase().contains(&needle))
            .unwrap_or(false)
    }
}

/// Which sheet a detection rule inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetSelector {
    /// A sheet with exactly this name (rule does not apply if absent)
    Named(String),
    /// Whatever sheet comes first in workbook order
    First,
}

impl SheetSelector {
    pub fn resolve<G: GridReader + ?Sized>(&self, grid: &G) -> Option<String> {
        match self {
            SheetSelector::Named(name) => {
                if grid.has_sheet(name) {
                    Some(name.clone())
                } else {
                    None
                }
            }
            SheetSelector::First => grid.sheet_names().into_iter().next(),
        }
    }
}

/// DetectionRule - one declarative detection step
///
/// The rule applies when its sheet resolves and its primary marker (if any)
/// matches. The discriminator then picks between `on_match` and `otherwise`;
/// without a discriminator the rule yields `on_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    pub id: String,

    /// Higher = evaluated first
    #[serde(default)]
    pub priority: i32,

    pub sheet: SheetSelector,

    #[serde(default)]
    pub primary: Option<Marker>,

    #[serde(default)]
    pub discriminator: Option<Marker>,

    pub on_match: Version,

    #[serde(default)]
    pub otherwise: Option<Version>,
}

impl DetectionRule {
    /// Version selected by this rule, or None if the rule does not apply
    pub fn evaluate<G: GridReader + ?Sized>(&self, grid: &G) -> Option<Version> {
        let sheet = self.sheet.resolve(grid)?;

        if let Some(primary) = &self.primary {
            if !primary.matches(grid, &sheet) {
                return None;
            }
        }

        match &self.discriminator {
            Some(discriminator) if discriminator.matches(grid, &sheet) => Some(self.on_match),
            Some(_) => self.otherwise,
            None => Some(self.on_match),
        }
    }
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Layout - row/column offsets of one template version (0-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub version: Version,
    pub dates_row: u32,
    #[serde(default)]
    pub time_row: Option<u32>,
    pub form_row: u32,
    pub topic_row: u32,
    pub teacher_row: u32,
    pub hours_row: u32,
    pub data_start_col: u32,
    pub participant_col: u32,
    pub participant_start_row: u32,
    pub total_hours: u32,

    /// Label identifying an empty output template of this version
    pub template_marker: Marker,

    /// Preferred extraction sheets in order; the first sheet is the fallback
    pub source_sheets: Vec<String>,
}

impl Layout {
    /// Sheet the extractor should read, if the workbook has any sheet at all
    pub fn resolve_sheet<G: GridReader + ?Sized>(&self, grid: &G) -> Option<String> {
        self.source_sheets
            .iter()
            .find(|name| grid.has_sheet(name))
            .cloned()
            .or_else(|| grid.sheet_names().into_iter().next())
    }

    /// Last row any activity field lives on
    pub fn last_field_row(&self) -> u32 {
        [
            Some(self.dates_row),
            self.time_row,
            Some(self.form_row),
            Some(self.topic_row),
            Some(self.teacher_row),
            Some(self.hours_row),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(self.hours_row)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    layouts: Vec<Layout>,
    rules: Vec<DetectionRule>,
}

/// LayoutRegistry - read-only table shared by every file in a batch
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: Vec<Layout>,
    rules: Vec<DetectionRule>,
}

impl LayoutRegistry {
    /// The shipped table for the 16- and 32-hour templates
    pub fn builtin() -> Self {
        let marker = |cell: &str, text: &str| Marker {
            cell: CellPos::parse_a1(cell).unwrap_or(CellPos::new(0, 0)),
            text: text.to_string(),
        };
        let source_sheets = vec![SOURCE_SHEET.to_string(), FALLBACK_SHEET.to_string()];

        let layouts = vec![
            Layout {
                version: Version::SixteenHour,
                dates_row: 5,
                time_row: Some(6),
                form_row: 7,
                topic_row: 8,
                teacher_row: 9,
                hours_row: 10,
                data_start_col: 2,
                participant_col: 1,
                participant_start_row: 11,
                total_hours: 16,
                template_marker: marker("B1", "16 hodin"),
                source_sheets: source_sheets.clone(),
            },
            Layout {
                version: Version::ThirtyTwoHour,
                dates_row: 5,
                time_row: None,
                form_row: 6,
                topic_row: 7,
                teacher_row: 8,
                hours_row: 9,
                data_start_col: 2,
                participant_col: 1,
                participant_start_row: 10,
                total_hours: 32,
                template_marker: marker("B1", "32 hodin"),
                source_sheets,
            },
        ];

        let start_time = "čas zahájení";
        let activity_date = "datum aktivity";

        let rules = vec![
            DetectionRule {
                id: "source-sheet".to_string(),
                priority: 40,
                sheet: SheetSelector::Named(SOURCE_SHEET.to_string()),
                primary: None,
                discriminator: Some(marker("B7", start_time)),
                on_match: Version::SixteenHour,
                otherwise: Some(Version::ThirtyTwoHour),
            },
            DetectionRule {
                id: "first-sheet-row6".to_string(),
                priority: 30,
                sheet: SheetSelector::First,
                primary: Some(marker("B6", activity_date)),
                discriminator: Some(marker("B7", start_time)),
                on_match: Version::SixteenHour,
                otherwise: Some(Version::ThirtyTwoHour),
            },
            DetectionRule {
                id: "first-sheet-row5".to_string(),
                priority: 20,
                sheet: SheetSelector::First,
                primary: Some(marker("B5", activity_date)),
                discriminator: Some(marker("B6", start_time)),
                on_match: Version::SixteenHour,
                otherwise: Some(Version::ThirtyTwoHour),
            },
            DetectionRule {
                id: "legacy-activity-list".to_string(),
                priority: 10,
                sheet: SheetSelector::Named(LEGACY_SHEET.to_string()),
                primary: Some(marker("B2", "pořadové číslo aktivity")),
                discriminator: None,
                on_match: Version::SixteenHour,
                otherwise: None,
            },
        ];

        LayoutRegistry::sorted(layouts, rules)
    }

    /// Load a custom registry from JSON (`{"layouts": [...], "rules": [...]}`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read layout file: {:?}", path.as_ref()))?;

        let file: RegistryFile =
            serde_json::from_str(&content).context("Failed to parse layout JSON")?;

        LayoutRegistry::from_parts(file.layouts, file.rules)
    }

    /// Validate and build a registry from its parts
    pub fn from_parts(layouts: Vec<Layout>, rules: Vec<DetectionRule>) -> Result<Self> {
        if rules.is_empty() {
            bail!("Layout registry has no detection rules");
        }

        for (i, layout) in layouts.iter().enumerate() {
            if layouts[..i].iter().any(|l| l.version == layout.version) {
                bail!("Duplicate layout for version {}", layout.version);
            }
        }

        for rule in &rules {
            for version in std::iter::once(rule.on_match).chain(rule.otherwise) {
                if !layouts.iter().any(|l| l.version == version) {
                    bail!("Rule '{}' selects {} but no layout is defined for it", rule.id, version);
                }
            }
        }

        Ok(LayoutRegistry::sorted(layouts, rules))
    }

    fn sorted(layouts: Vec<Layout>, mut rules: Vec<DetectionRule>) -> Self {
        // Stable sort keeps file order among equal priorities
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        LayoutRegistry { layouts, rules }
    }

    pub fn layout(&self, version: Version) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.version == version)
    }

    pub fn layouts(&self) -> &[Layout] {
        &self.layouts
    }

    /// Detection rules, highest priority first
    pub fn rules(&self) -> &[DetectionRule] {
        &self.rules
    }

    /// Write the registry as JSON (starting point for a custom layout file)
    pub fn to_json(&self) -> Result<String> {
        let file = RegistryFile {
            layouts: self.layouts.clone(),
            rules: self.rules.clone(),
        };
        serde_json::to_string_pretty(&file).context("Failed to serialize layout registry")
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================
