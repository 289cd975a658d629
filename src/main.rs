use anyhow::{Context, Result};
use attendance_ledger::{
    open_workbook, scan_folder, AttendanceProcessor, BatchReport, CsvExportWriter, Detection,
    FileStatus, LayoutRegistry, OutputTarget, ProcessorConfig, SkipReason, Version,
    VersionDetector,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Attendance ledger - extract and cross-check attendance workbooks
#[derive(Debug, Parser)]
#[command(name = "attendance-ledger", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom layout registry (JSON)
    #[arg(long, global = true)]
    layouts: Option<PathBuf>,

    /// Processor configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Report the template version of each source
    Detect {
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Extract, validate and optionally export sources
    Process {
        /// Workbooks or CSV directories, processed in order
        sources: Vec<PathBuf>,

        /// Also process every compatible workbook found in this folder
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Empty output template whose version pins the batch
        #[arg(long)]
        template: Option<PathBuf>,

        /// Pin the batch to a version (16h or 32h)
        #[arg(long = "expect", value_name = "VERSION")]
        expect: Option<Version>,

        /// Write CSV exports into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List compatible workbooks in a folder
    Scan {
        folder: PathBuf,

        #[arg(long = "expect", value_name = "VERSION")]
        expect: Option<Version>,
    },

    /// Print the layout registry as JSON
    Layouts,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("❌ {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let registry = match &cli.layouts {
        Some(path) => LayoutRegistry::from_file(path)?,
        None => LayoutRegistry::builtin(),
    };
    let config = match &cli.config {
        Some(path) => ProcessorConfig::from_file(path)?,
        None => ProcessorConfig::default(),
    };

    match cli.command {
        Commands::Detect { sources } => run_detect(&registry, &sources),
        Commands::Process {
            sources,
            folder,
            template,
            expect,
            output,
            json,
        } => {
            let report = run_process(registry, config, sources, folder, template, expect, output)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if report.count(FileStatus::Failed) > 0 {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Scan { folder, expect } => run_scan(&registry, &folder, expect),
        Commands::Layouts => {
            println!("{}", registry.to_json()?);
            Ok(())
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("ATTENDANCE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn run_detect(registry: &LayoutRegistry, sources: &[PathBuf]) -> Result<()> {
    let detector = VersionDetector::new(registry);
    for path in sources {
        let workbook = open_workbook(path).with_context(|| format!("Failed to open {}", path.display()))?;
        match detector.detect(&workbook) {
            Detection::Detected { version, rule_id } => {
                println!("✓ {} → {} (rule '{}')", path.display(), version, rule_id)
            }
            Detection::Undetermined => match detector.detect_template(&workbook) {
                Some(version) => println!("📄 {} → empty {} template", path.display(), version),
                None => println!("✗ {} → could not detect version", path.display()),
            },
        }
    }
    Ok(())
}

fn run_process(
    registry: LayoutRegistry,
    config: ProcessorConfig,
    mut sources: Vec<PathBuf>,
    folder: Option<PathBuf>,
    template: Option<PathBuf>,
    expect: Option<Version>,
    output: Option<PathBuf>,
) -> Result<BatchReport> {
    let mut processor = AttendanceProcessor::new(registry, config);

    if let Some(version) = expect {
        processor = processor.with_expected_version(version);
    }
    if let Some(path) = &template {
        let workbook = open_workbook(path).with_context(|| format!("Failed to open template {}", path.display()))?;
        let version = processor
            .pin_to_template(&workbook)
            .with_context(|| format!("Template {} has no recognizable version label", path.display()))?;
        println!("📄 Template {} → {}", path.display(), version);
    }

    if let Some(dir) = &folder {
        let scan = scan_folder(dir, processor.registry(), processor.expected_version())
            .with_context(|| format!("Failed to scan {}", dir.display()))?;
        sources.extend(scan.candidates.into_iter().map(|c| c.path));
    }

    if sources.is_empty() {
        anyhow::bail!("Nothing to process: pass source files or --folder");
    }

    let writer = CsvExportWriter::new();
    let target = output.as_deref().map(|directory| OutputTarget {
        writer: &writer,
        directory,
    });

    Ok(processor.process_paths(&sources, target.as_ref()))
}

fn run_scan(registry: &LayoutRegistry, folder: &Path, expect: Option<Version>) -> Result<()> {
    let report = scan_folder(folder, registry, expect)
        .with_context(|| format!("Failed to scan {}", folder.display()))?;

    println!("📂 {}", folder.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for candidate in &report.candidates {
        println!("✓ {} ({})", candidate.path.display(), candidate.version);
    }
    for (path, reason) in &report.skipped {
        let why = match reason {
            SkipReason::LockFile => "lock file".to_string(),
            SkipReason::PreviousOutput => "previous output".to_string(),
            SkipReason::Template => "template".to_string(),
            SkipReason::NotAttendance => "not an attendance workbook".to_string(),
            SkipReason::VersionMismatch { detected } => format!("{} layout", detected),
            SkipReason::Unreadable(err) => format!("unreadable: {}", err),
        };
        println!("  skipped {} ({})", path.display(), why);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!("📊 Attendance batch {}", report.run_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(note) = &report.version_note {
        println!("ℹ️  {}", note.message);
    }

    for file in &report.files {
        let icon = match file.status {
            FileStatus::Success => "✅",
            FileStatus::CompletedWithIssues => "⚠️ ",
            FileStatus::Failed => "❌",
        };
        println!("\n{} {}", icon, file.summary());

        // The batch note was already printed above
        let notes = file
            .diagnostics
            .info
            .iter()
            .filter(|d| report.version_note.as_ref() != Some(*d));
        for d in notes {
            println!("   ℹ️  {}", d.message);
        }
        for d in &file.diagnostics.warnings {
            println!("   ⚠️  {}", d.message);
        }
        for d in &file.diagnostics.errors {
            println!("   ❌ {}", d);
        }
        if let Some(output) = &file.output {
            println!("   💾 {}", output.display());
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
}
