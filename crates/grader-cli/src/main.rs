//! # grader-cli
//!
//! Binary entry point for the OpenGrader record tools.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading with command-line overrides
//! - `opengrader import` to merge student submissions into an exam record
//! - `opengrader students` to list the students a record already holds

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use grader_core::{
    ExamRecord, GraderConfig, IdentityStrategy, MergeSummary, RecordMerger, RecordMode,
    StudentSummary, WriteStrategy, submission,
};
use std::io::{IsTerminal, Read, stdout};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Output format for the students command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for programmatic access
    Json,
}

/// Identity key used to match students against existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdentityArg {
    /// firstname + lastname, compatible with existing records
    Concatenated,
    /// Names joined with a separator; "John"/"" differs from ""/"John"
    Separated,
}

impl From<IdentityArg> for IdentityStrategy {
    fn from(arg: IdentityArg) -> Self {
        match arg {
            IdentityArg::Concatenated => IdentityStrategy::Concatenated,
            IdentityArg::Separated => IdentityStrategy::Separated,
        }
    }
}

/// ANSI color codes for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
}

/// OpenGrader - exam record tools for the grading assistant
#[derive(Parser, Debug)]
#[command(name = "opengrader", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = grader_core::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge student submissions into an exam record
    Import(ImportArgs),

    /// List the students an exam record holds
    Students(StudentsArgs),
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Exam record to update (defaults to <output_dir>/<record_file> from config)
    record: Option<PathBuf>,

    /// Student list as JSON
    #[arg(
        short,
        long,
        conflicts_with = "students_file",
        required_unless_present = "students_file"
    )]
    students: Option<String>,

    /// File holding the student list as JSON ("-" reads stdin)
    #[arg(long)]
    students_file: Option<PathBuf>,

    /// Fail instead of creating a missing record
    #[arg(long)]
    require_existing: bool,

    /// Directory relative answer paths are resolved against
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Show the resulting record without writing it
    #[arg(long)]
    dry_run: bool,

    /// Identity key policy (overrides config)
    #[arg(long, value_enum)]
    identity: Option<IdentityArg>,
}

#[derive(Parser, Debug)]
struct StudentsArgs {
    /// Exam record to read (defaults to <output_dir>/<record_file> from config)
    record: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = GraderConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    // Initialize logging; RUST_LOG wins over the verbosity flag
    let filter = if cli.verbose || config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let warnings = config.validate().context("Configuration validation failed")?;
    for warning in &warnings {
        eprintln!("{warning}");
    }

    match cli.command {
        Commands::Import(args) => import_command(&config, cli.color, args),
        Commands::Students(args) => students_command(&config, cli.color, args),
    }
}

fn import_command(config: &GraderConfig, color_mode: ColorMode, args: ImportArgs) -> Result<()> {
    let record = args.record.unwrap_or_else(|| config.record_path());

    let json = match (args.students, args.students_file) {
        (Some(json), _) => json,
        (None, Some(path)) => read_students_file(&path)?,
        (None, None) => anyhow::bail!("No student list given: use --students or --students-file"),
    };
    let students = submission::parse_batch(&json).context("Failed to parse student list")?;
    debug!(students = students.len(), record = %record.display(), "Importing submissions");

    // CLI flags take precedence over config values
    let mut options = config.merge_options();
    if args.require_existing {
        options.mode = RecordMode::RequireExisting;
    }
    if let Some(base_dir) = args.base_dir {
        options.base_dir = Some(base_dir);
    }
    if let Some(identity) = args.identity {
        options.identity = identity.into();
    }
    options.dry_run = args.dry_run;

    let summary = RecordMerger::new(options)
        .merge(&record, &students)
        .with_context(|| format!("Failed to import submissions into {}", record.display()))?;

    if args.dry_run {
        print!("{}", summary.document);
    } else {
        print_import_summary(&summary, color_mode.should_use_colors());
    }
    Ok(())
}

fn read_students_file(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut json = String::new();
        std::io::stdin()
            .read_to_string(&mut json)
            .context("Failed to read student list from stdin")?;
        return Ok(json);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read student list from {}", path.display()))
}

fn print_import_summary(summary: &MergeSummary, use_colors: bool) {
    use colors::{BOLD, DIM, GREEN, RESET, YELLOW};

    let verb = if summary.created { "Created" } else { "Updated" };
    if use_colors {
        println!("{GREEN}✓{RESET} {verb} {BOLD}{}{RESET}", summary.record_path.display());
    } else {
        println!("{verb} {}", summary.record_path.display());
    }

    for name in &summary.inserted {
        if use_colors {
            println!("  {GREEN}+{RESET} {name}");
        } else {
            println!("  + {name}");
        }
    }
    for name in &summary.updated {
        if use_colors {
            println!("  {YELLOW}~{RESET} {name}");
        } else {
            println!("  ~ {name}");
        }
    }

    let mut totals = format!(
        "{} inserted, {} updated, {} answers imported",
        summary.inserted.len(),
        summary.updated.len(),
        summary.answers_imported
    );
    if summary.removed_duplicates > 0 {
        totals.push_str(&format!(", {} duplicates removed", summary.removed_duplicates));
    }
    if summary.strategy == WriteStrategy::Reserialized {
        totals.push_str(", record rewritten without comments");
    }
    if use_colors {
        println!("{DIM}{totals}{RESET}");
    } else {
        println!("{totals}");
    }
}

fn students_command(config: &GraderConfig, color_mode: ColorMode, args: StudentsArgs) -> Result<()> {
    let use_colors = color_mode.should_use_colors();
    let path = args.record.unwrap_or_else(|| config.record_path());

    let record = ExamRecord::load(&path)
        .with_context(|| format!("Failed to read exam record {}", path.display()))?;
    let students = record.students();

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&students)?;
            println!("{json}");
        }
        OutputFormat::Table => {
            if students.is_empty() {
                if use_colors {
                    println!("{}No students in {}.{}", colors::DIM, path.display(), colors::RESET);
                } else {
                    println!("No students in {}.", path.display());
                }
                return Ok(());
            }
            print_students_table(&students, use_colors);
        }
    }

    Ok(())
}

fn print_students_table(students: &[StudentSummary], use_colors: bool) {
    use colors::{BOLD, CYAN, DIM, RESET};

    let first_width = column_width(students.iter().map(|s| s.firstname.as_str()), "Firstname");
    let last_width = column_width(students.iter().map(|s| s.lastname.as_str()), "Lastname");

    if use_colors {
        println!(
            "{BOLD}{DIM}  # │ {:<first_width$} │ {:<last_width$} │ Answers │ Graded{RESET}",
            "Firstname", "Lastname"
        );
    } else {
        println!(
            "  # | {:<first_width$} | {:<last_width$} | Answers | Graded",
            "Firstname", "Lastname"
        );
    }

    for (i, student) in students.iter().enumerate() {
        let graded = format!("{}/{}", student.graded, student.answers);
        if use_colors {
            println!(
                "{DIM}{:>3}{RESET} │ {:<first_width$} │ {:<last_width$} │ {:>7} │ {CYAN}{graded}{RESET}",
                i + 1,
                student.firstname,
                student.lastname,
                student.answers,
            );
        } else {
            println!(
                "{:>3} | {:<first_width$} | {:<last_width$} | {:>7} | {graded}",
                i + 1,
                student.firstname,
                student.lastname,
                student.answers,
            );
        }
    }

    if use_colors {
        println!("{DIM}{} students{RESET}", students.len());
    } else {
        println!("{} students", students.len());
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values
        .map(|v| v.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(header.len())
}
