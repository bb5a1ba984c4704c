//! modelgen CLI.
//!
//! Generates TypeScript models from a relational schema snapshot or a SQLite
//! database.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use miette::{miette, IntoDiagnostic};
use tracing_subscriber::EnvFilter;

use modelgen_core::{
    GenerationOptions, Generator, HealthStatus, SchemaSource, SemanticComparator, WriteOutcome,
};

mod ui;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "modelgen.json";

#[derive(Parser)]
#[command(name = "modelgen")]
#[command(about = "Generates TypeScript models from a relational schema", version)]
struct Cli {
    /// Increase log verbosity (RUST_LOG overrides)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate model files
    Generate {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: OptionArgs,

        /// Print the result as JSON instead of status lines
        #[arg(long)]
        json: bool,
    },

    /// List the tables a generate run would process
    Tables {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Validate options and analyze the schema without generating
    Check {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Compare two files, ignoring generated timestamps and whitespace
    Compare {
        a: PathBuf,
        b: PathBuf,

        /// Additional line pattern (regex) to ignore
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },

    /// Construct every service and report its health
    Health {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        options: OptionArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Schema snapshot (.json) or SQLite database
    #[arg(short, long, default_value = "db/schema.json")]
    schema: PathBuf,

    /// Config file (defaults to ./modelgen.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct OptionArgs {
    /// Generate a single table
    #[arg(short, long)]
    table: Option<String>,

    /// Skip a table (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Report what would be written without touching disk
    #[arg(long)]
    dry_run: bool,

    /// Write even when content is unchanged
    #[arg(short, long)]
    force: bool,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum files per formatter batch
    #[arg(long)]
    batch_max_files: Option<usize>,

    /// Maximum estimated formatter memory per batch (MB)
    #[arg(long)]
    batch_max_memory_mb: Option<usize>,

    /// Do not run prettier
    #[arg(long)]
    skip_formatter: bool,

    /// Warn instead of failing on empty tables and unknown relationship kinds
    #[arg(long)]
    lenient: bool,

    /// Fail on unrecognized SQL types
    #[arg(long)]
    strict_types: bool,

    /// Directory the frontend root is searched from
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// JSON file listing loggable models
    #[arg(long)]
    loggable_manifest: Option<PathBuf>,
}

impl OptionArgs {
    /// Flags override values loaded from the config file.
    fn apply(&self, mut options: GenerationOptions) -> GenerationOptions {
        if self.table.is_some() {
            options.table = self.table.clone();
        }
        if !self.exclude.is_empty() {
            options.exclude_tables = self.exclude.clone();
        }
        options.dry_run |= self.dry_run;
        options.force |= self.force;
        options.skip_formatter |= self.skip_formatter;
        options.strict_types |= self.strict_types;
        if self.lenient {
            options.strict = false;
        }
        if let Some(output) = &self.output {
            options.output_dir = output.clone();
        }
        if let Some(files) = self.batch_max_files {
            options.batch_max_files = files;
        }
        if let Some(mb) = self.batch_max_memory_mb {
            options.batch_max_memory_mb = mb;
        }
        if let Some(root) = &self.project_root {
            options.project_root = root.clone();
        }
        if let Some(manifest) = &self.loggable_manifest {
            options.loggable_manifest = Some(manifest.clone());
        }
        options
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate { source, options, json } => generate(&source, &options, json),
        Commands::Tables { source, options } => {
            let generator = generator(&source, &options)?;
            for table in generator.tables()? {
                println!("{}", table);
            }
            Ok(())
        }
        Commands::Check { source, options } => check(&source, &options),
        Commands::Compare { a, b, ignore } => compare(&a, &b, &ignore),
        Commands::Health { source, options, json } => health(&source, &options, json),
    }
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_options(source: &SourceArgs, args: &OptionArgs) -> miette::Result<GenerationOptions> {
    let base = match &source.config {
        Some(path) => GenerationOptions::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => GenerationOptions::from_file(Path::new(DEFAULT_CONFIG))?,
        None => GenerationOptions::default(),
    };
    Ok(args.apply(base))
}

fn generator(source: &SourceArgs, args: &OptionArgs) -> miette::Result<Generator> {
    let options = load_options(source, args)?;
    Ok(Generator::new(options, SchemaSource::from_path(&source.schema)))
}

fn generate(source: &SourceArgs, args: &OptionArgs, json: bool) -> miette::Result<()> {
    let generator = generator(source, args)?;

    if json {
        let result = generator.generate()?;
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
        return Ok(());
    }

    let dry_run = generator.options().dry_run;
    ui::Panel::new(if dry_run { "modelgen (dry run)" } else { "modelgen" })
        .line(format!("schema  {}", source.schema.display()))
        .line(format!("output  {}", generator.options().output_dir.display()))
        .print();
    println!();

    let reporter = Rc::new(ui::ConsoleReporter::new(ui::spinner("Analyzing schema...")));
    let outcome = generator.with_reporter(reporter.clone()).generate();
    reporter.finish();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            ui::error_header();
            return Err(e.into());
        }
    };

    println!();
    if dry_run {
        ui::info(&format!(
            "{} tables {} {} files would be written",
            result.tables.len(),
            ui::symbols::DOT,
            result.planned.len()
        ));
        ui::dim(&ui::formatting_line(&result.formatting));
    } else {
        ui::success(&format!(
            "{} tables {} {} created {} {} identical {} {} errors",
            result.tables.len(),
            ui::symbols::DOT,
            result.created,
            ui::symbols::DOT,
            result.identical,
            ui::symbols::DOT,
            result.errors
        ));
        ui::dim(&ui::formatting_line(&result.formatting));
        for failed in result.write_results.iter() {
            if let WriteOutcome::Error(message) = &failed.outcome {
                ui::error(&format!("{}: {}", failed.path.display(), message));
            }
        }
    }
    ui::timing("Done", result.elapsed);

    if result.errors > 0 {
        return Err(miette!("{} files could not be written", result.errors));
    }
    Ok(())
}

fn check(source: &SourceArgs, args: &OptionArgs) -> miette::Result<()> {
    let started = Instant::now();
    let spinner = ui::spinner("Checking schema...");
    let generator = generator(source, args)?;
    let outcome = generator.tables();
    spinner.finish_and_clear();

    let tables = outcome?;
    ui::looking_good();
    println!();
    for table in &tables {
        println!("    {} {}", ui::symbols::TRIANGLE, table);
    }
    println!();
    ui::timing(&format!("{} tables checked", tables.len()), started.elapsed());
    Ok(())
}

fn compare(a: &Path, b: &Path, ignore: &[String]) -> miette::Result<()> {
    let left = std::fs::read_to_string(a).into_diagnostic()?;
    let right = std::fs::read_to_string(b).into_diagnostic()?;

    let mut comparator = SemanticComparator::new();
    for pattern in ignore {
        comparator = comparator.ignoring(pattern)?;
    }

    if comparator.identical(&left, &right) {
        ui::success("identical");
        Ok(())
    } else {
        ui::error("different");
        std::process::exit(1);
    }
}

fn health(source: &SourceArgs, args: &OptionArgs, json: bool) -> miette::Result<()> {
    let summary = generator(source, args)?.health()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary).into_diagnostic()?);
    } else {
        let mut panel = ui::Panel::new("service health");
        for (name, health) in &summary.report.services {
            let detail = health.message.as_deref().unwrap_or("");
            panel = panel.line(format!("{:<26} {} {}", name, ui::health_label(health.status), detail));
        }
        for failure in &summary.failures {
            panel = panel.line(format!(
                "{:<26} {} {}",
                failure.name,
                ui::health_label(HealthStatus::Unhealthy),
                failure.error
            ));
        }
        panel.print();

        let stats = &summary.statistics;
        ui::dim(&format!(
            "{} registered {} {} initialized {} {} errored",
            stats.registered,
            ui::symbols::DOT,
            stats.initialized,
            ui::symbols::DOT,
            stats.errored
        ));
        ui::info(&format!("overall: {}", ui::health_label(summary.status())));
    }

    if summary.status() == HealthStatus::Unhealthy {
        std::process::exit(1);
    }
    Ok(())
}
