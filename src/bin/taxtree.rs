use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use taxtree::app::{App, lookup_lineage};
use taxtree::config::{ConfigLoader, ConfigOverrides, DB_PATH_ENV};
use taxtree::domain::TaxonId;
use taxtree::download::TaxdumpHttpClient;
use taxtree::error::TaxTreeError;
use taxtree::output::{JsonOutput, OutputMode, TerminalProgress, print_lineage, print_load_summary};

#[derive(Parser)]
#[command(name = "taxtree")]
#[command(about = "Load the NCBI taxonomy into SQLite and resolve seven-rank lineages")]
#[command(version, author)]
struct Cli {
    /// Print JSON on stdout and no progress bars.
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download (if needed) taxdmp.zip and build the taxonomy database")]
    Load(LoadArgs),
    #[command(about = "Show the kingdom-to-species lineage of a stored taxon")]
    Lineage(LineageArgs),
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// SQLite database path [default: ./taxtree.db]
    #[arg(long, env = DB_PATH_ENV)]
    db: Option<Utf8PathBuf>,

    /// JSON config file [default: ./taxtree.json when present]
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args, Clone)]
struct LoadArgs {
    /// Directory holding taxdmp.zip [default: ~/.cache/taxtree]
    #[arg(short = 'c', long)]
    cache_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    source_url: Option<String>,

    /// Fail instead of downloading when the archive is not cached.
    #[arg(long)]
    offline: bool,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Clone)]
struct LineageArgs {
    taxon_id: String,

    #[command(flatten)]
    store: StoreArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<TaxTreeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TaxTreeError) -> u8 {
    match error {
        err if err.is_structural() => 2,
        TaxTreeError::TaxonNotFound(_) | TaxTreeError::InvalidTaxonId(_) => 2,
        TaxTreeError::Http(_) | TaxTreeError::HttpStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Load(args) => run_load(args, output_mode),
        Commands::Lineage(args) => run_lineage(args, output_mode),
    }
}

fn run_load(args: LoadArgs, output_mode: OutputMode) -> miette::Result<()> {
    let overrides = ConfigOverrides {
        db_path: args.store.db,
        cache_dir: args.cache_dir,
        source_url: args.source_url,
        offline: args.offline,
    };
    let config = ConfigLoader::resolve(args.store.config.as_deref(), overrides)?;
    let app = App::new(TaxdumpHttpClient::new()?);

    match output_mode {
        OutputMode::NonInteractive => {
            let report = app.load(&config, &JsonOutput)?;
            JsonOutput::print_load(&report).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let progress = TerminalProgress::new();
            let result = app.load(&config, &progress);
            progress.finish();
            print_load_summary(&result?);
        }
    }
    Ok(())
}

fn run_lineage(args: LineageArgs, output_mode: OutputMode) -> miette::Result<()> {
    let id: TaxonId = args.taxon_id.parse()?;
    let overrides = ConfigOverrides {
        db_path: args.store.db,
        ..ConfigOverrides::default()
    };
    let config = ConfigLoader::resolve(args.store.config.as_deref(), overrides)?;
    let result = lookup_lineage(&config.db_path, &id)?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_lineage(&result).into_diagnostic()?,
        OutputMode::Interactive => print_lineage(&result),
    }
    Ok(())
}
