use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use hbnssi_fetcher::app::{App, DatasetResult, Endpoints, FetchOptions};
use hbnssi_fetcher::config::ConfigLoader;
use hbnssi_fetcher::domain::SubjectId;
use hbnssi_fetcher::error::HbnError;
use hbnssi_fetcher::layout::DatasetLayout;
use hbnssi_fetcher::output::{JsonOutput, LogSink, OutputMode, SubjectPaths};
use hbnssi_fetcher::registry::RemoteRegistry;
use hbnssi_fetcher::retrieval::HttpRetriever;

#[derive(Parser)]
#[command(name = "hbnssi-fetch")]
#[command(about = "Fetch the HBN Serial Scanning Initiative derivatives from OSF")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every subject, the brain mask and prepare output directories")]
    Fetch(FetchArgs),
    #[command(about = "Print the local artifact paths of one subject (no network access)")]
    Paths(PathsArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, help = "Restart partial downloads from zero")]
    no_resume: bool,
}

#[derive(Args)]
struct PathsArgs {
    subject: String,

    #[arg(long)]
    data_dir: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HbnError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HbnError) -> u8 {
    match error {
        HbnError::LookupMissing { .. } | HbnError::Parse { .. } => 2,
        HbnError::Retrieval { .. } | HbnError::RetrievalStatus { .. } => 3,
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
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Paths(args) => run_paths(args),
    }
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;
    let data_dir = args.data_dir.unwrap_or_else(|| resolved.data_dir.clone());
    let options = FetchOptions {
        resume: resolved.resume && !args.no_resume,
    };

    let retriever = HttpRetriever::new()?;
    let registry = RemoteRegistry::new(retriever.clone());
    let app = App::new(
        registry,
        retriever,
        resolved.lookup.clone(),
        Endpoints::from(&resolved),
    );

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch_dataset(&data_dir, options, &JsonOutput)?;
            JsonOutput::print_dataset(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.fetch_dataset(&data_dir, options, &LogSink)?;
            print_fetch_summary(&result);
        }
    }
    Ok(())
}

fn run_paths(args: PathsArgs) -> miette::Result<()> {
    let subject: SubjectId = args.subject.parse()?;
    let root = match args.data_dir {
        Some(dir) => dir,
        None => DatasetLayout::default_root()?,
    };
    let layout = DatasetLayout::new(root);
    JsonOutput::print_paths(&SubjectPaths::derive(&layout, subject)).into_diagnostic()?;
    Ok(())
}

fn print_fetch_summary(result: &DatasetResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}HBN-SSI dataset{reset}");
    println!("{green}subjects: {}{reset}", result.subject_ids.len());
    for subject in &result.subject_ids {
        println!("   sub-{subject}");
    }
    println!("{green}derivatives: {}{reset}", result.derivatives_dir);
    println!("{green}mask: {}{reset}", result.mask_path);
    println!("{green}decoding output: {}{reset}", result.decoding_out_dir);
    println!("{green}mask cache: {}{reset}", result.mask_cache_dir);
}
