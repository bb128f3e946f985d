use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ipeds_sfa_pipeline::app::{
    App, CombineResult, FetchOptions, FetchResult, JoinResult, RenameResult, RunResult,
};
use ipeds_sfa_pipeline::domain::{StartYear, YearRange};
use ipeds_sfa_pipeline::error::SfaError;
use ipeds_sfa_pipeline::nces::{NcesClient, NcesHttpClient};
use ipeds_sfa_pipeline::output::{JsonOutput, OutputMode};
use ipeds_sfa_pipeline::store::SfaStore;

#[derive(Parser)]
#[command(name = "ipeds-sfa")]
#[command(about = "Download, combine, and label IPEDS Student Financial Aid survey data")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    data_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download survey archives for a range of start years")]
    Fetch(FetchArgs),
    #[command(about = "Combine local survey files into one csv")]
    Combine,
    #[command(about = "Relabel columns using the newest dictionary")]
    Rename,
    #[command(about = "Join institution names onto the combined data")]
    Join,
    #[command(about = "Run the whole pipeline end to end")]
    Run(RunArgs),
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[arg(long, default_value = "2013")]
    from_year: StartYear,

    #[arg(long, default_value = "2022")]
    to_year: StartYear,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(long, default_value = "2013")]
    from_year: StartYear,

    #[arg(long, default_value = "2022")]
    to_year: StartYear,

    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(sfa) = report.downcast_ref::<SfaError>() {
            return ExitCode::from(map_exit_code(sfa));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SfaError) -> u8 {
    match error {
        SfaError::InvalidYearBound(_)
        | SfaError::InvalidYearRange(_)
        | SfaError::NoSurveyFiles(_)
        | SfaError::MissingInput(_) => 2,
        SfaError::NcesHttp(_) | SfaError::NcesStatus { .. } => 3,
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
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let store = match cli.data_dir {
        Some(dir) => SfaStore::new_with_root(dir),
        None => SfaStore::new().into_diagnostic()?,
    };
    info!("data directory {}", store.data_root());
    let client = NcesHttpClient::new().into_diagnostic()?;
    let app = App::new(store, client);

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, app, output_mode),
        Commands::Combine => run_combine(app, output_mode),
        Commands::Rename => run_rename(app, output_mode),
        Commands::Join => run_join(app, output_mode),
        Commands::Run(args) => run_pipeline(args, app, output_mode),
    }
}

fn run_fetch<C: NcesClient + 'static>(
    args: FetchArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let range = YearRange::new(args.from_year, args.to_year).into_diagnostic()?;
    let options = FetchOptions {
        force: args.force,
        dry_run: args.dry_run,
    };
    let result = app.fetch(&range, options).into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic()?,
        OutputMode::Human => print_fetch_summary(&result),
    }
    Ok(())
}

fn run_combine<C: NcesClient + 'static>(app: App<C>, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.combine().into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_combine(&result).into_diagnostic()?,
        OutputMode::Human => print_combine_summary(&result),
    }
    Ok(())
}

fn run_rename<C: NcesClient + 'static>(app: App<C>, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.rename().into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_rename(&result).into_diagnostic()?,
        OutputMode::Human => print_rename_summary(&result),
    }
    Ok(())
}

fn run_join<C: NcesClient + 'static>(app: App<C>, output_mode: OutputMode) -> miette::Result<()> {
    let result = app.join().into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_join(&result).into_diagnostic()?,
        OutputMode::Human => print_join_summary(&result),
    }
    Ok(())
}

fn run_pipeline<C: NcesClient + 'static>(
    args: RunArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let range = YearRange::new(args.from_year, args.to_year).into_diagnostic()?;
    let options = FetchOptions {
        force: args.force,
        dry_run: false,
    };
    let result = app.run(&range, options).into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&result).into_diagnostic()?,
        OutputMode::Human => print_run_summary(&result),
    }
    Ok(())
}

fn print_fetch_summary(result: &FetchResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    for item in &result.items {
        let color = match item.action.as_str() {
            "download" | "would-download" => cyan,
            "unchanged" => green,
            _ => yellow,
        };
        match item.remote_size {
            Some(size) => println!(
                "{color}{} {} ({}, {} bytes){reset}",
                item.year, item.archive, item.action, size
            ),
            None => println!("{color}{} {} ({}){reset}", item.year, item.archive, item.action),
        }
    }
    println!(
        "{} downloaded, {} unchanged, {} skipped",
        result.downloaded, result.unchanged, result.skipped
    );
}

fn print_combine_summary(result: &CombineResult) {
    println!(
        "combined {} files with {} shared columns into {} rows",
        result.files_selected, result.common_columns, result.rows
    );
    println!("wrote {}", result.output);
}

fn print_rename_summary(result: &RenameResult) {
    match &result.dictionary {
        Some(dictionary) => println!(
            "relabelled {} columns using {}",
            result.renamed_columns, dictionary
        ),
        None => println!("no usable dictionary; columns keep their short names"),
    }
    println!("wrote {}", result.output);
}

fn print_join_summary(result: &JoinResult) {
    if result.joined {
        println!(
            "matched {} of {} rows against {} institutions",
            result.matched_rows, result.rows, result.reference_institutions
        );
    } else {
        println!("no institution reference available; nothing joined");
    }
    if let Some(output) = &result.output {
        println!("wrote {output}");
    }
}

fn print_run_summary(result: &RunResult) {
    print_fetch_summary(&result.fetch);
    print_combine_summary(&result.combine);
    print_rename_summary(&result.rename);
    print_join_summary(&result.join);
}
