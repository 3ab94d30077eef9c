use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use idlinker::config::Config;
use idlinker::runner::Pipeline;
use idlinker::scheduler::{CancelFlag, select_candidates};
use idlinker::store::RecordStore;

mod cli;

use cli::{Cli, Commands, RunArgs};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("idlinker")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("idlinker.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .target(env_logger::Target::Pipe(target))
        .init();

    // Until the config is loaded, RUST_LOG or info
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(log::LevelFilter::Info);
    }

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Config level applies only when RUST_LOG is unset.
fn apply_log_level(config: &Config) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Some(level) = config.log_level_filter() {
        log::set_max_level(level);
    }
}

/// Merge CLI flags and environment into the config. Credentials are only
/// checked for commands that call the lookup service.
fn resolve_config(config: &Config, args: &RunArgs, needs_service: bool) -> Result<Config> {
    let mut config = config.clone();
    args.apply(&mut config);
    config.apply_env();
    if needs_service {
        config.validate().context("Invalid configuration")?;
    } else {
        config.validate_settings().context("Invalid configuration")?;
    }
    Ok(config)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_enrich_command(&RunArgs::default(), config).await,
        Some(Commands::Enrich(args)) => handle_enrich_command(args, config).await,
        Some(Commands::Candidates { args, show }) => handle_candidates_command(args, *show, config),
    }
}

async fn handle_enrich_command(args: &RunArgs, config: &Config) -> Result<()> {
    let config = resolve_config(config, args, true)?;
    let options = config.pipeline_options();
    info!("Enriching {} -> {}", options.input_path.display(), options.output_path.display());

    let resolver = Arc::new(config.build_resolver().context("Failed to create resolver")?);
    let pipeline = Pipeline::new(resolver, options);

    let prepared = pipeline.prepare().context("Failed to prepare run")?;
    pipeline.banner(&prepared).print();

    if prepared.selection.is_empty() {
        println!("{}", "Nothing to resolve; all selected records are already linked.".green());
    }

    let cancel = pipeline.cancel_flag();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(cancel));

    let summary = pipeline.execute(prepared).await.context("Run failed")?;
    ctrl_c.abort();

    summary.print(config.progress.summary_preview);
    info!(
        "Run finished: {} processed, {} found, {} not found, {} errors",
        summary.stats.processed, summary.stats.found, summary.stats.not_found, summary.stats.errored
    );
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancelFlag) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\n{}", "Interrupted; finishing in-flight lookups and saving progress...".yellow());
        log::warn!("Ctrl-C received, cancelling run");
        cancel.cancel();
    }
}

fn handle_candidates_command(args: &RunArgs, show: usize, config: &Config) -> Result<()> {
    let config = resolve_config(config, args, false)?;
    let input = config.run.effective_input_path();
    info!("Listing candidates from {}", input.display());

    let store = RecordStore::load(input).context(format!("Failed to load {}", input.display()))?;
    let selection = select_candidates(&store, config.run.candidate_limit);

    println!("{} {}", "Store:".cyan(), input.display());
    println!("{}", selection.summary);
    for (rank, candidate) in selection.candidates.iter().take(show).enumerate() {
        let sales = store
            .get(&candidate.key)
            .and_then(|r| r.global_sales)
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}. {} [{}] {}",
            rank + 1,
            candidate.name,
            candidate.platform.as_deref().unwrap_or("?"),
            sales.dimmed()
        );
    }
    if selection.candidates.len() > show {
        println!("  ... and {} more", selection.candidates.len() - show);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_log_level(&config);

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
