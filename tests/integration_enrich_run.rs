//! End-to-end enrichment runs
//!
//! Drives the pipeline through the public API with a scripted resolver and a
//! record store on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use idlinker::config::Config;
use idlinker::domain::{Record, ResolutionError, ResolutionOutcome};
use idlinker::error::Result;
use idlinker::resolver::MockResolver;
use idlinker::runner::{Pipeline, PipelineOptions};
use idlinker::scheduler::{AuthMode, PacingPolicy};
use idlinker::store::RecordStore;
use tempfile::TempDir;

const MARIO_URI: &str = "http://www.wikidata.org/entity/Q12379";

fn write_input(path: &Path) -> Result<()> {
    let mut tetris = Record::new("vg:3", "Tetris (1989)").with_sales(35.0).with_year(1989);
    tetris.extra.insert("publisher".to_string(), serde_json::json!("Nintendo"));

    let store = RecordStore::from_records(vec![
        Record::new("vg:1", "Mario").with_platform("NES").with_sales(10.0),
        Record::new("vg:2", "Zelda").with_platform("NES").with_sales(30.0),
        tetris,
        Record::new("vg:4", "Pong").with_sales(20.0),
        Record::new("vg:5", "Doom").with_same_as("http://www.wikidata.org/entity/Q209163"),
    ])?;
    store.save(path)
}

fn records(path: &Path) -> Result<Vec<Record>> {
    Ok(RecordStore::load(path)?.iter().cloned().collect())
}

fn fast(mode: AuthMode) -> PacingPolicy {
    PacingPolicy::for_mode(mode)
        .with_worker_delay(Duration::ZERO)
        .without_hourly_budget()
}

fn options(dir: &TempDir, mode: AuthMode) -> PipelineOptions {
    PipelineOptions::new(
        dir.path().join("videogames.jsonl"),
        dir.path().join("videogames_with_wikidata.jsonl"),
        dir.path().join("not_found_games.txt"),
    )
    .with_pacing(fast(mode))
    .with_concurrency(5)
    .without_progress()
}

/// Every lookup failing leaves the store as it was and lists every name
#[tokio::test]
async fn test_always_error_resolver_changes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let opts = options(&dir, AuthMode::Authenticated);
    write_input(&opts.input_path)?;

    let resolver = MockResolver::with_fallback(ResolutionOutcome::Error(ResolutionError::Transport(
        "connection refused".to_string(),
    )));
    let summary = Pipeline::new(Arc::new(resolver), opts.clone()).run().await?;

    assert_eq!(summary.stats.found, 0);
    assert_eq!(summary.stats.processed, 4);
    assert_eq!(summary.stats.errored, summary.stats.processed);
    assert_eq!(records(&opts.output_path)?, records(&opts.input_path)?);

    let misses = fs::read_to_string(&opts.miss_list_path)?;
    assert_eq!(misses, "Mario\nPong\nTetris (1989)\nZelda\n");
    Ok(())
}

/// Limit 2 over weights 10/30/35/20 submits the two heaviest unlinked records
#[tokio::test]
async fn test_limit_submits_heaviest_first() -> Result<()> {
    let dir = TempDir::new()?;
    let opts = options(&dir, AuthMode::Unauthenticated).with_limit(2);
    write_input(&opts.input_path)?;

    let resolver = Arc::new(MockResolver::new());
    let summary = Pipeline::new(resolver.clone(), opts).run().await?;

    assert_eq!(summary.selection.total, 5);
    assert_eq!(summary.selection.already_enriched, 1);
    assert_eq!(summary.selection.selected, 2);
    assert_eq!(resolver.seen(), vec!["Tetris (1989)".to_string(), "Zelda".to_string()]);
    Ok(())
}

/// Unauthenticated mode never has more than one call in flight
#[tokio::test]
async fn test_unauthenticated_runs_one_at_a_time() -> Result<()> {
    let dir = TempDir::new()?;
    let opts = options(&dir, AuthMode::Unauthenticated).with_concurrency(20);
    write_input(&opts.input_path)?;

    let resolver = Arc::new(MockResolver::new().with_latency(Duration::from_millis(20)));
    let summary = Pipeline::new(resolver.clone(), opts).run().await?;

    assert_eq!(summary.dispatch.workers, 1);
    assert_eq!(resolver.peak_concurrency(), 1);
    assert_eq!(summary.stats.processed, 4);
    Ok(())
}

/// A matched record keeps the attributes the tool does not interpret
#[tokio::test]
async fn test_match_preserves_other_attributes() -> Result<()> {
    let dir = TempDir::new()?;
    let opts = options(&dir, AuthMode::Authenticated);
    write_input(&opts.input_path)?;

    let resolver = MockResolver::new().respond(
        "Tetris (1989)",
        ResolutionOutcome::Matched("http://www.wikidata.org/entity/Q71910".to_string()),
    );
    Pipeline::new(Arc::new(resolver), opts.clone()).run().await?;

    let saved = RecordStore::load(&opts.output_path)?;
    let tetris = saved.get("vg:3").expect("tetris saved");
    assert_eq!(tetris.same_as.as_deref(), Some("http://www.wikidata.org/entity/Q71910"));
    assert_eq!(tetris.extra.get("publisher"), Some(&serde_json::json!("Nintendo")));
    assert_eq!(tetris.year, Some(1989));
    assert_eq!(saved.len(), 5);
    Ok(())
}

/// A second run over the first run's output has nothing left to do
#[tokio::test]
async fn test_resume_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = Config::default();
    config.run.input_path = dir.path().join("videogames.jsonl");
    config.run.output_path = dir.path().join("videogames_with_wikidata.jsonl");
    config.run.miss_list_path = dir.path().join("not_found_games.txt");
    config.run.auth_mode = AuthMode::Authenticated;
    config.run.auth_token = Some("token".to_string());
    config.pacing.enforce_hourly_budget = false;
    config.pacing.authenticated.worker_delay_ms = Some(0);
    config.progress.enabled = false;
    config.validate()?;
    write_input(&config.run.input_path)?;

    let first = MockResolver::with_fallback(ResolutionOutcome::Matched(MARIO_URI.to_string()));
    let summary = Pipeline::new(Arc::new(first), config.pipeline_options()).run().await?;
    assert_eq!(summary.stats.found, 4);
    assert!(!config.run.miss_list_path.exists());
    let after_first = records(&config.run.output_path)?;

    let options = config.pipeline_options();
    assert_eq!(options.input_path, config.run.output_path);

    let second = Arc::new(MockResolver::new());
    let summary = Pipeline::new(second.clone(), options).run().await?;
    assert_eq!(summary.selection.selected, 0);
    assert_eq!(summary.selection.already_enriched, 5);
    assert_eq!(second.call_count(), 0);
    assert_eq!(records(&config.run.output_path)?, after_first);
    Ok(())
}

/// Misses from a partial run are retried on the next one
#[tokio::test]
async fn test_resume_retries_previous_misses() -> Result<()> {
    let dir = TempDir::new()?;
    let opts = options(&dir, AuthMode::Authenticated);
    write_input(&opts.input_path)?;

    let first = MockResolver::new().respond("Mario", ResolutionOutcome::Matched(MARIO_URI.to_string()));
    let summary = Pipeline::new(Arc::new(first), opts.clone()).run().await?;
    assert_eq!(summary.stats.found, 1);
    assert_eq!(summary.stats.not_found, 3);

    let mut resumed = opts.clone();
    resumed.input_path = opts.output_path.clone();
    let second = Arc::new(MockResolver::new());
    let summary = Pipeline::new(second.clone(), resumed).run().await?;

    assert_eq!(summary.selection.selected, 3);
    let mut seen = second.seen();
    seen.sort();
    assert_eq!(seen, vec!["Pong", "Tetris (1989)", "Zelda"]);
    Ok(())
}
