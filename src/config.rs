//! Configuration for idlinker.
//!
//! Loaded from YAML with a fallback chain: explicit `--config` path,
//! `~/.config/idlinker/idlinker.yml`, `./idlinker.yml`, then defaults. Every
//! section is `#[serde(default)]`, so a file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LinkerError, Result};
use crate::output::DEFAULT_MISS_PREVIEW;
use crate::resolver::{DescriptionKeywords, WikidataConfig, WikidataResolver};
use crate::runner::PipelineOptions;
use crate::scheduler::{
    AUTHENTICATED_MAX_WORKERS, AUTHENTICATED_REQUESTS_PER_HOUR, AUTHENTICATED_WORKER_DELAY, AuthMode,
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_BACKOFF, PacingPolicy, UNAUTHENTICATED_MAX_WORKERS,
    UNAUTHENTICATED_REQUESTS_PER_HOUR, UNAUTHENTICATED_WORKER_DELAY,
};

/// Environment variable holding the bearer token for authenticated mode.
pub const TOKEN_ENV_VAR: &str = "WIKIDATA_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub run: RunConfig,
    pub pacing: PacingConfig,
    pub resolver: ResolverConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub miss_list_path: PathBuf,
    pub concurrency: usize,
    pub candidate_limit: Option<usize>,
    pub auth_mode: AuthMode,
    /// Continue from `output_path` when it already exists.
    pub resume: bool,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("videogames.jsonl"),
            output_path: PathBuf::from("videogames_with_wikidata.jsonl"),
            miss_list_path: PathBuf::from("not_found_games.txt"),
            concurrency: 5,
            candidate_limit: None,
            auth_mode: AuthMode::default(),
            resume: true,
            auth_token: None,
        }
    }
}

impl RunConfig {
    /// Store file a run should read: the previous output when resuming and it
    /// exists, otherwise the configured input.
    pub fn effective_input_path(&self) -> &Path {
        if self.resume && self.output_path.is_file() {
            &self.output_path
        } else {
            &self.input_path
        }
    }
}

/// Effective pacing values for one auth mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePacing {
    pub max_workers: usize,
    pub worker_delay_ms: u64,
    pub requests_per_hour: u32,
}

impl ModePacing {
    /// Built-in values for `mode`.
    pub fn builtin(mode: AuthMode) -> Self {
        match mode {
            AuthMode::Authenticated => Self {
                max_workers: AUTHENTICATED_MAX_WORKERS,
                worker_delay_ms: AUTHENTICATED_WORKER_DELAY.as_millis() as u64,
                requests_per_hour: AUTHENTICATED_REQUESTS_PER_HOUR,
            },
            AuthMode::Unauthenticated => Self {
                max_workers: UNAUTHENTICATED_MAX_WORKERS,
                worker_delay_ms: UNAUTHENTICATED_WORKER_DELAY.as_millis() as u64,
                requests_per_hour: UNAUTHENTICATED_REQUESTS_PER_HOUR,
            },
        }
    }
}

/// Per-mode pacing keys from the config file. Unset keys keep that mode's
/// built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModePacingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
}

impl ModePacingOverrides {
    fn apply(&self, base: ModePacing) -> ModePacing {
        ModePacing {
            max_workers: self.max_workers.unwrap_or(base.max_workers),
            worker_delay_ms: self.worker_delay_ms.unwrap_or(base.worker_delay_ms),
            requests_per_hour: self.requests_per_hour.unwrap_or(base.requests_per_hour),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub authenticated: ModePacingOverrides,
    pub unauthenticated: ModePacingOverrides,
    pub enforce_hourly_budget: bool,
    pub call_timeout_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            authenticated: ModePacingOverrides::default(),
            unauthenticated: ModePacingOverrides::default(),
            enforce_hourly_budget: true,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            max_backoff_ms: DEFAULT_MAX_BACKOFF.as_millis() as u64,
        }
    }
}

impl PacingConfig {
    /// Configured values for `mode` merged onto its built-in values.
    pub fn for_mode(&self, mode: AuthMode) -> ModePacing {
        let overrides = match mode {
            AuthMode::Authenticated => &self.authenticated,
            AuthMode::Unauthenticated => &self.unauthenticated,
        };
        overrides.apply(ModePacing::builtin(mode))
    }

    /// Build the dispatcher policy for `mode`.
    pub fn policy(&self, mode: AuthMode) -> PacingPolicy {
        let values = self.for_mode(mode);
        let mut policy = PacingPolicy::for_mode(mode)
            .with_max_workers(values.max_workers)
            .with_worker_delay(Duration::from_millis(values.worker_delay_ms))
            .with_call_timeout(Duration::from_millis(self.call_timeout_ms));
        policy.requests_per_hour = values.requests_per_hour;
        policy.max_backoff = Duration::from_millis(self.max_backoff_ms);
        if !self.enforce_hourly_budget {
            policy = policy.without_hourly_budget();
        }
        policy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub search_url: String,
    pub sparql_url: String,
    pub user_agent: String,
    pub language: String,
    pub search_limit: u32,
    pub timeout_ms: u64,
    /// Description keywords a search hit must contain to be accepted
    pub keywords: Vec<String>,
    pub verify_year: bool,
    pub year_tolerance: i32,
    /// Relevant hits whose year is checked before a candidate counts as missed
    pub max_year_checks: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let defaults = WikidataConfig::default();
        Self {
            search_url: defaults.search_url,
            sparql_url: defaults.sparql_url,
            user_agent: defaults.user_agent,
            language: defaults.language,
            search_limit: defaults.search_limit,
            timeout_ms: defaults.timeout.as_millis() as u64,
            keywords: DescriptionKeywords::default().keywords().to_vec(),
            verify_year: defaults.year_tolerance.is_some(),
            year_tolerance: defaults.year_tolerance.unwrap_or(1),
            max_year_checks: defaults.max_year_checks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Missed names listed in the final summary
    pub summary_preview: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            summary_preview: DEFAULT_MISS_PREVIEW,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            run: RunConfig::default(),
            pacing: PacingConfig::default(),
            resolver: ResolverConfig::default(),
            progress: ProgressConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).map_err(|e| {
                LinkerError::Configuration(format!("Failed to load config from {}: {}", path.display(), e))
            });
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Fill in the auth token from the environment if none was configured.
    pub fn apply_env(&mut self) {
        self.apply_token(std::env::var(TOKEN_ENV_VAR).ok());
    }

    fn apply_token(&mut self, token: Option<String>) {
        if self.run.auth_token.is_some() {
            return;
        }
        self.run.auth_token = token.filter(|t| !t.trim().is_empty());
    }

    /// Log level from the config, if it names a valid level.
    pub fn log_level_filter(&self) -> Option<log::LevelFilter> {
        let level = self.log_level.as_deref()?;
        match level.parse() {
            Ok(filter) => Some(filter),
            Err(_) => {
                log::warn!("Ignoring unknown log level '{}'", level);
                None
            }
        }
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        self.validate_settings()?;
        if self.run.auth_mode.is_authenticated() && self.run.auth_token.is_none() {
            return invalid(&format!(
                "authenticated mode requires a token (set run.auth_token, --token or {})",
                TOKEN_ENV_VAR
            ));
        }
        Ok(())
    }

    /// Everything `validate` checks except credentials. Enough for commands
    /// that never contact the lookup service.
    pub fn validate_settings(&self) -> Result<()> {
        let run = &self.run;
        if run.concurrency == 0 {
            return invalid("run.concurrency must be at least 1");
        }
        if run.input_path.as_os_str().is_empty()
            || run.output_path.as_os_str().is_empty()
            || run.miss_list_path.as_os_str().is_empty()
        {
            return invalid("run paths must not be empty");
        }
        if run.output_path == run.miss_list_path {
            return invalid("run.output_path and run.miss_list_path must differ");
        }

        let mode = self.pacing.for_mode(run.auth_mode);
        let ceiling = ModePacing::builtin(run.auth_mode).max_workers;
        if mode.max_workers == 0 {
            return invalid(&format!("pacing.{}.max_workers must be at least 1", run.auth_mode));
        }
        if mode.max_workers > ceiling {
            return invalid(&format!(
                "pacing.{}.max_workers is {}, the {} mode allows at most {}",
                run.auth_mode, mode.max_workers, run.auth_mode, ceiling
            ));
        }
        if self.pacing.enforce_hourly_budget && mode.requests_per_hour == 0 {
            return invalid(&format!("pacing.{}.requests_per_hour must be at least 1", run.auth_mode));
        }
        if self.pacing.call_timeout_ms == 0 {
            return invalid("pacing.call_timeout_ms must be greater than 0");
        }

        if self.resolver.search_limit == 0 {
            return invalid("resolver.search_limit must be at least 1");
        }
        if self.resolver.year_tolerance < 0 {
            return invalid("resolver.year_tolerance must not be negative");
        }
        if self.resolver.verify_year && self.resolver.max_year_checks == 0 {
            return invalid("resolver.max_year_checks must be at least 1 when verify_year is set");
        }
        if self.progress.interval_ms == 0 {
            return invalid("progress.interval_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn pacing_policy(&self) -> PacingPolicy {
        self.pacing.policy(self.run.auth_mode)
    }

    /// Options for one pipeline run. Reads the previous output when resuming.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            input_path: self.run.effective_input_path().to_path_buf(),
            output_path: self.run.output_path.clone(),
            miss_list_path: self.run.miss_list_path.clone(),
            concurrency: self.run.concurrency,
            candidate_limit: self.run.candidate_limit,
            pacing: self.pacing_policy(),
            progress_enabled: self.progress.enabled,
            progress_interval: Duration::from_millis(self.progress.interval_ms),
        }
    }

    pub fn wikidata_config(&self) -> WikidataConfig {
        let resolver = &self.resolver;
        WikidataConfig {
            search_url: resolver.search_url.clone(),
            sparql_url: resolver.sparql_url.clone(),
            user_agent: resolver.user_agent.clone(),
            language: resolver.language.clone(),
            search_limit: resolver.search_limit,
            timeout: Duration::from_millis(resolver.timeout_ms),
            auth_token: self.run.auth_token.clone(),
            year_tolerance: resolver.verify_year.then_some(resolver.year_tolerance),
            max_year_checks: resolver.max_year_checks,
        }
    }

    pub fn build_resolver(&self) -> Result<WikidataResolver> {
        let relevance = DescriptionKeywords::new(&self.resolver.keywords);
        WikidataResolver::with_strategy(self.wikidata_config(), Box::new(relevance))
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(LinkerError::Configuration(message.to_string()))
}
