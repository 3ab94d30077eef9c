//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - enrich: resolve identifiers and write the updated store (default)
//! - candidates: show what a run would submit, without calling the service

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use idlinker::config::Config;
use idlinker::scheduler::AuthMode;

/// idlinker - link video game records to Wikidata entities
#[derive(Parser, Debug)]
#[command(name = "idlinker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve identifiers for unlinked records and save the results
    Enrich(RunArgs),

    /// List the candidates a run would submit, in dispatch order
    Candidates {
        #[command(flatten)]
        args: RunArgs,

        /// Number of candidates to print
        #[arg(long, default_value_t = 20)]
        show: usize,
    },
}

/// Run settings that override the config file
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Record store to read
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Where to write the updated store
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Where to write names that could not be linked
    #[arg(short, long)]
    pub miss_list: Option<PathBuf>,

    /// Requested workers (clamped by the auth mode ceiling)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Process at most this many candidates
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Authentication mode
    #[arg(short, long, value_enum)]
    pub auth_mode: Option<AuthMode>,

    /// Bearer token for authenticated mode
    #[arg(long)]
    pub token: Option<String>,

    /// Disable the live status line
    #[arg(long)]
    pub no_progress: bool,

    /// Start from the input file even if a previous output exists
    #[arg(long)]
    pub fresh: bool,
}

impl RunArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        let run = &mut config.run;
        if let Some(input) = &self.input {
            run.input_path = input.clone();
        }
        if let Some(output) = &self.output {
            run.output_path = output.clone();
        }
        if let Some(miss_list) = &self.miss_list {
            run.miss_list_path = miss_list.clone();
        }
        if let Some(concurrency) = self.concurrency {
            run.concurrency = concurrency;
        }
        if self.limit.is_some() {
            run.candidate_limit = self.limit;
        }
        if let Some(mode) = self.auth_mode {
            run.auth_mode = mode;
        }
        if self.token.is_some() {
            run.auth_token = self.token.clone();
        }
        if self.no_progress {
            config.progress.enabled = false;
        }
        if self.fresh {
            config.run.resume = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_no_args() {
        // No args runs enrich with config values
        let cli = Cli::try_parse_from(["idlinker"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["idlinker", "-v"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["idlinker", "-c", "/path/to/idlinker.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/idlinker.yml")));
    }

    #[test]
    fn test_enrich_flags() {
        let cli = Cli::try_parse_from([
            "idlinker",
            "enrich",
            "-i",
            "games.jsonl",
            "-j",
            "4",
            "-n",
            "200",
            "--auth-mode",
            "authenticated",
            "--token",
            "abc",
            "--no-progress",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Enrich(args)) => {
                assert_eq!(args.input, Some(PathBuf::from("games.jsonl")));
                assert_eq!(args.concurrency, Some(4));
                assert_eq!(args.limit, Some(200));
                assert_eq!(args.auth_mode, Some(AuthMode::Authenticated));
                assert_eq!(args.token.as_deref(), Some("abc"));
                assert!(args.no_progress);
                assert!(!args.fresh);
            }
            _ => panic!("Expected enrich command"),
        }
    }

    #[test]
    fn test_candidates_show() {
        let cli = Cli::try_parse_from(["idlinker", "candidates", "--show", "5", "-n", "10"]).unwrap();
        match cli.command {
            Some(Commands::Candidates { args, show }) => {
                assert_eq!(show, 5);
                assert_eq!(args.limit, Some(10));
            }
            _ => panic!("Expected candidates command"),
        }
    }

    #[test]
    fn test_invalid_auth_mode_rejected() {
        assert!(Cli::try_parse_from(["idlinker", "enrich", "--auth-mode", "sometimes"]).is_err());
    }

    #[test]
    fn test_apply_overrides_only_given_flags() {
        let mut config = Config::default();
        let args = RunArgs {
            output: Some(PathBuf::from("out.jsonl")),
            concurrency: Some(2),
            no_progress: true,
            fresh: true,
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.run.output_path, PathBuf::from("out.jsonl"));
        assert_eq!(config.run.input_path, PathBuf::from("videogames.jsonl"));
        assert_eq!(config.run.concurrency, 2);
        assert_eq!(config.run.candidate_limit, None);
        assert!(!config.progress.enabled);
        assert!(!config.run.resume);
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
