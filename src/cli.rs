//! Command-line interface argument parsing.
//!
//! Arguments given here override `.signalbrief.toml`; anything left unset
//! falls back to the file, then to built-in defaults.

use crate::config::LlmProvider;
use clap::Parser;
use std::path::PathBuf;

/// SignalBrief - bi-weekly opportunity briefs from market signals
///
/// Scores Hispanic and French-Canadian shopper signals with an LLM on five
/// criteria and renders a ranked, tiered opportunity brief.
///
/// Examples:
///   signalbrief --signals market_data/
///   signalbrief --collect --archive --format html
///   signalbrief --signals signals.json --provider ollama --model llama3.2:latest
///   signalbrief --signals signals.json --dry-run
///   signalbrief --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Signal JSON file or directory of JSON files
    #[arg(
        short,
        long,
        value_name = "PATH",
        required_unless_present_any = ["collect", "rerank", "init_config"]
    )]
    pub signals: Option<PathBuf>,

    /// Fetch signals from the configured RSS/Atom feeds
    #[arg(long)]
    pub collect: bool,

    /// Re-rank an archived opportunities_YYYYMMDD.json under the current weights
    ///
    /// No LLM calls are made; the saved criterion scores are reused.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["signals", "collect", "archive"]
    )]
    pub rerank: Option<PathBuf>,

    /// Output file path for the brief
    ///
    /// Defaults to <output_dir>/intelligence_brief_YYYYMMDD.<ext>
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .signalbrief.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Model used for scoring
    #[arg(short, long, env = "SIGNALBRIEF_MODEL")]
    pub model: Option<String>,

    /// LLM provider
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<LlmProvider>,

    /// Provider API base URL
    #[arg(long, value_name = "URL", env = "SIGNALBRIEF_API_URL")]
    pub api_url: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of scoring calls in flight at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Number of opportunities kept in the brief
    #[arg(long, value_name = "COUNT")]
    pub top_n: Option<usize>,

    /// Ignore signals older than this many days
    #[arg(long, value_name = "DAYS")]
    pub lookback_days: Option<u32>,

    /// Save the run's signals and ranked opportunities to the data directory
    #[arg(long)]
    pub archive: bool,

    /// Dry run: load signals and validate config without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Only run on even ISO weeks (for a weekly cron producing bi-weekly briefs)
    #[arg(long)]
    pub scheduled: bool,

    /// Exit with code 2 when no opportunities are found
    #[arg(long)]
    pub fail_on_empty: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .signalbrief.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the brief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain-text digest (default)
    #[default]
    Text,
    /// Markdown with score tables
    Markdown,
    /// Standalone HTML page
    Html,
    /// Full brief as JSON
    Json,
}

impl OutputFormat {
    /// File extension for the default output path.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.signals.is_none() && !self.collect && self.rerank.is_none() {
            return Err("Provide --signals <PATH>, --collect or --rerank <FILE>".to_string());
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.top_n == Some(0) {
            return Err("Top-N must be at least 1".to_string());
        }
        if self.lookback_days == Some(0) {
            return Err("Lookback must be at least 1 day".to_string());
        }

        if let Some(ref path) = self.signals {
            if !path.exists() {
                return Err(format!("Signals path does not exist: {}", path.display()));
            }
        }

        if let Some(ref path) = self.rerank {
            if !path.is_file() {
                return Err(format!("Archive file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn make_args() -> Args {
        Args {
            signals: None,
            collect: true,
            rerank: None,
            output: None,
            format: OutputFormat::Text,
            config: None,
            model: None,
            provider: None,
            api_url: None,
            timeout: None,
            concurrency: None,
            top_n: None,
            lookback_days: None,
            archive: false,
            dry_run: false,
            scheduled: false,
            fail_on_empty: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "signalbrief",
            "--collect",
            "--format",
            "html",
            "--provider",
            "ollama",
            "--top-n",
            "5",
            "--lookback-days",
            "7",
            "--fail-on-empty",
        ])
        .unwrap();

        assert!(args.collect);
        assert_eq!(args.format, OutputFormat::Html);
        assert_eq!(args.provider, Some(LlmProvider::Ollama));
        assert_eq!(args.top_n, Some(5));
        assert_eq!(args.lookback_days, Some(7));
        assert!(args.fail_on_empty);
    }

    #[test]
    fn test_signals_or_collect_required() {
        assert!(Args::try_parse_from(["signalbrief"]).is_err());
        assert!(Args::try_parse_from(["signalbrief", "--init-config"]).is_ok());

        let mut args = make_args();
        args.collect = false;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rerank_conflicts_with_scoring_inputs() {
        assert!(Args::try_parse_from(["signalbrief", "--rerank", "opportunities_20261015.json"]).is_ok());
        assert!(Args::try_parse_from([
            "signalbrief",
            "--rerank",
            "opportunities_20261015.json",
            "--collect",
        ])
        .is_err());

        let mut args = make_args();
        args.collect = false;
        args.rerank = Some(PathBuf::from("/nonexistent/opportunities_20261015.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.top_n = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());

        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_signals_path() {
        let mut args = make_args();
        args.signals = Some(PathBuf::from("/nonexistent/signals.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_merge_into_config() {
        let mut args = make_args();
        args.provider = Some(LlmProvider::Ollama);
        args.top_n = Some(3);
        args.concurrency = Some(8);

        let mut config = Config::default();
        config.merge_with_args(&args);

        assert_eq!(config.model.provider, LlmProvider::Ollama);
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.model.effective_api_url(), "http://localhost:11434");
        assert_eq!(config.scoring.top_n, 3);
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.collection.lookback_days, 14);
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(OutputFormat::Text.extension(), "txt");
        assert_eq!(OutputFormat::Html.extension(), "html");
    }
}
