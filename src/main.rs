//! SignalBrief - LLM-scored market opportunity briefs
//!
//! A CLI tool that scores Hispanic and French-Canadian shopper signals
//! with a language model and renders a ranked, tiered bi-weekly brief.
//!
//! Exit codes:
//!   0 - Success (or a scheduled run skipped on an odd week)
//!   1 - Runtime error (configuration, missing API key, I/O, interrupt)
//!   2 - No opportunities found and --fail-on-empty set

mod analysis;
mod cli;
mod collector;
mod config;
mod models;
mod pipeline;
mod report;
mod scorer;

use analysis::Aggregator;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use cli::{Args, OutputFormat};
use collector::{FeedCollector, SignalStore};
use config::{Config, ConfigError, CONFIG_FILE_NAME};
use models::{Brief, BriefMetadata, Market, Signal, TierSummary};
use pipeline::{Pipeline, PipelineOptions, PipelineOutcome};
use scorer::{LlmScorer, Scorer};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Recorded as the model for briefs re-ranked from an archive.
const ARCHIVE_MODEL_LABEL: &str = "archive";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("SignalBrief v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_brief(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Brief failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .signalbrief.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, weights, tiers and feeds.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete brief workflow. Returns exit code (0 or 2).
async fn run_brief(args: Args) -> Result<i32> {
    let start_time = Instant::now();
    let now = Utc::now();

    // Configuration problems abort before any network traffic
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;
    let aggregator = Aggregator::new(config.scoring.clone())?;

    if config.general.verbose {
        print_settings(&config);
    }

    if args.scheduled && !is_brief_week(now.date_naive()) {
        println!(
            "⏭️  Week {} is not a brief week. Skipping scheduled run.",
            now.iso_week().week()
        );
        return Ok(0);
    }

    let (signals, model_used, outcome) = match args.rerank {
        Some(ref path) => {
            let outcome = rerank_archive(path, &aggregator)?;
            (Vec::new(), ARCHIVE_MODEL_LABEL.to_string(), outcome)
        }
        None => {
            let api_key = config.model.api_key();
            if !args.dry_run && config.model.provider.requires_api_key() && api_key.is_none() {
                return Err(ConfigError::MissingApiKey(config.model.api_key_env.clone()).into());
            }

            // Step 1: Gather signals
            let signals = gather_signals(&args, &config, now).await?;
            let (hispanic, french_canadian) = count_by_market(&signals);
            println!(
                "📥 {} signals in the last {} days ({} {} | {} {})",
                signals.len(),
                config.collection.lookback_days,
                Market::Hispanic.emoji(),
                hispanic,
                Market::FrenchCanadian.emoji(),
                french_canadian
            );

            if args.dry_run {
                return handle_dry_run(&signals);
            }

            // Step 2: Score and rank
            let scorer = LlmScorer::new(&config.model, api_key)?;
            let model_used = scorer.name();

            println!("\n🤖 Scoring signals...");
            println!("   Model: {}", model_used);
            println!("   Endpoint: {}", config.model.effective_api_url());
            println!("   Concurrency: {}", config.general.concurrency);
            println!("   Timeout: {}s\n", config.model.timeout_seconds);

            let call_timeout = scorer.attempt_budget();
            let pipeline = Pipeline::new(
                scorer,
                aggregator,
                PipelineOptions {
                    concurrency: config.general.concurrency,
                    call_timeout,
                    show_progress: !args.quiet,
                },
            );

            // Dropping the pipeline future on Ctrl-C stops issuing new calls
            let outcome = tokio::select! {
                outcome = pipeline.run(&signals) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("Interrupted");
                }
            };

            (signals, model_used, outcome)
        }
    };
    let (hispanic, french_canadian) = count_by_market(&signals);

    // Step 3: Build the brief
    println!("📝 Generating brief...");

    let metadata = BriefMetadata {
        generated_at: now,
        model_used,
        lookback_days: config.collection.lookback_days,
        signals_total: signals.len(),
        hispanic_signals: hispanic,
        french_canadian_signals: french_canadian,
        signals_scored: outcome.scored,
        signals_skipped: outcome.skipped,
        signals_failed: outcome.failed,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let brief = Brief {
        metadata,
        summary: TierSummary::from_ranked(&outcome.ranked),
        opportunities: outcome.ranked,
        quick_wins: outcome.quick_wins,
        weights: config.scoring.weights,
    };

    let rendered = match args.format {
        OutputFormat::Text => report::generate_text_brief(&brief),
        OutputFormat::Markdown => report::generate_markdown_brief(&brief),
        OutputFormat::Html => report::generate_html_brief(&brief),
        OutputFormat::Json => report::generate_json_brief(&brief)?,
    };

    let output_path = args.output.clone().unwrap_or_else(|| {
        default_output_path(&config.general.output_dir, now.date_naive(), args.format)
    });
    write_output(&output_path, &rendered)?;

    if args.archive {
        let (signals_path, ranked_path) = collector::archive_run(
            Path::new(&config.general.data_dir),
            now.date_naive(),
            &signals,
            &brief.opportunities,
        )?;
        println!("💾 Archived signals to {}", signals_path.display());
        println!("💾 Archived opportunities to {}", ranked_path.display());
    }

    // Print summary
    let summary = &brief.summary;
    println!("\n📊 Brief Summary:");
    println!(
        "   Signals: {} scored | {} skipped | {} failed",
        outcome.scored, outcome.skipped, outcome.failed
    );
    println!("   Opportunities: {}", summary.total);
    println!(
        "   - 🔥 High Priority: {} | 💪 Strong: {} | 🤔 Consider: {} | 👀 Monitor: {}",
        summary.high_priority, summary.strong, summary.consider, summary.monitor
    );
    println!("   Quick wins: {}", brief.quick_wins.len());
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());

    if brief.is_empty() {
        warn!("No opportunities found");
        println!("\n⚠️  No opportunities found. Brief saved to: {}", output_path.display());
        if args.fail_on_empty {
            eprintln!("\n⛔ No opportunities found. Failing (exit code 2).");
            return Ok(2);
        }
        return Ok(0);
    }

    println!("\n✅ Brief complete! Saved to: {}", output_path.display());
    Ok(0)
}

/// Handle --rerank: re-rank an archived list without calling the LLM.
fn rerank_archive(path: &Path, aggregator: &Aggregator) -> Result<PipelineOutcome> {
    println!("♻️  Re-ranking {}", path.display());
    let saved = collector::load_archived_opportunities(path)?;
    let scored = saved.len();

    let ranked = aggregator.rerank(saved);
    let quick_wins = aggregator.quick_wins(&ranked);
    info!("Re-ranked {} archived opportunities into {}", scored, ranked.len());

    Ok(PipelineOutcome {
        ranked,
        quick_wins,
        scored,
        ..PipelineOutcome::default()
    })
}

/// Load signals from the given path and/or live feeds, then apply the window.
async fn gather_signals(
    args: &Args,
    config: &Config,
    now: chrono::DateTime<Utc>,
) -> Result<Vec<Signal>> {
    let store = SignalStore::new(&config.collection);
    let mut signals = Vec::new();

    if let Some(ref path) = args.signals {
        println!("📂 Loading signals from {}", path.display());
        signals.extend(store.load(path)?);
    }

    if args.collect {
        println!(
            "📡 Collecting from {} feeds...",
            config.collection.feeds.len()
        );
        let collector = FeedCollector::new(&config.collection, config.model.timeout_seconds)?;
        signals.extend(collector.collect().await);
    }

    Ok(store.apply_window(signals, now))
}

/// Handle --dry-run: list what would be scored, exit.
fn handle_dry_run(signals: &[Signal]) -> Result<i32> {
    println!("\n🔍 Dry run: no LLM calls will be made.\n");

    if signals.is_empty() {
        println!("   No signals in the lookback window.");
    } else {
        println!("   {} signals would be scored:\n", signals.len());
        for (index, signal) in signals.iter().enumerate() {
            let label = signal
                .title
                .clone()
                .unwrap_or_else(|| signal.raw_text.chars().take(60).collect());
            let marker = if signal.is_empty() { " (empty, skipped)" } else { "" };
            println!(
                "     {} [{}] {} {}{}",
                signal.market.emoji(),
                index,
                signal.source,
                label.trim(),
                marker
            );
        }
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

fn print_settings(config: &Config) {
    println!("⚙️  Settings:");
    println!("   Provider: {} ({})", config.model.provider, config.model.name);
    println!(
        "   Weights: {}",
        report::generator::weight_lines(&config.scoring.weights).join(", ")
    );
    println!(
        "   Tiers: high priority >= {}, strong >= {}, consider >= {}",
        config.scoring.thresholds.high_priority,
        config.scoring.thresholds.strong,
        config.scoring.thresholds.consider
    );
    println!(
        "   Top-N: {} | Min charter fit: {}",
        config.scoring.top_n, config.scoring.min_charter_fit
    );
}

fn count_by_market(signals: &[Signal]) -> (usize, usize) {
    let hispanic = signals
        .iter()
        .filter(|s| s.market == Market::Hispanic)
        .count();
    (hispanic, signals.len() - hispanic)
}

/// Briefs go out every other week: even ISO weeks only.
fn is_brief_week(date: NaiveDate) -> bool {
    date.iso_week().week() % 2 == 0
}

fn default_output_path(output_dir: &str, date: NaiveDate, format: OutputFormat) -> PathBuf {
    Path::new(output_dir).join(format!(
        "intelligence_brief_{}.{}",
        date.format("%Y%m%d"),
        format.extension()
    ))
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write brief to {}", path.display()))
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_brief_week() {
        // 2026-10-12 is a Monday in ISO week 42, 2026-10-19 in week 43
        assert!(is_brief_week(NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()));
        assert!(is_brief_week(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()));
        assert!(!is_brief_week(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()));
    }

    #[test]
    fn test_default_output_path() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            default_output_path("intelligence_briefs", date, OutputFormat::Html),
            PathBuf::from("intelligence_briefs/intelligence_brief_20261018.html")
        );
    }

    #[test]
    fn test_write_output_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("briefs").join("brief.txt");

        write_output(&path, "hello").unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }
}
