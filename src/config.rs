//! Configuration file handling.
//!
//! This module handles loading, merging and validating configuration
//! from `.signalbrief.toml` files and command-line overrides.

use crate::analysis::{ScoringWeights, TierThresholds};
use crate::models::Market;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".signalbrief.toml";

/// Structural configuration problems. Always fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("scoring weights must sum to 1.0 (got {sum:.4})")]
    WeightSum { sum: f64 },

    #[error("weight for {criterion} must be within [0, 1] (got {value})")]
    WeightRange { criterion: &'static str, value: f64 },

    #[error(
        "tier thresholds must be strictly decreasing within [0, 100] \
         (got high_priority={high_priority}, strong={strong}, consider={consider})"
    )]
    Thresholds {
        high_priority: f64,
        strong: f64,
        consider: f64,
    },

    #[error("{0} must be at least 1")]
    Zero(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("API key not set. Export {0} or switch to --provider ollama")]
    MissingApiKey(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Scoring and ranking settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Signal collection settings.
    #[serde(default)]
    pub collection: CollectionConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory for rendered briefs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory for archived signals and opportunities.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of concurrent scoring calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            data_dir: default_data_dir(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output_dir() -> String {
    "intelligence_briefs".to_string()
}

fn default_data_dir() -> String {
    "market_data".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Which LLM API the scorer talks to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API (default)
    #[default]
    Anthropic,
    /// Local Ollama chat API
    Ollama,
}

impl LlmProvider {
    /// Base URL used when none is configured.
    pub fn default_api_url(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com",
            LlmProvider::Ollama => "http://localhost:11434",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, LlmProvider::Anthropic)
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

/// LLM model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider API to call.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Base API URL. Defaults to the provider's public endpoint.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts after a transport failure.
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            name: default_model(),
            api_url: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout() -> u64 {
    60
}

fn default_retries() -> usize {
    2
}

impl ModelConfig {
    /// Effective base URL, without a trailing slash.
    pub fn effective_api_url(&self) -> String {
        self.api_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Scoring, tiering and ranking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Number of opportunities kept in the brief.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Opportunities with a lower charter fit are dropped before ranking.
    #[serde(default = "default_min_charter_fit")]
    pub min_charter_fit: f64,

    /// Maximum number of quick wins listed.
    #[serde(default = "default_quick_wins")]
    pub quick_wins: usize,

    /// Minimum composite score for a quick win.
    #[serde(default = "default_quick_win_min_composite")]
    pub quick_win_min_composite: f64,

    /// Minimum feasibility score for a quick win.
    #[serde(default = "default_quick_win_min_feasibility")]
    pub quick_win_min_feasibility: f64,

    /// Per-criterion weights; must sum to 1.0.
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Tier cutoffs.
    #[serde(default)]
    pub thresholds: TierThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_charter_fit: default_min_charter_fit(),
            quick_wins: default_quick_wins(),
            quick_win_min_composite: default_quick_win_min_composite(),
            quick_win_min_feasibility: default_quick_win_min_feasibility(),
            weights: ScoringWeights::default(),
            thresholds: TierThresholds::default(),
        }
    }
}

fn default_top_n() -> usize {
    8
}

fn default_min_charter_fit() -> f64 {
    50.0
}

fn default_quick_wins() -> usize {
    3
}

fn default_quick_win_min_composite() -> f64 {
    75.0
}

fn default_quick_win_min_feasibility() -> f64 {
    80.0
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        self.thresholds.validate()?;

        if self.top_n == 0 {
            return Err(ConfigError::Zero("top_n"));
        }

        for (field, value) in [
            ("min_charter_fit", self.min_charter_fit),
            ("quick_win_min_composite", self.quick_win_min_composite),
            ("quick_win_min_feasibility", self.quick_win_min_feasibility),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside [0, 100]", value),
                });
            }
        }

        Ok(())
    }
}

/// A feed to collect signals from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Display name, used as the signal source.
    pub name: String,
    /// RSS or Atom URL.
    pub url: String,
    /// Market every entry belongs to. Detected per entry when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<Market>,
}

/// Signal collection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Signals older than this many days are ignored.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Cap on signals kept per source.
    #[serde(default = "default_max_signals_per_source")]
    pub max_signals_per_source: usize,

    /// A feed entry must mention at least one of these to be kept.
    #[serde(default = "default_relevance_terms")]
    pub relevance_terms: Vec<String>,

    /// Terms that point to the US Hispanic market.
    #[serde(default = "default_hispanic_terms")]
    pub hispanic_terms: Vec<String>,

    /// Terms that point to the French-Canadian market.
    #[serde(default = "default_french_canadian_terms")]
    pub french_canadian_terms: Vec<String>,

    /// Feeds fetched with `--collect`.
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedSource>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            max_signals_per_source: default_max_signals_per_source(),
            relevance_terms: default_relevance_terms(),
            hispanic_terms: default_hispanic_terms(),
            french_canadian_terms: default_french_canadian_terms(),
            feeds: default_feeds(),
        }
    }
}

fn default_lookback_days() -> u32 {
    14
}

fn default_max_signals_per_source() -> usize {
    50
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_relevance_terms() -> Vec<String> {
    to_strings(&[
        "hispanic",
        "latino",
        "spanish",
        "multilingual",
        "translation",
        "quebec",
        "french",
        "canadian",
        "francophone",
        "bilingual",
        "ecommerce",
        "e-commerce",
        "shopping",
        "retail",
        "amazon",
        "voice",
        "alexa",
        "search",
        "product discovery",
    ])
}

fn default_hispanic_terms() -> Vec<String> {
    to_strings(&[
        "hispanic",
        "latino",
        "spanish",
        "mexico",
        "spanglish",
        "español",
    ])
}

fn default_french_canadian_terms() -> Vec<String> {
    to_strings(&["quebec", "québec", "french", "canadian", "français", "francophone"])
}

fn default_feeds() -> Vec<FeedSource> {
    let feed = |name: &str, url: &str, market: Option<Market>| FeedSource {
        name: name.to_string(),
        url: url.to_string(),
        market,
    };

    vec![
        feed("Portada", "https://www.portada-online.com/feed/", Some(Market::Hispanic)),
        feed(
            "Hispanic Executive",
            "https://hispanicexecutive.com/feed/",
            Some(Market::Hispanic),
        ),
        feed(
            "La Presse Affaires",
            "https://www.lapresse.ca/affaires/rss",
            Some(Market::FrenchCanadian),
        ),
        feed(
            "Marketing Magazine",
            "https://marketingmag.ca/feed/",
            Some(Market::FrenchCanadian),
        ),
        feed("Retail Dive", "https://www.retaildive.com/feeds/news/", None),
        feed(
            "arXiv cs.CL",
            "http://export.arxiv.org/api/query?search_query=all:multilingual+AND+cat:cs.CL&sortBy=submittedDate&sortOrder=descending&max_results=10",
            None,
        ),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only arguments given explicitly override file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(provider) = args.provider {
            if provider != self.model.provider && args.model.is_none() {
                self.model.name = match provider {
                    LlmProvider::Anthropic => default_model(),
                    LlmProvider::Ollama => "llama3.2:latest".to_string(),
                };
            }
            if provider != self.model.provider && args.api_url.is_none() {
                self.model.api_url = None;
            }
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.api_url {
            self.model.api_url = Some(url.clone());
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(top_n) = args.top_n {
            self.scoring.top_n = top_n;
        }
        if let Some(days) = args.lookback_days {
            self.collection.lookback_days = days;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check every structural invariant before any network traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;

        if self.general.concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if self.model.timeout_seconds == 0 {
            return Err(ConfigError::Zero("timeout_seconds"));
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::Zero("max_tokens"));
        }
        if self.collection.lookback_days == 0 {
            return Err(ConfigError::Zero("lookback_days"));
        }
        if self.collection.max_signals_per_source == 0 {
            return Err(ConfigError::Zero("max_signals_per_source"));
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid {
                field: "temperature",
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        let url = self.model.effective_api_url();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "api_url",
                reason: format!("'{}' must start with http:// or https://", url),
            });
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.provider, LlmProvider::Anthropic);
        assert_eq!(config.model.name, "claude-sonnet-4-20250514");
        assert_eq!(config.scoring.top_n, 8);
        assert_eq!(config.collection.lookback_days, 14);
        assert_eq!(config.scoring.thresholds.high_priority, 85.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "briefs"
concurrency = 2

[model]
provider = "ollama"
name = "llama3.2:latest"

[scoring]
top_n = 12

[scoring.weights]
charter_fit = 0.40
customer_evidence = 0.20
market_size = 0.20
feasibility = 0.10
competitive_advantage = 0.10

[collection]
lookback_days = 7

[[collection.feeds]]
name = "Portada"
url = "https://www.portada-online.com/feed/"
market = "hispanic"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, "briefs");
        assert_eq!(config.general.concurrency, 2);
        assert_eq!(config.model.provider, LlmProvider::Ollama);
        assert_eq!(config.model.effective_api_url(), "http://localhost:11434");
        assert_eq!(config.scoring.top_n, 12);
        assert_eq!(config.scoring.weights.charter_fit, 0.40);
        assert_eq!(config.scoring.thresholds, TierThresholds::default());
        assert_eq!(config.collection.lookback_days, 7);
        assert_eq!(config.collection.feeds.len(), 1);
        assert_eq!(config.collection.feeds[0].market, Some(Market::Hispanic));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_weights_fail_validation() {
        let toml_content = r#"
[scoring.weights]
charter_fit = 0.25
"#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeightSum { .. })
        ));
    }

    #[test]
    fn test_non_monotonic_thresholds_fail_validation() {
        let toml_content = r#"
[scoring.thresholds]
high_priority = 60
strong = 70
consider = 50
"#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Thresholds { .. })
        ));
    }

    #[test]
    fn test_zero_values_fail_validation() {
        let mut config = Config::default();
        config.general.concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("concurrency")));

        let mut config = Config::default();
        config.scoring.top_n = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero("top_n")));
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let mut config = Config::default();
        config.model.api_url = Some("http://localhost:8080/".to_string());
        assert_eq!(config.model.effective_api_url(), "http://localhost:8080");

        config.model.api_url = Some("ftp://nope".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[scoring.weights]"));
        assert!(toml_str.contains("[collection]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed, Config::default());
    }
}
