//! Data models for the opportunity brief.
//!
//! This module contains the core data structures used throughout
//! the application: collected signals, the five scoring criteria,
//! opportunities, and the ranked output consumed by the renderer.

use crate::analysis::ScoringWeights;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Language-market segment a signal or opportunity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// US Hispanic (Spanish and Spanglish speaking) shoppers
    #[serde(alias = "hispanic_us")]
    Hispanic,
    /// French-Canadian (mostly Quebec) shoppers
    FrenchCanadian,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Hispanic => write!(f, "US Hispanic (Spanish)"),
            Market::FrenchCanadian => write!(f, "French-Canadian"),
        }
    }
}

impl Market {
    /// Wire tag used in JSON and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Hispanic => "hispanic",
            Market::FrenchCanadian => "french_canadian",
        }
    }

    /// Returns a flag emoji for the market.
    pub fn emoji(&self) -> &'static str {
        match self {
            Market::Hispanic => "🇺🇸",
            Market::FrenchCanadian => "🇨🇦",
        }
    }
}

/// A single piece of raw collected text evidence (post, article, abstract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Where the signal came from (e.g. "reddit", "rss:Portada", "arxiv").
    pub source: String,
    /// Market the signal relates to.
    pub market: Market,
    /// Optional headline; prepended to the text sent for scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The collected free text.
    #[serde(rename = "text")]
    pub raw_text: String,
    /// Link back to the original content.
    #[serde(default)]
    pub url: Option<String>,
    /// When the signal was published or collected.
    pub collected_at: DateTime<Utc>,
}

impl Signal {
    /// True when there is no text worth scoring.
    pub fn is_empty(&self) -> bool {
        self.raw_text.trim().is_empty()
    }

    /// Text handed to the scorer: title (if any) followed by the body.
    pub fn scoring_text(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("{}\n\n{}", title, self.raw_text.trim()),
            _ => self.raw_text.trim().to_string(),
        }
    }
}

/// One of the five fixed scoring criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Alignment with the multilingual shopping experience charter
    CharterFit,
    /// Strength of customer pain point signals
    CustomerEvidence,
    /// Potential revenue impact
    MarketSize,
    /// Technical and operational feasibility
    Feasibility,
    /// Differentiation opportunity
    CompetitiveAdvantage,
}

impl Criterion {
    /// All criteria, in weight order.
    pub const ALL: [Criterion; 5] = [
        Criterion::CharterFit,
        Criterion::CustomerEvidence,
        Criterion::MarketSize,
        Criterion::Feasibility,
        Criterion::CompetitiveAdvantage,
    ];

    /// Field name used in JSON payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::CharterFit => "charter_fit",
            Criterion::CustomerEvidence => "customer_evidence",
            Criterion::MarketSize => "market_size",
            Criterion::Feasibility => "feasibility",
            Criterion::CompetitiveAdvantage => "competitive_advantage",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::CharterFit => write!(f, "Charter Fit"),
            Criterion::CustomerEvidence => write!(f, "Customer Evidence"),
            Criterion::MarketSize => write!(f, "Market Size"),
            Criterion::Feasibility => write!(f, "Feasibility"),
            Criterion::CompetitiveAdvantage => write!(f, "Competitive Advantage"),
        }
    }
}

/// Why a criterion mapping could not be turned into [`CriterionScores`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreGap {
    Missing(Criterion),
    OutOfRange(Criterion, f64),
}

impl fmt::Display for ScoreGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreGap::Missing(c) => write!(f, "missing criterion {}", c.as_str()),
            ScoreGap::OutOfRange(c, v) => {
                write!(f, "criterion {} out of range: {}", c.as_str(), v)
            }
        }
    }
}

/// A complete set of the five criterion values, each within [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriterionScores([f64; 5]);

impl CriterionScores {
    #[cfg(test)]
    pub fn new(
        charter_fit: f64,
        customer_evidence: f64,
        market_size: f64,
        feasibility: f64,
        competitive_advantage: f64,
    ) -> Self {
        Self([
            charter_fit,
            customer_evidence,
            market_size,
            feasibility,
            competitive_advantage,
        ])
    }

    /// Value for a single criterion.
    pub fn get(&self, criterion: Criterion) -> f64 {
        self.0[criterion.index()]
    }

    /// Build from a mapping, requiring every criterion with a finite value in range.
    pub fn from_map(map: &BTreeMap<Criterion, f64>) -> Result<Self, ScoreGap> {
        let mut values = [0.0; 5];
        for criterion in Criterion::ALL {
            let value = *map.get(&criterion).ok_or(ScoreGap::Missing(criterion))?;
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ScoreGap::OutOfRange(criterion, value));
            }
            values[criterion.index()] = value;
        }
        Ok(Self(values))
    }

    /// Convert back to the serializable mapping form.
    pub fn to_map(&self) -> BTreeMap<Criterion, f64> {
        Criterion::ALL.iter().map(|&c| (c, self.get(c))).collect()
    }
}

/// Reference from an opportunity back to a contributing signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Position of the signal in the run's input order.
    pub signal_index: usize,
    /// Source of the signal.
    pub source: String,
    /// Link to the signal, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Supporting quote extracted by the scorer.
    #[serde(default)]
    pub quote: String,
}

/// A synthesized candidate product or feature idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Short descriptive title.
    pub title: String,
    /// Pain point and proposed solution.
    pub description: String,
    /// Market this opportunity serves.
    pub market: Market,
    /// Contributing signals, in signal order.
    pub evidence: Vec<EvidenceRef>,
    /// Per-criterion scores (0-100).
    pub criterion_scores: BTreeMap<Criterion, f64>,
}

/// Discrete priority bucket derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Monitor,
    Consider,
    Strong,
    HighPriority,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::HighPriority => write!(f, "High Priority"),
            Tier::Strong => write!(f, "Strong"),
            Tier::Consider => write!(f, "Consider"),
            Tier::Monitor => write!(f, "Monitor"),
        }
    }
}

impl Tier {
    /// Returns an emoji representation of the tier.
    pub fn emoji(&self) -> &'static str {
        match self {
            Tier::HighPriority => "🔥",
            Tier::Strong => "💪",
            Tier::Consider => "🤔",
            Tier::Monitor => "👀",
        }
    }
}

/// An opportunity with its derived composite score, tier and rank.
///
/// Only the aggregator builds these; the derived fields are never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOpportunity {
    rank: usize,
    #[serde(flatten)]
    opportunity: Opportunity,
    composite_score: f64,
    tier: Tier,
}

impl RankedOpportunity {
    pub(crate) fn new(rank: usize, opportunity: Opportunity, composite_score: f64, tier: Tier) -> Self {
        Self {
            rank,
            opportunity,
            composite_score,
            tier,
        }
    }

    /// 1-based position in the ranked list.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn opportunity(&self) -> &Opportunity {
        &self.opportunity
    }

    pub fn composite_score(&self) -> f64 {
        self.composite_score
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Score for one criterion (0 if absent, which the aggregator never allows).
    pub fn score(&self, criterion: Criterion) -> f64 {
        self.opportunity
            .criterion_scores
            .get(&criterion)
            .copied()
            .unwrap_or(0.0)
    }

    /// Drop the derived fields, keeping only what was scored.
    pub fn into_opportunity(self) -> Opportunity {
        self.opportunity
    }
}

/// A ranked opportunity that is cheap enough to ship soon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickWin {
    /// Rank of the opportunity in the main list.
    pub rank: usize,
    pub title: String,
    pub composite_score: f64,
    pub feasibility: f64,
    /// Rough effort estimate derived from feasibility.
    pub effort: String,
}

/// Counts of ranked opportunities per tier and market.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSummary {
    pub total: usize,
    pub high_priority: usize,
    pub strong: usize,
    pub consider: usize,
    pub monitor: usize,
    pub by_market: BTreeMap<Market, usize>,
}

impl TierSummary {
    /// Creates a summary from a ranked list.
    pub fn from_ranked(ranked: &[RankedOpportunity]) -> Self {
        let mut summary = Self {
            total: ranked.len(),
            ..Self::default()
        };

        for item in ranked {
            match item.tier() {
                Tier::HighPriority => summary.high_priority += 1,
                Tier::Strong => summary.strong += 1,
                Tier::Consider => summary.consider += 1,
                Tier::Monitor => summary.monitor += 1,
            }

            *summary
                .by_market
                .entry(item.opportunity().market)
                .or_insert(0) += 1;
        }

        summary
    }
}

/// Metadata about a brief run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefMetadata {
    /// Date and time the brief was generated.
    pub generated_at: DateTime<Utc>,
    /// LLM provider and model used for scoring.
    pub model_used: String,
    /// Lookback window in days.
    pub lookback_days: u32,
    /// Signals handed to the pipeline.
    pub signals_total: usize,
    /// Signals from the US Hispanic market.
    pub hispanic_signals: usize,
    /// Signals from the French-Canadian market.
    pub french_canadian_signals: usize,
    /// Signals scored successfully.
    pub signals_scored: usize,
    /// Signals skipped for having no text.
    pub signals_skipped: usize,
    /// Signals whose scoring call failed.
    pub signals_failed: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete intelligence brief handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    pub metadata: BriefMetadata,
    /// Ranked, tiered opportunities (top-N).
    pub opportunities: Vec<RankedOpportunity>,
    /// Quick wins picked from the ranked list.
    pub quick_wins: Vec<QuickWin>,
    pub summary: TierSummary,
    /// Weights that produced the composite scores.
    pub weights: ScoringWeights,
}

impl Brief {
    /// True when the run produced nothing to report.
    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }
}
