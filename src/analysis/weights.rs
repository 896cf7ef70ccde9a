//! Scoring weights and tier thresholds.

use crate::config::ConfigError;
use crate::models::{Criterion, CriterionScores, Tier};
use serde::{Deserialize, Serialize};

/// Allowed distance between the weight sum and 1.0.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Per-criterion weights for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_charter_fit")]
    pub charter_fit: f64,
    #[serde(default = "default_customer_evidence")]
    pub customer_evidence: f64,
    #[serde(default = "default_market_size")]
    pub market_size: f64,
    #[serde(default = "default_feasibility")]
    pub feasibility: f64,
    #[serde(default = "default_competitive_advantage")]
    pub competitive_advantage: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            charter_fit: default_charter_fit(),
            customer_evidence: default_customer_evidence(),
            market_size: default_market_size(),
            feasibility: default_feasibility(),
            competitive_advantage: default_competitive_advantage(),
        }
    }
}

fn default_charter_fit() -> f64 {
    0.30
}

fn default_customer_evidence() -> f64 {
    0.25
}

fn default_market_size() -> f64 {
    0.20
}

fn default_feasibility() -> f64 {
    0.15
}

fn default_competitive_advantage() -> f64 {
    0.10
}

impl ScoringWeights {
    /// Weight of a single criterion.
    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::CharterFit => self.charter_fit,
            Criterion::CustomerEvidence => self.customer_evidence,
            Criterion::MarketSize => self.market_size,
            Criterion::Feasibility => self.feasibility,
            Criterion::CompetitiveAdvantage => self.competitive_advantage,
        }
    }

    pub fn sum(&self) -> f64 {
        Criterion::ALL.iter().map(|&c| self.get(c)).sum()
    }

    /// Each weight must lie in [0, 1] and the five must sum to 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for criterion in Criterion::ALL {
            let value = self.get(criterion);
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::WeightRange {
                    criterion: criterion.as_str(),
                    value,
                });
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::WeightSum { sum });
        }

        Ok(())
    }

    /// Weighted sum of the five criterion scores.
    pub fn composite(&self, scores: &CriterionScores) -> f64 {
        let total: f64 = Criterion::ALL
            .iter()
            .map(|&c| self.get(c) * scores.get(c))
            .sum();
        // Weights may sum to 1.0 only within epsilon.
        total.clamp(0.0, 100.0)
    }
}

/// Lower bounds (inclusive) of the three upper tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_high_priority")]
    pub high_priority: f64,
    #[serde(default = "default_strong")]
    pub strong: f64,
    #[serde(default = "default_consider")]
    pub consider: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high_priority: default_high_priority(),
            strong: default_strong(),
            consider: default_consider(),
        }
    }
}

fn default_high_priority() -> f64 {
    85.0
}

fn default_strong() -> f64 {
    70.0
}

fn default_consider() -> f64 {
    60.0
}

impl TierThresholds {
    /// Cutoffs must be strictly decreasing and within [0, 100].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = [self.high_priority, self.strong, self.consider]
            .iter()
            .all(|v| v.is_finite() && (0.0..=100.0).contains(v));

        if !in_range || self.high_priority <= self.strong || self.strong <= self.consider {
            return Err(ConfigError::Thresholds {
                high_priority: self.high_priority,
                strong: self.strong,
                consider: self.consider,
            });
        }

        Ok(())
    }

    /// Map a composite score to its tier.
    pub fn classify(&self, composite: f64) -> Tier {
        if composite >= self.high_priority {
            Tier::HighPriority
        } else if composite >= self.strong {
            Tier::Strong
        } else if composite >= self.consider {
            Tier::Consider
        } else {
            Tier::Monitor
        }
    }
}
