//! Opportunity aggregation and ranking.
//!
//! This module turns scored opportunities into the ranked, tiered list
//! that ends up in the brief: composite scores, tiers, the deterministic
//! sort, top-N, duplicate merging and quick-win selection.

use crate::config::{ConfigError, ScoringConfig};
use crate::models::{
    Criterion, CriterionScores, Opportunity, QuickWin, RankedOpportunity, Tier,
};
use tracing::{debug, warn};

/// Number of leading characters of a normalized title used for duplicate matching.
const TITLE_KEY_LEN: usize = 50;

/// Ranks opportunities with a fixed, validated scoring configuration.
#[derive(Debug, Clone)]
pub struct Aggregator {
    config: ScoringConfig,
}

impl Aggregator {
    /// Validate the configuration and build an aggregator.
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Weighted composite score for a complete set of criterion scores.
    pub fn composite(&self, scores: &CriterionScores) -> f64 {
        self.config.weights.composite(scores)
    }

    pub fn classify(&self, composite: f64) -> Tier {
        self.config.thresholds.classify(composite)
    }

    /// Score, filter, sort and truncate opportunities.
    ///
    /// Order: composite descending, then customer evidence descending,
    /// then input order.
    pub fn rank(&self, opportunities: Vec<Opportunity>) -> Vec<RankedOpportunity> {
        let mut scored: Vec<(Opportunity, CriterionScores, f64)> = Vec::new();

        for opportunity in opportunities {
            let scores = match CriterionScores::from_map(&opportunity.criterion_scores) {
                Ok(scores) => scores,
                Err(gap) => {
                    warn!("Excluding opportunity '{}': {}", opportunity.title, gap);
                    continue;
                }
            };

            let charter_fit = scores.get(Criterion::CharterFit);
            if charter_fit < self.config.min_charter_fit {
                debug!(
                    "Dropping '{}': charter fit {} below {}",
                    opportunity.title, charter_fit, self.config.min_charter_fit
                );
                continue;
            }

            let composite = self.composite(&scores);
            scored.push((opportunity, scores, composite));
        }

        // sort_by is stable, so equal keys keep input order
        scored.sort_by(|a, b| {
            b.2.total_cmp(&a.2).then_with(|| {
                let ce = Criterion::CustomerEvidence;
                b.1.get(ce).total_cmp(&a.1.get(ce))
            })
        });
        scored.truncate(self.config.top_n);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (opportunity, _, composite))| {
                RankedOpportunity::new(i + 1, opportunity, composite, self.classify(composite))
            })
            .collect()
    }

    /// Re-rank a saved list under the current weights and thresholds.
    ///
    /// Stored composites and tiers are ignored; previous rank order breaks ties.
    pub fn rerank(&self, saved: Vec<RankedOpportunity>) -> Vec<RankedOpportunity> {
        self.rank(
            saved
                .into_iter()
                .map(RankedOpportunity::into_opportunity)
                .collect(),
        )
    }

    /// Pick cheap, high-scoring opportunities from a ranked list.
    pub fn quick_wins(&self, ranked: &[RankedOpportunity]) -> Vec<QuickWin> {
        ranked
            .iter()
            .filter(|r| {
                r.composite_score() >= self.config.quick_win_min_composite
                    && r.score(Criterion::Feasibility) >= self.config.quick_win_min_feasibility
            })
            .take(self.config.quick_wins)
            .map(|r| {
                let feasibility = r.score(Criterion::Feasibility);
                QuickWin {
                    rank: r.rank(),
                    title: r.opportunity().title.clone(),
                    composite_score: r.composite_score(),
                    feasibility,
                    effort: effort_estimate(feasibility).to_string(),
                }
            })
            .collect()
    }
}

/// Rough delivery effort implied by a feasibility score.
pub fn effort_estimate(feasibility: f64) -> &'static str {
    if feasibility >= 85.0 {
        "1 quarter, 1-2 PMs"
    } else if feasibility >= 70.0 {
        "2 quarters, 2-3 PMs"
    } else {
        "3+ quarters, 4+ PMs"
    }
}

/// Key used to recognise the same opportunity reported from different signals.
pub fn title_key(title: &str) -> String {
    let mut key = String::with_capacity(title.len());
    let mut pending_space = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_space && !key.is_empty() {
                key.push(' ');
            }
            pending_space = false;
            key.push(ch);
        } else {
            pending_space = true;
        }
    }

    key.chars().take(TITLE_KEY_LEN).collect()
}

/// Merge opportunities that share a market and a title key.
///
/// The first occurrence keeps its text and scores; later duplicates only
/// contribute their evidence, appended in order.
pub fn merge_duplicates(opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
    let mut merged: Vec<(String, Opportunity)> = Vec::new();

    for opportunity in opportunities {
        let key = title_key(&opportunity.title);
        let existing = merged
            .iter_mut()
            .find(|(k, o)| !key.is_empty() && *k == key && o.market == opportunity.market);

        match existing {
            Some((_, first)) => {
                debug!("Merging duplicate opportunity '{}'", opportunity.title);
                first.evidence.extend(opportunity.evidence);
            }
            None => merged.push((key, opportunity)),
        }
    }

    merged.into_iter().map(|(_, o)| o).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ScoringWeights;
    use crate::models::{EvidenceRef, Market};
    use proptest::prelude::*;

    fn opportunity(title: &str, scores: CriterionScores) -> Opportunity {
        Opportunity {
            title: title.to_string(),
            description: format!("{} description", title),
            market: Market::Hispanic,
            evidence: vec![EvidenceRef {
                signal_index: 0,
                source: "reddit".to_string(),
                url: None,
                quote: String::new(),
            }],
            criterion_scores: scores.to_map(),
        }
    }

    fn open_config() -> ScoringConfig {
        ScoringConfig {
            min_charter_fit: 0.0,
            ..ScoringConfig::default()
        }
    }

    /// Weights that are exact in binary floating point.
    fn exact_weights() -> ScoringWeights {
        ScoringWeights {
            charter_fit: 0.5,
            customer_evidence: 0.25,
            market_size: 0.25,
            feasibility: 0.0,
            competitive_advantage: 0.0,
        }
    }

    #[test]
    fn test_new_rejects_bad_weights() {
        let config = ScoringConfig {
            weights: ScoringWeights {
                charter_fit: 0.25,
                ..ScoringWeights::default()
            },
            ..ScoringConfig::default()
        };
        assert!(matches!(
            Aggregator::new(config),
            Err(ConfigError::WeightSum { .. })
        ));
    }

    #[test]
    fn test_tie_break_on_customer_evidence() {
        let aggregator = Aggregator::new(ScoringConfig {
            weights: exact_weights(),
            ..open_config()
        })
        .unwrap();

        // composites 90 / 90 / 70, customer evidence 80 / 95 / 60
        let input = vec![
            opportunity("idx0", CriterionScores::new(100.0, 80.0, 80.0, 0.0, 0.0)),
            opportunity("idx1", CriterionScores::new(100.0, 95.0, 65.0, 0.0, 0.0)),
            opportunity("idx2", CriterionScores::new(80.0, 60.0, 60.0, 0.0, 0.0)),
        ];

        let ranked = aggregator.rank(input);
        let titles: Vec<_> = ranked.iter().map(|r| r.opportunity().title.as_str()).collect();
        assert_eq!(titles, vec!["idx1", "idx0", "idx2"]);
        assert_eq!(ranked[0].composite_score(), 90.0);
        assert_eq!(ranked[1].composite_score(), 90.0);
        assert_eq!(ranked[2].composite_score(), 70.0);
        assert_eq!(ranked[0].tier(), Tier::HighPriority);
        assert_eq!(ranked[2].tier(), Tier::Strong);
        assert_eq!(
            ranked.iter().map(|r| r.rank()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_full_tie_keeps_input_order() {
        let aggregator = Aggregator::new(open_config()).unwrap();
        let scores = CriterionScores::new(70.0, 70.0, 70.0, 70.0, 70.0);
        let input = vec![
            opportunity("first", scores),
            opportunity("second", scores),
            opportunity("third", scores),
        ];

        let ranked = aggregator.rank(input);
        let titles: Vec<_> = ranked.iter().map(|r| r.opportunity().title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_missing_criterion_excluded() {
        let aggregator = Aggregator::new(open_config()).unwrap();
        let mut incomplete = opportunity("incomplete", CriterionScores::new(90.0, 90.0, 90.0, 90.0, 90.0));
        incomplete.criterion_scores.remove(&Criterion::Feasibility);

        let ranked = aggregator.rank(vec![
            incomplete,
            opportunity("complete", CriterionScores::new(50.0, 50.0, 50.0, 50.0, 50.0)),
        ]);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].opportunity().title, "complete");
        assert_eq!(ranked[0].tier(), Tier::Monitor);
    }

    #[test]
    fn test_min_charter_fit_filter() {
        let aggregator = Aggregator::new(ScoringConfig::default()).unwrap();
        let ranked = aggregator.rank(vec![
            opportunity("off charter", CriterionScores::new(30.0, 99.0, 99.0, 99.0, 99.0)),
            opportunity("on charter", CriterionScores::new(60.0, 60.0, 60.0, 60.0, 60.0)),
        ]);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].opportunity().title, "on charter");
    }

    #[test]
    fn test_top_n_truncates() {
        let aggregator = Aggregator::new(ScoringConfig {
            top_n: 2,
            ..open_config()
        })
        .unwrap();

        let input = (0..5)
            .map(|i| {
                let v = 50.0 + i as f64 * 10.0;
                opportunity(&format!("opp{}", i), CriterionScores::new(v, v, v, v, v))
            })
            .collect();

        let ranked = aggregator.rank(input);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].opportunity().title, "opp4");
        assert_eq!(ranked[1].opportunity().title, "opp3");
    }

    #[test]
    fn test_rerank_uses_current_weights() {
        let saved = Aggregator::new(ScoringConfig {
            weights: exact_weights(),
            ..open_config()
        })
        .unwrap()
        .rank(vec![
            opportunity("evidence-heavy", CriterionScores::new(60.0, 100.0, 100.0, 0.0, 0.0)),
            opportunity("charter-heavy", CriterionScores::new(100.0, 40.0, 40.0, 100.0, 100.0)),
        ]);
        assert_eq!(saved[0].opportunity().title, "evidence-heavy");

        let charter_only = ScoringWeights {
            charter_fit: 1.0,
            customer_evidence: 0.0,
            market_size: 0.0,
            feasibility: 0.0,
            competitive_advantage: 0.0,
        };
        let reranked = Aggregator::new(ScoringConfig {
            weights: charter_only,
            ..open_config()
        })
        .unwrap()
        .rerank(saved);

        assert_eq!(reranked[0].opportunity().title, "charter-heavy");
        assert_eq!(reranked[0].rank(), 1);
        assert_eq!(reranked[0].composite_score(), 100.0);
        assert_eq!(reranked[0].tier(), Tier::HighPriority);
        assert_eq!(reranked[1].composite_score(), 60.0);
    }

    #[test]
    fn test_quick_wins() {
        let aggregator = Aggregator::new(open_config()).unwrap();
        let ranked = aggregator.rank(vec![
            opportunity("feasible", CriterionScores::new(80.0, 80.0, 80.0, 90.0, 80.0)),
            opportunity("hard", CriterionScores::new(95.0, 95.0, 95.0, 40.0, 95.0)),
            opportunity("weak", CriterionScores::new(50.0, 50.0, 50.0, 95.0, 50.0)),
        ]);

        let wins = aggregator.quick_wins(&ranked);
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].title, "feasible");
        assert_eq!(wins[0].rank, 2);
        assert_eq!(wins[0].effort, "1 quarter, 1-2 PMs");
    }

    #[test]
    fn test_effort_estimate() {
        assert_eq!(effort_estimate(85.0), "1 quarter, 1-2 PMs");
        assert_eq!(effort_estimate(70.0), "2 quarters, 2-3 PMs");
        assert_eq!(effort_estimate(69.9), "3+ quarters, 4+ PMs");
    }

    #[test]
    fn test_title_key() {
        assert_eq!(
            title_key("  Spanish Voice Search -- with Regional Accents! "),
            "spanish voice search with regional accents"
        );
        assert_eq!(title_key("Bill 96: French UX"), title_key("bill 96 french ux"));
        assert_eq!(title_key(&"a".repeat(80)).len(), TITLE_KEY_LEN);
    }

    #[test]
    fn test_merge_duplicates() {
        let scores = CriterionScores::new(80.0, 80.0, 80.0, 80.0, 80.0);
        let mut first = opportunity("Spanglish search", scores);
        first.evidence[0].signal_index = 0;
        let mut dup = opportunity("spanglish SEARCH!", CriterionScores::new(10.0, 10.0, 10.0, 10.0, 10.0));
        dup.evidence[0].signal_index = 3;
        let mut other_market = opportunity("Spanglish search", scores);
        other_market.market = Market::FrenchCanadian;
        other_market.evidence[0].signal_index = 4;

        let merged = merge_duplicates(vec![first, dup, other_market]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].criterion_scores, scores.to_map());
        assert_eq!(
            merged[0].evidence.iter().map(|e| e.signal_index).collect::<Vec<_>>(),
            vec![0, 3]
        );
        assert_eq!(merged[1].market, Market::FrenchCanadian);
    }

    proptest! {
        #[test]
        fn ranking_is_deterministic(
            values in prop::collection::vec(prop::array::uniform5(0.0f64..=100.0), 0..20),
        ) {
            let aggregator = Aggregator::new(open_config()).unwrap();
            let input: Vec<Opportunity> = values
                .iter()
                .enumerate()
                .map(|(i, v)| opportunity(&format!("opp{}", i), CriterionScores::new(v[0], v[1], v[2], v[3], v[4])))
                .collect();

            let first = aggregator.rank(input.clone());
            let second = aggregator.rank(input);
            prop_assert_eq!(first, second);
        }
    }
}
