//! One linear scoring run: signals in, ranked opportunities out.

use crate::analysis::{merge_duplicates, Aggregator};
use crate::models::{EvidenceRef, Opportunity, QuickWin, RankedOpportunity, Signal};
use crate::scorer::{ScoreResponse, Scorer, ScoringError};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs for the scoring stage.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Scoring calls in flight at once.
    pub concurrency: usize,
    /// Upper bound on a single signal's scoring, retries included.
    pub call_timeout: Duration,
    pub show_progress: bool,
}

/// Ranked output plus the per-signal accounting.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub ranked: Vec<RankedOpportunity>,
    pub quick_wins: Vec<QuickWin>,
    pub scored: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Pipeline<S: Scorer> {
    scorer: S,
    aggregator: Aggregator,
    options: PipelineOptions,
}

impl<S: Scorer> Pipeline<S> {
    pub fn new(scorer: S, aggregator: Aggregator, options: PipelineOptions) -> Self {
        Self {
            scorer,
            aggregator,
            options,
        }
    }

    /// Score every signal, then merge, rank and pick quick wins.
    ///
    /// A failing signal is logged and counted; it never aborts the run.
    pub async fn run(&self, signals: &[Signal]) -> PipelineOutcome {
        let candidates: Vec<(usize, &Signal)> = signals
            .iter()
            .enumerate()
            .filter(|(index, signal)| {
                if signal.is_empty() {
                    debug!("Skipping signal {} from {}: no text", index, signal.source);
                    false
                } else {
                    true
                }
            })
            .collect();
        let skipped = signals.len() - candidates.len();

        let progress = self.progress_bar(candidates.len() as u64);

        let mut results: Vec<(usize, Result<ScoreResponse, ScoringError>)> =
            stream::iter(candidates)
                .map(|(index, signal)| async move { (index, self.score_one(signal).await) })
                .buffer_unordered(self.options.concurrency.max(1))
                .inspect(|_| progress.inc(1))
                .collect()
                .await;

        progress.finish_and_clear();

        // Completion order must not leak into the output.
        results.sort_by_key(|(index, _)| *index);

        let mut failed = 0;
        let mut opportunities = Vec::new();
        for (index, result) in results {
            let signal = &signals[index];
            match result {
                Ok(response) => opportunities.push(to_opportunity(index, signal, response)),
                Err(e) => {
                    failed += 1;
                    warn!("Signal {} from {} not scored: {}", index, signal.source, e);
                }
            }
        }
        let scored = opportunities.len();

        let merged = merge_duplicates(opportunities);
        if merged.len() < scored {
            info!("Merged {} duplicate opportunities", scored - merged.len());
        }

        let ranked = self.aggregator.rank(merged);
        let quick_wins = self.aggregator.quick_wins(&ranked);

        PipelineOutcome {
            ranked,
            quick_wins,
            scored,
            skipped,
            failed,
        }
    }

    async fn score_one(&self, signal: &Signal) -> Result<ScoreResponse, ScoringError> {
        let text = signal.scoring_text();
        match tokio::time::timeout(
            self.options.call_timeout,
            self.scorer.score(signal.market, &text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ScoringError::Timeout(self.options.call_timeout.as_secs())),
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} signals ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }
}

fn to_opportunity(index: usize, signal: &Signal, response: ScoreResponse) -> Opportunity {
    Opportunity {
        title: response.title,
        description: response.description,
        market: signal.market,
        evidence: vec![EvidenceRef {
            signal_index: index,
            source: signal.source.clone(),
            url: signal.url.clone(),
            quote: response.evidence_quote,
        }],
        criterion_scores: response.scores.to_map(),
    }
}
