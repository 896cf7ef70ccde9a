//! Text, Markdown and JSON brief generation.
//!
//! The text brief is the bi-weekly digest circulated to the product team;
//! the Markdown variant carries the same content with score tables.

use crate::analysis::ScoringWeights;
use crate::models::{Brief, BriefMetadata, Criterion, Market, QuickWin, RankedOpportunity};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

/// Days between two briefs.
pub const BRIEF_INTERVAL_DAYS: i64 = 14;

/// Opportunities rendered with full detail; the rest are abbreviated.
pub const DETAILED_COUNT: usize = 3;

/// Evidence entries listed per detailed opportunity.
const MAX_EVIDENCE_LISTED: usize = 3;

pub const NO_OPPORTUNITIES: &str = "No opportunities found";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Generate the plain-text bi-weekly brief.
pub fn generate_text_brief(brief: &Brief) -> String {
    let mut output = String::new();

    output.push_str(&generate_text_header(&brief.metadata));
    output.push_str(&generate_text_snapshot(brief));

    if brief.is_empty() {
        output.push_str(&format!("⚠️  {}.\n", NO_OPPORTUNITIES));
        output.push_str(&empty_hint(&brief.metadata));
        output.push_str(&format!("\n{}\n\n", RULE));
    } else {
        for item in &brief.opportunities {
            output.push_str(&generate_text_opportunity(item));
        }
        output.push_str(&generate_text_quick_wins(&brief.quick_wins));
        output.push_str(&generate_text_actions(brief));
    }

    output.push_str(&generate_text_footer(&brief.weights));

    output
}

fn generate_text_header(metadata: &BriefMetadata) -> String {
    let mut header = String::new();

    header.push_str(RULE);
    header.push('\n');
    header.push_str("MULTILINGUAL SHOPPING EXPERIENCE OPPORTUNITIES\n");
    header.push_str(&format!(
        "{} - Bi-Weekly Intelligence Brief\n",
        brief_date(metadata.generated_at)
    ));
    header.push_str(RULE);
    header.push_str("\n\n");

    header
}

fn generate_text_snapshot(brief: &Brief) -> String {
    let metadata = &brief.metadata;
    let mut section = String::new();

    section.push_str("📊 MARKET SNAPSHOT\n");
    section.push_str(&format!(
        "• Hispanic market signals: {} analyzed\n",
        metadata.hispanic_signals
    ));
    section.push_str(&format!(
        "• French-Canadian signals: {} analyzed\n",
        metadata.french_canadian_signals
    ));
    section.push_str(&format!(
        "• Signals scored: {} (skipped: {}, failed: {})\n",
        metadata.signals_scored, metadata.signals_skipped, metadata.signals_failed
    ));
    section.push_str(&format!(
        "• High-priority opportunities: {}\n",
        brief.summary.high_priority
    ));
    section.push_str(&format!("• Quick wins: {}\n", brief.quick_wins.len()));
    section.push_str(&format!("\n{}\n\n", RULE));

    section
}

fn generate_text_opportunity(item: &RankedOpportunity) -> String {
    let opportunity = item.opportunity();
    let mut section = String::new();

    section.push_str(&format!(
        "{} TOP OPPORTUNITY #{}\n{}\n\n",
        item.tier().emoji(),
        item.rank(),
        opportunity.title
    ));
    section.push_str(&format!(
        "{} {} | {} | COMPOSITE: {:.1}/100 {}\n\n",
        opportunity.market.emoji(),
        opportunity.market,
        item.tier().to_string().to_uppercase(),
        item.composite_score(),
        stars(item.composite_score())
    ));

    if item.rank() <= DETAILED_COUNT {
        section.push_str("SCORES:\n");
        for criterion in Criterion::ALL {
            section.push_str(&format!(
                "  {:<24}{:>5.0}/100\n",
                criterion.to_string(),
                item.score(criterion)
            ));
        }
        section.push('\n');

        if !opportunity.description.is_empty() {
            section.push_str("OPPORTUNITY:\n");
            section.push_str(&opportunity.description);
            section.push_str("\n\n");
        }

        section.push_str("EVIDENCE SOURCES:\n");
        for evidence in opportunity.evidence.iter().take(MAX_EVIDENCE_LISTED) {
            let mut line = format!("• {}", evidence.source);
            if !evidence.quote.is_empty() {
                line.push_str(&format!(": \"{}\"", evidence.quote));
            }
            if let Some(url) = &evidence.url {
                line.push_str(&format!(" ({})", url));
            }
            section.push_str(&line);
            section.push('\n');
        }
        let hidden = opportunity.evidence.len().saturating_sub(MAX_EVIDENCE_LISTED);
        if hidden > 0 {
            section.push_str(&format!("• ...and {} more\n", hidden));
        }
        section.push('\n');
    } else {
        section.push_str("QUICK SUMMARY:\n");
        section.push_str(&truncate(&opportunity.description, 200));
        section.push_str(&format!(
            "\n\nCHARTER FIT: {:.0}/100 | SIGNALS: {}\n\n",
            item.score(Criterion::CharterFit),
            opportunity.evidence.len()
        ));
    }

    section.push_str(RULE);
    section.push_str("\n\n");

    section
}

fn generate_text_quick_wins(quick_wins: &[QuickWin]) -> String {
    if quick_wins.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("⚡ QUICK WIN OPPORTUNITIES\n\n");

    for (i, win) in quick_wins.iter().enumerate() {
        section.push_str(&format!(
            "{}. {} (Est. {})\n   - Composite: {:.1}/100 | Feasibility: {:.0}/100 | Rank #{}\n\n",
            i + 1,
            win.title,
            win.effort,
            win.composite_score,
            win.feasibility,
            win.rank
        ));
    }

    section.push_str(RULE);
    section.push_str("\n\n");

    section
}

fn generate_text_actions(brief: &Brief) -> String {
    let mut section = String::new();

    section.push_str("💡 RECOMMENDED ACTIONS\n\n");
    for action in recommended_actions(&brief.opportunities) {
        section.push_str(&action);
        section.push('\n');
    }
    section.push_str(&format!(
        "\nNext Brief: {}\n\n",
        next_brief_date(brief.metadata.generated_at)
    ));
    section.push_str(RULE);
    section.push_str("\n\n");

    section
}

fn generate_text_footer(weights: &ScoringWeights) -> String {
    let mut footer = String::new();

    footer.push_str("📌 ABOUT THIS BRIEF\n");
    footer.push_str("All opportunities are scored on:\n");
    for line in weight_lines(weights) {
        footer.push_str(&format!("• {}\n", line));
    }
    footer.push('\n');
    footer.push_str(RULE);
    footer.push('\n');

    footer
}

/// Generate the brief as Markdown.
pub fn generate_markdown_brief(brief: &Brief) -> String {
    let metadata = &brief.metadata;
    let mut output = String::new();

    output.push_str("# Multilingual Shopping Experience Opportunities\n\n");
    output.push_str(&format!(
        "*{} - Bi-Weekly Intelligence Brief*\n\n",
        brief_date(metadata.generated_at)
    ));

    output.push_str("## Market Snapshot\n\n");
    output.push_str("| Market | Signals |\n|:---|:---:|\n");
    output.push_str(&format!(
        "| {} {} | {} |\n",
        Market::Hispanic.emoji(),
        Market::Hispanic,
        metadata.hispanic_signals
    ));
    output.push_str(&format!(
        "| {} {} | {} |\n\n",
        Market::FrenchCanadian.emoji(),
        Market::FrenchCanadian,
        metadata.french_canadian_signals
    ));
    output.push_str(&format!(
        "- **Signals scored:** {} (skipped: {}, failed: {})\n",
        metadata.signals_scored, metadata.signals_skipped, metadata.signals_failed
    ));
    output.push_str(&format!(
        "- **High-priority opportunities:** {}\n",
        brief.summary.high_priority
    ));
    output.push_str(&format!("- **Quick wins:** {}\n", brief.quick_wins.len()));
    output.push_str(&format!("- **Model:** `{}`\n\n", metadata.model_used));

    output.push_str("## Top Opportunities\n\n");
    if brief.is_empty() {
        output.push_str(&format!("> ⚠️ **{}.** ", NO_OPPORTUNITIES));
        output.push_str(&empty_hint(metadata));
        output.push('\n');
    } else {
        output.push_str(&generate_markdown_ranking_table(&brief.opportunities));
        for item in &brief.opportunities {
            output.push_str(&generate_markdown_opportunity(item));
        }

        if !brief.quick_wins.is_empty() {
            output.push_str("## Quick Wins\n\n");
            for win in &brief.quick_wins {
                output.push_str(&format!(
                    "1. **{}** (Est. {}) - composite {:.1}, feasibility {:.0}\n",
                    win.title, win.effort, win.composite_score, win.feasibility
                ));
            }
            output.push('\n');
        }

        output.push_str("## Recommended Actions\n\n");
        for action in recommended_actions(&brief.opportunities) {
            output.push_str(&format!("- {}\n", action));
        }
        output.push('\n');
    }

    output.push_str(&format!(
        "**Next brief:** {}\n\n",
        next_brief_date(metadata.generated_at)
    ));

    output.push_str("---\n\n");
    output.push_str("*Scoring weights: ");
    output.push_str(&weight_lines(&brief.weights).join(", "));
    output.push_str("*\n");

    output
}

fn generate_markdown_ranking_table(ranked: &[RankedOpportunity]) -> String {
    let mut table = String::new();

    table.push_str("| # | Opportunity | Market | Tier | Composite |");
    for criterion in Criterion::ALL {
        table.push_str(&format!(" {} |", criterion));
    }
    table.push('\n');
    table.push_str("|:---:|:---|:---|:---|:---:|");
    table.push_str(&":---:|".repeat(Criterion::ALL.len()));
    table.push('\n');

    for item in ranked {
        let opportunity = item.opportunity();
        table.push_str(&format!(
            "| {} | {} | {} | {} {} | **{:.1}** |",
            item.rank(),
            opportunity.title.replace('|', "\\|"),
            opportunity.market,
            item.tier().emoji(),
            item.tier(),
            item.composite_score()
        ));
        for criterion in Criterion::ALL {
            table.push_str(&format!(" {:.0} |", item.score(criterion)));
        }
        table.push('\n');
    }
    table.push('\n');

    table
}

fn generate_markdown_opportunity(item: &RankedOpportunity) -> String {
    let opportunity = item.opportunity();
    let mut section = String::new();

    section.push_str(&format!(
        "### {}. {} {}\n\n",
        item.rank(),
        item.tier().emoji(),
        opportunity.title
    ));

    if item.rank() > DETAILED_COUNT {
        section.push_str(&truncate(&opportunity.description, 200));
        section.push_str("\n\n");
        return section;
    }

    if !opportunity.description.is_empty() {
        section.push_str(&opportunity.description);
        section.push_str("\n\n");
    }
    for evidence in opportunity.evidence.iter().take(MAX_EVIDENCE_LISTED) {
        let source = match &evidence.url {
            Some(url) => format!("[{}]({})", evidence.source, url),
            None => evidence.source.clone(),
        };
        if evidence.quote.is_empty() {
            section.push_str(&format!("- {}\n", source));
        } else {
            section.push_str(&format!("- {}: > {}\n", source, evidence.quote));
        }
    }
    section.push('\n');

    section
}

/// Generate the full brief as pretty-printed JSON.
pub fn generate_json_brief(brief: &Brief) -> Result<String> {
    serde_json::to_string_pretty(brief).map_err(Into::into)
}

pub(crate) fn brief_date(at: DateTime<Utc>) -> String {
    at.format("%B %d, %Y").to_string()
}

pub(crate) fn next_brief_date(at: DateTime<Utc>) -> String {
    brief_date(at + Duration::days(BRIEF_INTERVAL_DAYS))
}

pub(crate) fn stars(composite: f64) -> String {
    "⭐".repeat((composite / 20.0).floor() as usize)
}

/// Follow-ups for the three best opportunities.
pub(crate) fn recommended_actions(ranked: &[RankedOpportunity]) -> Vec<String> {
    let verbs = [
        "Validate '{}' with customer research",
        "Deep dive on '{}' market opportunity",
        "Competitive analysis for '{}'",
    ];

    ranked
        .iter()
        .zip(verbs)
        .enumerate()
        .map(|(i, (item, verb))| {
            format!(
                "Priority {}: {}",
                i + 1,
                verb.replace("{}", &item.opportunity().title)
            )
        })
        .collect()
}

pub(crate) fn weight_lines(weights: &ScoringWeights) -> Vec<String> {
    Criterion::ALL
        .iter()
        .map(|&c| format!("{} ({:.0}%)", c, weights.get(c) * 100.0))
        .collect()
}

pub(crate) fn empty_hint(metadata: &BriefMetadata) -> String {
    if metadata.signals_scored > 0 {
        format!(
            "{} signals scored, none cleared the charter-fit bar ({} failed to score).",
            metadata.signals_scored, metadata.signals_failed
        )
    } else if metadata.signals_total == 0 {
        "No signals were collected in the lookback window.".to_string()
    } else if metadata.signals_failed == metadata.signals_total {
        format!(
            "All {} signals failed to score. Check the model endpoint and logs.",
            metadata.signals_total
        )
    } else {
        format!(
            "None of {} signals could be scored ({} failed, {} had no text).",
            metadata.signals_total, metadata.signals_failed, metadata.signals_skipped
        )
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::Aggregator;
    use crate::config::ScoringConfig;
    use crate::models::{CriterionScores, EvidenceRef, Opportunity, TierSummary};
    use chrono::TimeZone;

    fn opportunity(title: &str, score: f64, market: Market) -> Opportunity {
        Opportunity {
            title: title.to_string(),
            description: format!("{} lets shoppers browse in their own dialect.", title),
            market,
            evidence: vec![EvidenceRef {
                signal_index: 0,
                source: "reddit".to_string(),
                url: Some("https://reddit.com/r/latinos/1".to_string()),
                quote: "I keep switching to English".to_string(),
            }],
            criterion_scores: CriterionScores::new(score, score, score, score, score).to_map(),
        }
    }

    pub(crate) fn sample_brief(count: usize) -> Brief {
        let aggregator = Aggregator::new(ScoringConfig::default()).unwrap();
        let opportunities = (0..count)
            .map(|i| {
                let market = if i % 2 == 0 {
                    Market::Hispanic
                } else {
                    Market::FrenchCanadian
                };
                opportunity(&format!("Opportunity {}", i + 1), 95.0 - i as f64 * 5.0, market)
            })
            .collect();
        let ranked = aggregator.rank(opportunities);
        let quick_wins = aggregator.quick_wins(&ranked);

        Brief {
            metadata: BriefMetadata {
                generated_at: Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap(),
                model_used: "anthropic/claude-sonnet-4-20250514".to_string(),
                lookback_days: 14,
                signals_total: 12,
                hispanic_signals: 7,
                french_canadian_signals: 5,
                signals_scored: count,
                signals_skipped: 1,
                signals_failed: 12 - count - 1,
                duration_seconds: 4.25,
            },
            summary: TierSummary::from_ranked(&ranked),
            opportunities: ranked,
            quick_wins,
            weights: ScoringWeights::default(),
        }
    }

    #[test]
    fn test_generate_text_brief() {
        let brief = sample_brief(5);
        let text = generate_text_brief(&brief);

        assert!(text.contains("MULTILINGUAL SHOPPING EXPERIENCE OPPORTUNITIES"));
        assert!(text.contains("October 18, 2026 - Bi-Weekly Intelligence Brief"));
        assert!(text.contains("• Hispanic market signals: 7 analyzed"));
        assert!(text.contains("TOP OPPORTUNITY #1\nOpportunity 1"));
        assert!(text.contains("⚡ QUICK WIN OPPORTUNITIES"));
        assert!(text.contains("Priority 1: Validate 'Opportunity 1' with customer research"));
        assert!(text.contains("Priority 3: Competitive analysis for 'Opportunity 3'"));
        assert!(text.contains("Next Brief: November 01, 2026"));
        assert!(text.contains("Charter Fit (30%)"));
        assert!(!text.contains(NO_OPPORTUNITIES));
    }

    #[test]
    fn test_detailed_and_abbreviated_entries() {
        let brief = sample_brief(5);
        let text = generate_text_brief(&brief);

        // Top three carry score breakdowns, the rest a summary.
        assert_eq!(text.matches("SCORES:").count(), DETAILED_COUNT);
        assert_eq!(text.matches("QUICK SUMMARY:").count(), 2);
        assert_eq!(text.matches("EVIDENCE SOURCES:").count(), DETAILED_COUNT);
    }

    #[test]
    fn test_empty_brief_states() {
        let brief = sample_brief(0);

        let text = generate_text_brief(&brief);
        assert!(text.contains(NO_OPPORTUNITIES));
        assert!(!text.contains("TOP OPPORTUNITY"));

        let markdown = generate_markdown_brief(&brief);
        assert!(markdown.contains(NO_OPPORTUNITIES));
        assert!(!markdown.contains("## Quick Wins"));
    }

    #[test]
    fn test_empty_hint_wording() {
        let mut metadata = sample_brief(0).metadata;
        metadata.signals_skipped = 0;
        metadata.signals_failed = 12;
        assert_eq!(
            empty_hint(&metadata),
            "All 12 signals failed to score. Check the model endpoint and logs."
        );

        metadata.signals_scored = 9;
        metadata.signals_failed = 3;
        assert!(empty_hint(&metadata).contains("none cleared the charter-fit bar"));

        metadata.signals_total = 0;
        metadata.signals_scored = 0;
        metadata.signals_failed = 0;
        assert_eq!(
            empty_hint(&metadata),
            "No signals were collected in the lookback window."
        );
    }

    #[test]
    fn test_generate_markdown_brief() {
        let brief = sample_brief(4);
        let markdown = generate_markdown_brief(&brief);

        assert!(markdown.contains("# Multilingual Shopping Experience Opportunities"));
        assert!(markdown.contains("| # | Opportunity | Market | Tier | Composite |"));
        assert!(markdown.contains("| 1 | Opportunity 1 | US Hispanic (Spanish) |"));
        assert!(markdown.contains("### 4. "));
        assert!(markdown.contains("[reddit](https://reddit.com/r/latinos/1)"));
        assert!(markdown.contains("Competitive Advantage (10%)"));
    }

    #[test]
    fn test_json_brief_round_trip() {
        let brief = sample_brief(4);
        let json = generate_json_brief(&brief).unwrap();

        assert!(json.contains("\"composite_score\""));
        assert!(json.contains("\"criterion_scores\""));

        let parsed: Brief = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, brief);

        let ranked_json = serde_json::to_string(&brief.opportunities).unwrap();
        let ranked: Vec<RankedOpportunity> = serde_json::from_str(&ranked_json).unwrap();
        assert_eq!(ranked, brief.opportunities);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(stars(87.8), "⭐⭐⭐⭐");
        assert_eq!(stars(19.9), "");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long description here", 6), "a long...");
    }
}
