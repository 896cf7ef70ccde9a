//! Standalone HTML export of the brief.

use super::generator::{
    brief_date, empty_hint, next_brief_date, recommended_actions, stars, weight_lines,
    NO_OPPORTUNITIES,
};
use crate::models::{Brief, Criterion, RankedOpportunity};

const STYLE: &str = r#"
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; line-height: 1.6; max-width: 900px; margin: 0 auto; padding: 20px; background: #f5f5f5; }
    .container { background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
    h1 { color: #232f3e; border-bottom: 3px solid #ff9900; padding-bottom: 10px; }
    h2 { color: #232f3e; margin-top: 30px; }
    .snapshot { background: #f0f8ff; padding: 20px; border-left: 4px solid #0073bb; margin: 20px 0; }
    .opportunity { background: #fff9f0; padding: 20px; margin: 20px 0; border-left: 4px solid #ff9900; }
    .empty { background: #fff4f4; padding: 20px; border-left: 4px solid #d13212; }
    .score { display: inline-block; background: #232f3e; color: white; padding: 5px 15px; border-radius: 20px; font-weight: bold; }
    table { border-collapse: collapse; }
    td, th { padding: 4px 12px; text-align: left; }
    footer { color: #666; font-size: 0.9em; border-top: 2px solid #ddd; margin-top: 30px; padding-top: 10px; }
"#;

/// Generate a self-contained HTML page for the brief.
pub fn generate_html_brief(brief: &Brief) -> String {
    let metadata = &brief.metadata;
    let date = brief_date(metadata.generated_at);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("  <meta charset=\"UTF-8\">\n");
    html.push_str(
        "  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str(&format!(
        "  <title>Multilingual Shopping Experience Intelligence Brief - {}</title>\n",
        escape_html(&date)
    ));
    html.push_str(&format!("  <style>{}</style>\n</head>\n<body>\n", STYLE));
    html.push_str("<div class=\"container\">\n");
    html.push_str("<h1>Multilingual Shopping Experience Opportunities</h1>\n");
    html.push_str(&format!(
        "<p>{} - Bi-Weekly Intelligence Brief</p>\n",
        escape_html(&date)
    ));

    html.push_str("<div class=\"snapshot\">\n<h2>📊 Market Snapshot</h2>\n<ul>\n");
    html.push_str(&format!(
        "<li>Hispanic market signals: {}</li>\n",
        metadata.hispanic_signals
    ));
    html.push_str(&format!(
        "<li>French-Canadian signals: {}</li>\n",
        metadata.french_canadian_signals
    ));
    html.push_str(&format!(
        "<li>Signals scored: {} (skipped: {}, failed: {})</li>\n",
        metadata.signals_scored, metadata.signals_skipped, metadata.signals_failed
    ));
    html.push_str(&format!(
        "<li>High-priority opportunities: {}</li>\n",
        brief.summary.high_priority
    ));
    html.push_str(&format!("<li>Quick wins: {}</li>\n", brief.quick_wins.len()));
    html.push_str("</ul>\n</div>\n");

    if brief.is_empty() {
        html.push_str(&format!(
            "<div class=\"empty\"><strong>{}.</strong> {}</div>\n",
            NO_OPPORTUNITIES,
            escape_html(&empty_hint(metadata))
        ));
    } else {
        html.push_str("<h2>Top Opportunities</h2>\n");
        for item in &brief.opportunities {
            html.push_str(&generate_html_opportunity(item));
        }

        if !brief.quick_wins.is_empty() {
            html.push_str("<h2>⚡ Quick Wins</h2>\n<ol>\n");
            for win in &brief.quick_wins {
                html.push_str(&format!(
                    "<li><strong>{}</strong> (Est. {}) - composite {:.1}, feasibility {:.0}</li>\n",
                    escape_html(&win.title),
                    escape_html(&win.effort),
                    win.composite_score,
                    win.feasibility
                ));
            }
            html.push_str("</ol>\n");
        }

        html.push_str("<h2>💡 Recommended Actions</h2>\n<ul>\n");
        for action in recommended_actions(&brief.opportunities) {
            html.push_str(&format!("<li>{}</li>\n", escape_html(&action)));
        }
        html.push_str("</ul>\n");
    }

    html.push_str(&format!(
        "<p><strong>Next brief:</strong> {}</p>\n",
        escape_html(&next_brief_date(metadata.generated_at))
    ));
    html.push_str(&format!(
        "<footer>Scoring weights: {}<br>Model: {}</footer>\n",
        escape_html(&weight_lines(&brief.weights).join(", ")),
        escape_html(&metadata.model_used)
    ));
    html.push_str("</div>\n</body>\n</html>\n");

    html
}

fn generate_html_opportunity(item: &RankedOpportunity) -> String {
    let opportunity = item.opportunity();
    let mut section = String::new();

    section.push_str("<div class=\"opportunity\">\n");
    section.push_str(&format!(
        "<h3>#{} {} {}</h3>\n",
        item.rank(),
        item.tier().emoji(),
        escape_html(&opportunity.title)
    ));
    section.push_str(&format!(
        "<p>{} {} | {} | <span class=\"score\">{:.1}</span> {}</p>\n",
        opportunity.market.emoji(),
        escape_html(&opportunity.market.to_string()),
        item.tier(),
        item.composite_score(),
        stars(item.composite_score())
    ));

    if !opportunity.description.is_empty() {
        section.push_str(&format!("<p>{}</p>\n", escape_html(&opportunity.description)));
    }

    section.push_str("<table>\n");
    for criterion in Criterion::ALL {
        section.push_str(&format!(
            "<tr><th>{}</th><td>{:.0}</td></tr>\n",
            criterion,
            item.score(criterion)
        ));
    }
    section.push_str("</table>\n<ul>\n");

    for evidence in &opportunity.evidence {
        let source = match &evidence.url {
            Some(url) => format!(
                "<a href=\"{}\">{}</a>",
                escape_html(url),
                escape_html(&evidence.source)
            ),
            None => escape_html(&evidence.source),
        };
        if evidence.quote.is_empty() {
            section.push_str(&format!("<li>{}</li>\n", source));
        } else {
            section.push_str(&format!(
                "<li>{}: <q>{}</q></li>\n",
                source,
                escape_html(&evidence.quote)
            ));
        }
    }
    section.push_str("</ul>\n</div>\n");

    section
}

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
