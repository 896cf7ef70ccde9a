//! Live collection from RSS 2.0 and Atom feeds.

use super::CollectionError;
use crate::config::{CollectionConfig, FeedSource};
use crate::models::{Market, Signal};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest text (in characters) kept from a feed entry.
pub const MAX_ENTRY_TEXT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error("document is not an RSS or Atom feed")]
    NotAFeed,
}

/// One `<item>` or `<entry>` as it appears in the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Body,
    Link,
    Published,
    Updated,
    Id,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"title" => Some(Field::Title),
            b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Body),
            b"link" => Some(Field::Link),
            b"pubDate" | b"published" | b"date" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            b"id" | b"guid" => Some(Field::Id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    body: String,
    link: String,
    published: String,
    updated: String,
    id: String,
}

impl EntryBuilder {
    fn buffer(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Body => &mut self.body,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Id => &mut self.id,
        }
    }

    /// Atom `<link href=".."/>`: the alternate (or unqualified) link wins.
    fn atom_link(&mut self, start: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        if !self.link.is_empty() {
            return Ok(());
        }
        let rel = match start.try_get_attribute("rel")? {
            Some(attr) => attr.unescape_value()?.into_owned(),
            None => String::new(),
        };
        if !rel.is_empty() && rel != "alternate" {
            return Ok(());
        }
        if let Some(href) = start.try_get_attribute("href")? {
            self.link = href.unescape_value()?.into_owned();
        }
        Ok(())
    }

    fn finish(self) -> FeedEntry {
        let link = [self.link, self.id]
            .into_iter()
            .map(|l| l.trim().to_string())
            .find(|l| l.starts_with("http"));
        let published = parse_date(&self.published).or_else(|| parse_date(&self.updated));

        FeedEntry {
            title: collapse_whitespace(&self.title),
            body: collapse_whitespace(&strip_html(&self.body)),
            link,
            published,
        }
    }
}

/// Parse an RSS 2.0 or Atom document into its entries.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FeedParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut saw_root = false;
    let mut entry: Option<EntryBuilder> = None;
    // Field being captured and the tag that opened it.
    let mut current: Option<(Field, Vec<u8>)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = e.local_name().as_ref().to_vec();
                match tag.as_slice() {
                    b"rss" | b"feed" | b"RDF" => saw_root = true,
                    b"item" | b"entry" => {
                        entry = Some(EntryBuilder::default());
                        current = None;
                    }
                    _ if current.is_none() => {
                        if let (Some(builder), Some(field)) = (entry.as_mut(), Field::from_tag(&tag)) {
                            if field == Field::Link {
                                builder.atom_link(&e)?;
                            }
                            if builder.buffer(field).is_empty() {
                                current = Some((field, tag));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if let Some(builder) = entry.as_mut() {
                    if e.local_name().as_ref() == b"link" {
                        builder.atom_link(&e)?;
                    }
                }
            }
            Event::Text(e) => {
                if let (Some(builder), Some((field, _))) = (entry.as_mut(), current.as_ref()) {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    push_text(builder.buffer(*field), &text);
                }
            }
            Event::CData(e) => {
                if let (Some(builder), Some((field, _))) = (entry.as_mut(), current.as_ref()) {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    push_text(builder.buffer(*field), &text);
                }
            }
            Event::End(e) => {
                let tag = e.local_name();
                let tag = tag.as_ref();
                if current.as_ref().is_some_and(|(_, open)| open.as_slice() == tag) {
                    current = None;
                } else if tag == b"item" || tag == b"entry" {
                    if let Some(builder) = entry.take() {
                        entries.push(builder.finish());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(FeedParseError::NotAFeed);
    }

    Ok(entries)
}

fn push_text(buffer: &mut String, text: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text);
}

/// RFC 2822 (RSS), RFC 3339 (Atom) or a bare `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Market with strictly more matching terms, or `None` on a tie.
pub fn detect_market(text: &str, config: &CollectionConfig) -> Option<Market> {
    let text = text.to_lowercase();
    let count = |terms: &[String]| {
        terms
            .iter()
            .filter(|term| text.contains(&term.to_lowercase()))
            .count()
    };

    let hispanic = count(&config.hispanic_terms);
    let french_canadian = count(&config.french_canadian_terms);

    match hispanic.cmp(&french_canadian) {
        std::cmp::Ordering::Greater => Some(Market::Hispanic),
        std::cmp::Ordering::Less => Some(Market::FrenchCanadian),
        std::cmp::Ordering::Equal => None,
    }
}

/// True when the text mentions any relevance term (or none are configured).
pub fn is_relevant(text: &str, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let text = text.to_lowercase();
    terms.iter().any(|term| text.contains(&term.to_lowercase()))
}

/// Fetches configured feeds and turns relevant entries into signals.
pub struct FeedCollector {
    http_client: reqwest::Client,
    config: CollectionConfig,
}

impl FeedCollector {
    pub fn new(config: &CollectionConfig, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("signalbrief/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    /// Collect from every feed. Failing feeds are logged and skipped.
    pub async fn collect(&self) -> Vec<Signal> {
        let results = join_all(self.config.feeds.iter().map(|feed| self.fetch_feed(feed))).await;

        let mut signals = Vec::new();
        for (feed, result) in self.config.feeds.iter().zip(results) {
            match result {
                Ok(collected) => {
                    info!("Collected {} signals from {}", collected.len(), feed.name);
                    signals.extend(collected);
                }
                Err(e) => warn!("{}", e),
            }
        }

        signals
    }

    async fn fetch_feed(&self, feed: &FeedSource) -> Result<Vec<Signal>, CollectionError> {
        let fetch_error = |reason: String| CollectionError::Fetch {
            feed: feed.name.clone(),
            reason,
        };

        let response = self
            .http_client
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let body = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
        let entries = parse_feed(&body).map_err(|source| CollectionError::FeedParse {
            feed: feed.name.clone(),
            source,
        })?;

        debug!("Feed {} has {} entries", feed.name, entries.len());
        Ok(entries
            .into_iter()
            .filter_map(|entry| self.entry_to_signal(feed, entry))
            .collect())
    }

    fn entry_to_signal(&self, feed: &FeedSource, entry: FeedEntry) -> Option<Signal> {
        let published = entry.published?;
        let combined = format!("{} {}", entry.title, entry.body);

        if !is_relevant(&combined, &self.config.relevance_terms) {
            return None;
        }

        let market = feed
            .market
            .or_else(|| detect_market(&combined, &self.config))?;

        let body = if entry.body.is_empty() {
            entry.title.clone()
        } else {
            entry.body
        };

        Some(Signal {
            source: feed.name.clone(),
            market,
            title: Some(entry.title).filter(|t| !t.is_empty()),
            raw_text: truncate_chars(&body, MAX_ENTRY_TEXT_CHARS),
            url: entry.link,
            collected_at: published,
        })
    }
}
