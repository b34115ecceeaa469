// src/ingest/mod.rs
pub mod rss;
pub mod sources;

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::config::IngestConfig;
use crate::ingest::rss::{parse_feed, RawEntry};
use crate::ingest::sources::FeedSource;
use crate::model::NewsItem;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curator_feed_items_total", "Items parsed from feeds.");
        describe_counter!(
            "curator_feed_errors_total",
            "Feed fetch/parse failures (feed contributed zero items)."
        );
        describe_histogram!("curator_feed_fetch_ms", "Per-feed fetch+parse time in ms.");
    });
}

/// Normalize feed text: decode entities, strip tags, straighten quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// RFC 2822 (RSS) first, RFC 3339 (Atom) second.
pub fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        return DateTime::from_timestamp(dt.unix_timestamp(), 0);
    }
    // chrono also accepts obsolete zone names ("GMT", "EST") that some feeds still emit.
    DateTime::parse_from_rfc3339(ts)
        .or_else(|_| DateTime::parse_from_rfc2822(ts))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Turn parsed entries of one source into `NewsItem`s.
pub fn entries_to_items(source: &FeedSource, entries: Vec<RawEntry>) -> Vec<NewsItem> {
    entries
        .into_iter()
        .filter_map(|e| {
            let title = normalize_text(&e.title);
            let link = e.link.trim().to_string();
            if title.is_empty() || link.is_empty() {
                return None;
            }
            Some(NewsItem::new(
                title,
                normalize_text(&e.description),
                link,
                e.pub_date.as_deref().and_then(parse_pub_date),
                source.name.clone(),
                source.category,
            ))
        })
        .collect()
}

/// Fetches every registered source in parallel. A failing source contributes nothing.
pub struct FeedAggregator {
    client: reqwest::Client,
    sources: Vec<FeedSource>,
}

impl FeedAggregator {
    pub fn new(sources: Vec<FeedSource>, cfg: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building feed http client")?;
        Ok(Self { client, sources })
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub async fn fetch_feed(&self, source: &FeedSource) -> Result<Vec<NewsItem>> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .with_context(|| format!("GET {}", source.url))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("feed {} answered {status}", source.name);
        }
        let body = resp.text().await.context("feed body")?;
        let entries = parse_feed(&body).with_context(|| format!("parsing feed {}", source.name))?;
        let items = entries_to_items(source, entries);

        histogram!("curator_feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("curator_feed_items_total").increment(items.len() as u64);
        Ok(items)
    }

    /// All sources concurrently; total latency is that of the slowest feed.
    pub async fn fetch_all_feeds(&self) -> Vec<NewsItem> {
        ensure_metrics_described();

        let results = join_all(self.sources.iter().map(|s| async move {
            (s, self.fetch_feed(s).await)
        }))
        .await;

        let mut all = Vec::new();
        for (source, res) in results {
            match res {
                Ok(mut items) => {
                    tracing::debug!(target: "ingest", feed = %source.name, items = items.len(), "feed fetched");
                    all.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", feed = %source.name, error = ?e, "feed skipped");
                    counter!("curator_feed_errors_total").increment(1);
                }
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    #[test]
    fn normalize_text_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b>!</p>  ";
        assert_eq!(normalize_text(s), "Hello, world !");
    }

    #[test]
    fn pub_dates_in_both_formats() {
        let a = parse_pub_date("Tue, 14 Oct 2025 09:30:00 +0000").unwrap();
        let b = parse_pub_date("2025-10-14T09:30:00Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_pub_date("yesterday").is_none());
    }

    #[test]
    fn entries_become_items_with_link_ids() {
        let src = FeedSource::new("Electrek", "https://electrek.co/feed/", Category::Ev);
        let entries = vec![RawEntry {
            title: "Truck &amp; trailer".into(),
            link: " https://electrek.co/truck ".into(),
            description: "<p>Body</p>".into(),
            pub_date: Some("2025-10-14T09:30:00Z".into()),
            guid: None,
        }];
        let items = entries_to_items(&src, entries);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Truck & trailer");
        assert_eq!(items[0].description, "Body");
        assert_eq!(items[0].link, "https://electrek.co/truck");
        assert_eq!(items[0].category, Category::Ev);
        assert_eq!(items[0].id, crate::model::item_id("https://electrek.co/truck"));
    }
}
