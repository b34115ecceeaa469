// src/dedup.rs
//! Processed-ID set: ids of items already surfaced to the reviewer.
//!
//! Stored under `processed_news_ids` as a JSON array in insertion order, so eviction
//! drops the oldest ids first once the cap is reached.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics::counter;

use crate::config::DedupConfig;
use crate::model::NewsItem;
use crate::store::{self, Change, ContentStore, KEY_PROCESSED_IDS};

#[derive(Clone)]
pub struct DedupStore {
    store: Arc<dyn ContentStore>,
    cfg: DedupConfig,
}

impl DedupStore {
    pub fn new(store: Arc<dyn ContentStore>, cfg: DedupConfig) -> Self {
        Self { store, cfg }
    }

    pub async fn processed_ids(&self) -> Result<Vec<String>> {
        Ok(store::get_json(self.store.as_ref(), KEY_PROCESSED_IDS)
            .await
            .context("reading processed ids")?
            .unwrap_or_default())
    }

    /// Unseen, quality-filtered items, newest first, capped per cycle.
    pub async fn get_new_items(&self, all: Vec<NewsItem>) -> Result<Vec<NewsItem>> {
        let seen: HashSet<String> = self.processed_ids().await?.into_iter().collect();
        let total = all.len();
        let out = select_new_items(all, &seen, &self.cfg);
        counter!("curator_dedup_dropped_total").increment(total.saturating_sub(out.len()) as u64);
        tracing::info!(target: "dedup", total, kept = out.len(), "filtered new items");
        Ok(out)
    }

    /// Union `ids` into the set and keep only the most recent `max_ids`.
    pub async fn mark_processed(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let max = self.cfg.max_ids;
        store::update::<Vec<String>, (), _>(self.store.as_ref(), KEY_PROCESSED_IDS, |cur| {
            let merged = merge_ids(cur.unwrap_or_default(), ids, max);
            (Change::Put(merged), ())
        })
        .await
        .context("marking ids processed")?;
        Ok(())
    }
}

/// Pure part of `mark_processed`: append unknown ids, evict from the front.
pub fn merge_ids(mut existing: Vec<String>, ids: &[String], max: usize) -> Vec<String> {
    let mut known: HashSet<String> = existing.iter().cloned().collect();
    for id in ids {
        if known.insert(id.clone()) {
            existing.push(id.clone());
        }
    }
    if existing.len() > max {
        let excess = existing.len() - max;
        existing.drain(0..excess);
    }
    existing
}

fn passes_quality(item: &NewsItem, cfg: &DedupConfig) -> bool {
    if item.title.chars().count() < cfg.min_title_chars
        || item.description.chars().count() < cfg.min_description_chars
    {
        return false;
    }
    let title = item.title.to_lowercase();
    let desc = item.description.to_lowercase();
    !cfg
        .blocked_phrases
        .iter()
        .any(|p| title.contains(p.as_str()) || desc.contains(p.as_str()))
}

/// Pure part of `get_new_items`: dedup against `seen` and within the poll, filter,
/// sort newest first (undated last, ties by id), cap.
pub fn select_new_items(
    all: Vec<NewsItem>,
    seen: &HashSet<String>,
    cfg: &DedupConfig,
) -> Vec<NewsItem> {
    let mut in_poll: HashSet<String> = HashSet::new();
    let mut out: Vec<NewsItem> = all
        .into_iter()
        .filter(|it| !seen.contains(&it.id))
        .filter(|it| in_poll.insert(it.id.clone()))
        .filter(|it| passes_quality(it, cfg))
        .collect();

    out.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
    out.truncate(cfg.max_new_items);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use chrono::{TimeZone, Utc};

    fn item(link: &str, title: &str, desc: &str, hour: Option<u32>) -> NewsItem {
        NewsItem::new(
            title,
            desc,
            link,
            hour.map(|h| Utc.with_ymd_and_hms(2025, 10, 14, h, 0, 0).unwrap()),
            "Src",
            Category::Tech,
        )
    }

    const DESC: &str = "A sufficiently long description that passes the fifty character minimum.";

    #[test]
    fn quality_filter_drops_short_and_boilerplate() {
        let cfg = DedupConfig::default();
        let all = vec![
            item("https://e.com/1", "Short", DESC, Some(1)),
            item("https://e.com/2", "Long enough title", "too short", Some(1)),
            item("https://e.com/3", "Click HERE for gadgets", DESC, Some(1)),
            item("https://e.com/4", "Long enough title", &format!("{DESC} Read more"), Some(1)),
            item("https://e.com/5", "Long enough title", DESC, Some(1)),
        ];
        let out = select_new_items(all, &HashSet::new(), &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].link, "https://e.com/5");
    }

    #[test]
    fn sorted_newest_first_undated_last() {
        let cfg = DedupConfig::default();
        let all = vec![
            item("https://e.com/a", "Long enough title", DESC, Some(3)),
            item("https://e.com/b", "Long enough title", DESC, None),
            item("https://e.com/c", "Long enough title", DESC, Some(9)),
        ];
        let out = select_new_items(all, &HashSet::new(), &cfg);
        let links: Vec<&str> = out.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, ["https://e.com/c", "https://e.com/a", "https://e.com/b"]);
    }

    #[test]
    fn same_link_twice_in_one_poll_is_kept_once() {
        let cfg = DedupConfig::default();
        let all = vec![
            item("https://e.com/x", "Long enough title", DESC, Some(3)),
            item("https://e.com/x", "Edited long title", DESC, Some(4)),
        ];
        assert_eq!(select_new_items(all, &HashSet::new(), &cfg).len(), 1);
    }

    #[test]
    fn merge_ids_evicts_oldest() {
        let existing: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let merged = merge_ids(existing, &["3".into(), "x".into(), "y".into()], 10);
        assert_eq!(merged.len(), 10);
        assert_eq!(merged.first().map(String::as_str), Some("2"));
        assert_eq!(merged.last().map(String::as_str), Some("y"));
    }
}
