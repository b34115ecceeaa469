// src/ingest/sources.rs
use serde::{Deserialize, Serialize};

use crate::model::Category;

/// One registered RSS/Atom source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub category: Category,
}

impl FeedSource {
    pub fn new(name: &str, url: &str, category: Category) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            category,
        }
    }
}

pub fn default_sources() -> Vec<FeedSource> {
    vec![
        FeedSource::new("TechCrunch", "https://techcrunch.com/feed/", Category::Tech),
        FeedSource::new("The Verge", "https://www.theverge.com/rss/index.xml", Category::Tech),
        FeedSource::new("Electrek", "https://electrek.co/feed/", Category::Ev),
        FeedSource::new("Teslarati", "https://www.teslarati.com/feed/", Category::Ev),
        FeedSource::new(
            "CoinDesk",
            "https://www.coindesk.com/arc/outboundfeeds/rss/",
            Category::Crypto,
        ),
        FeedSource::new("The Block", "https://www.theblock.co/rss.xml", Category::Crypto),
        FeedSource::new("Engadget", "https://www.engadget.com/rss.xml", Category::Gadgets),
        FeedSource::new("Gizmodo", "https://gizmodo.com/rss", Category::Gadgets),
    ]
}
