//! # Editorial data model
//! `NewsItem` → `NewsBrief` → `Batch`, plus the state transitions the approval
//! workflow is allowed to make on them.
//!
//! Brief statuses only move forward (`pending → approved | rejected`), batch statuses
//! only move `pending → processing → completed`. Every mutation goes through a method
//! returning [`TransitionError`] so an illegal move never reaches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Editorial section a feed belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Ev,
    Crypto,
    Gadgets,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Ev => "ev",
            Category::Crypto => "crypto",
            Category::Gadgets => "gadgets",
        }
    }

    /// Emoji shown next to a brief in the reviewer menu.
    pub fn emoji(self) -> &'static str {
        match self {
            Category::Tech => "💻",
            Category::Ev => "🚗",
            Category::Crypto => "₿",
            Category::Gadgets => "📱",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized story from a feed. Identity is `id`, a hash of the canonical link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    /// `None` when the feed carried no parseable date; such items sort last.
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    pub category: Category,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        link: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        source: impl Into<String>,
        category: Category,
    ) -> Self {
        let link = link.into();
        Self {
            id: item_id(&link),
            title: title.into(),
            description: description.into(),
            link,
            published_at,
            source: source.into(),
            category,
        }
    }
}

/// Canonical form of a story link: trimmed, fragment dropped, trailing slash dropped.
/// Scheme and host are case-insensitive and lowercased.
pub fn canonical_link(link: &str) -> String {
    let trimmed = link.trim();
    let no_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let mut out = match no_fragment.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(i) => rest.split_at(i),
                None => (rest, ""),
            };
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => no_fragment.to_string(),
    };
    while out.ends_with('/') && !out.ends_with("://") {
        out.pop();
    }
    out
}

/// Deterministic item id: first 8 bytes of SHA-256 over the canonical link, hex encoded.
/// Titles are deliberately not part of the hash; they get edited upstream.
pub fn item_id(link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_link(link).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BriefStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("brief {id} is already {from:?}, cannot become {to:?}")]
    Brief {
        id: String,
        from: BriefStatus,
        to: BriefStatus,
    },
    #[error("batch {id} cannot move from {from:?} to {to:?}")]
    Batch {
        id: String,
        from: BatchStatus,
        to: BatchStatus,
    },
}

/// Short AI-drafted summary of a `NewsItem`, awaiting the reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsBrief {
    pub id: String,
    pub news_item: NewsItem,
    pub summary: String,
    pub suggested_title: String,
    pub suggested_tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: BriefStatus,
}

impl NewsBrief {
    pub fn new(
        news_item: NewsItem,
        summary: String,
        suggested_title: String,
        suggested_tags: Vec<String>,
    ) -> Self {
        Self {
            id: brief_id(&news_item.id),
            news_item,
            summary,
            suggested_title,
            suggested_tags,
            created_at: Utc::now(),
            status: BriefStatus::Pending,
        }
    }

    pub fn approve(&mut self) -> Result<(), TransitionError> {
        self.resolve(BriefStatus::Approved)
    }

    pub fn reject(&mut self) -> Result<(), TransitionError> {
        self.resolve(BriefStatus::Rejected)
    }

    fn resolve(&mut self, to: BriefStatus) -> Result<(), TransitionError> {
        if self.status != BriefStatus::Pending {
            return Err(TransitionError::Brief {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Brief ids are derived from the item id so a re-generated brief keeps its identity.
pub fn brief_id(item_id: &str) -> String {
    format!("{item_id}_b")
}

/// Opaque batch identifier, carried in every callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        BatchId(format!("b{}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Briefs produced by one ingestion cycle. `briefs` order is relevance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: BatchId,
    pub briefs: Vec<NewsBrief>,
    pub created_at: DateTime<Utc>,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(batch_id: BatchId, briefs: Vec<NewsBrief>, created_at: DateTime<Utc>) -> Self {
        Self {
            batch_id,
            briefs,
            created_at,
            status: BatchStatus::Pending,
        }
    }

    pub fn brief(&self, brief_id: &str) -> Option<&NewsBrief> {
        self.briefs.iter().find(|b| b.id == brief_id)
    }

    pub fn is_empty(&self) -> bool {
        self.briefs.is_empty()
    }

    pub fn transition(&mut self, to: BatchStatus) -> Result<(), TransitionError> {
        let ok = matches!(
            (self.status, to),
            (BatchStatus::Pending, BatchStatus::Processing)
                | (BatchStatus::Processing, BatchStatus::Processing)
                | (BatchStatus::Pending, BatchStatus::Completed)
                | (BatchStatus::Processing, BatchStatus::Completed)
        );
        if !ok {
            return Err(TransitionError::Batch {
                id: self.batch_id.to_string(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Detach a brief from the batch. When the last brief leaves, the batch completes.
    pub fn take_brief(&mut self, brief_id: &str) -> Option<NewsBrief> {
        let idx = self.briefs.iter().position(|b| b.id == brief_id)?;
        let brief = self.briefs.remove(idx);
        if self.briefs.is_empty() {
            self.status = BatchStatus::Completed;
        }
        Some(brief)
    }

    /// Append briefs not already present (by id). Returns how many were added.
    pub fn merge(&mut self, briefs: Vec<NewsBrief>) -> usize {
        let mut added = 0;
        for b in briefs {
            if self.brief(&b.id).is_none() {
                self.briefs.push(b);
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: &str) -> NewsItem {
        NewsItem::new("Title long enough", "desc", link, None, "Src", Category::Tech)
    }

    #[test]
    fn same_link_same_id_regardless_of_title() {
        let a = NewsItem::new("A", "x", "https://Example.com/a/", None, "S", Category::Ev);
        let b = NewsItem::new("B", "y", " https://example.com/a#top", None, "T", Category::Tech);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
        assert_ne!(a.id, item("https://example.com/b").id);
    }

    #[test]
    fn brief_status_never_reverses() {
        let mut b = NewsBrief::new(item("https://e.com/1"), "s".into(), "t".into(), vec![]);
        b.approve().unwrap();
        assert!(b.reject().is_err());
        assert!(b.approve().is_err());
        assert_eq!(b.status, BriefStatus::Approved);
    }

    #[test]
    fn emptied_batch_completes() {
        let brief = NewsBrief::new(item("https://e.com/1"), "s".into(), "t".into(), vec![]);
        let id = brief.id.clone();
        let mut batch = Batch::new(BatchId("b1".into()), vec![brief], Utc::now());
        batch.transition(BatchStatus::Processing).unwrap();
        assert!(batch.take_brief(&id).is_some());
        assert_eq!(batch.status, BatchStatus::Completed);
        assert!(batch.transition(BatchStatus::Pending).is_err());
    }

    #[test]
    fn merge_skips_known_briefs() {
        let b1 = NewsBrief::new(item("https://e.com/1"), "s".into(), "t".into(), vec![]);
        let b2 = NewsBrief::new(item("https://e.com/2"), "s".into(), "t".into(), vec![]);
        let mut batch = Batch::new(BatchId("b1".into()), vec![b1.clone()], Utc::now());
        assert_eq!(batch.merge(vec![b1, b2]), 1);
        assert_eq!(batch.briefs.len(), 2);
    }
}
