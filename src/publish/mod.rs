// src/publish/mod.rs
//! Publisher: commits generated articles into the content repository, then refreshes
//! the site feed and sitemap.
//!
//! Article commits run in small concurrent groups with a pause between groups. A failed
//! commit is counted and reported; it never stops its siblings. Feed/sitemap refresh runs
//! only after at least one article landed and is best-effort.

pub mod feed;
pub mod github;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use metrics::counter;

use crate::articles::Article;
use crate::config::PublishConfig;
use crate::model::NewsBrief;
use feed::FeedEntry;

pub use github::GitHubTarget;

#[async_trait]
pub trait PublicationTarget: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Option<String>>;
    /// Create or update `path` in a single commit.
    async fn write_file(&self, path: &str, content: &str, message: &str) -> Result<()>;
}

/// Article that made it into the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub brief_id: String,
    pub title: String,
    pub description: String,
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFailure {
    pub brief_id: String,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: Vec<Published>,
    pub failed: Vec<CommitFailure>,
}

impl PublishReport {
    pub fn success_count(&self) -> usize {
        self.published.len()
    }
}

pub struct Publisher {
    target: Arc<dyn PublicationTarget>,
    cfg: PublishConfig,
}

impl Publisher {
    pub fn new(target: Arc<dyn PublicationTarget>, cfg: PublishConfig) -> Self {
        Self { target, cfg }
    }

    pub fn article_url(&self, article: &Article) -> String {
        format!("{}/blog/{}", self.cfg.site_url.trim_end_matches('/'), article.stem())
    }

    async fn try_commit(&self, brief: &NewsBrief, article: &Article) -> Result<Published> {
        let path = article.path_in(&self.cfg.content_dir);
        let message = format!("Add article: {}", brief.suggested_title);
        self.target
            .write_file(&path, &article.render(), &message)
            .await?;
        Ok(Published {
            brief_id: brief.id.clone(),
            title: brief.suggested_title.clone(),
            description: article.front_matter.description.clone(),
            url: self.article_url(article),
            path,
        })
    }

    /// Single commit; failures are logged and reported as `false`.
    pub async fn commit_article(&self, brief: &NewsBrief, article: &Article) -> bool {
        self.commit_one(brief, article).await.is_ok()
    }

    async fn commit_one(&self, brief: &NewsBrief, article: &Article) -> Result<Published, CommitFailure> {
        match self.try_commit(brief, article).await {
            Ok(p) => {
                counter!("curator_articles_published_total").increment(1);
                tracing::info!(target: "publish", brief = %brief.id, path = %p.path, "article committed");
                Ok(p)
            }
            Err(e) => {
                counter!("curator_commit_failures_total").increment(1);
                tracing::warn!(target: "publish", brief = %brief.id, error = ?e, "commit failed");
                Err(CommitFailure {
                    brief_id: brief.id.clone(),
                    title: brief.suggested_title.clone(),
                    error: format!("{e:#}"),
                })
            }
        }
    }

    /// Commits in groups of `commit_concurrency`, pausing between groups.
    pub async fn commit_multiple_articles(&self, items: &[(NewsBrief, Article)]) -> PublishReport {
        let size = self.cfg.commit_concurrency.max(1);
        let groups = items.chunks(size).count();
        let mut report = PublishReport::default();

        for (gi, group) in items.chunks(size).enumerate() {
            let results = join_all(group.iter().map(|(b, a)| self.commit_one(b, a))).await;
            for r in results {
                match r {
                    Ok(p) => report.published.push(p),
                    Err(f) => report.failed.push(f),
                }
            }
            if gi + 1 < groups {
                tokio::time::sleep(Duration::from_millis(self.cfg.group_delay_ms)).await;
            }
        }
        report
    }

    /// Commit articles and, if any landed, refresh feed and sitemap.
    pub async fn publish(&self, items: &[(NewsBrief, Article)]) -> PublishReport {
        let report = self.commit_multiple_articles(items).await;
        if report.success_count() > 0 {
            self.update_site_documents(&report.published).await;
        }
        report
    }

    /// Best-effort: each document is updated independently and failures are only logged.
    pub async fn update_site_documents(&self, published: &[Published]) {
        if let Err(e) = self.update_feed(published).await {
            counter!("curator_site_document_failures_total", "document" => "feed").increment(1);
            tracing::warn!(target: "publish", error = ?e, "feed update failed");
        }
        if let Err(e) = self.update_sitemap(published).await {
            counter!("curator_site_document_failures_total", "document" => "sitemap").increment(1);
            tracing::warn!(target: "publish", error = ?e, "sitemap update failed");
        }
    }

    async fn update_feed(&self, published: &[Published]) -> Result<()> {
        let now = Utc::now();
        let existing = match self.target.read_file(&self.cfg.feed_path).await? {
            Some(doc) => doc,
            None => feed::base_feed(
                &self.cfg.site_title,
                &self.cfg.site_description,
                &self.cfg.site_url,
            ),
        };
        let entries: Vec<FeedEntry> = published
            .iter()
            .map(|p| FeedEntry {
                title: p.title.clone(),
                description: p.description.clone(),
                url: p.url.clone(),
                published: now,
            })
            .collect();
        let doc = feed::splice_feed(&existing, &entries, self.cfg.feed_max_items)?;
        self.target
            .write_file(&self.cfg.feed_path, &doc, "Update RSS feed with new articles")
            .await
    }

    async fn update_sitemap(&self, published: &[Published]) -> Result<()> {
        let now = Utc::now();
        let existing = match self.target.read_file(&self.cfg.sitemap_path).await? {
            Some(doc) => doc,
            None => feed::base_sitemap(&self.cfg.site_url, now),
        };
        let urls: Vec<String> = published.iter().map(|p| p.url.clone()).collect();
        let doc = feed::splice_sitemap(
            &existing,
            &urls,
            &self.cfg.site_url,
            now,
            self.cfg.sitemap_max_urls.max(1),
        )?;
        self.target
            .write_file(&self.cfg.sitemap_path, &doc, "Update sitemap with new articles")
            .await
    }
}

/// Repository kept in memory. Paths containing a configured marker reject writes.
#[derive(Default)]
pub struct InMemoryTarget {
    files: Mutex<BTreeMap<String, String>>,
    commits: Mutex<Vec<(String, String)>>,
    reject: Mutex<Vec<String>>,
}

impl InMemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_paths_containing(&self, marker: impl Into<String>) {
        if let Ok(mut r) = self.reject.lock() {
            r.push(marker.into());
        }
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().ok().and_then(|f| f.get(path).cloned())
    }

    pub fn paths(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `(path, message)` per successful write, in order.
    pub fn commits(&self) -> Vec<(String, String)> {
        self.commits.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PublicationTarget for InMemoryTarget {
    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        Ok(self.file(path))
    }

    async fn write_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        let rejected = self
            .reject
            .lock()
            .map(|r| r.iter().any(|m| path.contains(m.as_str())))
            .unwrap_or(false);
        if rejected {
            return Err(anyhow!("write to {path} rejected"));
        }
        self.files
            .lock()
            .map_err(|_| anyhow!("target lock poisoned"))?
            .insert(path.to_string(), content.to_string());
        self.commits
            .lock()
            .map_err(|_| anyhow!("target lock poisoned"))?
            .push((path.to_string(), message.to_string()));
        Ok(())
    }
}
