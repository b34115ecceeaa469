// src/config/mod.rs
//! Explicit application configuration, handed to each component constructor.
//!
//! Loading order:
//! 1) `$CURATOR_CONFIG_PATH` (must exist)
//! 2) `config/curator.toml`
//! 3) built-in defaults
//!
//! Secret fields set to `"ENV"` (or left empty) are resolved from the environment
//! by [`AppConfig::resolve_secrets`].

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::batch::BatchPolicy;
use crate::ingest::sources::{default_sources, FeedSource};

pub const ENV_CONFIG_PATH: &str = "CURATOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/curator.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feeds: Vec<FeedSource>,
    pub ingest: IngestConfig,
    pub dedup: DedupConfig,
    pub llm: LlmConfig,
    pub briefs: BriefConfig,
    pub telegram: TelegramConfig,
    pub publish: PublishConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feeds: default_sources(),
            ingest: IngestConfig::default(),
            dedup: DedupConfig::default(),
            llm: LlmConfig::default(),
            briefs: BriefConfig::default(),
            telegram: TelegramConfig::default(),
            publish: PublishConfig::default(),
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: "NewsCurator/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Processed-ID set capacity; oldest ids are evicted first.
    pub max_ids: usize,
    /// Cap on items surfaced per cycle.
    pub max_new_items: usize,
    pub min_title_chars: usize,
    pub min_description_chars: usize,
    pub blocked_phrases: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_ids: 1000,
            max_new_items: 15,
            min_title_chars: 10,
            min_description_chars: 50,
            blocked_phrases: ["click here", "read more", "learn more", "find out"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    pub api_key: String,
    pub brief_model: String,
    pub article_model: String,
    pub fallback_model: String,
    pub timeout_secs: u64,
    pub brief_max_tokens: u32,
    pub article_max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: "ENV".to_string(),
            brief_model: "gpt-4o-mini".to_string(),
            article_model: "gpt-4o-mini".to_string(),
            fallback_model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 60,
            brief_max_tokens: 500,
            article_max_tokens: 2000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefConfig {
    /// Items summarized concurrently per group.
    pub concurrency: usize,
    pub group_delay_ms: u64,
    /// Extra attempts for a failed model call before the item is dropped for this cycle.
    pub retries: u8,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            group_delay_ms: 1000,
            retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    /// "ENV" means: read from TELEGRAM_BOT_TOKEN.
    pub bot_token: String,
    /// "ENV" means: read from TELEGRAM_CHAT_ID. The single authorized reviewer chat.
    pub chat_id: String,
    /// Optional; "ENV" reads TELEGRAM_WEBHOOK_SECRET (absent env leaves it unset).
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: "ENV".to_string(),
            chat_id: "ENV".to_string(),
            webhook_secret: None,
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub api_base: String,
    /// "ENV" means: read from GITHUB_TOKEN.
    pub token: String,
    /// "owner/name"; "ENV" means: read from GITHUB_REPO.
    pub repo: String,
    pub branch: String,
    pub content_dir: String,
    pub feed_path: String,
    pub sitemap_path: String,
    pub site_url: String,
    pub site_title: String,
    pub site_description: String,
    pub commit_concurrency: usize,
    pub group_delay_ms: u64,
    pub feed_max_items: usize,
    pub sitemap_max_urls: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: "ENV".to_string(),
            repo: "ENV".to_string(),
            branch: "main".to_string(),
            content_dir: "site/src/content/blog".to_string(),
            feed_path: "site/public/rss.xml".to_string(),
            sitemap_path: "site/public/sitemap.xml".to_string(),
            site_url: "https://agaminews.in".to_string(),
            site_title: "Tech News Blog".to_string(),
            site_description: "Latest tech, EV, crypto, and gadget news".to_string(),
            commit_concurrency: 3,
            group_delay_ms: 2000,
            feed_max_items: 50,
            sitemap_max_urls: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_policy: BatchPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 2 * 3600,
            batch_policy: BatchPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the file-backed store; `None` keeps state in memory.
    pub dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("state")),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path");
            }
            return Self::load_from(&pb);
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        Ok(Self::default())
    }

    /// Replace `"ENV"`/empty secrets with environment values. Required secrets that are
    /// still missing afterwards are an error.
    pub fn resolve_secrets(&mut self) -> Result<()> {
        self.llm.api_key = resolve(&self.llm.api_key, "OPENAI_API_KEY")?;
        self.telegram.bot_token = resolve(&self.telegram.bot_token, "TELEGRAM_BOT_TOKEN")?;
        self.telegram.chat_id = resolve(&self.telegram.chat_id, "TELEGRAM_CHAT_ID")?;
        self.publish.token = resolve(&self.publish.token, "GITHUB_TOKEN")?;
        self.publish.repo = resolve(&self.publish.repo, "GITHUB_REPO")?;
        if let Some(s) = &self.telegram.webhook_secret {
            self.telegram.webhook_secret = if needs_env(s) {
                env::var("TELEGRAM_WEBHOOK_SECRET").ok()
            } else {
                Some(s.clone())
            };
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        let d = AppConfig::default();
        if self.feeds.is_empty() {
            self.feeds = d.feeds;
        }
        if self.briefs.concurrency == 0 {
            self.briefs.concurrency = d.briefs.concurrency;
        }
        if self.publish.commit_concurrency == 0 {
            self.publish.commit_concurrency = d.publish.commit_concurrency;
        }
        if self.dedup.max_ids == 0 {
            self.dedup.max_ids = d.dedup.max_ids;
        }
        if self.publish.feed_max_items == 0 {
            self.publish.feed_max_items = d.publish.feed_max_items;
        }
        if self.scheduler.interval_secs == 0 {
            self.scheduler.interval_secs = d.scheduler.interval_secs;
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            self.llm.temperature = d.llm.temperature;
        }
        self.dedup.blocked_phrases = self
            .dedup
            .blocked_phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
    }
}

fn needs_env(v: &str) -> bool {
    let t = v.trim();
    t.is_empty() || t.eq_ignore_ascii_case("env")
}

fn resolve(v: &str, var: &str) -> Result<String> {
    if !needs_env(v) {
        return Ok(v.to_string());
    }
    env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("Missing {var} env var"))
}
