// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod approval;
pub mod articles;
pub mod batch;
pub mod briefs;
pub mod config;
pub mod dedup;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod publish;
pub mod scheduler;
pub mod stats;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

use crate::approval::{ApprovalController, ScheduleInfo};
use crate::articles::ArticleGenerator;
use crate::batch::BatchManager;
use crate::briefs::BriefGenerator;
use crate::config::AppConfig;
use crate::dedup::DedupStore;
use crate::ingest::FeedAggregator;
use crate::llm::{LanguageModel, OpenAiClient};
use crate::notify::{NotificationChannel, TelegramChannel};
use crate::publish::{GitHubTarget, PublicationTarget, Publisher};
use crate::scheduler::Pipeline;
use crate::stats::Stats;
use crate::store::{ContentStore, FileStore, MemoryStore};

pub use crate::api::router;

/// External systems the pipeline talks to.
pub struct Collaborators {
    pub store: Arc<dyn ContentStore>,
    pub model: Arc<dyn LanguageModel>,
    pub channel: Arc<dyn NotificationChannel>,
    pub target: Arc<dyn PublicationTarget>,
}

impl Collaborators {
    /// Production wiring. Secrets must already be resolved.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let store: Arc<dyn ContentStore> = match &cfg.store.dir {
            Some(dir) => Arc::new(FileStore::open(dir.clone()).await?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self {
            store,
            model: Arc::new(OpenAiClient::new(&cfg.llm)?),
            channel: Arc::new(TelegramChannel::new(&cfg.telegram)?),
            target: Arc::new(GitHubTarget::new(&cfg.publish)?),
        })
    }
}

/// Fully wired application: the scheduled pipeline and the approval controller share
/// one store, one channel and one model client.
pub struct App {
    pub config: AppConfig,
    pub store: Arc<dyn ContentStore>,
    pub pipeline: Arc<Pipeline>,
    pub controller: Arc<ApprovalController>,
}

pub fn build(config: AppConfig, c: Collaborators) -> Result<App> {
    let batches = BatchManager::new(c.store.clone(), config.scheduler.batch_policy);
    let stats = Stats::new(c.store.clone());

    let pipeline = Pipeline::new(
        FeedAggregator::new(config.feeds.clone(), &config.ingest)?,
        DedupStore::new(c.store.clone(), config.dedup.clone()),
        BriefGenerator::new(c.model.clone(), config.llm.clone(), config.briefs.clone()),
        batches.clone(),
        stats.clone(),
        c.channel.clone(),
    );

    let controller = ApprovalController::new(
        config.telegram.chat_id.clone(),
        batches,
        ArticleGenerator::new(c.model.clone(), config.llm.clone()),
        Publisher::new(c.target.clone(), config.publish.clone()),
        c.channel.clone(),
        stats,
        ScheduleInfo {
            feeds: config.feeds.len(),
            interval_secs: config.scheduler.interval_secs,
        },
    );

    Ok(App {
        store: c.store,
        pipeline: Arc::new(pipeline),
        controller: Arc::new(controller),
        config,
    })
}
