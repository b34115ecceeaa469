// src/scheduler.rs
//! One ingestion cycle: fetch → dedup → briefs → batch → notify, and the periodic
//! trigger that runs it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::batch::{BatchManager, OpenOutcome};
use crate::briefs::BriefGenerator;
use crate::dedup::DedupStore;
use crate::ingest::FeedAggregator;
use crate::model::BatchId;
use crate::notify::NotificationChannel;
use crate::stats::Stats;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new_items: usize,
    pub briefs: usize,
    /// Batch shown to the reviewer this cycle.
    pub batch: Option<BatchId>,
    /// Live batch that suppressed this cycle.
    pub suppressed_by: Option<BatchId>,
    pub notified: bool,
}

pub struct Pipeline {
    aggregator: FeedAggregator,
    dedup: DedupStore,
    briefs: BriefGenerator,
    batches: BatchManager,
    stats: Stats,
    channel: Arc<dyn NotificationChannel>,
}

impl Pipeline {
    pub fn new(
        aggregator: FeedAggregator,
        dedup: DedupStore,
        briefs: BriefGenerator,
        batches: BatchManager,
        stats: Stats,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            aggregator,
            dedup,
            briefs,
            batches,
            stats,
            channel,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        if let Some(live) = self.batches.blocking_batch().await? {
            tracing::info!(target: "scheduler", batch = %live, "live batch pending, cycle suppressed");
            counter!("curator_cycles_suppressed_total").increment(1);
            report.suppressed_by = Some(live);
            return Ok(report);
        }

        let all = self.aggregator.fetch_all_feeds().await;
        report.fetched = all.len();

        let fresh = self.dedup.get_new_items(all).await?;
        report.new_items = fresh.len();
        tracing::info!(target: "scheduler", fetched = report.fetched, new = report.new_items, "found new items");
        if fresh.is_empty() {
            return Ok(report);
        }

        let briefs = self.briefs.generate_batch_briefs(&fresh).await;
        report.briefs = briefs.len();
        if briefs.is_empty() {
            tracing::warn!(target: "scheduler", "no briefs generated; items stay unprocessed");
            return Ok(report);
        }
        let surfaced: Vec<String> = briefs.iter().map(|b| b.news_item.id.clone()).collect();

        let now = Utc::now();
        let outcome = self.batches.open(briefs, now).await?;
        let batch = match outcome {
            OpenOutcome::Suppressed(live) => {
                report.suppressed_by = Some(live);
                return Ok(report);
            }
            OpenOutcome::Empty => return Ok(report),
            OpenOutcome::Created(b)
            | OpenOutcome::Merged { batch: b, .. }
            | OpenOutcome::Replaced { batch: b, .. } => b,
        };
        report.batch = Some(batch.batch_id.clone());

        // Items count as surfaced once their batch is stored; the menu can be re-sent.
        self.dedup.mark_processed(&surfaced).await?;
        if let Err(e) = self.stats.record_batch(now.date_naive(), report.briefs).await {
            tracing::warn!(target: "scheduler", error = ?e, "batch stats not recorded");
        }

        match self.channel.send(&crate::approval::menu::briefs_menu(&batch)).await {
            Ok(()) => report.notified = true,
            Err(e) => {
                counter!("curator_notify_failures_total").increment(1);
                tracing::error!(target: "scheduler", batch = %batch.batch_id, error = ?e, "briefs menu not delivered");
            }
        }

        counter!("curator_cycles_total").increment(1);
        gauge!("curator_last_cycle_ts").set(now.timestamp() as f64);
        tracing::info!(
            target: "scheduler",
            batch = %batch.batch_id,
            briefs = report.briefs,
            notified = report.notified,
            "cycle complete"
        );
        Ok(report)
    }
}

/// Run a cycle every `interval_secs`, first one after one full interval.
pub fn spawn_scheduler(pipeline: Arc<Pipeline>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(interval_secs.max(60));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = pipeline.run_cycle().await {
                counter!("curator_cycle_failures_total").increment(1);
                tracing::warn!(target: "scheduler", "cycle failed: {e:#}");
            }
        }
    })
}
