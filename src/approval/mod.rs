// src/approval/mod.rs
//! Approval Controller: the human-in-the-loop state machine.
//!
//! Commands are informational. Button presses are acknowledged before any work starts,
//! then dispatched on [`CallbackAction`]. Every callback names its batch, so acting on
//! an older menu never touches a newer batch.

pub mod event;
pub mod menu;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use metrics::counter;

use crate::articles::ArticleGenerator;
use crate::batch::BatchManager;
use crate::model::{Batch, BatchId};
use crate::notify::{NotificationChannel, OutboundMessage};
use crate::publish::Publisher;
use crate::stats::Stats;

pub use event::{CallbackAction, Command, InboundEvent, Update};
use menu::ItemOutcome;

/// Static facts shown by `/status` and `/help`.
#[derive(Debug, Clone)]
pub struct ScheduleInfo {
    pub feeds: usize,
    pub interval_secs: u64,
}

pub struct ApprovalController {
    reviewer_chat: String,
    batches: BatchManager,
    articles: ArticleGenerator,
    publisher: Publisher,
    channel: Arc<dyn NotificationChannel>,
    stats: Stats,
    schedule: ScheduleInfo,
}

impl ApprovalController {
    pub fn new(
        reviewer_chat: impl Into<String>,
        batches: BatchManager,
        articles: ArticleGenerator,
        publisher: Publisher,
        channel: Arc<dyn NotificationChannel>,
        stats: Stats,
        schedule: ScheduleInfo,
    ) -> Self {
        Self {
            reviewer_chat: reviewer_chat.into(),
            batches,
            articles,
            publisher,
            channel,
            stats,
            schedule,
        }
    }

    pub async fn handle_update(&self, update: &Update) -> Result<()> {
        let event = InboundEvent::from_update(update, &self.reviewer_chat);
        self.handle_event(event).await
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Command(cmd) => self.on_command(cmd).await,
            InboundEvent::Callback {
                callback_id,
                action,
            } => {
                let ack = action.as_ref().map(|_| "Working on it…");
                if let Err(e) = self.channel.acknowledge(&callback_id, ack).await {
                    tracing::warn!(target: "approval", error = ?e, "callback acknowledgement failed");
                }
                match action {
                    Some(action) => {
                        let res = self.on_callback(action).await;
                        if let Err(e) = &res {
                            self.say(OutboundMessage::text(format!(
                                "❌ Request failed: {}",
                                html_escape::encode_text(&format!("{e:#}"))
                            )))
                            .await;
                        }
                        res
                    }
                    None => {
                        tracing::warn!(target: "approval", callback = %callback_id, "unknown callback payload");
                        Ok(())
                    }
                }
            }
            InboundEvent::Unauthorized {
                chat_id,
                callback_id,
            } => {
                counter!("curator_unauthorized_events_total").increment(1);
                tracing::warn!(target: "approval", chat_id, "event from unauthorized chat ignored");
                if let Some(id) = callback_id {
                    if let Err(e) = self.channel.acknowledge(&id, Some("Not authorized")).await {
                        tracing::debug!(target: "approval", error = ?e, "ack to unauthorized chat failed");
                    }
                }
                Ok(())
            }
            InboundEvent::Ignored => Ok(()),
        }
    }

    /// Store writes after publication must not abort the reply; they are collected instead.
    fn note_bookkeeping(notes: &mut Vec<String>, what: &str, e: anyhow::Error) {
        counter!("curator_bookkeeping_failures_total").increment(1);
        tracing::error!(target: "approval", what, error = ?e, "post-publication store write failed");
        notes.push(format!("{what}: {e:#}"));
    }

    async fn say(&self, msg: OutboundMessage) {
        if let Err(e) = self.channel.send(&msg).await {
            counter!("curator_notify_failures_total").increment(1);
            tracing::warn!(target: "approval", error = ?e, "reviewer message not delivered");
        }
    }

    async fn on_command(&self, cmd: Command) -> Result<()> {
        tracing::info!(target: "approval", ?cmd, "command");
        let interval = self.schedule.interval_secs;
        let msg = match cmd {
            Command::Start => menu::welcome_message(interval),
            Command::Help => menu::help_message(interval),
            Command::Status => {
                let live = self.batches.current().await?;
                menu::status_message(
                    live.as_ref().map_or(0, |b| b.briefs.len()),
                    live.as_ref().map(|b| b.batch_id.as_str()),
                    self.schedule.feeds,
                    interval,
                )
            }
            Command::Stats => {
                let snap = self.stats.snapshot(Utc::now().date_naive()).await?;
                menu::stats_message(&snap, interval)
            }
        };
        self.say(msg).await;
        Ok(())
    }

    async fn on_callback(&self, action: CallbackAction) -> Result<()> {
        tracing::info!(target: "approval", payload = %action.encode(), "callback");
        match action {
            CallbackAction::Approve { batch, brief_id } => self.approve_one(batch, &brief_id).await,
            CallbackAction::ApproveAll { batch } => self.approve_all(batch).await,
            CallbackAction::SkipAll { batch } => self.skip_all(batch).await,
            CallbackAction::ViewStats => self.on_command(Command::Stats).await,
            CallbackAction::RefreshBriefs => self.refresh().await,
        }
    }

    async fn target_batch(&self, batch: Option<BatchId>) -> Result<Option<Batch>> {
        match batch {
            Some(id) => self.batches.load(&id).await,
            None => self.batches.current().await,
        }
    }

    async fn approve_one(&self, batch: Option<BatchId>, brief_id: &str) -> Result<()> {
        let Some(batch) = self.target_batch(batch).await? else {
            self.say(OutboundMessage::text("❌ No current batch found.")).await;
            return Ok(());
        };
        let Some(brief) = batch.brief(brief_id).cloned() else {
            self.say(OutboundMessage::text("❌ Article not found in current batch."))
                .await;
            return Ok(());
        };

        self.say(OutboundMessage::text("🔄 Processing approved article...")).await;

        // On any failure the brief stays in its batch so the button can be pressed again.
        let article = match self.articles.generate_full_article(&brief).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(target: "approval", brief = %brief.id, error = ?e, "article generation failed");
                self.say(OutboundMessage::text(format!(
                    "❌ Failed to generate: {}",
                    html_escape::encode_text(&brief.suggested_title)
                )))
                .await;
                return Ok(());
            }
        };

        let report = self.publisher.publish(&[(brief.clone(), article)]).await;
        let Some(published) = report.published.first() else {
            self.say(OutboundMessage::text(format!(
                "❌ Failed to publish: {}",
                html_escape::encode_text(&brief.suggested_title)
            )))
            .await;
            return Ok(());
        };

        let mut notes = Vec::new();
        match self.batches.take_brief(&batch.batch_id, &brief.id).await {
            Ok(Some((mut resolved, _))) => {
                if let Err(e) = resolved.approve() {
                    tracing::warn!(target: "approval", error = %e, "brief already resolved");
                }
                if let Err(e) = self.batches.archive_brief(&resolved).await {
                    Self::note_bookkeeping(&mut notes, "archive", e);
                }
            }
            Ok(None) => {}
            Err(e) => Self::note_bookkeeping(
                &mut notes,
                "brief still listed in its batch, do not approve it again",
                e,
            ),
        }
        if let Err(e) = self.stats.record_published(Utc::now().date_naive(), 1).await {
            Self::note_bookkeeping(&mut notes, "stats", e);
        }

        let msg = OutboundMessage::text(format!(
            "✅ Published: <a href=\"{}\">{}</a>",
            html_escape::encode_text(&published.url),
            html_escape::encode_text(&published.title)
        ));
        self.say(menu::with_bookkeeping_notes(msg, &notes)).await;
        Ok(())
    }

    /// Every brief in order; one failure never stops the rest. The batch is cleared at the end.
    async fn approve_all(&self, batch: Option<BatchId>) -> Result<()> {
        let batch = match self.target_batch(batch).await? {
            Some(b) if !b.is_empty() => b,
            _ => {
                self.say(OutboundMessage::text("❌ No articles to process.")).await;
                return Ok(());
            }
        };
        let id = batch.batch_id.clone();
        let batch = self.batches.mark_processing(&id).await?.unwrap_or(batch);

        self.say(OutboundMessage::text(format!(
            "🔄 Processing {} approved articles...",
            batch.briefs.len()
        )))
        .await;

        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; batch.briefs.len()];
        let mut generated = Vec::new();
        for (i, brief) in batch.briefs.iter().enumerate() {
            match self.articles.generate_full_article(brief).await {
                Ok(article) => generated.push((i, brief.clone(), article)),
                Err(e) => {
                    tracing::warn!(target: "approval", brief = %brief.id, error = ?e, "article generation failed");
                    outcomes[i] = Some(ItemOutcome::Failed {
                        title: brief.suggested_title.clone(),
                        reason: format!("generation failed: {e}"),
                    });
                }
            }
        }

        let pairs: Vec<_> = generated
            .iter()
            .map(|(_, b, a)| (b.clone(), a.clone()))
            .collect();
        let report = self.publisher.publish(&pairs).await;

        let mut notes = Vec::new();
        for (i, brief, _) in &generated {
            let outcome = match report.published.iter().find(|p| p.brief_id == brief.id) {
                Some(p) => {
                    let mut resolved = brief.clone();
                    if resolved.approve().is_ok() {
                        if let Err(e) = self.batches.archive_brief(&resolved).await {
                            Self::note_bookkeeping(&mut notes, "archive", e);
                        }
                    }
                    ItemOutcome::Published {
                        title: p.title.clone(),
                        url: p.url.clone(),
                    }
                }
                None => {
                    let reason = report
                        .failed
                        .iter()
                        .find(|f| f.brief_id == brief.id)
                        .map(|f| format!("commit failed: {}", f.error))
                        .unwrap_or_else(|| "commit failed".to_string());
                    ItemOutcome::Failed {
                        title: brief.suggested_title.clone(),
                        reason,
                    }
                }
            };
            outcomes[*i] = Some(outcome);
        }

        if let Err(e) = self.batches.clear(&id).await {
            Self::note_bookkeeping(&mut notes, "batch still open, do not approve it again", e);
        }
        if let Err(e) = self
            .stats
            .record_published(Utc::now().date_naive(), report.success_count())
            .await
        {
            Self::note_bookkeeping(&mut notes, "stats", e);
        }

        let outcomes: Vec<ItemOutcome> = outcomes.into_iter().flatten().collect();
        tracing::info!(
            target: "approval",
            batch = %id,
            published = report.success_count(),
            total = outcomes.len(),
            "approve_all finished"
        );
        self.say(menu::with_bookkeeping_notes(
            menu::approve_all_report(&outcomes),
            &notes,
        ))
        .await;
        Ok(())
    }

    async fn skip_all(&self, batch: Option<BatchId>) -> Result<()> {
        let Some(batch) = self.target_batch(batch).await? else {
            self.say(OutboundMessage::text("❌ No current batch found.")).await;
            return Ok(());
        };
        let Some(batch) = self.batches.clear(&batch.batch_id).await? else {
            self.say(OutboundMessage::text("❌ No current batch found.")).await;
            return Ok(());
        };

        for brief in &batch.briefs {
            let mut rejected = brief.clone();
            if rejected.reject().is_ok() {
                self.batches.archive_brief(&rejected).await?;
            }
        }
        counter!("curator_briefs_skipped_total").increment(batch.briefs.len() as u64);
        self.say(OutboundMessage::text(format!(
            "⏭️ Skipped all {} articles in this batch.",
            batch.briefs.len()
        )))
        .await;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        match self.batches.current().await? {
            Some(b) if !b.is_empty() => self.say(menu::briefs_menu(&b)).await,
            _ => {
                self.say(OutboundMessage::text(
                    "✅ No pending briefs. A new batch will be available after the next scheduled run.",
                ))
                .await
            }
        }
        Ok(())
    }
}
