// Reviewer-facing message builders (Telegram HTML).

use std::fmt::Write as _;

use crate::approval::event::CallbackAction;
use crate::model::{Batch, NewsBrief};
use crate::notify::{Button, OutboundMessage};
use crate::stats::DaySnapshot;

const SUMMARY_PREVIEW_CHARS: usize = 100;
const TAGS_SHOWN: usize = 3;
const APPROVE_BUTTONS_PER_ROW: usize = 5;

fn esc(s: &str) -> String {
    html_escape::encode_text(s).to_string()
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

fn brief_lines(out: &mut String, index: usize, b: &NewsBrief) {
    let tags = b
        .suggested_tags
        .iter()
        .take(TAGS_SHOWN)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let more = if b.suggested_tags.len() > TAGS_SHOWN { "..." } else { "" };
    let _ = writeln!(
        out,
        "{}. {} <b>{}</b>",
        index + 1,
        b.news_item.category.emoji(),
        esc(&b.suggested_title)
    );
    let _ = writeln!(out, "   📝 {}", esc(&preview(&b.summary, SUMMARY_PREVIEW_CHARS)));
    let _ = writeln!(out, "   🏷️ {}{more}", esc(&tags));
    let _ = writeln!(out, "   📰 Source: {}\n", esc(&b.news_item.source));
}

/// Numbered brief list plus approve buttons bound to this batch.
pub fn briefs_menu(batch: &Batch) -> OutboundMessage {
    if batch.briefs.is_empty() {
        return OutboundMessage::text("No new news items found in this batch.");
    }

    let mut text = String::from("📰 <b>New Tech News Briefs</b>\n\n");
    let _ = writeln!(
        text,
        "Found {} new articles. Choose which ones to publish:\n",
        batch.briefs.len()
    );
    for (i, b) in batch.briefs.iter().enumerate() {
        brief_lines(&mut text, i, b);
    }
    text.push_str("Use the buttons below to approve articles:");

    let id = Some(batch.batch_id.clone());
    let approve: Vec<Button> = batch
        .briefs
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let action = CallbackAction::Approve {
                batch: id.clone(),
                brief_id: b.id.clone(),
            };
            Button::new(format!("✅ #{}", i + 1), action.encode())
        })
        .collect();

    let mut rows: Vec<Vec<Button>> = approve
        .chunks(APPROVE_BUTTONS_PER_ROW)
        .map(<[Button]>::to_vec)
        .collect();
    rows.push(vec![
        Button::new("✅ Approve All", CallbackAction::ApproveAll { batch: id.clone() }.encode()),
        Button::new("❌ Skip All", CallbackAction::SkipAll { batch: id }.encode()),
    ]);
    rows.push(vec![
        Button::new("📊 View Stats", CallbackAction::ViewStats.encode()),
        Button::new("🔄 Refresh", CallbackAction::RefreshBriefs.encode()),
    ]);

    OutboundMessage::text(text).with_keyboard(rows)
}

pub fn welcome_message(interval_secs: u64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "🤖 Welcome to Tech News Bot!\n\nI'll send you news briefs every {}. Use the buttons to approve articles for publishing.",
        human_interval(interval_secs)
    ))
}

pub fn help_message(interval_secs: u64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "📖 <b>Available Commands:</b>\n\n/start - Start the bot\n/status - Check current status\n/stats - Today's statistics\n/help - Show this help\n\nI'll automatically send you news briefs every {}!",
        human_interval(interval_secs)
    ))
}

pub fn status_message(
    pending: usize,
    batch: Option<&str>,
    feeds: usize,
    interval_secs: u64,
) -> OutboundMessage {
    let mut text = String::from("📊 <b>Bot Status</b>\n\n");
    let _ = writeln!(text, "🔄 Pending articles: {pending}");
    if let Some(id) = batch {
        let _ = writeln!(text, "🗂️ Live batch: <code>{}</code>", esc(id));
    }
    let _ = writeln!(text, "⏰ Next batch: Every {}", human_interval(interval_secs));
    let _ = writeln!(text, "📰 Sources: {feeds} RSS feeds");
    text.push_str("🤖 Status: Active");
    OutboundMessage::text(text)
}

pub fn stats_message(snap: &DaySnapshot, interval_secs: u64) -> OutboundMessage {
    let mut text = String::from("📊 <b>Today's Statistics</b>\n\n");
    if let Some(b) = &snap.batch {
        let _ = writeln!(text, "🔄 Batches processed: {}", b.batches);
        let _ = writeln!(text, "📝 Total briefs generated: {}", b.total_briefs);
    }
    if let Some(d) = &snap.daily {
        let _ = writeln!(text, "✅ Articles published: {}", d.published);
    }
    if snap.batch.is_none() && snap.daily.is_none() {
        text.push_str("Nothing recorded yet today.\n");
    }
    if let Some(date) = snap.date {
        let _ = write!(text, "\n📅 Date: {}\n", date.format("%Y-%m-%d"));
    }
    let _ = write!(text, "⏰ Next update: Every {}", human_interval(interval_secs));
    OutboundMessage::text(text)
}

/// Outcome line per brief after an approve-all run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Published { title: String, url: String },
    Failed { title: String, reason: String },
}

pub fn approve_all_report(outcomes: &[ItemOutcome]) -> OutboundMessage {
    let ok = outcomes
        .iter()
        .filter(|o| matches!(o, ItemOutcome::Published { .. }))
        .count();
    let mut text = format!(
        "✅ Successfully processed {ok} of {} articles!\n\n",
        outcomes.len()
    );
    for o in outcomes {
        match o {
            ItemOutcome::Published { title, url } => {
                let _ = writeln!(text, "✅ <a href=\"{}\">{}</a>", esc(url), esc(title));
            }
            ItemOutcome::Failed { title, reason } => {
                let _ = writeln!(
                    text,
                    "❌ {}: {}",
                    esc(title),
                    esc(&preview(reason, 120))
                );
            }
        }
    }
    OutboundMessage::text(text.trim_end().to_string())
}

/// Appends what could not be recorded after articles went out.
pub fn with_bookkeeping_notes(mut msg: OutboundMessage, notes: &[String]) -> OutboundMessage {
    if notes.is_empty() {
        return msg;
    }
    msg.text.push_str("\n\n⚠️ Published, but state was not fully saved:");
    for n in notes {
        let _ = write!(msg.text, "\n• {}", esc(&preview(n, 160)));
    }
    msg
}

fn human_interval(secs: u64) -> String {
    match secs {
        s if s % 3600 == 0 && s / 3600 == 1 => "hour".to_string(),
        s if s % 3600 == 0 => format!("{} hours", s / 3600),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{s} seconds"),
    }
}
