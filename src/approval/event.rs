//! Inbound chat events: the Telegram update shape we read, and the closed sets of
//! commands and button actions the controller understands.

use serde::Deserialize;

use crate::model::BatchId;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Help,
    Stats,
}

impl Command {
    /// `/status`, `/status@MyBot` and `/STATUS extra` all parse; plain text does not.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let word = word.split('@').next().unwrap_or(word).to_ascii_lowercase();
        match word.as_str() {
            "/start" => Some(Command::Start),
            "/status" => Some(Command::Status),
            "/help" => Some(Command::Help),
            "/stats" => Some(Command::Stats),
            _ => None,
        }
    }
}

/// Button payloads. `batch` is `None` only for payloads sent before batch ids were
/// embedded; those target the live batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Approve {
        batch: Option<BatchId>,
        brief_id: String,
    },
    ApproveAll {
        batch: Option<BatchId>,
    },
    SkipAll {
        batch: Option<BatchId>,
    },
    ViewStats,
    RefreshBriefs,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let data = data.trim();
        let batch_of = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| BatchId(s.to_string()))
        };
        match data {
            "view_stats" => return Some(CallbackAction::ViewStats),
            "refresh_briefs" => return Some(CallbackAction::RefreshBriefs),
            "approve_all" => return Some(CallbackAction::ApproveAll { batch: None }),
            "skip_all" => return Some(CallbackAction::SkipAll { batch: None }),
            _ => {}
        }
        if let Some(id) = data.strip_prefix("approve_all:") {
            return Some(CallbackAction::ApproveAll { batch: Some(batch_of(id)?) });
        }
        if let Some(id) = data.strip_prefix("skip_all:") {
            return Some(CallbackAction::SkipAll { batch: Some(batch_of(id)?) });
        }
        if let Some(rest) = data.strip_prefix("approve:") {
            let (batch, brief) = rest.split_once(':')?;
            if brief.is_empty() {
                return None;
            }
            return Some(CallbackAction::Approve {
                batch: Some(batch_of(batch)?),
                brief_id: brief.to_string(),
            });
        }
        if let Some(brief) = data.strip_prefix("approve_") {
            if brief.is_empty() {
                return None;
            }
            return Some(CallbackAction::Approve {
                batch: None,
                brief_id: brief.to_string(),
            });
        }
        None
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Approve {
                batch: Some(b),
                brief_id,
            } => format!("approve:{b}:{brief_id}"),
            CallbackAction::Approve {
                batch: None,
                brief_id,
            } => format!("approve_{brief_id}"),
            CallbackAction::ApproveAll { batch: Some(b) } => format!("approve_all:{b}"),
            CallbackAction::ApproveAll { batch: None } => "approve_all".to_string(),
            CallbackAction::SkipAll { batch: Some(b) } => format!("skip_all:{b}"),
            CallbackAction::SkipAll { batch: None } => "skip_all".to_string(),
            CallbackAction::ViewStats => "view_stats".to_string(),
            CallbackAction::RefreshBriefs => "refresh_briefs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command(Command),
    /// `action` is `None` for payloads we do not recognise; they are still acknowledged.
    Callback {
        callback_id: String,
        action: Option<CallbackAction>,
    },
    /// From a chat other than the reviewer's.
    Unauthorized {
        chat_id: i64,
        callback_id: Option<String>,
    },
    Ignored,
}

impl InboundEvent {
    pub fn from_update(update: &Update, reviewer_chat: &str) -> Self {
        let authorized = |id: i64| id.to_string() == reviewer_chat.trim();

        if let Some(cb) = &update.callback_query {
            let chat_id = cb.message.as_ref().map(|m| m.chat.id).unwrap_or(cb.from.id);
            if !authorized(chat_id) {
                return InboundEvent::Unauthorized {
                    chat_id,
                    callback_id: Some(cb.id.clone()),
                };
            }
            return InboundEvent::Callback {
                callback_id: cb.id.clone(),
                action: cb.data.as_deref().and_then(CallbackAction::parse),
            };
        }

        if let Some(msg) = &update.message {
            let Some(command) = msg.text.as_deref().and_then(Command::parse) else {
                return InboundEvent::Ignored;
            };
            if !authorized(msg.chat.id) {
                return InboundEvent::Unauthorized {
                    chat_id: msg.chat.id,
                    callback_id: None,
                };
            }
            return InboundEvent::Command(command);
        }

        InboundEvent::Ignored
    }
}
