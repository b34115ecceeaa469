//! Reviewer notification channel.
//!
//! The pipeline only needs two things from the chat provider: send a message (with an
//! optional inline keyboard) to the configured reviewer, and acknowledge a button press.

pub mod telegram;

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

pub use telegram::TelegramChannel;

/// One inline button. `data` is the opaque callback payload echoed back on press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// HTML-formatted text plus keyboard rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;
    /// Clear the provider's "pending" indicator for a button press.
    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message(OutboundMessage),
    Ack {
        callback_id: String,
        text: Option<String>,
    },
}

/// In-memory channel keeping every delivery in order. Used by tests and dry runs.
#[derive(Default)]
pub struct RecordingChannel {
    log: Mutex<Vec<Delivery>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Message(m) => Some(m),
                Delivery::Ack { .. } => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    fn push(&self, d: Delivery) {
        if let Ok(mut l) = self.log.lock() {
            l.push(d);
        }
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        self.push(Delivery::Message(msg.clone()));
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.push(Delivery::Ack {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
