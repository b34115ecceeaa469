use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Button, NotificationChannel, OutboundMessage};
use crate::config::TelegramConfig;

/// Bot API hard limit on message text.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram Bot API channel bound to a single reviewer chat.
#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    max_retries: u8,
}

impl TelegramChannel {
    pub fn new(cfg: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building telegram http client")?;
        Ok(Self {
            client,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            bot_token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id.clone(),
            max_retries: cfg.max_retries.max(1),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T: Serialize + Sync>(&self, method: &str, body: &T) -> Result<()> {
        let url = self.method_url(method);
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self.client.post(&url).json(body).send().await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    // 4xx other than rate limiting will not improve on retry.
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if retryable && attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    let text = rsp.text().await.unwrap_or_default();
                    return Err(anyhow!("telegram {method} HTTP {status}: {text}"));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("telegram {method} request failed: {e}"));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Serialize)]
struct ReplyMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineButton<'a>>>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup<'a>>,
}

#[derive(Serialize)]
struct AnswerCallback<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

fn markup(rows: &[Vec<Button>]) -> Option<ReplyMarkup<'_>> {
    if rows.is_empty() {
        return None;
    }
    Some(ReplyMarkup {
        inline_keyboard: rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| InlineButton {
                        text: &b.label,
                        callback_data: &b.data,
                    })
                    .collect()
            })
            .collect(),
    })
}

/// Cut on a line boundary so no HTML tag is split.
pub fn clip_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(4);
    let mut out = String::new();
    let mut used = 0;
    for line in text.split_inclusive('\n') {
        let n = line.chars().count();
        if used + n > budget {
            break;
        }
        out.push_str(line);
        used += n;
    }
    out.push_str("\n…");
    out
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: clip_message(&msg.text, MAX_MESSAGE_CHARS),
            parse_mode: "HTML",
            disable_web_page_preview: true,
            reply_markup: markup(&msg.keyboard),
        };
        self.call("sendMessage", &body).await
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let body = AnswerCallback {
            callback_query_id: callback_id,
            text,
        };
        self.call("answerCallbackQuery", &body).await
    }
}
