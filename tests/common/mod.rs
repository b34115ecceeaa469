// tests/common/mod.rs
//
// Shared fakes for integration tests: a scripted language model, sample items/briefs,
// and a fully wired App over in-memory collaborators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use chrono::{Duration, TimeZone, Utc};

use news_curator::config::AppConfig;
use news_curator::llm::{CompletionRequest, LanguageModel, LlmError};
use news_curator::model::{Category, NewsBrief, NewsItem};
use news_curator::notify::RecordingChannel;
use news_curator::publish::InMemoryTarget;
use news_curator::store::{ContentStore, Expected, MemoryStore, StoreError, Versioned};
use news_curator::{build, App, Collaborators};

pub const REVIEWER_CHAT: &str = "42";

pub const LONG_DESC: &str =
    "A sufficiently long description of the story that clears the fifty character minimum.";

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Language model answering through a closure; every request is recorded.
pub struct ScriptedModel {
    respond: Box<Responder>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new<F>(f: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(f),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn models_used(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.model).collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push(req.clone());
        (self.respond)(req)
    }
}

pub fn brief_json(title: &str) -> String {
    format!(
        r#"{{"summary":"Summary of {title}.","suggestedTitle":"{title}","suggestedTags":["tech","news"]}}"#
    )
}

pub fn article_markdown(title: &str) -> String {
    format!(
        "---\ntitle: \"{title}\"\ndescription: \"About {title}\"\n---\n\n## {title}\n\nFull article body."
    )
}

/// Briefs get JSON, articles get markdown, unless the prompt mentions `fail_marker`
/// in which case article calls answer 500 on every model.
pub fn editorial_model(fail_marker: Option<&'static str>) -> Arc<ScriptedModel> {
    ScriptedModel::new(move |req| {
        let is_article = req.prompt.starts_with("Write a professional blog article");
        if is_article {
            if let Some(m) = fail_marker {
                if req.prompt.contains(m) {
                    return Err(LlmError::Status {
                        status: 500,
                        body: "upstream exploded".into(),
                    });
                }
            }
            let title = req
                .prompt
                .lines()
                .find_map(|l| l.strip_prefix("Title: "))
                .unwrap_or("Untitled")
                .to_string();
            Ok(article_markdown(&title))
        } else {
            let title = req
                .prompt
                .lines()
                .find_map(|l| l.strip_prefix("Title: "))
                .unwrap_or("Untitled")
                .to_string();
            Ok(brief_json(&format!("Brief: {title}")))
        }
    })
}

pub fn item(n: u32) -> NewsItem {
    NewsItem::new(
        format!("Story number {n} headline"),
        LONG_DESC,
        format!("https://news.example.com/story-{n}"),
        Some(Utc.with_ymd_and_hms(2025, 10, 14, 6, 0, 0).unwrap() + Duration::minutes(n as i64)),
        "Example",
        Category::Tech,
    )
}

pub fn brief(n: u32) -> NewsBrief {
    NewsBrief::new(
        item(n),
        format!("Summary {n}."),
        format!("Headline {n}"),
        vec!["tech".into()],
    )
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.telegram.chat_id = REVIEWER_CHAT.to_string();
    cfg.publish.group_delay_ms = 0;
    cfg.briefs.group_delay_ms = 0;
    cfg.briefs.retries = 0;
    cfg.store.dir = None;
    cfg
}

pub struct Harness {
    pub app: App,
    pub model: Arc<ScriptedModel>,
    pub channel: Arc<RecordingChannel>,
    pub target: Arc<InMemoryTarget>,
}

/// In-memory store whose writes fail for keys under the given prefixes.
pub struct FailingStore {
    inner: MemoryStore,
    failing: Mutex<Vec<&'static str>>,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failing: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_writes(&self, prefixes: &[&'static str]) {
        *self.failing.lock().unwrap() = prefixes.to_vec();
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().iter().any(|p| key.starts_with(p)) {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value, expected: Expected) -> Result<u64, StoreError> {
        self.check(key)?;
        self.inner.put(key, value, expected).await
    }

    async fn delete(&self, key: &str, expected: Expected) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.delete(key, expected).await
    }
}

pub fn harness(cfg: AppConfig, model: Arc<ScriptedModel>) -> Harness {
    harness_with_store(cfg, model, Arc::new(MemoryStore::new()))
}

pub fn harness_with_store(
    cfg: AppConfig,
    model: Arc<ScriptedModel>,
    store: Arc<dyn ContentStore>,
) -> Harness {
    let channel = Arc::new(RecordingChannel::new());
    let target = Arc::new(InMemoryTarget::new());
    let app = build(
        cfg,
        Collaborators {
            store,
            model: model.clone(),
            channel: channel.clone(),
            target: target.clone(),
        },
    )
    .expect("build app");
    Harness {
        app,
        model,
        channel,
        target,
    }
}

pub fn callback_update(id: &str, data: &str) -> news_curator::approval::Update {
    serde_json::from_value(serde_json::json!({
        "update_id": 1,
        "callback_query": {
            "id": id,
            "from": { "id": 42 },
            "message": { "message_id": 7, "chat": { "id": 42 } },
            "data": data
        }
    }))
    .expect("callback update")
}

pub fn text_update(chat: i64, text: &str) -> news_curator::approval::Update {
    serde_json::from_value(serde_json::json!({
        "update_id": 2,
        "message": { "message_id": 9, "chat": { "id": chat }, "text": text }
    }))
    .expect("text update")
}
