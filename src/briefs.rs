// src/briefs.rs
//! Brief Generator: one summarization call per item, in fixed-size concurrent groups
//! with a pause between groups.
//!
//! A call that keeps failing drops its item for this cycle (it is not marked
//! processed, so it comes back next cycle). A call that succeeds but returns
//! something unparsable yields a deterministic brief built from the item itself.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use serde::Deserialize;

use crate::config::{BriefConfig, LlmConfig};
use crate::llm::{CompletionRequest, LanguageModel, LlmError, SYSTEM_PROMPT};
use crate::model::{NewsBrief, NewsItem};

const FALLBACK_SUMMARY_CHARS: usize = 200;
const MAX_TAGS: usize = 5;

pub struct BriefGenerator {
    model: Arc<dyn LanguageModel>,
    llm: LlmConfig,
    cfg: BriefConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BriefDraft {
    #[serde(default, alias = "summary_text")]
    summary: String,
    #[serde(default, alias = "suggested_title", alias = "title")]
    suggested_title: String,
    #[serde(default, alias = "suggested_tags", alias = "tags")]
    suggested_tags: Vec<String>,
}

impl BriefGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, llm: LlmConfig, cfg: BriefConfig) -> Self {
        Self { model, llm, cfg }
    }

    fn request_for(&self, item: &NewsItem) -> CompletionRequest {
        CompletionRequest {
            model: self.llm.brief_model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: brief_prompt(item),
            max_tokens: self.llm.brief_max_tokens,
            temperature: self.llm.temperature,
        }
    }

    /// Summarize one item. Errors only when every attempt at the model call failed.
    pub async fn generate_brief(&self, item: &NewsItem) -> Result<NewsBrief, LlmError> {
        let req = self.request_for(item);
        let mut attempt: u8 = 0;
        let raw = loop {
            match self.model.complete(&req).await {
                Ok(raw) => break raw,
                Err(e) if attempt < self.cfg.retries => {
                    attempt += 1;
                    tracing::debug!(target: "briefs", item = %item.id, attempt, error = %e, "retrying brief");
                    tokio::time::sleep(Duration::from_millis(250u64 << attempt.min(4))).await;
                }
                Err(e) => return Err(e),
            }
        };

        match parse_brief_response(&raw, item) {
            Some(brief) => Ok(brief),
            None => {
                tracing::warn!(target: "briefs", item = %item.id, "unparsable brief response, using fallback");
                counter!("curator_brief_fallbacks_total").increment(1);
                Ok(fallback_brief(item))
            }
        }
    }

    /// Items are processed in groups of `concurrency`; order of the output follows input.
    pub async fn generate_batch_briefs(&self, items: &[NewsItem]) -> Vec<NewsBrief> {
        let size = self.cfg.concurrency.max(1);
        let groups = items.chunks(size).count();
        let mut briefs = Vec::with_capacity(items.len());

        for (gi, group) in items.chunks(size).enumerate() {
            let results = join_all(group.iter().map(|item| self.generate_brief(item))).await;
            for (item, res) in group.iter().zip(results) {
                match res {
                    Ok(b) => briefs.push(b),
                    Err(e) => {
                        tracing::warn!(target: "briefs", item = %item.id, title = %item.title, error = %e, "brief dropped");
                        counter!("curator_brief_failures_total").increment(1);
                    }
                }
            }
            if gi + 1 < groups {
                tokio::time::sleep(Duration::from_millis(self.cfg.group_delay_ms)).await;
            }
        }

        counter!("curator_briefs_generated_total").increment(briefs.len() as u64);
        briefs
    }
}

pub fn brief_prompt(item: &NewsItem) -> String {
    format!(
        r#"You are a tech news curator. Create a brief summary of this news item for a tech blog.

News Item:
Title: {title}
Description: {description}
Source: {source}
Category: {category}
Link: {link}

Please provide:
1. A concise summary (2-3 sentences)
2. A catchy blog title
3. Relevant tags (3-5 tags)

Format your response as JSON:
{{
  "summary": "brief summary here",
  "suggestedTitle": "catchy title here",
  "suggestedTags": ["tag1", "tag2", "tag3"]
}}"#,
        title = item.title,
        description = item.description,
        source = item.source,
        category = item.category,
        link = item.link,
    )
}

/// Extract the JSON object from a model answer (tolerates code fences and chatter
/// around it). `None` when there is no usable summary and title.
pub fn parse_brief_response(raw: &str, item: &NewsItem) -> Option<NewsBrief> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let draft: BriefDraft = serde_json::from_str(&raw[start..=end]).ok()?;

    let summary = draft.summary.trim().to_string();
    let title = draft.suggested_title.trim().to_string();
    if summary.is_empty() || title.is_empty() {
        return None;
    }

    let mut tags: Vec<String> = Vec::new();
    for t in draft.suggested_tags {
        let t = t.trim().trim_start_matches('#').to_string();
        if !t.is_empty() && !tags.iter().any(|x| x.eq_ignore_ascii_case(&t)) {
            tags.push(t);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    if tags.is_empty() {
        tags.push(item.category.to_string());
    }

    Some(NewsBrief::new(item.clone(), summary, title, tags))
}

/// Deterministic brief straight from the item: truncated description, original title,
/// category as the only tag. Never yields empty fields.
pub fn fallback_brief(item: &NewsItem) -> NewsBrief {
    let desc = item.description.trim();
    let summary = if desc.is_empty() {
        item.title.clone()
    } else if desc.chars().count() > FALLBACK_SUMMARY_CHARS {
        let head: String = desc.chars().take(FALLBACK_SUMMARY_CHARS).collect();
        format!("{}...", head.trim_end())
    } else {
        desc.to_string()
    };
    let title = if item.title.trim().is_empty() {
        item.source.clone()
    } else {
        item.title.clone()
    };
    NewsBrief::new(item.clone(), summary, title, vec![item.category.to_string()])
}
