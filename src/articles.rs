// src/articles.rs
//! Article Generator: expands an approved brief into a publishable markdown article.
//!
//! One call against the primary model; a transport failure or server-class answer gets
//! exactly one more attempt against the fallback model. The model's front matter is not
//! trusted verbatim: it is re-rendered from the brief, keeping only its description.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use metrics::counter;

use crate::config::LlmConfig;
use crate::llm::{CompletionRequest, LanguageModel, LlmError, SYSTEM_PROMPT};
use crate::model::NewsBrief;

const SLUG_MAX_CHARS: usize = 50;
const DESCRIPTION_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub tags: Vec<String>,
    pub source: String,
    pub source_url: String,
}

/// A generated article, ready to be written to the publication target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub slug: String,
    pub front_matter: FrontMatter,
    pub body: String,
    /// Model that produced the body.
    pub model: String,
}

impl Article {
    /// `YYYY-MM-DD-<slug>`, also the public URL path segment.
    pub fn stem(&self) -> String {
        format!("{}-{}", self.front_matter.date.format("%Y-%m-%d"), self.slug)
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.stem())
    }

    pub fn path_in(&self, content_dir: &str) -> String {
        let dir = content_dir.trim_end_matches('/');
        if dir.is_empty() {
            self.file_name()
        } else {
            format!("{dir}/{}", self.file_name())
        }
    }

    pub fn render(&self) -> String {
        let fm = &self.front_matter;
        let tags = fm
            .tags
            .iter()
            .map(|t| yaml_quote(t))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "---\ntitle: {}\ndescription: {}\ndate: \"{}\"\ntags: [{}]\nsource: {}\nsourceUrl: {}\n---\n\n{}\n",
            yaml_quote(&fm.title),
            yaml_quote(&fm.description),
            fm.date.format("%Y-%m-%d"),
            tags,
            yaml_quote(&fm.source),
            yaml_quote(&fm.source_url),
            self.body.trim(),
        )
    }
}

fn yaml_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', " ");
    format!("\"{escaped}\"")
}

/// Lowercase, keep `[a-z0-9 -]`, whitespace runs become `-`, at most 50 chars.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let dashed = kept.split_whitespace().collect::<Vec<_>>().join("-");
    let slug: String = dashed.chars().take(SLUG_MAX_CHARS).collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "article".to_string()
    } else {
        slug
    }
}

pub fn article_prompt(brief: &NewsBrief, date: NaiveDate) -> String {
    let tags = brief
        .suggested_tags
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"Write a professional blog article based on this news brief. The article should be engaging, informative, and SEO-optimized.

News Brief:
Title: {title}
Summary: {summary}
Original Source: {source}
Original Link: {link}
Tags: {tag_list}

Requirements:
- Write 800-1200 words
- Include proper headings and structure
- Add relevant context and background information
- Include the original source link
- Make it engaging for tech enthusiasts
- Use markdown format
- Include SEO-friendly meta description

Format the response as a complete markdown article with frontmatter:

---
title: "{title}"
description: "SEO description here"
date: "{date}"
tags: [{tags}]
source: "{source}"
sourceUrl: "{link}"
---

[Article content here in markdown format]"#,
        title = brief.suggested_title,
        summary = brief.summary,
        source = brief.news_item.source,
        link = brief.news_item.link,
        tag_list = brief.suggested_tags.join(", "),
        date = date.format("%Y-%m-%d"),
        tags = tags,
    )
}

/// Model output split into its front-matter description (if any) and body.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedOutput {
    pub description: Option<String>,
    pub body: String,
}

/// Accepts output with or without a `---` front-matter block and with or without a
/// surrounding code fence.
pub fn parse_model_output(raw: &str) -> ParsedOutput {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = text.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        text = text.trim_end().strip_suffix("```").unwrap_or(text).trim();
    }

    let Some(after_open) = text.strip_prefix("---") else {
        return ParsedOutput {
            description: None,
            body: text.to_string(),
        };
    };
    let Some(close) = after_open.find("\n---") else {
        return ParsedOutput {
            description: None,
            body: text.to_string(),
        };
    };

    let front = &after_open[..close];
    let rest = &after_open[close + 4..];
    let body = rest
        .split_once('\n')
        .map(|(_, b)| b)
        .unwrap_or("")
        .trim()
        .to_string();

    let description = front
        .lines()
        .filter_map(|l| l.trim().strip_prefix("description:"))
        .map(|v| unquote(v.trim()))
        .find(|v| !v.is_empty() && !v.eq_ignore_ascii_case("SEO description here"));

    ParsedOutput { description, body }
}

fn unquote(v: &str) -> String {
    let v = v
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| v.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(v);
    v.replace("\\\"", "\"").trim().to_string()
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

pub struct ArticleGenerator {
    model: Arc<dyn LanguageModel>,
    cfg: LlmConfig,
}

impl ArticleGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, cfg: LlmConfig) -> Self {
        Self { model, cfg }
    }

    pub async fn generate_full_article(&self, brief: &NewsBrief) -> Result<Article> {
        self.generate_for_date(brief, Utc::now().date_naive()).await
    }

    pub async fn generate_for_date(&self, brief: &NewsBrief, date: NaiveDate) -> Result<Article> {
        let prompt = article_prompt(brief, date);
        let primary = self.cfg.article_model.clone();

        let (model, parsed) = match self.attempt(&primary, &prompt).await {
            Ok(parsed) => (primary, parsed),
            Err(e) if e.is_server_class() && self.cfg.fallback_model != primary => {
                tracing::warn!(
                    target: "articles",
                    brief = %brief.id,
                    model = %primary,
                    fallback = %self.cfg.fallback_model,
                    error = %e,
                    "primary model failed, using fallback"
                );
                counter!("curator_article_fallbacks_total").increment(1);
                let fallback = self.cfg.fallback_model.clone();
                let parsed = self.attempt(&fallback, &prompt).await.map_err(|e2| {
                    counter!("curator_article_failures_total").increment(1);
                    anyhow!("article for {} failed on {primary} ({e}) and {fallback} ({e2})", brief.id)
                })?;
                (fallback, parsed)
            }
            Err(e) => {
                counter!("curator_article_failures_total").increment(1);
                return Err(anyhow!("article for {} failed on {primary}: {e}", brief.id));
            }
        };

        counter!("curator_articles_generated_total").increment(1);
        tracing::info!(target: "articles", brief = %brief.id, model = %model, chars = parsed.body.len(), "article generated");

        Ok(Article {
            slug: slugify(&brief.suggested_title),
            front_matter: FrontMatter {
                title: brief.suggested_title.clone(),
                description: parsed
                    .description
                    .unwrap_or_else(|| clip(&brief.summary, DESCRIPTION_MAX_CHARS)),
                date,
                tags: brief.suggested_tags.clone(),
                source: brief.news_item.source.clone(),
                source_url: brief.news_item.link.clone(),
            },
            body: parsed.body,
            model,
        })
    }

    async fn attempt(&self, model: &str, prompt: &str) -> Result<ParsedOutput, LlmError> {
        let req = CompletionRequest {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            max_tokens: self.cfg.article_max_tokens,
            temperature: self.cfg.temperature,
        };
        let raw = self.model.complete(&req).await?;
        let parsed = parse_model_output(&raw);
        if parsed.body.is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(parsed)
    }
}
