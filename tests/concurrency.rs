// tests/concurrency.rs
//
// Group-wise fan-out limits: brief generation never exceeds its group size and drops
// only the items whose calls failed; article commits never exceed commit_concurrency.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use news_curator::articles::{Article, FrontMatter};
use news_curator::briefs::BriefGenerator;
use news_curator::config::{BriefConfig, LlmConfig, PublishConfig};
use news_curator::llm::{CompletionRequest, LanguageModel, LlmError};
use news_curator::publish::{PublicationTarget, Publisher};

#[derive(Default)]
struct Gauge {
    now: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    async fn hold(&self) {
        let n = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(n, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.now.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Answers every brief prompt after a short delay; one title always errors.
struct SlowModel {
    gauge: Gauge,
    failing_title: &'static str,
}

#[async_trait]
impl LanguageModel for SlowModel {
    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        self.gauge.hold().await;
        if req.prompt.contains(self.failing_title) {
            return Err(LlmError::Status {
                status: 503,
                body: "overloaded".into(),
            });
        }
        Ok(common::brief_json("Fine"))
    }
}

/// Records writes after a short delay; one path always errors.
struct SlowTarget {
    gauge: Gauge,
    failing_path: String,
    written: Mutex<Vec<String>>,
}

#[async_trait]
impl PublicationTarget for SlowTarget {
    async fn read_file(&self, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn write_file(&self, path: &str, _content: &str, _message: &str) -> Result<()> {
        self.gauge.hold().await;
        if path == self.failing_path {
            return Err(anyhow!("409 conflict"));
        }
        self.written.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

fn article(n: u32) -> Article {
    Article {
        slug: format!("headline-{n}"),
        front_matter: FrontMatter {
            title: format!("Headline {n}"),
            description: format!("About headline {n}"),
            date: NaiveDate::from_ymd_opt(2025, 10, 14).unwrap(),
            tags: vec!["tech".into()],
            source: "Example".into(),
            source_url: format!("https://news.example.com/story-{n}"),
        },
        body: "Body.".into(),
        model: "gpt-4".into(),
    }
}

#[tokio::test]
async fn seven_items_one_failing_yield_six_briefs() {
    let model = Arc::new(SlowModel {
        gauge: Gauge::default(),
        failing_title: "Title: Story number 3 headline\n",
    });
    let gen = BriefGenerator::new(
        model.clone(),
        LlmConfig::default(),
        BriefConfig {
            concurrency: 5,
            group_delay_ms: 0,
            retries: 0,
        },
    );
    let items: Vec<_> = (0..7).map(common::item).collect();

    let briefs = gen.generate_batch_briefs(&items).await;

    assert_eq!(briefs.len(), 6);
    assert!(briefs.iter().all(|b| b.news_item.link != items[3].link));
    // Input order is kept.
    assert_eq!(briefs[0].news_item.link, items[0].link);
    assert_eq!(briefs[5].news_item.link, items[6].link);
    assert!(model.gauge.peak() <= 5, "peak {}", model.gauge.peak());
    assert_eq!(model.gauge.peak(), 5);
}

#[tokio::test]
async fn commits_run_at_most_three_at_a_time() {
    let cfg = PublishConfig {
        commit_concurrency: 3,
        group_delay_ms: 0,
        ..PublishConfig::default()
    };
    let failing = article(4).path_in(&cfg.content_dir);
    let target = Arc::new(SlowTarget {
        gauge: Gauge::default(),
        failing_path: failing.clone(),
        written: Mutex::new(Vec::new()),
    });
    let publisher = Publisher::new(target.clone(), cfg);
    let items: Vec<_> = (1..=8).map(|n| (common::brief(n), article(n))).collect();

    let report = publisher.commit_multiple_articles(&items).await;

    assert_eq!(report.success_count(), 7);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].brief_id, items[3].0.id);
    assert!(report.failed[0].error.contains("409"));
    assert_eq!(target.written.lock().unwrap().len(), 7);
    assert!(!target.written.lock().unwrap().contains(&failing));
    assert!(target.gauge.peak() <= 3, "peak {}", target.gauge.peak());
    assert_eq!(target.gauge.peak(), 3);
}
