use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Can succeed only once per process.
    pub fn init(interval_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("curator_cycles_total", "Scheduled cycles that opened or extended a batch.");
        describe_counter!("curator_cycles_suppressed_total", "Cycles skipped because a batch was still live.");
        describe_counter!("curator_briefs_generated_total", "Briefs produced (model or fallback).");
        describe_counter!("curator_brief_fallbacks_total", "Briefs built from the item after an unparsable answer.");
        describe_counter!("curator_articles_published_total", "Article files committed.");
        describe_counter!("curator_commit_failures_total", "Article commits that failed.");
        describe_counter!("curator_webhook_events_total", "Webhook requests received.");
        describe_gauge!("curator_schedule_interval_secs", "Configured cycle interval.");

        gauge!("curator_schedule_interval_secs").set(interval_secs as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
