//! News Curator: binary entrypoint
//! Boots the Axum HTTP server, the approval worker and the periodic ingestion cycle.

use news_curator::{
    api::{self, ApiState},
    config::AppConfig,
    metrics::Metrics,
    scheduler::spawn_scheduler,
    Collaborators,
};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,h2=warn,reqwest=warn,rustls=warn";

/// Compact logs by default, JSON when `CURATOR_LOG_JSON=1`.
/// `try_init` leaves an already-installed subscriber (the hosting runtime's) in place.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("CURATOR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut config = AppConfig::load_default()?;
    config.resolve_secrets()?;
    tracing::info!(
        feeds = config.feeds.len(),
        interval_secs = config.scheduler.interval_secs,
        policy = ?config.scheduler.batch_policy,
        llm_key_len = config.llm.api_key.len(),
        bot_token_len = config.telegram.bot_token.len(),
        github_token_len = config.publish.token.len(),
        repo = %config.publish.repo,
        "configuration loaded"
    );

    let collaborators = Collaborators::from_config(&config).await?;
    let app = news_curator::build(config, collaborators)?;
    let metrics = Metrics::init(app.config.scheduler.interval_secs)?;

    let (events, queue) = api::event_queue();
    api::spawn_event_worker(app.controller.clone(), queue);

    if app.config.scheduler.enabled {
        spawn_scheduler(app.pipeline.clone(), app.config.scheduler.interval_secs);
    } else {
        tracing::info!("scheduler disabled");
    }

    let state = ApiState {
        events,
        webhook_secret: app.config.telegram.webhook_secret.clone(),
    };
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
