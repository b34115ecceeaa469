// tests/metrics.rs
//
// The global recorder can be installed once per process, so everything lives in one test.

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use news_curator::api::{self, ApiState};
use news_curator::metrics::Metrics;

#[tokio::test]
async fn metrics_endpoint_exposes_curator_series() {
    let metrics = Metrics::init(7200).expect("install recorder");
    assert!(Metrics::init(7200).is_err(), "second install must fail");

    let (events, _queue) = api::event_queue();
    let app = api::router(ApiState {
        events,
        webhook_secret: None,
    })
    .merge(metrics.router());

    let update = json!({ "update_id": 1, "message": { "message_id": 1, "chat": { "id": 42 }, "text": "/status" } });
    let r = app
        .clone()
        .oneshot(
            Request::post("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in ["curator_schedule_interval_secs 7200", "curator_webhook_events_total 1"] {
        assert!(text.contains(needle), "metrics exposition missing '{needle}'\n{text}");
    }
}
