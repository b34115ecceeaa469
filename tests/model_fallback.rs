// tests/model_fallback.rs
//
// Article generation against a mock chat-completions endpoint:
// - primary 5xx falls back to the fallback model
// - primary 401 does not fall back
// - both models failing is an error
// Brief generation: garbage output still yields a brief, a dead model drops the item.

mod common;

use mockito::Matcher;
use serde_json::json;

use news_curator::articles::ArticleGenerator;
use news_curator::briefs::BriefGenerator;
use news_curator::config::{BriefConfig, LlmConfig};
use news_curator::llm::{LanguageModel, OpenAiClient};
use std::sync::Arc;

fn llm_config(base: &str) -> LlmConfig {
    LlmConfig {
        endpoint: format!("{base}/v1/chat/completions"),
        api_key: "test-key".to_string(),
        timeout_secs: 5,
        ..LlmConfig::default()
    }
}

fn completion(content: &str) -> String {
    json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] }).to_string()
}

fn model_matcher(model: &str) -> Matcher {
    Matcher::PartialJson(json!({ "model": model }))
}

fn client(cfg: &LlmConfig) -> Arc<dyn LanguageModel> {
    Arc::new(OpenAiClient::new(cfg).unwrap())
}

#[tokio::test]
async fn server_error_on_primary_uses_fallback() {
    let mut server = mockito::Server::new_async().await;
    let primary = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(model_matcher("gpt-4o-mini"))
        .with_status(500)
        .with_body("overloaded")
        .expect(1)
        .create_async()
        .await;
    let fallback = server
        .mock("POST", "/v1/chat/completions")
        .match_body(model_matcher("gpt-3.5-turbo"))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion(&common::article_markdown("Headline 1")))
        .expect(1)
        .create_async()
        .await;

    let cfg = llm_config(&server.url());
    let gen = ArticleGenerator::new(client(&cfg), cfg);
    let article = gen.generate_full_article(&common::brief(1)).await.unwrap();

    assert_eq!(article.model, "gpt-3.5-turbo");
    assert_eq!(article.slug, "headline-1");
    assert!(article.body.contains("Full article body."));
    assert_eq!(article.front_matter.description, "About Headline 1");
    primary.assert_async().await;
    fallback.assert_async().await;
}

#[tokio::test]
async fn client_error_does_not_fall_back() {
    let mut server = mockito::Server::new_async().await;
    let _primary = server
        .mock("POST", "/v1/chat/completions")
        .match_body(model_matcher("gpt-4o-mini"))
        .with_status(401)
        .with_body(r#"{"error":"bad key"}"#)
        .create_async()
        .await;
    let fallback = server
        .mock("POST", "/v1/chat/completions")
        .match_body(model_matcher("gpt-3.5-turbo"))
        .with_status(200)
        .with_body(completion("unused"))
        .expect(0)
        .create_async()
        .await;

    let cfg = llm_config(&server.url());
    let gen = ArticleGenerator::new(client(&cfg), cfg);
    let err = gen.generate_full_article(&common::brief(1)).await.unwrap_err();

    assert!(err.to_string().contains("401"), "{err}");
    fallback.assert_async().await;
}

#[tokio::test]
async fn both_models_failing_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _any = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let cfg = llm_config(&server.url());
    let gen = ArticleGenerator::new(client(&cfg), cfg);
    let err = gen.generate_full_article(&common::brief(2)).await.unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("gpt-4o-mini") && msg.contains("gpt-3.5-turbo"), "{msg}");
}

#[tokio::test]
async fn garbage_brief_output_still_yields_a_brief() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(completion("I'm sorry, I can't produce JSON today."))
        .create_async()
        .await;

    let cfg = llm_config(&server.url());
    let gen = BriefGenerator::new(
        client(&cfg),
        cfg,
        BriefConfig {
            group_delay_ms: 0,
            retries: 0,
            ..BriefConfig::default()
        },
    );
    let item = common::item(3);
    let brief = gen.generate_brief(&item).await.unwrap();

    assert_eq!(brief.news_item.id, item.id);
    assert!(!brief.summary.is_empty());
    assert!(!brief.suggested_title.is_empty());
}

#[tokio::test]
async fn unreachable_model_drops_items_from_the_batch() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/chat/completions")
        .with_status(500)
        .create_async()
        .await;

    let cfg = llm_config(&server.url());
    let gen = BriefGenerator::new(
        client(&cfg),
        cfg,
        BriefConfig {
            group_delay_ms: 0,
            retries: 0,
            ..BriefConfig::default()
        },
    );
    let items: Vec<_> = (1..=3).map(common::item).collect();
    assert!(gen.generate_batch_briefs(&items).await.is_empty());
}
