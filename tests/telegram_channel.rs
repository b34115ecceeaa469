// tests/telegram_channel.rs
//
// Bot API adapter against a mock server: message shape, callback acks, retry policy.

use mockito::Matcher;
use serde_json::json;

use news_curator::config::TelegramConfig;
use news_curator::notify::{Button, NotificationChannel, OutboundMessage, TelegramChannel};

fn channel(base: &str, retries: u8) -> TelegramChannel {
    TelegramChannel::new(&TelegramConfig {
        api_base: base.to_string(),
        bot_token: "123:abc".to_string(),
        chat_id: "42".to_string(),
        webhook_secret: None,
        timeout_secs: 5,
        max_retries: retries,
    })
    .unwrap()
}

#[tokio::test]
async fn send_posts_html_with_inline_keyboard() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::PartialJson(json!({
            "chat_id": "42",
            "text": "<b>Found 1 new articles</b>",
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
            "reply_markup": { "inline_keyboard": [[ { "text": "✅ 1", "callback_data": "approve:b1:x" } ]] }
        })))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    let msg = OutboundMessage::text("<b>Found 1 new articles</b>")
        .with_keyboard(vec![vec![Button::new("✅ 1", "approve:b1:x")]]);
    channel(&server.url(), 1).send(&msg).await.unwrap();
    m.assert_async().await;
}

#[tokio::test]
async fn acknowledge_answers_callback_query() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("POST", "/bot123:abc/answerCallbackQuery")
        .match_body(Matcher::Json(json!({
            "callback_query_id": "cbq-9",
            "text": "Working on it…"
        })))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    channel(&server.url(), 1)
        .acknowledge("cbq-9", Some("Working on it…"))
        .await
        .unwrap();
    m.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_client_errors_are_not() {
    let mut server = mockito::Server::new_async().await;
    let flaky = server
        .mock("POST", "/bot123:abc/sendMessage")
        .with_status(502)
        .expect(2)
        .create_async()
        .await;

    let err = channel(&server.url(), 2)
        .send(&OutboundMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("502"), "{err}");
    flaky.assert_async().await;

    let mut server = mockito::Server::new_async().await;
    let bad = server
        .mock("POST", "/bot123:abc/sendMessage")
        .with_status(400)
        .with_body(r#"{"ok":false,"description":"chat not found"}"#)
        .expect(1)
        .create_async()
        .await;

    let err = channel(&server.url(), 3)
        .send(&OutboundMessage::text("hi"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("chat not found"), "{err}");
    bad.assert_async().await;
}
