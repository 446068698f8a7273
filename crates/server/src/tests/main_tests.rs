use std::sync::Mutex;

use async_trait::async_trait;
use axum::{body, body::Body, http::Request};
use tower::ServiceExt;

use line_gateway::{signature_for, ReplyGateway};
use shared::{domain::ReplyToken, protocol::OutboundMessage};
use storage::RecordStore;

use super::*;

const TEST_SECRET: &str = "test-channel-secret";

#[derive(Default)]
struct RecordingGateway {
    replies: Mutex<Vec<(ReplyToken, OutboundMessage)>>,
}

#[async_trait]
impl ReplyGateway for RecordingGateway {
    async fn send_reply(
        &self,
        reply_token: &ReplyToken,
        message: &OutboundMessage,
    ) -> anyhow::Result<()> {
        self.replies
            .lock()
            .expect("lock")
            .push((reply_token.clone(), message.clone()));
        Ok(())
    }
}

async fn test_app() -> (Router, Storage, Arc<RecordingGateway>) {
    let storage = Storage::new("sqlite::memory:", "exams").await.expect("db");
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = Dispatcher::new(Arc::new(storage.clone()), gateway.clone());
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        channel_secret: TEST_SECRET.to_string(),
    };
    (build_router(Arc::new(state)), storage, gateway)
}

fn signed_webhook(body_json: &str) -> Request<Body> {
    Request::post("/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature_for(TEST_SECRET, body_json.as_bytes()))
        .body(Body::from(body_json.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _storage, _gateway) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn signed_registration_webhook_stores_record_and_replies() {
    let (app, storage, gateway) = test_app().await;
    let payload = r#"{"events":[{"type":"message","replyToken":"tok-1","message":{"type":"text","id":"1","text":"Math Exam:2024-01-15"}}]}"#;

    let response = app.oneshot(signed_webhook(payload)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let records = storage.scan_all().await.expect("scan");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Math Exam");
    assert_eq!(records[0].date, "2024-01-15");

    let replies = gateway.replies.lock().expect("lock").clone();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, ReplyToken("tok-1".into()));
    assert_eq!(replies[0].1, OutboundMessage::text("登録しました"));
}

#[tokio::test]
async fn webhook_with_wrong_signature_is_rejected() {
    let (app, storage, _gateway) = test_app().await;
    let payload = r#"{"events":[{"type":"message","replyToken":"tok-1","message":{"type":"text","id":"1","text":"Math Exam:2024-01-15"}}]}"#;

    let request = Request::post("/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature_for("wrong-secret", payload.as_bytes()))
        .body(Body::from(payload))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(storage.scan_all().await.expect("scan").is_empty());
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let (app, _storage, _gateway) = test_app().await;
    let request = Request::post("/webhook")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"events":[]}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_is_a_validation_error() {
    let (app, _storage, _gateway) = test_app().await;
    let response = app
        .oneshot(signed_webhook(r#"{"events": "not-a-list"}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_event_batch_succeeds_without_replies() {
    let (app, _storage, gateway) = test_app().await;
    let response = app
        .oneshot(signed_webhook(r#"{"events":[]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(gateway.replies.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn register_then_list_round_trip() {
    let (app, _storage, gateway) = test_app().await;

    let register = r#"{"events":[{"type":"message","replyToken":"tok-1","message":{"type":"text","id":"1","text":"数学:2024-01-15"}}]}"#;
    let response = app
        .clone()
        .oneshot(signed_webhook(register))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let list = r#"{"events":[{"type":"postback","replyToken":"tok-2","postback":{"data":"action=list"}}]}"#;
    let response = app.oneshot(signed_webhook(list)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let replies = gateway.replies.lock().expect("lock").clone();
    assert_eq!(replies.len(), 2);
    assert_eq!(
        replies[1].1,
        OutboundMessage::text("登録された試験一覧:\n数学 : 2024-01-15")
    );
}
