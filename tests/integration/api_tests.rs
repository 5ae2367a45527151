//! HTTP API over an ephemeral port.

use std::sync::Arc;
use std::time::{Duration, Instant};

use question_relay::api;
use question_relay::api::models::QuestionResponse;
use question_relay::state::AppState;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::test_helpers::{
    recording_state, test_state, ALICE, CHANNEL, CRON_SECRET, NOTIFIER_SECRET, OTHER_SECRET,
};

struct Server {
    base: String,
    ct: CancellationToken,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

async fn spawn_server(state: Arc<AppState>) -> Server {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    let ct = CancellationToken::new();

    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = api::serve(state, listener, server_ct).await;
    });

    Server {
        base: format!("http://{addr}"),
        ct,
    }
}

fn question_body() -> Value {
    json!({
        "channel": CHANNEL,
        "text": "Which backup?",
        "options": [{ "data": "555", "label": "latest" }, { "data": "999" }],
    })
}

async fn create_question(client: &Client, server: &Server) -> String {
    let response = client
        .post(format!("{}/question", server.base))
        .bearer_auth(CRON_SECRET)
        .json(&question_body())
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: QuestionResponse = response.json().await.expect("json");
    assert!(body.answer.is_none());
    body.id
}

#[tokio::test]
async fn health_needs_no_token() {
    let (state, _) = recording_state().await;
    let server = spawn_server(state).await;

    let response = reqwest::get(format!("{}/health", server.base))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), "ok");
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
    let (state, _) = recording_state().await;
    let server = spawn_server(state).await;
    let client = Client::new();
    let body = json!({ "channel": CHANNEL, "text": "hi" });

    let response = client
        .post(format!("{}/notify", server.base))
        .json(&body)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .post(format!("{}/notify", server.base))
        .bearer_auth("not-a-token")
        .json(&body)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn notify_fans_out_with_prefix() {
    let (state, messenger) = recording_state().await;
    let server = spawn_server(state).await;

    let response = Client::new()
        .post(format!("{}/notify", server.base))
        .bearer_auth(NOTIFIER_SECRET)
        .json(&json!({ "channel": CHANNEL, "text": "backup done" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body, json!({ "delivered_to_anyone": true }));

    let sent = messenger.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].text, "[notifier -> backups]\n\nbackup done");
    assert!(sent[0].buttons.is_empty());
}

#[tokio::test]
async fn unknown_channel_is_not_found() {
    let (state, _) = recording_state().await;
    state.channels().create("deploys", None).await.expect("channel");
    let server = spawn_server(state).await;

    for channel in ["ghost", "deploys"] {
        let response = Client::new()
            .post(format!("{}/notify", server.base))
            .bearer_auth(CRON_SECRET)
            .json(&json!({ "channel": channel, "text": "hi" }))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{channel}");
        let body: Value = response.json().await.expect("json");
        assert_eq!(body["reason"], "channel not found or no permission");
    }
}

#[tokio::test]
async fn missing_capability_is_forbidden() {
    let (state, _) = recording_state().await;
    let server = spawn_server(state).await;

    let response = Client::new()
        .post(format!("{}/question", server.base))
        .bearer_auth(NOTIFIER_SECRET)
        .json(&question_body())
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["reason"], "capability disallowed");

    let response = Client::new()
        .post(format!("{}/notify", server.base))
        .bearer_auth(OTHER_SECRET)
        .json(&json!({ "channel": CHANNEL, "text": "hi" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_question_is_bad_request() {
    let (state, messenger) = recording_state().await;
    let server = spawn_server(state).await;
    let client = Client::new();

    for body in [
        json!({ "channel": CHANNEL, "text": "Proceed?", "options": [] }),
        json!({ "channel": CHANNEL, "text": "", "options": [{ "data": "y" }] }),
        json!({ "channel": CHANNEL, "text": "Proceed?", "options": [{ "data": "x".repeat(13) }] }),
    ] {
        let response = client
            .post(format!("{}/question", server.base))
            .bearer_auth(CRON_SECRET)
            .json(&body)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        let reply: Value = response.json().await.expect("json");
        assert!(reply["reason"].is_string());
    }
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn question_lifecycle_over_http() {
    let (state, messenger) = recording_state().await;
    let questions = state.questions.clone();
    let server = spawn_server(state).await;
    let client = Client::new();

    let id = create_question(&client, &server).await;
    assert_eq!(messenger.sent().len(), 2);

    let response = client
        .get(format!("{}/question/{id}", server.base))
        .bearer_auth(CRON_SECRET)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: QuestionResponse = response.json().await.expect("json");
    assert_eq!(body.id, id);
    assert!(body.answer.is_none());

    let started = Instant::now();
    let response = client
        .get(format!("{}/question/{id}/poll", server.base))
        .bearer_auth(CRON_SECRET)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(started.elapsed() >= Duration::from_millis(300));

    let poll = {
        let client = client.clone();
        let url = format!("{}/question/{id}/poll", server.base);
        tokio::spawn(async move { client.get(url).bearer_auth(CRON_SECRET).send().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    questions.answer(&id, ALICE, "555").await.expect("answer");

    let response = poll.await.expect("task").expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: QuestionResponse = response.json().await.expect("json");
    let answer = body.answer.expect("answered");
    assert_eq!(answer.data, "555");
    assert_eq!(answer.by.id, ALICE);

    // Answered questions return immediately.
    let response = client
        .get(format!("{}/question/{id}/poll", server.base))
        .bearer_auth(CRON_SECRET)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn questions_of_other_tokens_are_hidden() {
    let (state, _) = recording_state().await;
    let server = spawn_server(state).await;
    let client = Client::new();

    let id = create_question(&client, &server).await;
    for path in [format!("/question/{id}"), format!("/question/{id}/poll")] {
        let response = client
            .get(format!("{}{path}", server.base))
            .bearer_auth(OTHER_SECRET)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }

    let response = client
        .get(format!("{}/question/deadbeef", server.base))
        .bearer_auth(CRON_SECRET)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn channel_without_subscribers_rejects_questions() {
    let (state, _) = recording_state().await;
    let channel = state.channels().get_by_name(CHANNEL).await.expect("query").expect("channel");
    for user in [ALICE, super::test_helpers::BOB] {
        state
            .channels()
            .change_subscription(user, channel.id, false)
            .await
            .expect("unsubscribe");
    }
    let server = spawn_server(state).await;

    let response = Client::new()
        .post(format!("{}/question", server.base))
        .bearer_auth(CRON_SECRET)
        .json(&question_body())
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["reason"], "no subscribers on this channel");
}

#[tokio::test]
async fn local_only_mode_rejects_delivery_but_serves_reads() {
    let state = test_state(None).await;
    let server = spawn_server(state).await;

    let response = Client::new()
        .post(format!("{}/notify", server.base))
        .bearer_auth(CRON_SECRET)
        .json(&json!({ "channel": CHANNEL, "text": "hi" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"], "slack: messaging is not configured");

    let response = Client::new()
        .get(format!("{}/question/unknown", server.base))
        .bearer_auth(CRON_SECRET)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
