//! End-to-end tests for the response executor pipeline: inbound sweep,
//! reply dispatch, cursor advancement, comment-triggered auto-DMs, and
//! rate-limit handling.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use engage::adapters::{AdapterRegistry, InstagramAdapter, register_instagram_adapter};
use engage::ai::AiGatewayClient;
use engage::cache::PersonaCache;
use engage::classifier::Classifier;
use engage::config::{AiGatewayConfig, ExecutorConfig, RateLimitPolicyConfig};
use engage::executor::ResponseExecutor;
use engage::models::{conversation, message, response_job};
use engage::repositories::persona::PersonaUpdate;
use engage::repositories::PersonaRepository;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use test_utils::{
    create_account, create_connection, enable_responder, insert_queued_job, setup_db,
    test_crypto_key,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_executor(
    db: &DatabaseConnection,
    platform_server: &MockServer,
    ai_server: &MockServer,
) -> ResponseExecutor {
    let mut registry = AdapterRegistry::new();
    register_instagram_adapter(
        &mut registry,
        Arc::new(InstagramAdapter::new(
            "client-id".to_string(),
            "client-secret".to_string(),
            platform_server.uri(),
            platform_server.uri(),
        )),
    );

    let ai_config = AiGatewayConfig {
        api_key: Some("test-ai-key".to_string()),
        ..AiGatewayConfig::default()
    };
    let ai = Arc::new(
        AiGatewayClient::new(&ai_config)
            .unwrap()
            .with_base_url(format!("{}/v1/chat/completions", ai_server.uri())),
    );

    ResponseExecutor::new(
        Arc::new(db.clone()),
        Arc::new(registry),
        Classifier::new(ai, 12),
        Arc::new(PersonaCache::new(Duration::from_secs(60))),
        test_crypto_key(),
        ExecutorConfig::default(),
        RateLimitPolicyConfig::default(),
    )
}

fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "cmpl-test",
        "choices": [
            { "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }
        ]
    })
}

async fn mock_empty_comments(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .mount(server)
        .await;
}

async fn mock_empty_messages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn dm_pipeline_records_inbound_replies_and_advances_cursor() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let connection = create_connection(&db, &account_id, "instagram", "graph-token").await;
    enable_responder(&db, &connection).await;

    let platform_server = MockServer::start().await;
    let ai_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "mid-1",
                    "from": { "id": "fan-1", "username": "superfan" },
                    "text": "price? link?",
                    "created_time": "2025-06-01T10:00:00+00:00"
                }
            ]
        })))
        .mount(&platform_server)
        .await;
    mock_empty_comments(&platform_server).await;

    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message_id": "out-1" })),
        )
        .expect(1)
        .mount(&platform_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hey! 💕")))
        .expect(1)
        .mount(&ai_server)
        .await;

    let executor = build_executor(&db, &platform_server, &ai_server);

    insert_queued_job(&db, &connection).await;
    let count = executor.claim_and_run_jobs().await.unwrap();
    assert_eq!(count, 1);

    // Conversation created for the fan, AI-enabled by the sweep
    let conversations = conversation::Entity::find().all(&db).await.unwrap();
    assert_eq!(conversations.len(), 1);
    let thread = &conversations[0];
    assert_eq!(thread.participant_id, "fan-1");
    assert!(thread.ai_enabled);
    assert_eq!(thread.message_count, 2);
    // Cursor advanced to the answered message
    assert_eq!(thread.last_processed_message_id.as_deref(), Some("mid-1"));

    // Inbound fan row plus the dispatched AI reply
    let rows = message::Entity::find().all(&db).await.unwrap();
    assert_eq!(rows.len(), 2);
    let fan_row = rows.iter().find(|row| row.sender_type == "fan").unwrap();
    assert_eq!(fan_row.content, "price? link?");
    let ai_row = rows.iter().find(|row| row.sender_type == "ai").unwrap();
    assert_eq!(ai_row.status, "sent");
    assert_eq!(ai_row.platform_message_id.as_deref(), Some("out-1"));
    assert_eq!(ai_row.content, "hey! 💕");

    // Job is marked succeeded
    let jobs = response_job::Entity::find().all(&db).await.unwrap();
    assert_eq!(jobs[0].status, "succeeded");
    assert!(jobs[0].finished_at.is_some());
}

#[tokio::test]
async fn repeated_ticks_do_not_duplicate_messages_or_replies() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let connection = create_connection(&db, &account_id, "instagram", "graph-token").await;
    enable_responder(&db, &connection).await;

    let platform_server = MockServer::start().await;
    let ai_server = MockServer::start().await;

    // The platform keeps returning the same message on every poll
    Mock::given(method("GET"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "mid-1",
                    "from": { "id": "fan-1", "username": "superfan" },
                    "text": "hello there",
                    "created_time": "2025-06-01T10:00:00+00:00"
                }
            ]
        })))
        .mount(&platform_server)
        .await;
    mock_empty_comments(&platform_server).await;

    // Reply may be sent at most once across both ticks
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message_id": "out-1" })),
        )
        .expect(1)
        .mount(&platform_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hi!")))
        .expect(1)
        .mount(&ai_server)
        .await;

    let executor = build_executor(&db, &platform_server, &ai_server);

    insert_queued_job(&db, &connection).await;
    executor.claim_and_run_jobs().await.unwrap();

    insert_queued_job(&db, &connection).await;
    executor.claim_and_run_jobs().await.unwrap();

    let rows = message::Entity::find().all(&db).await.unwrap();
    let fan_rows = rows.iter().filter(|row| row.sender_type == "fan").count();
    let ai_rows = rows.iter().filter(|row| row.sender_type == "ai").count();
    assert_eq!(fan_rows, 1, "inbound message recorded once");
    assert_eq!(ai_rows, 1, "reply dispatched once");
}

#[tokio::test]
async fn buying_comment_triggers_exactly_one_dm_across_ticks() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let connection = create_connection(&db, &account_id, "instagram", "graph-token").await;
    enable_responder(&db, &connection).await;

    let platform_server = MockServer::start().await;
    let ai_server = MockServer::start().await;

    mock_empty_messages(&platform_server).await;
    Mock::given(method("GET"))
        .and(path("/me/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "c-1",
                    "from": { "id": "fan-9", "username": "buyer" },
                    "text": "price? link?"
                }
            ]
        })))
        .mount(&platform_server)
        .await;

    // The auto-DM may hit the platform at most once across both ticks
    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message_id": "out-5" })),
        )
        .expect(1)
        .mount(&platform_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"[{"id": "c-1", "signal": "buying", "reply": "check your DMs 💕"}]"#,
        )))
        .mount(&ai_server)
        .await;

    let executor = build_executor(&db, &platform_server, &ai_server);

    insert_queued_job(&db, &connection).await;
    executor.claim_and_run_jobs().await.unwrap();

    insert_queued_job(&db, &connection).await;
    executor.claim_and_run_jobs().await.unwrap();

    let rows = message::Entity::find()
        .filter(message::Column::TriggerId.eq("c-1"))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1, "exactly one auto-DM per triggering comment");
    assert_eq!(rows[0].sender_type, "ai");
    assert_eq!(rows[0].status, "sent");
    assert_eq!(rows[0].content, "check your DMs 💕");
}

#[tokio::test]
async fn ai_rate_limit_requeues_job_and_sends_nothing() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let connection = create_connection(&db, &account_id, "instagram", "graph-token").await;
    enable_responder(&db, &connection).await;

    let platform_server = MockServer::start().await;
    let ai_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "mid-1",
                    "from": { "id": "fan-1", "username": "superfan" },
                    "text": "hello",
                    "created_time": "2025-06-01T10:00:00+00:00"
                }
            ]
        })))
        .mount(&platform_server)
        .await;
    mock_empty_comments(&platform_server).await;

    // Gateway is rate limiting
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&ai_server)
        .await;

    let executor = build_executor(&db, &platform_server, &ai_server);

    insert_queued_job(&db, &connection).await;
    executor.claim_and_run_jobs().await.unwrap();

    // No AI message row reached "sent"
    let sent_ai_rows = message::Entity::find()
        .filter(message::Column::SenderType.eq("ai"))
        .filter(message::Column::Status.eq("sent"))
        .all(&db)
        .await
        .unwrap();
    assert!(sent_ai_rows.is_empty());

    // Job went back to the queue with a backoff hint
    let jobs = response_job::Entity::find().all(&db).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, "queued");
    assert!(jobs[0].retry_after.is_some());
    assert_eq!(jobs[0].attempts, 1);
    let error = jobs[0].error.as_ref().expect("error recorded");
    assert_eq!(error["pipeline_error"]["type"], "rate_limited");
}

#[tokio::test]
async fn persona_biases_reply_and_redirect_is_marked() {
    let db = setup_db().await;
    let account_id = create_account(&db).await;
    let connection = create_connection(&db, &account_id, "instagram", "graph-token").await;
    enable_responder(&db, &connection).await;

    PersonaRepository::new(Arc::new(db.clone()))
        .upsert(
            &account_id,
            PersonaUpdate {
                tone: "flirty".to_string(),
                vocabulary_style: "casual".to_string(),
                emotional_range: "warm".to_string(),
                boundaries: None,
                redirect_url: Some("https://fans.example.com/me".to_string()),
            },
        )
        .await
        .unwrap();

    let platform_server = MockServer::start().await;
    let ai_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "id": "mid-1",
                    "from": { "id": "fan-1", "username": "superfan" },
                    "text": "where can I see more?",
                    "created_time": "2025-06-01T10:00:00+00:00"
                }
            ]
        })))
        .mount(&platform_server)
        .await;
    mock_empty_comments(&platform_server).await;

    Mock::given(method("POST"))
        .and(path("/me/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message_id": "out-1" })),
        )
        .mount(&platform_server)
        .await;

    // The reply carries the persona's redirect URL
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "it's all here 💕 https://fans.example.com/me",
        )))
        .mount(&ai_server)
        .await;

    let executor = build_executor(&db, &platform_server, &ai_server);

    insert_queued_job(&db, &connection).await;
    executor.claim_and_run_jobs().await.unwrap();

    let thread = conversation::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert!(thread.redirect_sent, "redirect flag set after link went out");

    // The prompt sent to the gateway carried the persona instruction
    let requests = ai_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("Tone: flirty"));
    assert!(system.contains("https://fans.example.com/me"));
}
