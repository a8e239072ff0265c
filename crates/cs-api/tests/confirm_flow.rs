//! End-to-end confirmation flow against a real Postgres plus wiremock LLM and
//! mail endpoints. These run only when TEST_DATABASE_URL (or DATABASE_URL)
//! points at a reachable database; otherwise each test returns early.

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cs_api::SharedState;
use cs_common::db::{
    activate_by_token, create_pool_from_url, run_migrations, upsert_pending_contact, PgPool,
};
use cs_common::llm::{LlmClient, LlmConfig};
use cs_common::mail::{Mailer, MailerConfig};
use cs_common::token::generate_token;

const MIGRATION_LOCK_KEY: i64 = 0x4353_4d49;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()?;

    let pool = create_pool_from_url(&url).expect("pool should build");
    let client = pool.get().await.expect("test database should be reachable");

    client
        .query("SELECT pg_advisory_lock($1)", &[&MIGRATION_LOCK_KEY])
        .await
        .expect("advisory lock");
    let applied = run_migrations(&pool).await;
    client
        .query("SELECT pg_advisory_unlock($1)", &[&MIGRATION_LOCK_KEY])
        .await
        .expect("advisory unlock");
    applied.expect("migrations should apply");

    Some(pool)
}

fn unique_email(tag: &str) -> String {
    format!("{tag}-{}@example.test", &generate_token()[..12])
}

fn flow_state(pool: PgPool, llm_server: &MockServer, mail_server: &MockServer) -> SharedState {
    let llm = LlmClient::new(LlmConfig {
        endpoint: format!("{}/v1/chat/completions", llm_server.uri()),
        api_key: "test-key".into(),
        ..LlmConfig::default()
    })
    .expect("llm client should build");

    let mailer = Mailer::new(MailerConfig {
        api_base: mail_server.uri(),
        api_token: "test-token".into(),
        sender: "scanner@clearself.ai".into(),
        timeout_secs: 5,
    })
    .expect("mailer should build");

    cs_api::test_state_with(pool, llm, mailer)
}

fn completion_body(text: &str) -> serde_json::Value {
    json!({
        "choices": [ { "message": { "role": "assistant", "content": text } } ]
    })
}

async fn submit(app: &Router, email: &str) -> StatusCode {
    let body = json!({ "email": email, "situation": "I freeze in meetings" }).to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/analyze")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    response.status()
}

async fn click(app: &Router, token: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/confirm/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn contact_row(pool: &PgPool, email: &str) -> (String, Option<String>) {
    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            "SELECT status, confirmation_token FROM contacts WHERE email = $1",
            &[&email],
        )
        .await
        .unwrap();
    (row.get(0), row.get(1))
}

async fn newest_analysis(pool: &PgPool, email: &str) -> (String, Option<String>) {
    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            "SELECT a.status, a.analysis
             FROM analyses a
             JOIN contacts c ON c.id = a.contact_id
             WHERE c.email = $1
             ORDER BY a.created_at DESC, a.id DESC
             LIMIT 1",
            &[&email],
        )
        .await
        .unwrap();
    (row.get(0), row.get(1))
}

#[tokio::test]
async fn confirmation_generates_delivers_and_spends_the_link() {
    let Some(pool) = test_pool().await else { return };
    let llm_server = MockServer::start().await;
    let mail_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("1. I am not enough.")))
        .expect(1)
        .mount(&llm_server)
        .await;
    // One confirmation email, one results email.
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mail_server)
        .await;

    let state = flow_state(pool.clone(), &llm_server, &mail_server);
    let app = cs_api::create_router(state);
    let email = unique_email("happy");

    assert_eq!(submit(&app, &email).await, StatusCode::OK);
    let (status, token) = contact_row(&pool, &email).await;
    assert_eq!(status, "pending");
    let token = token.expect("submission should issue a token");

    let (status, page) = click(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("Email address confirmed"));

    let (status, token_after) = contact_row(&pool, &email).await;
    assert_eq!(status, "active");
    assert_eq!(token_after, None);
    let (analysis_status, text) = newest_analysis(&pool, &email).await;
    assert_eq!(analysis_status, "completed");
    assert_eq!(text.as_deref(), Some("1. I am not enough."));

    // The link is spent; a re-click no longer matches any token.
    let (status, page) = click(&app, &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(page.contains("invalid or has already been used"));
}

#[tokio::test]
async fn llm_failure_reverts_so_the_same_link_retries() {
    let Some(pool) = test_pool().await else { return };
    let llm_server = MockServer::start().await;
    let mail_server = MockServer::start().await;

    // First generation attempt fails, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .up_to_n_times(1)
        .mount(&llm_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("1. I must not fail.")))
        .expect(1)
        .mount(&llm_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mail_server)
        .await;

    let state = flow_state(pool.clone(), &llm_server, &mail_server);
    let app = cs_api::create_router(state);
    let email = unique_email("llm-fail");

    assert_eq!(submit(&app, &email).await, StatusCode::OK);
    let (_, token) = contact_row(&pool, &email).await;
    let token = token.unwrap();

    let (status, page) = click(&app, &token).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(page.contains("clicking the link in your email once more"));

    // Everything rolled back for a retry: contact pending, token intact,
    // analysis still pending with no text.
    let (contact_status, token_after) = contact_row(&pool, &email).await;
    assert_eq!(contact_status, "pending");
    assert_eq!(token_after.as_deref(), Some(&token[..]));
    let (analysis_status, text) = newest_analysis(&pool, &email).await;
    assert_eq!(analysis_status, "pending");
    assert_eq!(text, None);

    let (status, _) = click(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    let (contact_status, token_after) = contact_row(&pool, &email).await;
    assert_eq!(contact_status, "active");
    assert_eq!(token_after, None);
}

#[tokio::test]
async fn results_delivery_failure_reverts_completion_for_retry() {
    let Some(pool) = test_pool().await else { return };
    let llm_server = MockServer::start().await;
    let mail_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("1. I am replaceable.")))
        .expect(2)
        .mount(&llm_server)
        .await;
    // Confirmation email goes out, the first results email bounces, the
    // retried results email succeeds.
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&mail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(500).set_body_string("mail provider down"))
        .up_to_n_times(1)
        .mount(&mail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mail_server)
        .await;

    let state = flow_state(pool.clone(), &llm_server, &mail_server);
    let app = cs_api::create_router(state);
    let email = unique_email("mail-fail");

    assert_eq!(submit(&app, &email).await, StatusCode::OK);
    let (_, token) = contact_row(&pool, &email).await;
    let token = token.unwrap();

    let (status, _) = click(&app, &token).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // The completed-but-undelivered analysis went back to pending with its
    // text dropped, and the contact can re-confirm with the same link.
    let (contact_status, token_after) = contact_row(&pool, &email).await;
    assert_eq!(contact_status, "pending");
    assert_eq!(token_after.as_deref(), Some(&token[..]));
    let (analysis_status, text) = newest_analysis(&pool, &email).await;
    assert_eq!(analysis_status, "pending");
    assert_eq!(text, None);

    let (status, page) = click(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("Email address confirmed"));
    let (analysis_status, text) = newest_analysis(&pool, &email).await;
    assert_eq!(analysis_status, "completed");
    assert_eq!(text.as_deref(), Some("1. I am replaceable."));
}

#[tokio::test]
async fn repeated_click_on_an_active_contact_generates_nothing() {
    let Some(pool) = test_pool().await else { return };
    let llm_server = MockServer::start().await;
    let mail_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&llm_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mail_server)
        .await;

    let email = unique_email("repeat");
    let token = generate_token();
    upsert_pending_contact(&pool, &email, &token).await.unwrap();
    activate_by_token(&pool, &token).await.unwrap();

    let state = flow_state(pool.clone(), &llm_server, &mail_server);
    let app = cs_api::create_router(state);

    let (status, page) = click(&app, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("no new one was generated"));

    let (contact_status, token_after) = contact_row(&pool, &email).await;
    assert_eq!(contact_status, "active");
    assert_eq!(token_after.as_deref(), Some(&token[..]));
}
