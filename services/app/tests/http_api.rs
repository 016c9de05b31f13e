//! Runs the REST adapter against a local axum server.

use app_lib::adapters::{FileTokenStore, HttpApi};
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use saarthi_core::domain::{AuthToken, Credentials, NewInteraction};
use saarthi_core::ports::{
    AuthService, ChatService, KrishnaPathService, PortError, ThoughtService, TokenStore,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use uuid::Uuid;

const PEACE: &str = "8d3f7c1e-6a0b-4f2e-9c54-1b2d3e4f5a60";
const ANGER: &str = "0b9e2a44-71c3-4d8a-a5f6-c7d8e9f0a1b2";

#[derive(Default)]
struct Seen {
    authorization: Mutex<Vec<Option<String>>>,
    interactions: Mutex<Vec<Value>>,
}

impl Seen {
    fn record(&self, headers: &HeaderMap) {
        let value = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.authorization.lock().unwrap().push(value);
    }
}

async fn emotions(State(seen): State<Arc<Seen>>, headers: HeaderMap) -> Json<Value> {
    seen.record(&headers);
    Json(json!([
        {
            "id": PEACE,
            "name": "peace",
            "display_name": "Peace",
            "description": "Seeking calm",
            "color": "#22c55e",
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z"
        },
        {
            "id": ANGER,
            "name": "anger",
            "display_name": "Anger",
            "description": null,
            "color": "#ef4444",
            "is_active": false,
            "created_at": "2025-01-01T00:00:00Z"
        }
    ]))
}

async fn random_verse(Path(_id): Path<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "No verses found for this emotion" })),
    )
}

async fn verse_count(Path(_id): Path<String>) -> Json<Value> {
    Json(json!({ "count": 7 }))
}

async fn interactions(
    State(seen): State<Arc<Seen>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.record(&headers);
    seen.interactions.lock().unwrap().push(body);
    Json(json!({ "id": Uuid::new_v4() }))
}

async fn login(State(seen): State<Arc<Seen>>, headers: HeaderMap) -> Json<Value> {
    seen.record(&headers);
    Json(json!({ "access_token": "fresh-token", "token_type": "bearer" }))
}

async fn me() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Could not validate credentials" })),
    )
}

async fn chat_messages() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn slow_thought() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

struct Fixture {
    api: HttpApi,
    seen: Arc<Seen>,
    tokens: Arc<FileTokenStore>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let seen = Arc::new(Seen::default());
    let router = Router::new()
        .route("/api/krishna-path/emotions", get(emotions))
        .route("/api/krishna-path/verses/{id}/random", get(random_verse))
        .route("/api/krishna-path/verses/count/{id}", get(verse_count))
        .route("/api/krishna-path/interactions", post(interactions))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/chat/messages", get(chat_messages))
        .route("/api/thought-of-the-day/current", get(slow_thought))
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token.json")));
    let api = HttpApi::new(
        format!("http://{}/", addr),
        Duration::from_millis(300),
        tokens.clone(),
    )
    .unwrap();

    Fixture {
        api,
        seen,
        tokens,
        _dir: dir,
    }
}

async fn store_token(tokens: &FileTokenStore, value: &str) {
    tokens
        .save(&AuthToken {
            access_token: value.to_string(),
            token_type: "bearer".to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn stored_token_is_sent_as_bearer() {
    let f = fixture().await;

    f.api.list_emotions().await.unwrap();
    store_token(&f.tokens, "abc123").await;
    f.api.list_emotions().await.unwrap();

    let seen = f.seen.authorization.lock().unwrap().clone();
    assert_eq!(seen, vec![None, Some("Bearer abc123".to_string())]);
}

#[tokio::test]
async fn inactive_emotions_are_filtered_out() {
    let f = fixture().await;

    let emotions = f.api.list_emotions().await.unwrap();

    assert_eq!(emotions.len(), 1);
    assert_eq!(emotions[0].display_name, "Peace");
    assert_eq!(emotions[0].id.to_string(), PEACE);
}

#[tokio::test]
async fn missing_verse_maps_to_not_found_with_detail() {
    let f = fixture().await;

    let err = f.api.random_verse(Uuid::new_v4()).await.unwrap_err();

    assert_eq!(
        err,
        PortError::NotFound("No verses found for this emotion".to_string())
    );
}

#[tokio::test]
async fn verse_count_is_read_from_the_count_field() {
    let f = fixture().await;

    assert_eq!(f.api.verse_count(Uuid::new_v4()).await.unwrap(), 7);
}

#[tokio::test]
async fn interaction_is_posted_as_json() {
    let f = fixture().await;
    store_token(&f.tokens, "abc123").await;
    let interaction = NewInteraction {
        emotion_id: Uuid::new_v4(),
        verse_id: Uuid::new_v4(),
        session_id: Uuid::now_v7().to_string(),
    };

    f.api.track_interaction(interaction.clone()).await.unwrap();

    let posted = f.seen.interactions.lock().unwrap().clone();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["emotion_id"], json!(interaction.emotion_id));
    assert_eq!(posted[0]["verse_id"], json!(interaction.verse_id));
    assert_eq!(posted[0]["session_id"], json!(interaction.session_id));
}

#[tokio::test]
async fn login_never_sends_a_stale_token() {
    let f = fixture().await;
    store_token(&f.tokens, "expired").await;

    let token = f
        .api
        .login(&Credentials {
            username: "arjuna".to_string(),
            password: "gandiva".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(token.access_token, "fresh-token");
    assert_eq!(f.seen.authorization.lock().unwrap().clone(), vec![None]);
}

#[tokio::test]
async fn unauthorized_me_means_nobody_is_signed_in() {
    let f = fixture().await;
    store_token(&f.tokens, "expired").await;

    assert_eq!(f.api.me().await.unwrap(), None);
}

#[tokio::test]
async fn server_errors_keep_status_and_body() {
    let f = fixture().await;

    let err = f.api.list_messages().await.unwrap_err();

    assert_eq!(
        err,
        PortError::Http {
            status: 500,
            body: "boom".to_string()
        }
    );
}

#[tokio::test]
async fn slow_responses_time_out() {
    let f = fixture().await;

    let err = f.api.current_thought().await.unwrap_err();

    assert_eq!(err, PortError::Timeout);
}

#[tokio::test]
async fn refused_connections_are_network_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let tokens = Arc::new(FileTokenStore::new(dir.path().join("token.json")));
    let api = HttpApi::new(format!("http://{}", addr), Duration::from_secs(2), tokens).unwrap();

    let err = api.list_emotions().await.unwrap_err();
    assert!(matches!(err, PortError::Network(_)), "got {:?}", err);
}
