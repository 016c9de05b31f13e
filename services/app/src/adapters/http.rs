//! services/app/src/adapters/http.rs
//!
//! This module contains the REST adapter for the Saarthi API. It implements the
//! `KrishnaPathService`, `ChatService`, `ThoughtService` and `AuthService` ports
//! from the `core` crate on top of a single `reqwest` client.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use saarthi_core::domain::{
    AuthToken, ChatExchange, ChatMessage, Credentials, Emotion, NewInteraction, Registration,
    Thought, User, Verse,
};
use saarthi_core::ports::{
    AuthService, ChatService, KrishnaPathService, PortError, PortResult, ThoughtService,
    TokenStore,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that talks to the Saarthi REST API under `{base_url}/api`.
///
/// Every authenticated request carries the stored token as a bearer token.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

/// Whether a request should carry the stored bearer token.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    Anonymous,
}

#[derive(Deserialize)]
struct CountResponse {
    #[serde(default)]
    count: u64,
}

#[derive(Serialize)]
struct NewChatMessage<'a> {
    content: &'a str,
}

impl HttpApi {
    /// Creates a new `HttpApi`. `timeout` bounds each whole request.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("saarthi-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, auth: Auth) -> PortResult<Response> {
        let request = match auth {
            Auth::Bearer => match self.tokens.load().await? {
                Some(token) => request.bearer_auth(token.access_token),
                None => request,
            },
            Auth::Anonymous => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "api response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => PortError::NotFound(detail(&body)),
            StatusCode::UNAUTHORIZED => PortError::Unauthorized,
            _ => PortError::Http {
                status: status.as_u16(),
                body: detail(&body),
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PortResult<T> {
        let response = self.send(self.client.get(self.url(path)), Auth::Bearer).await?;
        response.json::<T>().await.map_err(body_error)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, auth: Auth) -> PortResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.client.post(self.url(path)).json(body), auth)
            .await?;
        response.json::<T>().await.map_err(body_error)
    }
}

/// FastAPI reports failures as `{"detail": "..."}`; fall back to the raw body.
fn detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn transport_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Timeout
    } else {
        PortError::Network(e.to_string())
    }
}

fn body_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Timeout
    } else {
        PortError::Unexpected(format!("invalid response body: {}", e))
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl KrishnaPathService for HttpApi {
    async fn list_emotions(&self) -> PortResult<Vec<Emotion>> {
        let emotions: Vec<Emotion> = self.get_json("/krishna-path/emotions").await?;
        Ok(emotions.into_iter().filter(|e| e.is_active).collect())
    }

    async fn random_verse(&self, emotion_id: Uuid) -> PortResult<Verse> {
        self.get_json(&format!("/krishna-path/verses/{}/random", emotion_id))
            .await
    }

    async fn verse_count(&self, emotion_id: Uuid) -> PortResult<u64> {
        let response: CountResponse = self
            .get_json(&format!("/krishna-path/verses/count/{}", emotion_id))
            .await?;
        Ok(response.count)
    }

    async fn track_interaction(&self, interaction: NewInteraction) -> PortResult<()> {
        self.send(
            self.client
                .post(self.url("/krishna-path/interactions"))
                .json(&interaction),
            Auth::Bearer,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatService for HttpApi {
    async fn list_messages(&self) -> PortResult<Vec<ChatMessage>> {
        self.get_json("/chat/messages").await
    }

    async fn send_message(&self, content: &str) -> PortResult<ChatExchange> {
        self.post_json("/chat/messages", &NewChatMessage { content }, Auth::Bearer)
            .await
    }
}

#[async_trait]
impl ThoughtService for HttpApi {
    async fn current_thought(&self) -> PortResult<Thought> {
        self.get_json("/thought-of-the-day/current").await
    }
}

#[async_trait]
impl AuthService for HttpApi {
    async fn login(&self, credentials: &Credentials) -> PortResult<AuthToken> {
        self.post_json("/auth/login", credentials, Auth::Anonymous)
            .await
    }

    async fn register(&self, registration: &Registration) -> PortResult<AuthToken> {
        self.post_json("/auth/register", registration, Auth::Anonymous)
            .await
    }

    async fn me(&self) -> PortResult<Option<User>> {
        match self.get_json("/auth/me").await {
            Ok(user) => Ok(Some(user)),
            Err(PortError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_the_fastapi_field() {
        assert_eq!(detail(r#"{"detail":"No verses found"}"#), "No verses found");
        assert_eq!(detail("Bad Gateway"), "Bad Gateway");
        assert_eq!(detail(r#"{"error":"x"}"#), r#"{"error":"x"}"#);
    }
}
