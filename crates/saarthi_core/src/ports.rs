//! crates/saarthi_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core logic consumes.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the HTTP client, the token storage and the local card store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AuthToken, ChatExchange, ChatMessage, Credentials, DailyDraw, Emotion, NewInteraction,
    Registration, Thought, User, Verse,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy for every port operation.
///
/// It is `Clone` because the query cache keeps the last error of a key and hands
/// a copy to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The request never completed (connection refused, DNS, reset...).
    #[error("Network error: {0}")]
    Network(String),
    /// The server answered with a failure status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Request timed out")]
    Timeout,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// 404 and 401 are never worth retrying without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PortError::Network(_) | PortError::Timeout | PortError::Http { .. }
        )
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait KrishnaPathService: Send + Sync {
    /// Lists the active emotions.
    async fn list_emotions(&self) -> PortResult<Vec<Emotion>>;

    /// Asks the server for one random active verse of the emotion.
    /// Fails with `PortError::NotFound` when the emotion has none.
    async fn random_verse(&self, emotion_id: Uuid) -> PortResult<Verse>;

    /// Number of active verses for the emotion (display only).
    async fn verse_count(&self, emotion_id: Uuid) -> PortResult<u64>;

    async fn track_interaction(&self, interaction: NewInteraction) -> PortResult<()>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn list_messages(&self) -> PortResult<Vec<ChatMessage>>;

    async fn send_message(&self, content: &str) -> PortResult<ChatExchange>;
}

#[async_trait]
pub trait ThoughtService: Send + Sync {
    async fn current_thought(&self) -> PortResult<Thought>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> PortResult<AuthToken>;

    async fn register(&self, registration: &Registration) -> PortResult<AuthToken>;

    /// The current user, or `None` when the server does not recognise the token.
    async fn me(&self) -> PortResult<Option<User>>;
}

/// Client-side persistence of the bearer token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> PortResult<Option<AuthToken>>;

    async fn save(&self, token: &AuthToken) -> PortResult<()>;

    async fn clear(&self) -> PortResult<()>;
}

/// Client-side persistence of the daily wisdom card.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn load(&self) -> PortResult<Option<DailyDraw>>;

    async fn save(&self, draw: &DailyDraw) -> PortResult<()>;

    async fn clear(&self) -> PortResult<()>;
}
