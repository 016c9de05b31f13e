//! crates/saarthi_core/src/domain.rs
//!
//! Defines the core data structures exchanged with the Saarthi API.
//! These structs carry serde derives because the client reads them straight
//! off the wire; they hold no transport or storage details.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Krishna Path
//=========================================================================================

/// A selectable emotion that scopes which verses can be drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A Bhagavad Gita verse, drawn at random server-side for one emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub id: Uuid,
    pub emotion_id: Uuid,
    pub sanskrit: String,
    pub hindi: String,
    pub english: String,
    pub explanation: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub verse_number: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Verse {
    /// A short "Bhagavad Gita 2.47" style reference, when the verse carries one.
    pub fn reference(&self) -> Option<String> {
        match (&self.chapter, &self.verse_number) {
            (Some(chapter), Some(number)) => Some(format!("Bhagavad Gita {}.{}", chapter, number)),
            (Some(chapter), None) => Some(format!("Bhagavad Gita, chapter {}", chapter)),
            _ => None,
        }
    }
}

/// The audit record written once per successful verse draw.
/// The server stamps the timestamp on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInteraction {
    pub emotion_id: Uuid,
    pub verse_id: Uuid,
    pub session_id: String,
}

fn default_true() -> bool {
    true
}

//=========================================================================================
// Accounts
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Login payload. Only ever sent, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub name: String,
    pub password: String,
}

/// The bearer token issued by login and register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

//=========================================================================================
// Chat and thoughts
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    pub user_id: Uuid,
    pub is_ai_response: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<User>,
}

/// What the server answers to a sent message: the stored message and the AI reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub user_message: ChatMessage,
    pub ai_message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    pub language: String,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Daily wisdom card
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardTheme {
    Strength,
    Clarity,
    Peace,
    Courage,
    Wisdom,
    Love,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WisdomCard {
    pub id: u32,
    pub title: String,
    pub verse: String,
    pub wisdom: String,
    pub guidance: String,
    pub theme: CardTheme,
    pub chapter: String,
}

/// The card drawn on a given calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDraw {
    pub date: NaiveDate,
    pub card: WisdomCard,
}
