use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HelpdeskError;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Lowercase wire name (`user`, `assistant`, `system`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Capitalized display name used when rendering transcripts.
    pub fn title(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "human" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(HelpdeskError::Serialization(format!(
                "unknown message role: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A single message in the live conversation buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A message row as loaded back from the History Store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A nearest-neighbor hit from the Semantic Memory Store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub role: Role,
    pub content: String,
    /// Cosine similarity (higher is closer).
    pub score: f64,
}

// =============================================================================
// Turn boundary
// =============================================================================

/// Per-turn parameters. Opaque to the stage graph; forwarded to collaborators.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Model identifier passed to the Language Model Service. `None` uses
    /// the service default.
    pub model: Option<String>,
    /// Overrides the configured maximum number of generation attempts.
    pub max_generation_attempts: Option<u32>,
}

/// Durable snapshot of a conversation taken after every turn.
///
/// Carries no per-turn retrieval results; those are rebuilt on each turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub user_id: String,
    pub summary: String,
    pub messages: Vec<Message>,
    pub turn_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// An empty checkpoint for a thread that has never completed a turn.
    pub fn empty(user_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            summary: String::new(),
            messages: Vec::new(),
            turn_count: 0,
            updated_at: Utc::now(),
        }
    }
}
