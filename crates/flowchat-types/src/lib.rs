//! Core types for flowchat
//!
//! This crate holds the data model shared by the session store, the view
//! renderer and the browser host: conversations, turns, the session that
//! groups them, and the client settings. Everything here is plain data with
//! serde support; storage and network access live in `flowchat-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Storage key holding the serialized [`Settings`]
pub const SETTINGS_KEY: &str = "chatAppSettings";

/// Storage key holding the serialized conversation list
pub const SESSION_KEY: &str = "m365CopilotChats";

/// Storage key holding the identifier of the current conversation
pub const CURRENT_CHAT_KEY: &str = "currentChatId";

/// Response-length limit used when none is configured
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Endpoint used by the path-embedded request shape when no URL is configured
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/assistant";

/// Prefix of generated conversation identifiers
pub const CONVERSATION_ID_PREFIX: &str = "chat_";

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Helper function to deserialize string or null values
fn deserialize_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Turns
// ============================================================================

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    #[serde(deserialize_with = "deserialize_string_or_null", default)]
    pub content: String,
    #[serde(default = "unix_epoch")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
            is_error: false,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }

    /// Assistant turn describing a failed completion
    pub fn assistant_error(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            is_error: true,
            ..Self::assistant(content, timestamp)
        }
    }

    /// The error flag; always false for user turns.
    pub fn error_flag(&self) -> bool {
        self.role == Role::Assistant && self.is_error
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// A persisted sequence of turns
///
/// The identifier is fixed at construction. Turns are kept in insertion
/// order, which is also chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    id: String,
    #[serde(rename = "messages", default)]
    turns: Vec<Turn>,
    #[serde(default = "unix_epoch")]
    created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn first_turn(&self) -> Option<&Turn> {
        self.turns.first()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// The last `n` turns, oldest first
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Time of the latest turn, or the creation time for an empty conversation
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.turns
            .last()
            .map(|turn| turn.timestamp)
            .unwrap_or(self.created_at)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Errors raised while decoding a persisted conversation list
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid session JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected session encoding: expected an array or an object, found {0}")]
    UnexpectedShape(&'static str),
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode a persisted conversation list.
///
/// Accepts the current array encoding and the legacy encoding that kept
/// conversations in an object keyed by identifier. Legacy entries are
/// ordered by creation time.
pub fn decode_conversations(raw: &str) -> Result<Vec<Conversation>, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let mut conversations: Vec<Conversation> = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        Value::Object(map) => {
            let mut legacy = map
                .into_iter()
                .map(|(key, mut entry)| {
                    if let Value::Object(fields) = &mut entry {
                        fields.entry("id").or_insert(Value::String(key));
                    }
                    serde_json::from_value::<Conversation>(entry)
                })
                .collect::<Result<Vec<_>, _>>()?;
            legacy.sort_by_key(|conversation| conversation.created_at);
            legacy
        }
        other => return Err(DecodeError::UnexpectedShape(value_kind(&other))),
    };

    // Entries written without a creation time inherit their first turn's.
    let epoch = unix_epoch();
    for conversation in &mut conversations {
        if conversation.created_at == epoch {
            if let Some(first) = conversation.turns.first() {
                conversation.created_at = first.timestamp;
            }
        }
    }

    Ok(conversations)
}

/// All conversations plus the one currently displayed
///
/// `current` holds an identifier rather than a reference; `None` is the
/// new-chat state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    conversations: Vec<Conversation>,
    current: Option<String>,
}

impl Session {
    pub fn new(conversations: Vec<Conversation>, current: Option<String>) -> Self {
        let mut session = Self {
            conversations,
            current: None,
        };
        if let Some(id) = current {
            session.set_current(Some(id));
        }
        session
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    pub fn current_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.current.clone()?;
        self.get_mut(&id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Point the session at `id`. Returns false, leaving the selection
    /// cleared, when no such conversation exists.
    pub fn set_current(&mut self, id: Option<String>) -> bool {
        match id {
            Some(id) if self.contains(&id) => {
                self.current = Some(id);
                true
            }
            Some(_) => {
                self.current = None;
                false
            }
            None => {
                self.current = None;
                true
            }
        }
    }

    pub fn insert(&mut self, conversation: Conversation) {
        self.conversations.push(conversation);
    }

    /// Remove a conversation. The selection is left untouched; callers
    /// decide what becomes current.
    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| c.id == id)?;
        Some(self.conversations.remove(index))
    }

    /// The conversation with the latest activity
    pub fn most_recently_updated(&self) -> Option<&Conversation> {
        self.conversations
            .iter()
            .max_by_key(|conversation| conversation.last_activity())
    }

    /// A time-derived identifier that is unique within this session
    pub fn next_conversation_id(&self, now: DateTime<Utc>) -> String {
        let mut millis = now.timestamp_millis();
        loop {
            let id = format!("{}{}", CONVERSATION_ID_PREFIX, millis);
            if !self.contains(&id) {
                return id;
            }
            millis += 1;
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// How a prompt is carried to the completion endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestShape {
    /// `GET <endpoint>/<percent-encoded prompt>`
    #[default]
    Path,
    /// `POST <endpoint>` with a JSON body carrying the prompt and recent history
    JsonBody,
}

/// Client configuration, persisted separately from the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub request_shape: RequestShape,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_shape: RequestShape::default(),
        }
    }
}

impl Settings {
    /// Parse persisted settings; fields missing from `raw` keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_configured(&self) -> bool {
        !self.api_url.trim().is_empty()
    }

    pub fn credential(&self) -> Option<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}
