use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of a stored exam record. Generated once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Single-use token correlating an inbound event to its one permitted reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRecord {
    pub id: RecordId,
    pub name: String,
    /// `yyyy-mm-dd`. Validated syntactically at dispatch, not for
    /// calendar validity.
    pub date: String,
    pub created_at: DateTime<Utc>,
}

/// Inbound webhook event, decoded once at the boundary. Internal logic
/// never re-inspects raw `type` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    TextMessage { reply_token: ReplyToken, text: String },
    Postback { reply_token: ReplyToken, action: String },
    /// Non-text messages and event types this bot does not handle.
    Other,
}
