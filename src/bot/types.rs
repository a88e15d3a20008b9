use crate::application::SubmitterIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity reported by the bus when a session is established
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
}

impl BotIdentity {
    pub fn handle(&self) -> String {
        match &self.username {
            Some(username) => format!("@{}", username),
            None => format!("bot {}", self.id),
        }
    }
}

/// A chat message delivered to the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub update_id: i64,
    pub message_id: i64,
    pub chat_id: i64,
    pub from: SubmitterIdentity,
    pub text: Option<String>,
    pub date: DateTime<Utc>,
}

/// One long-poll result. Updates without a message (edits, joins, ...) still
/// advance the poll offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<InboundMessage>,
}
