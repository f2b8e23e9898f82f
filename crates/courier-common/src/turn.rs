use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// One user prompt and its corresponding assistant response.
///
/// Immutable once committed to the history store; the response field holds
/// the text that was actually delivered to the chat, which may be a partial
/// answer if the backend stream failed mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: UserId,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user: UserId, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user,
            prompt: prompt.into(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}
