use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One entry of a conversation log. Never mutated once appended.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_replies: Option<Vec<String>>,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self::new(text, Sender::User, None)
    }

    /// Quick replies only ever ride on bot messages; an empty list is dropped.
    pub fn bot(text: &str, quick_replies: Option<Vec<String>>) -> Self {
        let quick_replies = quick_replies.filter(|replies| !replies.is_empty());
        Self::new(text, Sender::Bot, quick_replies)
    }

    fn new(text: &str, sender: Sender, quick_replies: Option<Vec<String>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            sender,
            timestamp: Utc::now(),
            quick_replies,
        }
    }
}
