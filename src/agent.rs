use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::intent::{classify, Topic};
use crate::responses::{ResponseEntry, ResponseTable};
use crate::session::Message;

/// Rule-based responder shared by every session.
/// Host-agnostic: takes user text, returns the canned reply to show.
pub struct Agent {
    pub config: ChatConfig,
    responses: ResponseTable,
}

impl Agent {
    pub fn new(config: ChatConfig) -> Self {
        let responses = ResponseTable::builtin();
        info!("Loaded {} canned responses", responses.len());
        Self { config, responses }
    }

    /// Classify the text and look up its reply
    pub fn reply_to(&self, text: &str) -> (Topic, &ResponseEntry) {
        let topic = classify(text);
        debug!("Classified {:?} as {}", text, topic);
        (topic, self.responses.respond(topic))
    }

    /// First bot message of a new session; offers the same
    /// follow-ups as the fallback reply.
    pub fn greeting(&self) -> Message {
        let suggestions = &self.responses.respond(Topic::Default).quick_replies;
        Message::bot(&self.config.greeting, suggestions.clone())
    }
}
