use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::session::{ChatSession, Message as ChatMessage, SessionRegistry};

/// Telegram rejects messages above 4096 chars
const MAX_MESSAGE_LEN: usize = 4000;

/// Quick-reply buttons per keyboard row
const BUTTONS_PER_ROW: usize = 2;

/// One chat session per Telegram chat
pub struct TelegramHost {
    agent: Arc<Agent>,
    sessions: Arc<SessionRegistry<ChatId>>,
    allowed_user_ids: Vec<u64>,
}

impl TelegramHost {
    pub fn new(agent: Arc<Agent>, allowed_user_ids: Vec<u64>) -> Self {
        Self {
            agent,
            sessions: Arc::new(SessionRegistry::new()),
            allowed_user_ids,
        }
    }

    pub fn sessions(&self) -> Arc<SessionRegistry<ChatId>> {
        Arc::clone(&self.sessions)
    }

    /// Empty allow-list lets everybody in
    fn is_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }

    /// New open session whose bot messages are forwarded to the chat
    fn new_session(&self, bot: &Bot, chat_id: ChatId) -> ChatSession {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(bot.clone(), chat_id, rx));

        let mut session = ChatSession::new(Arc::clone(&self.agent), Some(tx));
        session.set_on_toggle(Box::new(move |open: bool| {
            debug!("Chat {:?} widget {}", chat_id, if open { "opened" } else { "closed" });
        }));
        session.set_visible(true);
        session
    }
}

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        // A single char wider than max_len still goes out whole
        if end == start {
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Reply keyboard for a bot message's quick replies; pressing a
/// button sends its label as ordinary text.
fn reply_markup(quick_replies: Option<&[String]>) -> ReplyMarkup {
    match quick_replies {
        Some(labels) if !labels.is_empty() => {
            let rows: Vec<Vec<KeyboardButton>> = labels
                .chunks(BUTTONS_PER_ROW)
                .map(|row| row.iter().map(|label| KeyboardButton::new(label.clone())).collect())
                .collect();
            ReplyMarkup::Keyboard(
                KeyboardMarkup::new(rows)
                    .resize_keyboard()
                    .one_time_keyboard(),
            )
        }
        _ => ReplyMarkup::KeyboardRemove(KeyboardRemove::new()),
    }
}

/// Forward a session's bot messages to its chat until the session is dropped
async fn deliver(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<ChatMessage>) {
    while let Some(message) = rx.recv().await {
        let chunks = split_message(&message.text, MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut request = bot.send_message(chat_id, chunk);
            if i == last {
                request = request.reply_markup(reply_markup(message.quick_replies.as_deref()));
            }
            if let Err(e) = request.await {
                warn!("Failed to deliver message {} to {:?}: {}", message.id, chat_id, e);
            }
        }
    }
    debug!("Delivery to chat {:?} finished", chat_id);
}

/// Run the Telegram host
pub async fn run(host: Arc<TelegramHost>, bot: Bot) -> Result<()> {
    info!("Starting Telegram platform...");

    let filter_host = Arc::clone(&host);
    let handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            let user = msg.from.as_ref()?;
            if filter_host.is_allowed(user.id.0) {
                Some(msg)
            } else {
                None
            }
        })
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![host])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, host: Arc<TelegramHost>) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };
    let text = match msg.text() {
        Some(t) => t.to_string(),
        None => return Ok(()),
    };
    let chat_id = msg.chat.id;

    info!("Telegram message from {} ({}): {}", user.first_name, user.id.0, text);

    match text.as_str() {
        "/start" => {
            // Fresh session; its greeting arrives through the outbox
            let session = host.new_session(&bot, chat_id);
            host.sessions.lock().await.insert(chat_id, session);
            return Ok(());
        }
        "/clear" => {
            host.sessions.remove(&chat_id).await;
            bot.send_message(chat_id, "Conversation cleared.")
                .reply_markup(reply_markup(None))
                .await?;
            return Ok(());
        }
        "/close" => {
            if let Some(session) = host.sessions.lock().await.get_mut(&chat_id) {
                session.close();
            }
            bot.send_message(chat_id, "Chat closed. Send any message to reopen it.")
                .reply_markup(reply_markup(None))
                .await?;
            return Ok(());
        }
        "/transcript" => {
            let transcript = match host.sessions.lock().await.get(&chat_id) {
                Some(session) => session.transcript_json().await,
                None => Ok("[]".to_string()),
            };
            match transcript {
                Ok(json) => {
                    for chunk in split_message(&json, MAX_MESSAGE_LEN) {
                        bot.send_message(chat_id, chunk).await.ok();
                    }
                }
                Err(e) => error!("Failed to export transcript: {:#}", e),
            }
            return Ok(());
        }
        "/help" => {
            bot.send_message(
                chat_id,
                "Ask me anything about renting a vehicle, or tap a suggestion.\n\n\
                 Commands:\n\
                 /start - Start a new conversation\n\
                 /close - Close the chat\n\
                 /clear - Clear conversation history\n\
                 /transcript - Export this conversation as JSON",
            )
            .await?;
            return Ok(());
        }
        _ => {}
    }

    let composing = {
        let mut sessions = host.sessions.lock().await;
        let session = sessions
            .entry(chat_id)
            .or_insert_with(|| host.new_session(&bot, chat_id));
        session.set_visible(true);
        session.send_text(&text).await.is_some() && session.is_composing()
    };

    if composing {
        bot.send_chat_action(chat_id, ChatAction::Typing).await.ok();
    }

    Ok(())
}
