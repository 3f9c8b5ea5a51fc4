pub mod message;
pub mod registry;

pub use message::{Message, Sender};
pub use registry::SessionRegistry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::Agent;

/// Widget visibility as seen by the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Closed,
    Open,
    Minimized,
}

impl Visibility {
    /// Minimized still counts as open for the launcher
    pub fn is_open(&self) -> bool {
        !matches!(self, Visibility::Closed)
    }
}

/// Called with the new open/closed flag whenever it changes
pub type ToggleCallback = Box<dyn Fn(bool) + Send + Sync>;

/// One chat widget instance: visibility, input buffer and the
/// append-only message log. Owned by its host; pending replies are
/// cancelled when the session is closed or dropped.
pub struct ChatSession {
    id: String,
    agent: Arc<Agent>,
    log: Arc<Mutex<Vec<Message>>>,
    visibility: Visibility,
    input: String,
    pending: Vec<JoinHandle<()>>,
    /// Bumped on every cancel; replies issued under an older value are discarded
    generation: Arc<AtomicU64>,
    on_toggle: Option<ToggleCallback>,
    outbox: Option<mpsc::UnboundedSender<Message>>,
    last_active: DateTime<Utc>,
}

impl ChatSession {
    /// Create a closed session seeded with the greeting.
    /// Bot messages (greeting included) are also pushed to `outbox` if given.
    pub fn new(agent: Arc<Agent>, outbox: Option<mpsc::UnboundedSender<Message>>) -> Self {
        let greeting = agent.greeting();
        if let Some(tx) = &outbox {
            if tx.send(greeting.clone()).is_err() {
                warn!("Outbox closed before greeting was delivered");
            }
        }

        let id = Uuid::new_v4().to_string();
        debug!("Created chat session {}", id);

        Self {
            id,
            agent,
            log: Arc::new(Mutex::new(vec![greeting])),
            visibility: Visibility::Closed,
            input: String::new(),
            pending: Vec::new(),
            generation: Arc::new(AtomicU64::new(0)),
            on_toggle: None,
            outbox,
            last_active: Utc::now(),
        }
    }

    pub fn set_on_toggle(&mut self, callback: ToggleCallback) {
        self.on_toggle = Some(callback);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// True while at least one bot reply is still scheduled
    pub fn is_composing(&self) -> bool {
        self.pending.iter().any(|handle| !handle.is_finished())
    }

    pub fn toggle(&mut self) {
        let open = !self.visibility.is_open();
        self.set_open(open);
    }

    /// Host-driven visibility; no-op when already in the requested state.
    pub fn set_visible(&mut self, visible: bool) {
        self.set_open(visible);
    }

    pub fn close(&mut self) {
        self.set_open(false);
    }

    pub fn minimize(&mut self) {
        if self.visibility == Visibility::Open {
            self.visibility = Visibility::Minimized;
            self.touch();
        }
    }

    pub fn restore(&mut self) {
        if self.visibility == Visibility::Minimized {
            self.visibility = Visibility::Open;
            self.touch();
        }
    }

    fn set_open(&mut self, open: bool) {
        if self.visibility.is_open() == open {
            return;
        }

        self.visibility = if open {
            Visibility::Open
        } else {
            Visibility::Closed
        };
        if !open {
            self.cancel_pending();
        }
        self.touch();

        info!(
            "Session {} {}",
            self.id,
            if open { "opened" } else { "closed" }
        );
        if let Some(callback) = &self.on_toggle {
            callback(open);
        }
    }

    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
    }

    /// Send whatever is in the input buffer.
    ///
    /// Returns the appended user message, or `None` when the input was
    /// blank or the widget is not open. The bot reply follows after the
    /// configured delay.
    pub async fn submit(&mut self) -> Option<Message> {
        if self.visibility != Visibility::Open {
            debug!("Session {} ignored input while {:?}", self.id, self.visibility);
            return None;
        }

        let input = std::mem::take(&mut self.input);
        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        self.touch();
        let user_msg = Message::user(text);
        self.log.lock().await.push(user_msg.clone());

        let (topic, entry) = self.agent.reply_to(text);
        let entry = entry.clone();
        info!("Session {}: scheduling {} reply", self.id, topic);

        self.pending.retain(|handle| !handle.is_finished());

        let log = Arc::clone(&self.log);
        let outbox = self.outbox.clone();
        let delay = self.agent.config.reply_delay();
        let session_id = self.id.clone();
        let generation = Arc::clone(&self.generation);
        let issued = generation.load(Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let reply = Message::bot(&entry.text, entry.quick_replies);
            if !append_reply(&log, &generation, issued, reply.clone()).await {
                debug!("Session {}: dropped reply cancelled before delivery", session_id);
                return;
            }

            if let Some(tx) = outbox {
                if tx.send(reply).is_err() {
                    warn!("Session {}: outbox closed, reply not delivered", session_id);
                }
            }
        });
        self.pending.push(handle);

        Some(user_msg)
    }

    /// Equivalent to typing `text` and pressing send
    pub async fn send_text(&mut self, text: &str) -> Option<Message> {
        self.set_input(text);
        self.submit().await
    }

    /// Equivalent to typing the label and pressing send
    pub async fn choose_quick_reply(&mut self, label: &str) -> Option<Message> {
        self.send_text(label).await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.log.lock().await.clone()
    }

    /// Quick replies offered by the most recent bot message, if any
    pub async fn last_quick_replies(&self) -> Option<Vec<String>> {
        self.log
            .lock()
            .await
            .iter()
            .rev()
            .find(|msg| msg.sender == Sender::Bot)
            .and_then(|msg| msg.quick_replies.clone())
    }

    pub async fn transcript_json(&self) -> Result<String> {
        let log = self.log.lock().await;
        serde_json::to_string_pretty(&*log).context("Failed to serialize transcript")
    }

    fn cancel_pending(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut cancelled = 0;
        for handle in self.pending.drain(..) {
            if !handle.is_finished() {
                handle.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!("Session {}: cancelled {} pending reply(s)", self.id, cancelled);
        }
    }

    fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

/// Append a scheduled reply unless replies were cancelled since it was issued.
/// The check runs under the log lock, so it cannot interleave with another append.
async fn append_reply(
    log: &Mutex<Vec<Message>>,
    generation: &AtomicU64,
    issued: u64,
    reply: Message,
) -> bool {
    let mut log = log.lock().await;
    if generation.load(Ordering::SeqCst) != issued {
        return false;
    }
    log.push(reply);
    true
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::config::ChatConfig;
    use crate::intent::Topic;
    use crate::responses::ResponseTable;

    const DELAY: Duration = Duration::from_millis(1000);

    fn agent() -> Arc<Agent> {
        Arc::new(Agent::new(ChatConfig {
            reply_delay_ms: DELAY.as_millis() as u64,
            ..ChatConfig::default()
        }))
    }

    fn open_session() -> ChatSession {
        let mut session = ChatSession::new(agent(), None);
        session.toggle();
        session
    }

    async fn wait_for_reply() {
        tokio::time::sleep(DELAY + Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_is_closed_with_greeting() {
        let session = ChatSession::new(agent(), None);
        assert_eq!(session.visibility(), Visibility::Closed);
        let log = session.messages().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::Bot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_cycle_appends_user_then_bot() {
        let mut session = open_session();

        let sent = session.send_text("Where do I swap my battery?").await;
        assert_eq!(sent.unwrap().sender, Sender::User);
        assert_eq!(session.messages().await.len(), 2);
        assert!(session.is_composing());
        assert!(session.input().is_empty());

        wait_for_reply().await;

        let log = session.messages().await;
        assert_eq!(log.len(), 3);
        assert!(!session.is_composing());
        let expected = ResponseTable::builtin().respond(Topic::BatterySwap).clone();
        assert_eq!(log[2].sender, Sender::Bot);
        assert_eq!(log[2].text, expected.text);
        assert_eq!(log[2].quick_replies, expected.quick_replies);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_not_visible_before_delay() {
        let mut session = open_session();
        session.send_text("help").await;

        tokio::time::sleep(DELAY / 2).await;
        assert_eq!(session.messages().await.len(), 2);
        assert!(session.is_composing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_is_ignored() {
        let mut session = open_session();
        assert!(session.send_text("").await.is_none());
        assert!(session.send_text("   ").await.is_none());
        assert!(!session.is_composing());

        wait_for_reply().await;
        assert_eq!(session.messages().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_grows_by_two_per_cycle() {
        let mut session = open_session();
        session.send_text("rental plans").await;
        session.send_text("book now").await;

        wait_for_reply().await;

        let log = session.messages().await;
        assert_eq!(log.len(), 5);
        let senders: Vec<Sender> = log.iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![Sender::Bot, Sender::User, Sender::User, Sender::Bot, Sender::Bot]
        );
        assert!(log.iter().all(|m| m.sender == Sender::Bot || m.quick_replies.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_reply_matches_typing() {
        let mut typed = open_session();
        let mut clicked = open_session();

        typed.send_text("Book Now").await;
        clicked.choose_quick_reply("Book Now").await;
        wait_for_reply().await;

        let typed_log = typed.messages().await;
        let clicked_log = clicked.messages().await;
        assert_eq!(typed_log.len(), clicked_log.len());
        for (a, b) in typed_log.iter().zip(clicked_log.iter()) {
            assert_eq!(a.sender, b.sender);
            assert_eq!(a.text, b.text);
            assert_eq!(a.quick_replies, b.quick_replies);
        }
        assert_eq!(clicked_log[1].text, "Book Now");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_mid_delay_cancels_reply() {
        let mut session = open_session();
        session.send_text("kyc").await;
        session.close();

        assert!(!session.is_composing());
        wait_for_reply().await;
        assert_eq!(session.messages().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_mid_delay_cancels_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::new(agent(), Some(tx));
        session.toggle();

        let greeting = rx.recv().await.unwrap();
        assert_eq!(greeting.sender, Sender::Bot);

        session.send_text("earn money").await;
        drop(session);

        wait_for_reply().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbox_receives_bot_replies() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = ChatSession::new(agent(), Some(tx));
        session.toggle();
        rx.recv().await.unwrap();

        session.send_text("contact").await;
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.sender, Sender::Bot);
        assert!(reply.text.contains("Customer Support"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_callback_fires_on_open_close_only() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let recorded = Arc::clone(&events);

        let mut session = ChatSession::new(agent(), None);
        session.set_on_toggle(Box::new(move |open: bool| recorded.lock().unwrap().push(open)));

        session.toggle();
        session.minimize();
        session.restore();
        session.set_visible(true);
        session.toggle();
        session.set_visible(false);
        session.set_visible(true);

        assert_eq!(*events.lock().unwrap(), vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimize_only_while_open() {
        let mut session = ChatSession::new(agent(), None);
        session.minimize();
        assert_eq!(session.visibility(), Visibility::Closed);

        session.toggle();
        session.minimize();
        assert_eq!(session.visibility(), Visibility::Minimized);
        assert!(session.visibility().is_open());

        session.toggle();
        assert_eq!(session.visibility(), Visibility::Closed);
        session.restore();
        assert_eq!(session.visibility(), Visibility::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_ignored_unless_open() {
        let mut session = ChatSession::new(agent(), None);
        assert!(session.send_text("rental").await.is_none());

        session.toggle();
        session.minimize();
        assert!(session.send_text("rental").await.is_none());
        assert_eq!(session.input(), "rental");

        session.restore();
        assert!(session.submit().await.is_some());
        assert_eq!(session.messages().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_quick_replies_follow_latest_bot_message() {
        let mut session = open_session();
        session.send_text("kyc").await;
        wait_for_reply().await;

        let replies = session.last_quick_replies().await.unwrap();
        assert_eq!(replies, vec!["Upload Documents", "Contact Support"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_json_lists_messages() {
        let session = ChatSession::new(agent(), None);
        let json = session.transcript_json().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["sender"], "bot");
    }

    #[tokio::test]
    async fn test_append_reply_discards_stale_generation() {
        let log = Mutex::new(Vec::new());
        let generation = AtomicU64::new(0);

        assert!(append_reply(&log, &generation, 0, Message::bot("first", None)).await);

        generation.fetch_add(1, Ordering::SeqCst);
        assert!(!append_reply(&log, &generation, 0, Message::bot("late", None)).await);
        assert!(append_reply(&log, &generation, 1, Message::bot("fresh", None)).await);

        let texts: Vec<String> = log.lock().await.iter().map(|m| m.text.clone()).collect();
        assert_eq!(texts, vec!["first", "fresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_after_close_only_shows_new_replies() {
        let mut session = open_session();
        session.send_text("kyc").await;
        session.close();
        session.toggle();
        session.send_text("battery").await;

        wait_for_reply().await;

        let log = session.messages().await;
        assert_eq!(log.len(), 4);
        let expected = ResponseTable::builtin().respond(Topic::BatterySwap).text.clone();
        assert_eq!(log[3].text, expected);
    }
}
