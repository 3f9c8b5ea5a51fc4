use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use super::ChatSession;

/// Sessions of a multi-user host, keyed by chat
pub struct SessionRegistry<K> {
    sessions: Mutex<HashMap<K, ChatSession>>,
}

impl<K: Eq + Hash + Debug> SessionRegistry<K> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, HashMap<K, ChatSession>> {
        self.sessions.lock().await
    }

    /// Drop a session, cancelling its pending replies
    pub async fn remove(&self, key: &K) -> bool {
        self.sessions.lock().await.remove(key).is_some()
    }

    /// Drop every session idle for longer than `max_idle` as of `now`.
    /// Sessions with a reply still scheduled are kept until it lands.
    pub async fn sweep_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|key, session| {
            let keep = session.is_composing() || now - session.last_active() <= max_idle;
            if !keep {
                info!("Expiring idle session {} for {:?}", session.id(), key);
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl<K: Eq + Hash + Debug> Default for SessionRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agent::Agent;
    use crate::config::ChatConfig;
    use crate::session::Sender;

    fn session() -> ChatSession {
        ChatSession::new(Arc::new(Agent::new(ChatConfig::default())), None)
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = SessionRegistry::new();
        registry.lock().await.insert("chat-1".to_string(), session());
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(&"chat-1".to_string()).await);
        assert!(!registry.remove(&"chat-1".to_string()).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_recent_sessions() {
        let registry = SessionRegistry::new();
        registry.lock().await.insert(1_i64, session());

        let swept = registry.sweep_idle(Utc::now(), Duration::minutes(30)).await;
        assert_eq!(swept, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_sessions() {
        let registry = SessionRegistry::new();
        {
            let mut sessions = registry.lock().await;
            sessions.insert(1_i64, session());
            sessions.insert(2_i64, session());
        }

        let later = Utc::now() + Duration::hours(1);
        let swept = registry.sweep_idle(later, Duration::minutes(30)).await;
        assert_eq!(swept, 2);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_session_with_pending_reply() {
        let registry = SessionRegistry::new();
        {
            let mut sessions = registry.lock().await;
            let mut composing = session();
            composing.toggle();
            composing.send_text("battery").await.unwrap();
            sessions.insert(1_i64, composing);
            sessions.insert(2_i64, session());
        }

        let later = Utc::now() + Duration::hours(1);
        let swept = registry.sweep_idle(later, Duration::minutes(30)).await;
        assert_eq!(swept, 1);
        assert_eq!(registry.len().await, 1);

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let sessions = registry.lock().await;
        let log = sessions[&1_i64].messages().await;
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].sender, Sender::Bot);
        assert!(!sessions[&1_i64].is_composing());
    }
}
