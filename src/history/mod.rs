use std::collections::HashMap;
use tokio::sync::Mutex;
use log::debug;

use crate::models::chat::Message;

/// 10 user/assistant exchanges.
pub const MAX_HISTORY_MESSAGES: usize = 20;

/// In-memory conversation histories keyed by conversation id.
///
/// One lock guards the whole map, so each read-modify-write of a history is
/// atomic. The lock is never held across a provider call.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<String, Vec<Message>>>,
    max_messages: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY_MESSAGES)
    }
}

impl ConversationStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            max_messages,
        }
    }

    /// History for `conversation_id`, oldest first. Empty if the id is unknown.
    pub async fn get(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations.lock().await.get(conversation_id).cloned().unwrap_or_default()
    }

    /// Appends one exchange and keeps only the most recent messages.
    pub async fn append(&self, conversation_id: &str, user: Message, assistant: Message) {
        let mut conversations = self.conversations.lock().await;
        let history = conversations.entry(conversation_id.to_string()).or_default();
        history.push(user);
        history.push(assistant);
        if history.len() > self.max_messages {
            let excess = history.len() - self.max_messages;
            history.drain(..excess);
            debug!("Trimmed {} old messages from conversation {}", excess, conversation_id);
        }
    }

    /// Drops the history; false if there was nothing to drop.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        self.conversations.lock().await.remove(conversation_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }
}

pub fn format_history_for_log(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;
    use std::sync::Arc;

    async fn fill(store: &ConversationStore, id: &str, exchanges: usize) {
        for i in 0..exchanges {
            store.append(id, Message::user(format!("q{i}")), Message::assistant(format!("a{i}"))).await;
        }
    }

    #[tokio::test]
    async fn unknown_id_has_empty_history() {
        let store = ConversationStore::default();
        assert!(store.get("nope").await.is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn keeps_every_message_up_to_the_cap() {
        for exchanges in 1..=10 {
            let store = ConversationStore::default();
            fill(&store, "c", exchanges).await;
            let history = store.get("c").await;
            assert_eq!(history.len(), (2 * exchanges).min(MAX_HISTORY_MESSAGES));
            assert_eq!(history[0].content, "q0");
            assert_eq!(history.last().unwrap().content, format!("a{}", exchanges - 1));
        }
    }

    #[tokio::test]
    async fn trims_oldest_messages_first() {
        let store = ConversationStore::default();
        fill(&store, "c", 13).await;
        let history = store.get("c").await;
        assert_eq!(history.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(history[0].content, "q3");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[19].content, "a12");
    }

    #[tokio::test]
    async fn clear_reports_whether_id_existed() {
        let store = ConversationStore::default();
        fill(&store, "c", 1).await;
        assert!(store.clear("c").await);
        assert!(store.get("c").await.is_empty());
        assert!(!store.clear("c").await);
    }

    #[tokio::test]
    async fn conversations_are_independent() {
        let store = ConversationStore::default();
        fill(&store, "a", 2).await;
        fill(&store, "b", 1).await;
        assert_eq!(store.get("a").await.len(), 4);
        assert_eq!(store.get("b").await.len(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn log_format_prefixes_roles() {
        let text = format_history_for_log(&[Message::user("hi"), Message::assistant("hey")]);
        assert_eq!(text, "user: hi\nassistant: hey");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_to_one_id_are_not_lost() {
        for writers in [3usize, 8, 32] {
            let store = Arc::new(ConversationStore::default());
            let handles: Vec<_> = (0..writers)
                .map(|i| {
                    let store = Arc::clone(&store);
                    tokio::spawn(async move {
                        store.append("shared", Message::user(format!("q{i}")), Message::assistant(format!("a{i}"))).await;
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }

            let history = store.get("shared").await;
            assert_eq!(history.len(), (2 * writers).min(MAX_HISTORY_MESSAGES));
            // Exchanges never interleave: every question is followed by its own answer.
            for pair in history.chunks(2) {
                assert_eq!(pair[0].role, Role::User);
                assert_eq!(pair[1].content, pair[0].content.replacen('q', "a", 1));
            }
        }
    }
}
