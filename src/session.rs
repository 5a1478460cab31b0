//! Per-upload document context
//!
//! Each processed document gets its own session id, and chat turns are
//! answered against the text stored under that id. The store keeps at most
//! `capacity` sessions and drops the oldest first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct SessionEntry {
    pub text: Arc<str>,
    pub created_at: DateTime<Local>,
}

impl SessionEntry {
    /// Whole seconds since the session was created.
    pub fn age_secs(&self) -> i64 {
        (Local::now() - self.created_at).num_seconds()
    }
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    order: VecDeque<String>,
}

pub struct SessionStore {
    capacity: usize,
    inner: RwLock<Sessions>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(Sessions::default()),
        }
    }

    /// Store `text` under a fresh session id and return the id.
    pub async fn create(&self, text: String) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            text: Arc::from(text),
            created_at: Local::now(),
        };

        let mut sessions = self.inner.write().await;
        sessions.entries.insert(id.clone(), entry);
        sessions.order.push_back(id.clone());
        while sessions.order.len() > self.capacity {
            if let Some(oldest) = sessions.order.pop_front() {
                if let Some(evicted) = sessions.entries.remove(&oldest) {
                    log::info!(
                        "Evicting session {} after {}s (created {})",
                        oldest,
                        evicted.age_secs(),
                        evicted.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        id
    }

    pub async fn get(&self, id: &str) -> Option<SessionEntry> {
        self.inner.read().await.entries.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(8);
        let a = store.create("paper A".to_string()).await;
        let b = store.create("paper B".to_string()).await;

        assert_ne!(a, b);
        assert_eq!(&*store.get(&a).await.unwrap().text, "paper A");
        assert_eq!(&*store.get(&b).await.unwrap().text, "paper B");
    }

    #[tokio::test]
    async fn test_same_text_gets_distinct_ids() {
        let store = SessionStore::new(8);
        let a = store.create("same".to_string()).await;
        let b = store.create("same".to_string()).await;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_ids_are_random_uuids() {
        let store = SessionStore::new(8);
        let id = store.create("text".to_string()).await;
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_oldest_session_is_evicted() {
        let store = SessionStore::new(2);
        let first = store.create("1".to_string()).await;
        let second = store.create("2".to_string()).await;
        let third = store.create("3".to_string()).await;

        assert!(store.get(&first).await.is_none());
        assert!(store.get(&second).await.is_some());
        assert!(store.get(&third).await.is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_age_is_measured_from_creation() {
        let store = SessionStore::new(2);
        let id = store.create("aging".to_string()).await;
        let mut entry = store.get(&id).await.unwrap();
        assert!(entry.created_at <= Local::now());
        assert!(entry.age_secs() < 5);

        entry.created_at = Local::now() - chrono::Duration::seconds(90);
        assert!(entry.age_secs() >= 90);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::new(2);
        assert!(store.is_empty().await);
        assert!(store.get("nope").await.is_none());
    }
}
