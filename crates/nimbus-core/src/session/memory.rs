use super::{ConversationState, SessionGuard, SessionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Process-local store: a state map plus one async mutex per conversation.
#[derive(Default)]
pub struct InMemorySessionStore {
    states: DashMap<String, ConversationState>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn lock(&self, conversation_id: &str) -> SessionGuard {
        // Clone the Arc out so no DashMap shard guard lives across the await.
        let mutex = self
            .locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        SessionGuard::new(mutex.lock_owned().await)
    }

    async fn get(&self, conversation_id: &str) -> Option<ConversationState> {
        self.states.get(conversation_id).map(|s| s.value().clone())
    }

    async fn put(&self, state: ConversationState) {
        self.states.insert(state.conversation_id.clone(), state);
    }

    async fn delete(&self, conversation_id: &str) -> bool {
        self.states.remove(conversation_id).is_some()
    }

    async fn purge_expired(&self, now: Instant, idle_timeout: Duration) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, state| !state.is_purgeable(now, idle_timeout));
        let purged = before.saturating_sub(self.states.len());
        // Only drop locks nobody is holding or waiting on.
        self.locks.retain(|id, lock| {
            self.states.contains_key(id) || Arc::strong_count(lock) > 1
        });
        if purged > 0 {
            tracing::info!(target: "nimbus::session", purged, "expired conversations purged");
        }
        purged
    }

    async fn active_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = InMemorySessionStore::new();
        let now = Instant::now();
        store.put(ConversationState::new("a", now)).await;
        store.put(ConversationState::new("b", now)).await;
        assert!(store.delete("a").await);
        assert!(store.get("a").await.is_none());
        assert_eq!(store.get("b").await.unwrap().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_states() {
        let store = InMemorySessionStore::new();
        let start = Instant::now();
        store.put(ConversationState::new("old", start)).await;
        let later = start + Duration::from_secs(120);
        store.put(ConversationState::new("fresh", later)).await;
        let purged = store.purge_expired(later, Duration::from_secs(60)).await;
        assert_eq!(purged, 1);
        assert_eq!(store.active_count().await, 1);
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn pending_states_outlive_one_timeout() {
        use crate::call::OperationCall;
        use crate::catalog::OperationCatalog;

        let store = InMemorySessionStore::new();
        let start = Instant::now();
        let op = OperationCatalog::standard().lookup("create_server").unwrap();
        let mut collecting = ConversationState::new("collecting", start);
        collecting.phase = Phase::Collecting(OperationCall::new(op, &serde_json::Map::new()));
        store.put(collecting).await;
        store.put(ConversationState::new("idle", start)).await;

        let timeout = Duration::from_secs(60);
        assert_eq!(store.purge_expired(start + Duration::from_secs(90), timeout).await, 1);
        assert!(store.get("collecting").await.is_some());
        assert_eq!(store.purge_expired(start + Duration::from_secs(121), timeout).await, 1);
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn lock_serializes_same_conversation() {
        let store = Arc::new(InMemorySessionStore::new());
        let guard = store.lock("c").await;
        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _g = store.lock("c").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        // A different conversation is not blocked.
        let _other = store.lock("d").await;
        drop(guard);
        contender.await.unwrap();
    }
}
