use cade_core::config::SessionConfig;
use cade_core::session::SessionContext;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

struct SessionSlot {
    context: Arc<Mutex<SessionContext>>,
    last_used: Instant,
}

impl SessionSlot {
    /// Someone outside the map still holds the context (an in-flight turn).
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.context) > 1
    }
}

/// In-memory cache of per-session dispatch contexts.
///
/// Each context sits behind its own mutex. Holding that mutex for the whole
/// turn serializes turns of one session, while turns of different sessions
/// only share the brief map lookup.
///
/// The cache holds at most `max_sessions` contexts. Making room for a new
/// session drops contexts idle for longer than `idle_ttl`, then the least
/// recently used one. A context handed out to an in-flight turn is never
/// dropped, so the cache can briefly exceed its bound when every context is
/// busy.
pub struct SessionContexts {
    sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionContexts {
    /// Creates a new empty cache with the default bounds.
    pub fn new() -> Self {
        Self::with_limits(&SessionConfig::default())
    }

    pub fn with_limits(config: &SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions: config.max_sessions.max(1),
            idle_ttl: config.idle_ttl(),
        }
    }

    /// Returns the context for `session_id`, creating an empty one if needed.
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<SessionContext>> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        if let Some(slot) = sessions.get_mut(session_id) {
            slot.last_used = now;
            return Arc::clone(&slot.context);
        }

        self.make_room(&mut sessions, now);
        let context = Arc::new(Mutex::new(SessionContext::new(session_id)));
        sessions.insert(
            session_id.to_string(),
            SessionSlot {
                context: Arc::clone(&context),
                last_used: now,
            },
        );
        context
    }

    fn make_room(&self, sessions: &mut HashMap<String, SessionSlot>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, slot| {
            slot.in_use() || now.duration_since(slot.last_used) <= self.idle_ttl
        });

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, slot)| !slot.in_use())
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            let Some(id) = oldest else {
                tracing::warn!(
                    sessions = sessions.len(),
                    max_sessions = self.max_sessions,
                    "Every session context is in use, exceeding the bound"
                );
                break;
            };
            sessions.remove(&id);
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "Evicted idle session contexts");
        }
    }

    /// A copy of the current context, if the session is known.
    ///
    /// Waits for an in-flight turn of that session to finish.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionContext> {
        let context = self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|slot| Arc::clone(&slot.context))?;
        let guard = context.lock().await;
        Some(guard.clone())
    }

    /// Removes a session's context.
    pub async fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
    }

    /// Clears all cached contexts.
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionContexts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded(max_sessions: usize, idle_ttl_secs: u64) -> SessionContexts {
        SessionContexts::with_limits(&SessionConfig {
            max_sessions,
            idle_ttl_secs,
        })
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_context() {
        let contexts = SessionContexts::new();
        let first = contexts.get_or_create("s-1").await;
        first.lock().await.turn_count = 3;

        let again = contexts.get_or_create("s-1").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(contexts.snapshot("s-1").await.unwrap().turn_count, 3);
        assert!(contexts.snapshot("s-2").await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let contexts = SessionContexts::new();
        contexts.get_or_create("a").await.lock().await.turn_count = 1;
        contexts.get_or_create("b").await;

        assert_eq!(contexts.len().await, 2);
        assert_eq!(contexts.snapshot("b").await.unwrap().turn_count, 0);

        contexts.remove("a").await;
        assert_eq!(contexts.len().await, 1);
        contexts.clear().await;
        assert!(contexts.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let contexts = bounded(3, 3600);
        for id in ["a", "b", "c"] {
            contexts.get_or_create(id).await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        // Touching "a" makes "b" the oldest.
        contexts.get_or_create("a").await;
        tokio::time::advance(Duration::from_secs(1)).await;

        contexts.get_or_create("d").await;
        assert_eq!(contexts.len().await, 3);
        assert!(contexts.snapshot("b").await.is_none());
        assert!(contexts.snapshot("a").await.is_some());
        assert!(contexts.snapshot("d").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_sessions_stay_within_capacity() {
        let contexts = bounded(16, 3600);
        for i in 0..500 {
            contexts.get_or_create(&format!("s-{i}")).await;
        }
        assert_eq!(contexts.len().await, 16);
        assert!(contexts.snapshot("s-499").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire_on_next_insert() {
        let contexts = bounded(100, 60);
        contexts.get_or_create("old-1").await;
        contexts.get_or_create("old-2").await;
        tokio::time::advance(Duration::from_secs(61)).await;

        contexts.get_or_create("fresh").await;
        assert_eq!(contexts.len().await, 1);
        assert!(contexts.snapshot("fresh").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_context_is_never_evicted() {
        let contexts = bounded(2, 60);
        let held = contexts.get_or_create("busy").await;
        let _guard = held.lock().await;
        contexts.get_or_create("idle").await;
        tokio::time::advance(Duration::from_secs(120)).await;

        contexts.get_or_create("new-1").await;
        contexts.get_or_create("new-2").await;

        let sessions = contexts.sessions.read().await;
        assert!(sessions.contains_key("busy"));
        assert!(!sessions.contains_key("idle"));
        assert_eq!(sessions.len(), 2);
    }
}
