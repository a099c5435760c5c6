// Conversation session store
// Author: kelexine (https://github.com/kelexine)

use crate::config::SessionConfig;
use crate::gemini::ChatSession;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Keeps Gemini conversations between requests, keyed by conversation id.
///
/// Sessions are checked out: `take` removes the entry and the caller `put`s
/// it back after the turn, so two requests never drive the same session.
pub trait SessionStore: Send + Sync {
    /// Remove and return the session for `id`, if present and not expired.
    fn take(&self, id: &str) -> Option<ChatSession>;

    /// Store (or return) a session.
    fn put(&self, id: &str, session: ChatSession);

    /// Forget a session.
    fn evict(&self, id: &str);

    /// Drop every expired entry; returns how many were removed.
    fn purge_expired(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    session: ChatSession,
    last_used: Instant,
}

/// LRU-bounded store whose entries also expire after an idle TTL.
pub struct InMemorySessionStore {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_entries, Duration::from_secs(config.ttl_seconds))
    }
}

impl SessionStore for InMemorySessionStore {
    fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.last_used.elapsed() > self.ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            entries.pop(id);
        }
        if !expired.is_empty() {
            debug!("Purged {} expired session(s)", expired.len());
        }
        crate::metrics::set_active_sessions(entries.len());
        expired.len()
    }

    fn take(&self, id: &str) -> Option<ChatSession> {
        let entry = {
            let mut entries = self.entries.lock();
            let entry = entries.pop(id);
            crate::metrics::set_active_sessions(entries.len());
            entry?
        };
        if entry.last_used.elapsed() > self.ttl {
            debug!("Session {} expired", id);
            return None;
        }
        Some(entry.session)
    }

    fn put(&self, id: &str, session: ChatSession) {
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(
            id.to_string(),
            Entry {
                session,
                last_used: Instant::now(),
            },
        ) {
            if evicted != id {
                debug!("Session store full; evicted {}", evicted);
            }
        }
        crate::metrics::set_active_sessions(entries.len());
    }

    fn evict(&self, id: &str) {
        let mut entries = self.entries.lock();
        entries.pop(id);
        crate::metrics::set_active_sessions(entries.len());
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
