use super::{Provider, SessionError, Token};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Entry {
    fields: HashMap<String, String>,
    last_access: Instant,
}

impl Entry {
    fn new() -> Self {
        Self {
            fields: HashMap::new(),
            last_access: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }

    /// Live while `last_access + lifetime >= now`
    fn is_live(&self, lifetime: Duration, now: Instant) -> bool {
        self.last_access
            .checked_add(lifetime)
            .is_none_or(|deadline| deadline >= now)
    }
}

/// Drop `id` when it outlived `lifetime`, returning whether it is still held
fn evict_if_stale(sessions: &mut LruCache<String, Entry>, id: &str, lifetime: Duration) -> bool {
    match sessions.peek(id) {
        None => false,
        Some(entry) if entry.is_live(lifetime, Instant::now()) => true,
        Some(_) => {
            sessions.pop(id);
            false
        }
    }
}

type Sessions = Arc<Mutex<LruCache<String, Entry>>>;

/// Process-local session provider
///
/// Sessions live in an unbounded LRU list: every access through a
/// [`VolatileToken`] moves the session to the front, so [`gc`](Provider::gc)
/// only ever has to look at the back of the list. A session idle for longer
/// than `lifetime` is gone as soon as anyone looks at it, whether or not a
/// sweep ran yet. Each instance is fully independent; two providers never see
/// each other's sessions.
#[derive(Clone)]
pub struct VolatileProvider {
    sessions: Sessions,
    lifetime: Duration,
}

impl VolatileProvider {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(LruCache::unbounded())),
            lifetime,
        }
    }

    /// Number of sessions currently held
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn token(&self, id: &str) -> VolatileToken {
        VolatileToken {
            id: id.to_string(),
            sessions: self.sessions.clone(),
            lifetime: self.lifetime,
        }
    }

    /// Session ids ordered from most to least recently used
    pub fn ids_by_recency(&self) -> Vec<String> {
        self.sessions
            .lock()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for VolatileProvider {
    type Token = VolatileToken;

    async fn init(&self, id: &str) -> Result<VolatileToken, SessionError> {
        self.sessions.lock().push(id.to_string(), Entry::new());
        Ok(self.token(id))
    }

    async fn read(&self, id: &str) -> Result<Option<VolatileToken>, SessionError> {
        // Resolving a handle is not an access; only field operations touch.
        if !evict_if_stale(&mut self.sessions.lock(), id, self.lifetime) {
            return Ok(None);
        }
        Ok(Some(self.token(id)))
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.lock().pop(id);
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<usize, SessionError> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let mut removed = 0;

        while let Some((_, entry)) = sessions.peek_lru() {
            if entry.is_live(max_lifetime, now) {
                break;
            }
            sessions.pop_lru();
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = sessions.len(), "swept idle sessions");
        }
        Ok(removed)
    }
}

/// Handle to one session of a [`VolatileProvider`]
#[derive(Clone)]
pub struct VolatileToken {
    id: String,
    sessions: Sessions,
    lifetime: Duration,
}

impl VolatileToken {
    fn with_entry<T>(&self, f: impl FnOnce(&mut Entry) -> T) -> Option<T> {
        let mut sessions = self.sessions.lock();
        if !evict_if_stale(&mut sessions, &self.id, self.lifetime) {
            return None;
        }
        // get_mut moves the entry to the front
        let entry = sessions.get_mut(&self.id)?;
        let result = f(entry);
        entry.touch();
        Some(result)
    }
}

#[async_trait]
impl Token for VolatileToken {
    async fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.with_entry(|e| {
            e.fields.insert(key.to_string(), value.to_string());
        })
        .ok_or(SessionError::NotFound)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.with_entry(|e| e.fields.get(key).cloned()).flatten())
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.with_entry(|e| {
            e.fields.remove(key);
        })
        .ok_or(SessionError::NotFound)
    }

    async fn get_all(&self) -> Result<HashMap<String, String>, SessionError> {
        Ok(self.with_entry(|e| e.fields.clone()).unwrap_or_default())
    }

    fn token_id(&self) -> &str {
        &self.id
    }
}
