use std::collections::HashMap;
use std::sync::Mutex;

/// Keys for the client-side query cache. The key space is closed, so the
/// cache needs no eviction policy beyond explicit calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MyDraft { form_id: i32 },
    Response { response_id: i32 },
    FormResponses { form_id: i32 },
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    stale: bool,
}

/// Keyed read cache with the two explicit operations the draft lifecycle
/// needs: `invalidate` marks an entry as needing a refetch but keeps the
/// value readable, `evict` drops it entirely.
#[derive(Debug)]
pub struct QueryCache<T> {
    entries: Mutex<HashMap<CacheKey, Entry<T>>>,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> QueryCache<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put(&self, key: CacheKey, value: T) {
        self.lock().insert(key, Entry { value, stale: false });
    }

    /// Cached value, stale or not.
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        self.lock().get(key).map(|e| e.value.clone())
    }

    /// Cached value only while it has not been invalidated.
    pub fn get_fresh(&self, key: &CacheKey) -> Option<T> {
        self.lock().get(key).filter(|e| !e.stale).map(|e| e.value.clone())
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.stale = true;
        }
    }

    pub fn evict(&self, key: &CacheKey) {
        self.lock().remove(key);
    }
}
