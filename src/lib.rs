pub mod ai;
pub mod api;
pub mod chat;
pub mod chunker;
pub mod db;
pub mod digest;
pub mod error;
pub mod index;
pub mod prompts;
pub mod rank;

use std::sync::Arc;

pub type SharedDB = Arc<db::DiaryDB>;

/// Run a blocking DB operation on tokio's blocking thread pool.
///
/// All synchronous DiaryDB calls in async context MUST go through this
/// to avoid starving tokio worker threads.
pub async fn db_call<F, T>(db: &SharedDB, f: F) -> Result<T, error::MemoirError>
where
    F: FnOnce(&db::DiaryDB) -> T + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| error::MemoirError::Internal(e.to_string()))
}

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDB,
    pub ai: Option<ai::AiConfig>,
    pub api_key: Option<String>,
    pub embed_cache: EmbedCache,
    pub started_at: std::time::Instant,
}

use lru::LruCache;
use std::num::NonZeroUsize;

/// Small LRU cache for query embeddings so repeated questions in a session
/// don't hit the embedding API twice.
#[derive(Clone)]
pub struct EmbedCache {
    inner: Arc<parking_lot::Mutex<EmbedCacheInner>>,
}

struct EmbedCacheInner {
    cache: LruCache<String, Vec<f32>>,
    hits: u64,
    misses: u64,
}

impl EmbedCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(EmbedCacheInner {
                cache: LruCache::new(
                    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(128).unwrap()),
                ),
                hits: 0,
                misses: 0,
            })),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        let val = inner.cache.get(key).cloned();
        if val.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        val
    }

    pub fn insert(&self, key: String, value: Vec<f32>) {
        let mut inner = self.inner.lock();
        inner.cache.put(key, value);
    }

    pub fn stats(&self) -> (usize, usize, u64, u64) {
        let inner = self.inner.lock();
        (inner.cache.len(), inner.cache.cap().get(), inner.hits, inner.misses)
    }
}
