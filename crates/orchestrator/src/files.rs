use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Reads source files on behalf of the orchestrator
#[async_trait]
pub trait FileAccess: Send + Sync {
    async fn read_file(&self, path: &Path) -> std::io::Result<Arc<str>>;

    /// Drop any cached content
    fn clear_cache(&self) {}
}

/// Filesystem reader with a bounded LRU content cache
pub struct FsFileAccess {
    cache: Mutex<LruCache<PathBuf, Arc<str>>>,
}

impl FsFileAccess {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<PathBuf, Arc<str>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FsFileAccess {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl FileAccess for FsFileAccess {
    async fn read_file(&self, path: &Path) -> std::io::Result<Arc<str>> {
        if let Some(hit) = self.lock().get(path) {
            return Ok(Arc::clone(hit));
        }

        let content: Arc<str> = tokio::fs::read_to_string(path).await?.into();
        self.lock().put(path.to_path_buf(), Arc::clone(&content));
        Ok(content)
    }

    fn clear_cache(&self) {
        let evicted = {
            let mut cache = self.lock();
            let evicted = cache.len();
            cache.clear();
            evicted
        };
        log::debug!("Cleared {evicted} cached file(s)");
    }
}
