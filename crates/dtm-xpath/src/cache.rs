//! LRU cache of compiled paths for one static context.
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::compiler::CompileMode;
use crate::runtime::{DefaultErrorListener, Error, ErrorListener, StaticContext};
use crate::xpath::CompiledPath;

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Shares compiled paths across evaluation contexts. Compilation failures are
/// not cached.
pub struct PathCache {
    static_ctx: StaticContext,
    listener: Arc<dyn ErrorListener>,
    entries: Mutex<LruCache<(String, CompileMode), Arc<CompiledPath>>>,
}

impl PathCache {
    pub fn new(static_ctx: StaticContext, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            static_ctx,
            listener: Arc::new(DefaultErrorListener),
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn with_error_listener(mut self, listener: Arc<dyn ErrorListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    /// Cached path for `text`, compiling it on a miss.
    pub fn get_or_compile(&self, text: &str, mode: CompileMode) -> Result<Arc<CompiledPath>, Error> {
        let key = (text.to_string(), mode);
        if let Some(hit) = self.lock().get(&key) {
            return Ok(hit.clone());
        }
        let compiled = Arc::new(CompiledPath::compile(
            text,
            None,
            &self.static_ctx,
            mode,
            self.listener.as_ref(),
        )?);
        self.lock().put(key, compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<(String, CompileMode), Arc<CompiledPath>>> {
        // a panic while holding the lock leaves the cache usable
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
