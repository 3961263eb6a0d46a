//! # Memory Cache Backend
//!
//! A process-local map with an optional byte budget. Suits a headless
//! service that only needs to survive between cycles, not restarts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::store::CacheBackend;
use crate::error::CacheError;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Vec<u8>>,
    used: usize,
}

/// In-memory [`CacheBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    /// Byte budget; `0` is unbounded.
    capacity: usize,
}

impl MemoryBackend {
    /// Backend holding at most `capacity` bytes of values (`0` for no limit).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Backend without a byte budget.
    pub fn unbounded() -> Self {
        Self::with_capacity(0)
    }

    /// Bytes currently stored.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().map(|g| g.used).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, CacheError> {
        self.inner
            .lock()
            .map_err(|_| CacheError::Backend("memory cache lock poisoned".into()))
    }

    fn fits(&self, inner: &Inner, key: &str, bytes: usize) -> bool {
        if self.capacity == 0 {
            return true;
        }
        let existing = inner.values.get(key).map_or(0, Vec::len);
        inner.used - existing + bytes <= self.capacity
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        if !self.fits(&inner, key, value.len()) {
            return Err(CacheError::Capacity);
        }
        if let Some(old) = inner.values.insert(key.to_string(), value.to_vec()) {
            inner.used -= old.len();
        }
        inner.used += value.len();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        if let Some(old) = inner.values.remove(key) {
            inner.used -= old.len();
        }
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .lock()?
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn would_fit(&self, key: &str, bytes: usize) -> bool {
        self.lock().map(|g| self.fits(&g, key, bytes)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_counts_replacements_once() {
        let b = MemoryBackend::with_capacity(10);
        assert!(b.put("k", &[0; 6]).await.is_ok());
        assert!(b.put("k", &[0; 9]).await.is_ok());
        assert_eq!(b.used_bytes(), 9);
        assert!(matches!(b.put("j", &[0; 2]).await, Err(CacheError::Capacity)));
        assert!(b.remove("k").await.is_ok());
        assert_eq!(b.used_bytes(), 0);
        assert!(b.put("j", &[0; 2]).await.is_ok());
    }
}
