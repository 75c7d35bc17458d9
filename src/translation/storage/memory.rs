//! 进程内缓存存储
//!
//! 每个命名空间一个 LRU，过期条目在读取时惰性删除。

use std::collections::HashMap;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::translation::config::constants::DEFAULT_CACHE_CAPACITY;
use crate::translation::error::{TranslationError, TranslationResult};

use super::cache::{CacheEntry, CacheNamespace, CacheStore};

/// 基于 LRU 的内存缓存存储
pub struct MemoryCacheStore {
    namespaces: HashMap<CacheNamespace, Mutex<LruCache<String, CacheEntry>>>,
}

impl MemoryCacheStore {
    /// 创建存储，`capacity` 为每个命名空间的条目上限
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        let namespaces = CacheNamespace::ALL
            .iter()
            .map(|ns| (*ns, Mutex::new(LruCache::new(capacity))))
            .collect();

        Self { namespaces }
    }

    fn namespace(&self, namespace: CacheNamespace) -> TranslationResult<&Mutex<LruCache<String, CacheEntry>>> {
        self.namespaces.get(&namespace).ok_or_else(|| {
            TranslationError::CacheUnavailable(format!("命名空间 {} 未初始化", namespace.as_str()))
        })
    }

    /// 当前条目数
    pub async fn len(&self, namespace: CacheNamespace) -> usize {
        match self.namespaces.get(&namespace) {
            Some(cache) => cache.lock().await.len(),
            None => 0,
        }
    }

    /// 清理全部命名空间中的过期条目
    pub async fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        for cache in self.namespaces.values() {
            let mut cache = cache.lock().await;
            let expired: Vec<String> = cache
                .iter()
                .filter(|(_, entry)| entry.is_expired())
                .map(|(key, _)| key.clone())
                .collect();

            for key in &expired {
                cache.pop(key);
            }
            removed += expired.len();
        }

        if removed > 0 {
            tracing::debug!(removed, "已清理过期缓存条目");
        }
        removed
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<Option<CacheEntry>> {
        let mut cache = self.namespace(namespace)?.lock().await;

        let expired = match cache.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            cache.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, namespace: CacheNamespace, entry: CacheEntry) -> TranslationResult<()> {
        let mut cache = self.namespace(namespace)?.lock().await;
        cache.put(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<bool> {
        let mut cache = self.namespace(namespace)?.lock().await;
        Ok(cache.pop(key).is_some())
    }

    async fn delete_prefix(&self, namespace: CacheNamespace, prefix: &str) -> TranslationResult<usize> {
        let mut cache = self.namespace(namespace)?.lock().await;
        let matching: Vec<String> = cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matching {
            cache.pop(key);
        }
        Ok(matching.len())
    }

    async fn clear_namespace(&self, namespace: CacheNamespace) -> TranslationResult<usize> {
        let mut cache = self.namespace(namespace)?.lock().await;
        let count = cache.len();
        cache.clear();
        Ok(count)
    }
}
