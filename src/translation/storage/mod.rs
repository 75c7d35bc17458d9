//! 存储模块
//!
//! 提供结果缓存和字段配置存储的接口与内存实现。

pub mod cache;
pub mod config_store;
pub mod memory;

pub use cache::{
    canonical_json, fingerprint, CacheEntry, CacheNamespace, CachePolicy, CacheStats, CacheStore,
    NamespaceStats, ResultCache,
};
pub use config_store::{ConfigStore, MemoryConfigStore};
pub use memory::MemoryCacheStore;
