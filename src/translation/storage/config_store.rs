//! 字段配置存储
//!
//! 持久化由外部协作方负责，这里只定义窄接口和一个内存实现。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::translation::config::FieldConfig;
use crate::translation::error::TranslationResult;

/// 字段配置存储
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self, client: &str, collection: &str) -> TranslationResult<Option<FieldConfig>>;

    async fn save_config(&self, client: &str, collection: &str, config: FieldConfig) -> TranslationResult<()>;

    /// 客户端的全部集合名称，按名称排序
    async fn list_configs(&self, client: &str) -> TranslationResult<Vec<String>>;
}

#[async_trait]
impl<T: ConfigStore + ?Sized> ConfigStore for Arc<T> {
    async fn get_config(&self, client: &str, collection: &str) -> TranslationResult<Option<FieldConfig>> {
        (**self).get_config(client, collection).await
    }

    async fn save_config(&self, client: &str, collection: &str, config: FieldConfig) -> TranslationResult<()> {
        (**self).save_config(client, collection, config).await
    }

    async fn list_configs(&self, client: &str) -> TranslationResult<Vec<String>> {
        (**self).list_configs(client).await
    }
}

/// 内存配置存储
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: DashMap<(String, String), FieldConfig>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以单个配置初始化
    pub fn with_config(client: &str, collection: &str, config: FieldConfig) -> Self {
        let store = Self::new();
        store
            .configs
            .insert((client.to_string(), collection.to_string()), config);
        store
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_config(&self, client: &str, collection: &str) -> TranslationResult<Option<FieldConfig>> {
        Ok(self
            .configs
            .get(&(client.to_string(), collection.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn save_config(&self, client: &str, collection: &str, config: FieldConfig) -> TranslationResult<()> {
        self.configs
            .insert((client.to_string(), collection.to_string()), config);
        Ok(())
    }

    async fn list_configs(&self, client: &str) -> TranslationResult<Vec<String>> {
        let mut collections: Vec<String> = self
            .configs
            .iter()
            .filter(|entry| entry.key().0 == client)
            .map(|entry| entry.key().1.clone())
            .collect();
        collections.sort();
        Ok(collections)
    }
}
