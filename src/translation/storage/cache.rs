//! 分级结果缓存
//!
//! 三个相互独立的命名空间（配置、提取、验证），各自有 TTL。
//! 缓存存储不可用时读视为未命中、写视为空操作，任何请求都不会因缓存失败。

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::translation::config::{FieldConfig, PipelineSettings};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::ExtractionResult;

/// 缓存命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    Config,
    Extraction,
    Validation,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 3] = [
        CacheNamespace::Config,
        CacheNamespace::Extraction,
        CacheNamespace::Validation,
    ];

    /// 键前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Config => "field_config",
            CacheNamespace::Extraction => "field_extraction",
            CacheNamespace::Validation => "field_validation",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Config => "config",
            CacheNamespace::Extraction => "extraction",
            CacheNamespace::Validation => "validation",
        }
    }
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub version: u32,
    pub payload: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, version: u32, payload: Value, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            key: key.into(),
            version,
            payload,
            expires_at: Utc::now() + ttl,
        }
    }

    /// 检查是否过期
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// 缓存存储
///
/// 任何方法都可能以 [`TranslationError::CacheUnavailable`] 失败，
/// 由 [`ResultCache`] 负责降级。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<Option<CacheEntry>>;

    async fn set(&self, namespace: CacheNamespace, entry: CacheEntry) -> TranslationResult<()>;

    /// 删除单个键，返回是否存在
    async fn delete(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<bool>;

    /// 删除前缀匹配的条目，返回删除数量
    async fn delete_prefix(&self, namespace: CacheNamespace, prefix: &str) -> TranslationResult<usize>;

    async fn clear_namespace(&self, namespace: CacheNamespace) -> TranslationResult<usize>;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<Option<CacheEntry>> {
        (**self).get(namespace, key).await
    }

    async fn set(&self, namespace: CacheNamespace, entry: CacheEntry) -> TranslationResult<()> {
        (**self).set(namespace, entry).await
    }

    async fn delete(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<bool> {
        (**self).delete(namespace, key).await
    }

    async fn delete_prefix(&self, namespace: CacheNamespace, prefix: &str) -> TranslationResult<usize> {
        (**self).delete_prefix(namespace, prefix).await
    }

    async fn clear_namespace(&self, namespace: CacheNamespace) -> TranslationResult<usize> {
        (**self).clear_namespace(namespace).await
    }
}

/// 单个命名空间的统计
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub skipped_writes: u64,
    pub errors: u64,
}

impl NamespaceStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub namespaces: BTreeMap<CacheNamespace, NamespaceStats>,
}

impl CacheStats {
    pub fn namespace(&self, namespace: CacheNamespace) -> NamespaceStats {
        self.namespaces.get(&namespace).cloned().unwrap_or_default()
    }

    /// 全部命名空间的命中率
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = self
            .namespaces
            .values()
            .fold((0, 0), |(h, m), s| (h + s.hits, m + s.misses));
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    skipped_writes: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> NamespaceStats {
        NamespaceStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// 缓存策略参数
#[derive(Debug, Clone, PartialEq)]
pub struct CachePolicy {
    pub config_ttl: Duration,
    pub extraction_ttl: Duration,
    pub validation_ttl: Duration,
    pub timeout: Duration,
    pub max_content_bytes: usize,
    pub version: u32,
}

impl From<&PipelineSettings> for CachePolicy {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            config_ttl: settings.config_cache_ttl(),
            extraction_ttl: settings.extraction_cache_ttl(),
            validation_ttl: settings.validation_cache_ttl(),
            timeout: settings.cache_timeout(),
            max_content_bytes: settings.max_cacheable_content_bytes,
            version: settings.cache_version,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

/// 规范化 JSON：对象键排序，紧凑输出
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, &Value> = map.iter().collect();
                out.push('{');
                for (i, (key, item)) in sorted.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String(key.clone()).to_string());
                    out.push(':');
                    write(item, out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// 转义键中的分隔符，避免不同的客户端、集合名拼出相同的键
fn key_part(part: &str) -> Cow<'_, str> {
    if part.contains(&[':', '%'][..]) {
        Cow::Owned(part.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(part)
    }
}

/// 规范化输入的 blake3 指纹
pub fn fingerprint<T: Serialize + ?Sized>(input: &T) -> TranslationResult<String> {
    let value = serde_json::to_value(input)?;
    Ok(blake3::hash(canonical_json(&value).as_bytes()).to_hex().to_string())
}

/// 带降级的结果缓存
pub struct ResultCache<C> {
    store: C,
    policy: CachePolicy,
    counters: BTreeMap<CacheNamespace, Counters>,
}

impl<C: CacheStore> ResultCache<C> {
    pub fn new(store: C, policy: CachePolicy) -> Self {
        let counters = CacheNamespace::ALL
            .iter()
            .map(|ns| (*ns, Counters::default()))
            .collect();
        Self {
            store,
            policy,
            counters,
        }
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    // ------------------------------------------------------------------
    // 键
    // ------------------------------------------------------------------

    pub fn config_key(&self, client: &str, collection: &str) -> String {
        format!(
            "{}:v{}:{}:{}",
            CacheNamespace::Config.prefix(),
            self.policy.version,
            key_part(client),
            key_part(collection)
        )
    }

    pub fn extraction_key(&self, config_hash: &str, content_hash: &str, locale: &str) -> String {
        format!(
            "{}:v{}:{}:{}:{}",
            CacheNamespace::Extraction.prefix(),
            self.policy.version,
            config_hash,
            content_hash,
            key_part(locale)
        )
    }

    pub fn validation_key(&self, client: &str, collection: &str, paths_hash: &str) -> String {
        format!(
            "{}:{}",
            self.validation_prefix(client, Some(collection)),
            paths_hash
        )
    }

    fn validation_prefix(&self, client: &str, collection: Option<&str>) -> String {
        let base = format!(
            "{}:v{}:{}:",
            CacheNamespace::Validation.prefix(),
            self.policy.version,
            key_part(client)
        );
        match collection {
            Some(collection) => format!("{}{}", base, key_part(collection)),
            None => base,
        }
    }

    fn extraction_prefix(&self, config_hash: &str) -> String {
        format!(
            "{}:v{}:{}:",
            CacheNamespace::Extraction.prefix(),
            self.policy.version,
            config_hash
        )
    }

    fn ttl(&self, namespace: CacheNamespace) -> Duration {
        match namespace {
            CacheNamespace::Config => self.policy.config_ttl,
            CacheNamespace::Extraction => self.policy.extraction_ttl,
            CacheNamespace::Validation => self.policy.validation_ttl,
        }
    }

    fn counter(&self, namespace: CacheNamespace) -> Option<&Counters> {
        self.counters.get(&namespace)
    }

    fn bump(&self, namespace: CacheNamespace, pick: impl Fn(&Counters) -> &AtomicU64) {
        if let Some(counters) = self.counter(namespace) {
            pick(counters).fetch_add(1, Ordering::Relaxed);
        }
    }

    // ------------------------------------------------------------------
    // 通用读写
    // ------------------------------------------------------------------

    /// 读取并反序列化，任何失败都视为未命中
    pub async fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        let entry = match tokio::time::timeout(self.policy.timeout, self.store.get(namespace, key)).await {
            Ok(Ok(entry)) => entry,
            Ok(Err(e)) => {
                self.degrade(namespace, "读取", &e);
                None
            }
            Err(_) => {
                self.degrade(namespace, "读取", &TranslationError::Timeout("缓存读取超时".to_string()));
                None
            }
        };

        let payload = entry
            .filter(|entry| entry.version == self.policy.version && !entry.is_expired())
            .and_then(|entry| match serde_json::from_value(entry.payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(namespace = namespace.as_str(), key = %key, "缓存内容无法解析: {}", e);
                    None
                }
            });

        if payload.is_some() {
            self.bump(namespace, |c| &c.hits);
            tracing::debug!(namespace = namespace.as_str(), key = %key, "缓存命中");
        } else {
            self.bump(namespace, |c| &c.misses);
        }
        payload
    }

    /// 序列化并写入，失败时只记录日志
    pub async fn set<T: Serialize + ?Sized>(&self, namespace: CacheNamespace, key: &str, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(namespace = namespace.as_str(), key = %key, "缓存内容序列化失败: {}", e);
                return;
            }
        };

        let entry = CacheEntry::new(key, self.policy.version, payload, self.ttl(namespace));
        match tokio::time::timeout(self.policy.timeout, self.store.set(namespace, entry)).await {
            Ok(Ok(())) => self.bump(namespace, |c| &c.writes),
            Ok(Err(e)) => self.degrade(namespace, "写入", &e),
            Err(_) => self.degrade(namespace, "写入", &TranslationError::Timeout("缓存写入超时".to_string())),
        }
    }

    async fn delete(&self, namespace: CacheNamespace, key: &str) -> usize {
        match tokio::time::timeout(self.policy.timeout, self.store.delete(namespace, key)).await {
            Ok(Ok(existed)) => usize::from(existed),
            Ok(Err(e)) => {
                self.degrade(namespace, "删除", &e);
                0
            }
            Err(_) => {
                self.degrade(namespace, "删除", &TranslationError::Timeout("缓存删除超时".to_string()));
                0
            }
        }
    }

    async fn delete_prefix(&self, namespace: CacheNamespace, prefix: &str) -> usize {
        match tokio::time::timeout(self.policy.timeout, self.store.delete_prefix(namespace, prefix)).await {
            Ok(Ok(removed)) => removed,
            Ok(Err(e)) => {
                self.degrade(namespace, "删除", &e);
                0
            }
            Err(_) => {
                self.degrade(namespace, "删除", &TranslationError::Timeout("缓存删除超时".to_string()));
                0
            }
        }
    }

    fn degrade(&self, namespace: CacheNamespace, operation: &str, error: &TranslationError) {
        self.bump(namespace, |c| &c.errors);
        tracing::warn!(
            namespace = namespace.as_str(),
            "缓存{}失败，按未命中处理: {}",
            operation,
            error
        );
    }

    // ------------------------------------------------------------------
    // 配置缓存
    // ------------------------------------------------------------------

    pub async fn get_config(&self, client: &str, collection: &str) -> Option<FieldConfig> {
        self.get(CacheNamespace::Config, &self.config_key(client, collection)).await
    }

    pub async fn set_config(&self, client: &str, collection: &str, config: &FieldConfig) {
        self.set(CacheNamespace::Config, &self.config_key(client, collection), config)
            .await
    }

    // ------------------------------------------------------------------
    // 提取缓存
    // ------------------------------------------------------------------

    /// 读取提取结果，内容过大时直接未命中
    pub async fn get_extraction(
        &self,
        config: &FieldConfig,
        record: &Value,
        locale: &str,
    ) -> Option<ExtractionResult> {
        let key = self.extraction_cache_key(config, record, locale)?;
        self.get(CacheNamespace::Extraction, &key).await
    }

    /// 写入提取结果，超过大小上限的内容不缓存
    pub async fn set_extraction(
        &self,
        config: &FieldConfig,
        record: &Value,
        locale: &str,
        result: &ExtractionResult,
    ) {
        match self.extraction_cache_key(config, record, locale) {
            Some(key) => self.set(CacheNamespace::Extraction, &key, result).await,
            None => self.bump(CacheNamespace::Extraction, |c| &c.skipped_writes),
        }
    }

    fn extraction_cache_key(&self, config: &FieldConfig, record: &Value, locale: &str) -> Option<String> {
        let content = canonical_json(record);
        if content.len() > self.policy.max_content_bytes {
            tracing::debug!(
                bytes = content.len(),
                limit = self.policy.max_content_bytes,
                "内容超过缓存上限，跳过提取缓存"
            );
            return None;
        }

        let config_hash = match fingerprint(config) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!("配置指纹计算失败: {}", e);
                return None;
            }
        };
        let content_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        Some(self.extraction_key(&config_hash, &content_hash, locale))
    }

    // ------------------------------------------------------------------
    // 验证缓存
    // ------------------------------------------------------------------

    pub async fn get_validation<T: DeserializeOwned>(
        &self,
        client: &str,
        collection: &str,
        paths: &[String],
    ) -> Option<T> {
        let key = self.validation_key(client, collection, &fingerprint(paths).ok()?);
        self.get(CacheNamespace::Validation, &key).await
    }

    pub async fn set_validation<T: Serialize>(
        &self,
        client: &str,
        collection: &str,
        paths: &[String],
        report: &T,
    ) {
        match fingerprint(paths) {
            Ok(hash) => {
                let key = self.validation_key(client, collection, &hash);
                self.set(CacheNamespace::Validation, &key, report).await
            }
            Err(e) => tracing::warn!("路径指纹计算失败: {}", e),
        }
    }

    // ------------------------------------------------------------------
    // 失效
    // ------------------------------------------------------------------

    /// 配置写入后失效相关缓存
    ///
    /// 删除配置键、该集合的全部验证结果，以及旧配置指纹下的全部提取结果。
    pub async fn invalidate_config(&self, client: &str, collection: &str, previous: Option<&FieldConfig>) -> usize {
        let mut removed = self
            .delete(CacheNamespace::Config, &self.config_key(client, collection))
            .await;
        removed += self
            .delete_prefix(
                CacheNamespace::Validation,
                &format!("{}:", self.validation_prefix(client, Some(collection))),
            )
            .await;

        if let Some(previous) = previous {
            match fingerprint(previous) {
                Ok(hash) => {
                    removed += self
                        .delete_prefix(CacheNamespace::Extraction, &self.extraction_prefix(&hash))
                        .await
                }
                Err(e) => tracing::warn!("旧配置指纹计算失败: {}", e),
            }
        }

        tracing::info!(client = %client, collection = %collection, removed, "配置相关缓存已失效");
        removed
    }

    /// 失效客户端（或其单个集合）的配置与验证缓存
    pub async fn invalidate_client(&self, client: &str, collection: Option<&str>) -> usize {
        let (mut removed, validation) = match collection {
            Some(collection) => (
                self.delete(CacheNamespace::Config, &self.config_key(client, collection))
                    .await,
                format!("{}:", self.validation_prefix(client, Some(collection))),
            ),
            None => {
                let prefix = format!(
                    "{}:v{}:{}:",
                    CacheNamespace::Config.prefix(),
                    self.policy.version,
                    key_part(client)
                );
                (
                    self.delete_prefix(CacheNamespace::Config, &prefix).await,
                    self.validation_prefix(client, None),
                )
            }
        };
        removed += self.delete_prefix(CacheNamespace::Validation, &validation).await;
        removed
    }

    /// 删除配置指纹下的全部提取结果
    pub async fn invalidate_extractions(&self, config: &FieldConfig) -> usize {
        match fingerprint(config) {
            Ok(hash) => {
                self.delete_prefix(CacheNamespace::Extraction, &self.extraction_prefix(&hash))
                    .await
            }
            Err(e) => {
                tracing::warn!("配置指纹计算失败: {}", e);
                0
            }
        }
    }

    /// 清空全部命名空间
    pub async fn clear_all(&self) -> usize {
        let mut removed = 0;
        for namespace in CacheNamespace::ALL {
            match tokio::time::timeout(self.policy.timeout, self.store.clear_namespace(namespace)).await {
                Ok(Ok(count)) => removed += count,
                Ok(Err(e)) => self.degrade(namespace, "清空", &e),
                Err(_) => self.degrade(namespace, "清空", &TranslationError::Timeout("缓存清空超时".to_string())),
            }
        }
        tracing::info!(removed, "缓存已全部清空");
        removed
    }

    /// 统计快照
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            namespaces: self
                .counters
                .iter()
                .map(|(ns, counters)| (*ns, counters.snapshot()))
                .collect(),
        }
    }
}
