// 集成测试公共模块
//
// 提供测试替身、夹具和共享的测试环境

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use locplat::translation::backend::{InstructionMode, Translator};
use locplat::translation::storage::{CacheEntry, CacheNamespace, CacheStore};
use locplat::translation::{
    FieldConfig, MemoryCacheStore, MemoryConfigStore, PipelineSettings, TranslationError,
    TranslationResult, TranslationService,
};

pub const CLIENT: &str = "acme";
pub const COLLECTION: &str = "articles";

/// 单次后端调用记录
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub text: String,
    pub mode: Option<InstructionMode>,
}

/// 记录全部调用的翻译替身，译文为 `文本_目标语言` 或预设映射
#[derive(Default)]
pub struct RecordingTranslator {
    calls: Mutex<Vec<RecordedCall>>,
    batch_calls: AtomicUsize,
    mappings: Vec<(String, String)>,
}

impl RecordingTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, text: &str, translated: &str) -> Self {
        self.mappings.push((text.to_string(), translated.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.text).collect()
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn render(&self, text: &str, target: &str) -> String {
        self.mappings
            .iter()
            .find(|(from, _)| from == text)
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| format!("{}_{}", text, target))
    }
}

#[async_trait]
impl Translator for RecordingTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_locale: &str,
        target_locale: &str,
        mode: InstructionMode,
    ) -> TranslationResult<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            text: text.to_string(),
            mode: Some(mode),
        });
        Ok(self.render(text, target_locale))
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _source_locale: &str,
        target_locale: &str,
    ) -> TranslationResult<Vec<String>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut calls = self.calls.lock().unwrap();
        for text in texts {
            calls.push(RecordedCall {
                text: text.clone(),
                mode: None,
            });
        }
        Ok(texts.iter().map(|t| self.render(t, target_locale)).collect())
    }

    fn provider_name(&self) -> &str {
        "recording"
    }
}

/// 在自然语句模式下给孤立片段追加解释句的后端
///
/// 模拟在片段上使用风格化指令时后端编造内容的行为。
pub struct ChattyTranslator {
    pub inner: RecordingTranslator,
}

pub const CHATTY_APPENDIX: &str = " (This word is commonly used as a greeting.)";

impl ChattyTranslator {
    pub fn new(inner: RecordingTranslator) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Translator for ChattyTranslator {
    async fn translate(
        &self,
        text: &str,
        source_locale: &str,
        target_locale: &str,
        mode: InstructionMode,
    ) -> TranslationResult<String> {
        let translated = self
            .inner
            .translate(text, source_locale, target_locale, mode)
            .await?;
        let is_fragment = !text.trim_end().ends_with(['.', '!', '?']);
        if mode == InstructionMode::NaturalSentence && is_fragment {
            return Ok(format!("{}{}", translated, CHATTY_APPENDIX));
        }
        Ok(translated)
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        source_locale: &str,
        target_locale: &str,
    ) -> TranslationResult<Vec<String>> {
        self.inner
            .translate_batch(texts, source_locale, target_locale)
            .await
    }

    fn provider_name(&self) -> &str {
        "chatty"
    }
}

/// 对包含指定子串的文本返回错误的后端
pub struct FailingTranslator {
    pub needle: String,
}

impl FailingTranslator {
    pub fn on(needle: &str) -> Self {
        Self {
            needle: needle.to_string(),
        }
    }

    pub fn always() -> Self {
        Self::on("")
    }
}

#[async_trait]
impl Translator for FailingTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_locale: &str,
        target_locale: &str,
        _mode: InstructionMode,
    ) -> TranslationResult<String> {
        if text.contains(&self.needle) {
            return Err(TranslationError::Backend(format!("rejected: {}", text)));
        }
        Ok(format!("{}_{}", text, target_locale))
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _source_locale: &str,
        target_locale: &str,
    ) -> TranslationResult<Vec<String>> {
        if texts.iter().any(|t| t.contains(&self.needle)) {
            return Err(TranslationError::Backend("batch rejected".to_string()));
        }
        Ok(texts.iter().map(|t| format!("{}_{}", t, target_locale)).collect())
    }

    fn provider_name(&self) -> &str {
        "failing"
    }
}

/// 所有操作都失败的缓存存储
#[derive(Default)]
pub struct FailingCacheStore;

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _namespace: CacheNamespace, _key: &str) -> TranslationResult<Option<CacheEntry>> {
        Err(TranslationError::CacheUnavailable("connection refused".to_string()))
    }

    async fn set(&self, _namespace: CacheNamespace, _entry: CacheEntry) -> TranslationResult<()> {
        Err(TranslationError::CacheUnavailable("connection refused".to_string()))
    }

    async fn delete(&self, _namespace: CacheNamespace, _key: &str) -> TranslationResult<bool> {
        Err(TranslationError::CacheUnavailable("connection refused".to_string()))
    }

    async fn delete_prefix(&self, _namespace: CacheNamespace, _prefix: &str) -> TranslationResult<usize> {
        Err(TranslationError::CacheUnavailable("connection refused".to_string()))
    }

    async fn clear_namespace(&self, _namespace: CacheNamespace) -> TranslationResult<usize> {
        Err(TranslationError::CacheUnavailable("connection refused".to_string()))
    }
}

/// 每个操作都延迟的缓存存储，用于触发超时
pub struct SlowCacheStore {
    inner: MemoryCacheStore,
    delay: Duration,
}

impl SlowCacheStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryCacheStore::new(64),
            delay,
        }
    }
}

#[async_trait]
impl CacheStore for SlowCacheStore {
    async fn get(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<Option<CacheEntry>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: CacheNamespace, entry: CacheEntry) -> TranslationResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(namespace, entry).await
    }

    async fn delete(&self, namespace: CacheNamespace, key: &str) -> TranslationResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(namespace, key).await
    }

    async fn delete_prefix(&self, namespace: CacheNamespace, prefix: &str) -> TranslationResult<usize> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_prefix(namespace, prefix).await
    }

    async fn clear_namespace(&self, namespace: CacheNamespace) -> TranslationResult<usize> {
        tokio::time::sleep(self.delay).await;
        self.inner.clear_namespace(namespace).await
    }
}

/// 测试数据生成器
pub struct Fixtures;

impl Fixtures {
    pub fn article() -> Value {
        json!({
            "id": 42,
            "title": "Hello",
            "summary": "A short summary",
            "content": "<p>Hi <strong>there</strong></p>",
            "seo": {"title": "Hello SEO", "keywords": ["a", "b"]},
            "author": null,
            "views": 1200
        })
    }

    pub fn article_config() -> FieldConfig {
        FieldConfig::new(["title", "summary", "content", "seo.title"])
            .with_primary_collection(COLLECTION)
            .with_batch_processing(true)
    }

    pub fn scalar_record(count: usize) -> (Value, Vec<String>) {
        let mut record = serde_json::Map::new();
        record.insert("id".to_string(), json!(1));
        let mut paths = Vec::new();
        for i in 0..count {
            let key = format!("field_{:02}", i);
            record.insert(key.clone(), json!(format!("text number {}", i)));
            paths.push(key);
        }
        (Value::Object(record), paths)
    }
}

/// 测试环境，服务持有共享的内存存储
pub struct TestEnvironment {
    pub config_store: Arc<MemoryConfigStore>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub service: TranslationService<Arc<MemoryConfigStore>, Arc<MemoryCacheStore>>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_settings(PipelineSettings::default())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        let config_store = Arc::new(MemoryConfigStore::new());
        let cache_store = Arc::new(MemoryCacheStore::new(settings.cache_capacity));
        let service = TranslationService::new(config_store.clone(), cache_store.clone(), settings);
        Self {
            config_store,
            cache_store,
            service,
        }
    }

    pub async fn with_config(config: FieldConfig) -> Self {
        let env = Self::new();
        env.service
            .save_config(CLIENT, COLLECTION, config)
            .await
            .expect("config should be saved");
        env
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// 去掉标签，只保留文本
pub fn strip_tags(markup: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
