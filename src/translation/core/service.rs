//! 翻译服务入口
//!
//! [`TranslationService`] 把配置存储、结果缓存、字段提取、翻译引擎和
//! 存储形态生成串起来。缓存和配置存储都由调用方注入，服务本身不持有
//! 跨请求的可变状态（缓存统计除外）。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use locplat::translation::{
//!     backend::{MockMode, MockTranslator},
//!     config::{FieldConfig, PipelineSettings},
//!     core::TranslationService,
//!     storage::{MemoryCacheStore, MemoryConfigStore},
//! };
//! use serde_json::json;
//!
//! # async fn run() -> locplat::TranslationResult<()> {
//! let service = TranslationService::new(
//!     MemoryConfigStore::new(),
//!     MemoryCacheStore::default(),
//!     PipelineSettings::default(),
//! );
//! let config = FieldConfig::new(["title"]).with_primary_collection("articles");
//! service.save_config("acme", "articles", config).await?;
//!
//! let translator = MockTranslator::new(MockMode::Suffix);
//! let outcome = service
//!     .translate_record(&json!({"id": 1, "title": "Hello"}), "acme", "articles", "en", "fr", &translator)
//!     .await?;
//! assert_eq!(outcome.record["articles_id"], json!(1));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{FieldKind, PathExpr};
use crate::translation::backend::Translator;
use crate::translation::config::{FieldConfig, PipelineSettings};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{
    extract_fields, materialize, ExtractionResult, FieldOutcome, MaterializedRecord,
};
use crate::translation::storage::{CachePolicy, CacheStats, CacheStore, ConfigStore, ResultCache};

use super::engine::{EngineReport, TranslationEngine};

/// 提取结果及缓存命中情况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub result: ExtractionResult,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// 预览中的单个字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewField {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub content: Value,
    pub batched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// 配置摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub total_fields: usize,
    pub batch_processing: bool,
    pub pattern: String,
    pub rtl_support: bool,
    pub sentence_level_markup: bool,
}

/// 翻译预览，不调用后端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPreview {
    pub locale: String,
    pub fields: Vec<PreviewField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ConfigSummary>,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// 路径验证报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// 单条记录的翻译结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutcome {
    pub record: MaterializedRecord,
    pub translated: Vec<String>,
    pub failures: BTreeMap<String, String>,
    pub passthrough: Vec<String>,
    pub stats: EngineReport,
    pub extraction_cache_hit: bool,
}

/// 翻译服务
pub struct TranslationService<S, C> {
    store: S,
    cache: ResultCache<C>,
    settings: PipelineSettings,
}

impl<S: ConfigStore, C: CacheStore> TranslationService<S, C> {
    pub fn new(store: S, cache_store: C, settings: PipelineSettings) -> Self {
        let cache = ResultCache::new(cache_store, CachePolicy::from(&settings));
        Self {
            store,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &ResultCache<C> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // 配置
    // ------------------------------------------------------------------

    /// 读取字段配置，先查配置缓存
    pub async fn get_config(&self, client: &str, collection: &str) -> TranslationResult<Option<FieldConfig>> {
        if let Some(config) = self.cache.get_config(client, collection).await {
            return Ok(Some(config));
        }

        let config = self.store.get_config(client, collection).await?;
        if let Some(config) = &config {
            self.cache.set_config(client, collection, config).await;
        }
        Ok(config)
    }

    /// 校验并保存字段配置，同时失效派生缓存
    #[tracing::instrument(skip_all, fields(client = %client, collection = %collection))]
    pub async fn save_config(&self, client: &str, collection: &str, config: FieldConfig) -> TranslationResult<()> {
        config.validate()?;

        let previous = self.store.get_config(client, collection).await?;
        self.store.save_config(client, collection, config.clone()).await?;

        self.cache
            .invalidate_config(client, collection, previous.as_ref())
            .await;
        self.cache.set_config(client, collection, &config).await;

        tracing::info!(
            fields = config.field_paths.len(),
            pattern = config.pattern.as_str(),
            "字段配置已保存"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // 提取与预览
    // ------------------------------------------------------------------

    /// 按存储的配置提取字段
    pub async fn extract(
        &self,
        record: &Value,
        client: &str,
        collection: &str,
        locale: &str,
    ) -> TranslationResult<ExtractionOutcome> {
        match self.get_config(client, collection).await? {
            Some(config) => Ok(self.extract_with(&config, record, locale).await),
            None => {
                tracing::warn!(client = %client, collection = %collection, "未找到字段配置，返回空提取结果");
                Ok(ExtractionOutcome {
                    result: ExtractionResult::default(),
                    cache_hit: false,
                    warnings: vec![missing_config(client, collection)],
                })
            }
        }
    }

    async fn extract_with(&self, config: &FieldConfig, record: &Value, locale: &str) -> ExtractionOutcome {
        if let Some(result) = self.cache.get_extraction(config, record, locale).await {
            return ExtractionOutcome {
                result,
                cache_hit: true,
                warnings: Vec::new(),
            };
        }

        let result = extract_fields(record, config, locale, self.settings.is_rtl(locale));
        self.cache.set_extraction(config, record, locale, &result).await;

        ExtractionOutcome {
            result,
            cache_hit: false,
            warnings: Vec::new(),
        }
    }

    /// 预览将要翻译的内容
    pub async fn preview(
        &self,
        record: &Value,
        client: &str,
        collection: &str,
        locale: &str,
    ) -> TranslationResult<TranslationPreview> {
        let Some(config) = self.get_config(client, collection).await? else {
            return Ok(TranslationPreview {
                locale: locale.to_string(),
                fields: Vec::new(),
                summary: None,
                cache_hit: false,
                warnings: vec![missing_config(client, collection)],
            });
        };

        let outcome = self.extract_with(&config, record, locale).await;
        let extraction = &outcome.result;

        let fields = extraction
            .order
            .iter()
            .filter_map(|path| {
                if let Some(field) = extraction.fields.get(path) {
                    let markup = field.kind == FieldKind::Markup;
                    return Some(PreviewField {
                        path: path.clone(),
                        kind: field.kind,
                        content: field.value.clone(),
                        batched: false,
                        node_count: markup.then(|| field.metadata.nodes.len()),
                        parse_error: field.metadata.parse_error.clone(),
                    });
                }

                let bucket = extraction.batch.as_ref()?;
                Some(PreviewField {
                    path: path.clone(),
                    kind: bucket.kinds.get(path).copied().unwrap_or(FieldKind::ScalarText),
                    content: Value::String(bucket.text_for(path)?.to_string()),
                    batched: true,
                    node_count: None,
                    parse_error: None,
                })
            })
            .collect();

        let is_rtl = self.settings.is_rtl(locale);
        Ok(TranslationPreview {
            locale: locale.to_string(),
            fields,
            summary: Some(ConfigSummary {
                total_fields: config.effective_paths(locale, is_rtl).len(),
                batch_processing: config.batch_processing,
                pattern: config.pattern.as_str().to_string(),
                rtl_support: is_rtl,
                sentence_level_markup: is_rtl && config.sentence_level_enabled(locale),
            }),
            cache_hit: outcome.cache_hit,
            warnings: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // 验证
    // ------------------------------------------------------------------

    /// 验证字段路径，结果写入验证缓存
    pub async fn validate_paths(
        &self,
        client: &str,
        collection: &str,
        paths: &[String],
    ) -> TranslationResult<ValidationReport> {
        if let Some(report) = self.cache.get_validation(client, collection, paths).await {
            return Ok(report);
        }

        let stored = self.get_config(client, collection).await?;
        let report = validate(paths, stored.as_ref());
        self.cache
            .set_validation(client, collection, paths, &report)
            .await;
        Ok(report)
    }

    // ------------------------------------------------------------------
    // 翻译
    // ------------------------------------------------------------------

    /// 翻译单条记录并生成目标存储形态
    ///
    /// 单个字段失败不影响其他字段；只有全部可翻译字段都失败时返回
    /// [`TranslationError::AllFieldsFailed`]。
    #[tracing::instrument(
        skip_all,
        fields(client = %client, collection = %collection, locale = %target_locale)
    )]
    pub async fn translate_record(
        &self,
        record: &Value,
        client: &str,
        collection: &str,
        source_locale: &str,
        target_locale: &str,
        translator: &dyn Translator,
    ) -> TranslationResult<TranslationOutcome> {
        let config = self
            .get_config(client, collection)
            .await?
            .ok_or_else(|| TranslationError::Configuration(missing_config(client, collection)))?;
        config.validate()?;

        let sentence_level = self.settings.is_rtl(target_locale) && config.sentence_level_enabled(target_locale);
        let extraction = self.extract_with(&config, record, target_locale).await;

        let engine = TranslationEngine::new(
            translator,
            source_locale,
            target_locale,
            self.settings.max_concurrent_calls,
        )
        .with_sentence_level(sentence_level);

        let started = std::time::Instant::now();
        let outcomes = engine.translate(&extraction.result, &config).await;
        let stats = engine.stats().report(started.elapsed().as_millis() as u64);

        let mut translated = Vec::new();
        let mut failures = BTreeMap::new();
        let mut passthrough = Vec::new();
        for (path, outcome) in &outcomes {
            match outcome {
                FieldOutcome::Translated(_) => translated.push(path.clone()),
                FieldOutcome::Passthrough(_) => passthrough.push(path.clone()),
                FieldOutcome::Failed { message, .. } => {
                    failures.insert(path.clone(), message.clone());
                }
            }
        }

        if translated.is_empty() && !failures.is_empty() {
            tracing::error!(failed = failures.len(), "记录中全部可翻译字段均失败");
            return Err(TranslationError::AllFieldsFailed(format!(
                "{} 个字段失败: {}",
                failures.len(),
                failures.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        let materialized = materialize(
            &outcomes,
            &config,
            record.get("id"),
            target_locale,
            self.settings.failure_policy,
        )?;

        tracing::info!(
            translated = translated.len(),
            failed = failures.len(),
            passthrough = passthrough.len(),
            "记录翻译完成"
        );

        Ok(TranslationOutcome {
            record: materialized,
            translated,
            failures,
            passthrough,
            stats,
            extraction_cache_hit: extraction.cache_hit,
        })
    }

    // ------------------------------------------------------------------
    // 缓存管理
    // ------------------------------------------------------------------

    /// 失效客户端（或其单个集合）的全部缓存
    pub async fn invalidate(&self, client: &str, collection: Option<&str>) -> TranslationResult<usize> {
        let collections = match collection {
            Some(collection) => vec![collection.to_string()],
            None => self.store.list_configs(client).await?,
        };

        let mut removed = 0;
        for collection in &collections {
            if let Some(config) = self.store.get_config(client, collection).await? {
                removed += self.cache.invalidate_extractions(&config).await;
            }
        }
        removed += self.cache.invalidate_client(client, collection).await;

        tracing::info!(client = %client, removed, "缓存已失效");
        Ok(removed)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn missing_config(client: &str, collection: &str) -> String {
    format!("未找到 {}/{} 的字段配置", client, collection)
}

/// 检查路径语法、重复项和存储形态要求
fn validate(paths: &[String], stored: Option<&FieldConfig>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();

    if paths.is_empty() {
        report.warnings.push("没有需要验证的字段路径".to_string());
    }

    for path in paths {
        if let Err(e) = PathExpr::parse(path) {
            report.errors.push(e.to_string());
        }
        if !seen.insert(path.as_str()) {
            report.errors.push(format!("字段路径重复: {}", path));
        }
    }

    match stored {
        Some(config) => {
            if config.pattern.requires_primary_collection() {
                if let Err(e) = config.primary_collection() {
                    report.errors.push(e.to_string());
                }
            }
            for path in paths {
                if !config.field_paths.contains(path) {
                    report
                        .warnings
                        .push(format!("路径 {} 不在已保存的配置中", path));
                }
            }
        }
        None => report
            .warnings
            .push("未找到已保存的配置，跳过存储形态检查".to_string()),
    }

    report.valid = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::backend::{MockMode, MockTranslator};
    use crate::translation::config::TranslationPattern;
    use crate::translation::storage::{CacheNamespace, MemoryCacheStore, MemoryConfigStore};
    use serde_json::json;

    fn service() -> TranslationService<MemoryConfigStore, MemoryCacheStore> {
        TranslationService::new(
            MemoryConfigStore::new(),
            MemoryCacheStore::new(64),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_save_config_rejects_invalid() {
        let service = service();
        let err = service
            .save_config("acme", "articles", FieldConfig::new(["title"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Configuration(_)));
        assert!(service.get_config("acme", "articles").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_config_uses_cache_after_save() {
        let service = service();
        let config = FieldConfig::new(["title"]).with_pattern(TranslationPattern::PerLocaleCollection);
        service.save_config("acme", "pages", config.clone()).await.unwrap();

        assert_eq!(service.get_config("acme", "pages").await.unwrap(), Some(config));
        assert_eq!(service.cache_stats().namespace(CacheNamespace::Config).hits, 1);
    }

    #[tokio::test]
    async fn test_extract_cache_hit_on_repeat() {
        let service = service();
        let config = FieldConfig::new(["title"]).with_pattern(TranslationPattern::Custom);
        service.save_config("acme", "pages", config).await.unwrap();
        let record = json!({"title": "Hello"});

        let first = service.extract(&record, "acme", "pages", "fr").await.unwrap();
        let second = service.extract(&record, "acme", "pages", "fr").await.unwrap();
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.result, second.result);
    }

    #[tokio::test]
    async fn test_missing_config_behaviour() {
        let service = service();
        let record = json!({"title": "Hello"});

        let extraction = service.extract(&record, "acme", "nope", "fr").await.unwrap();
        assert!(extraction.result.is_empty());
        assert_eq!(extraction.warnings.len(), 1);

        let preview = service.preview(&record, "acme", "nope", "fr").await.unwrap();
        assert!(preview.summary.is_none());

        let translator = MockTranslator::new(MockMode::Suffix);
        let err = service
            .translate_record(&record, "acme", "nope", "en", "fr", &translator)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_preview_lists_batched_and_markup() {
        let service = service();
        let config = FieldConfig::new(["title", "content"])
            .with_pattern(TranslationPattern::Custom)
            .with_batch_processing(true);
        service.save_config("acme", "pages", config).await.unwrap();

        let record = json!({"title": "Hello", "content": "<p>Hi <b>x</b></p>"});
        let preview = service.preview(&record, "acme", "pages", "ar").await.unwrap();

        assert_eq!(preview.fields[0].path, "title");
        assert!(preview.fields[0].batched);
        assert_eq!(preview.fields[1].node_count, Some(2));
        let summary = preview.summary.unwrap();
        assert!(summary.rtl_support);
        assert!(summary.sentence_level_markup);
        assert_eq!(summary.total_fields, 2);
    }

    #[tokio::test]
    async fn test_validate_paths_report() {
        let service = service();
        let paths = vec!["title".to_string(), "items[x]".to_string(), "title".to_string()];
        let report = service.validate_paths("acme", "pages", &paths).await.unwrap();

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.warnings.is_empty());

        let cached = service.validate_paths("acme", "pages", &paths).await.unwrap();
        assert_eq!(cached, report);
        assert_eq!(service.cache_stats().namespace(CacheNamespace::Validation).hits, 1);
    }

    #[tokio::test]
    async fn test_all_fields_failed() {
        let service = service();
        let config = FieldConfig::new(["title", "meta"]).with_pattern(TranslationPattern::PerLocaleCollection);
        service.save_config("acme", "pages", config).await.unwrap();

        let translator = MockTranslator::new(MockMode::Error("down".into()));
        let err = service
            .translate_record(&json!({"id": 1, "title": "Hi", "meta": {"a": 1}}), "acme", "pages", "en", "fr", &translator)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::AllFieldsFailed(_)));
    }

    #[tokio::test]
    async fn test_invalidate_clears_extractions() {
        let service = service();
        let config = FieldConfig::new(["title"]).with_pattern(TranslationPattern::Custom);
        service.save_config("acme", "pages", config).await.unwrap();
        let record = json!({"title": "Hello"});

        service.extract(&record, "acme", "pages", "fr").await.unwrap();
        let removed = service.invalidate("acme", None).await.unwrap();
        assert!(removed >= 2);

        let again = service.extract(&record, "acme", "pages", "fr").await.unwrap();
        assert!(!again.cache_hit);
    }
}
