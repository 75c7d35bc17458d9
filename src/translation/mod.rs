//! 翻译模块
//!
//! 采用清晰的模块化架构：
//! - **core**: 翻译服务入口和单记录翻译引擎
//! - **pipeline**: 字段收集、批次分组、存储形态生成
//! - **storage**: 结果缓存和字段配置存储
//! - **backend**: 翻译后端抽象
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use locplat::translation::{translate_with_config, FieldConfig, MockMode, MockTranslator, PipelineSettings};
//! use serde_json::json;
//!
//! # async fn example() -> locplat::TranslationResult<()> {
//! let config = FieldConfig::new(["title", "content"]).with_primary_collection("articles");
//! let translator = MockTranslator::new(MockMode::Suffix);
//! let record = json!({"id": 7, "title": "Hello", "content": "<p>Hi <em>there</em></p>"});
//!
//! let outcome = translate_with_config(&record, config, "en", "fr", &translator, PipelineSettings::default()).await?;
//! println!("{}", serde_json::to_string_pretty(&outcome.record)?);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 翻译后端模块 - 后端特性与指令模式
pub mod backend;

/// 配置管理模块 - 字段配置与进程级设置
pub mod config;

/// 核心模块 - 翻译服务与引擎
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 处理管道模块 - 字段收集、批次分组和存储形态生成
pub mod pipeline;

/// 存储模块 - 结果缓存与配置存储
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use backend::{InstructionMode, MockMode, MockTranslator, Translator};
pub use config::{constants, ConfigManager, FieldConfig, PipelineSettings, RtlOverride, TranslationPattern};
pub use self::core::{
    ExtractionOutcome, TranslationEngine, TranslationOutcome, TranslationPreview,
    TranslationService, ValidationReport,
};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use pipeline::{
    extract_fields, materialize, BatchBucket, ExtractionResult, FailurePolicy, FieldOutcome,
    MaterializedRecord,
};
pub use storage::{
    CacheNamespace, CacheStats, CacheStore, ConfigStore, MemoryCacheStore, MemoryConfigStore,
    ResultCache,
};

// ============================================================================
// 便利函数
// ============================================================================

/// 不经过配置存储，直接用给定配置翻译一条记录
///
/// 内部使用一次性的内存配置存储和内存缓存，适合命令行和脚本场景。
pub async fn translate_with_config(
    record: &serde_json::Value,
    config: FieldConfig,
    source_locale: &str,
    target_locale: &str,
    translator: &dyn Translator,
    settings: PipelineSettings,
) -> TranslationResult<TranslationOutcome> {
    const CLIENT: &str = "local";
    const COLLECTION: &str = "records";

    config.validate()?;
    let capacity = settings.cache_capacity;
    let service = TranslationService::new(
        MemoryConfigStore::with_config(CLIENT, COLLECTION, config),
        MemoryCacheStore::new(capacity),
        settings,
    );
    service
        .translate_record(record, CLIENT, COLLECTION, source_locale, target_locale, translator)
        .await
}
