//! # Locplat Library
//!
//! 从 CMS 内容记录中提取可翻译字段，按标记结构安全地写回译文，
//! 并生成按语言区分的存储记录。
//!
//! ## 模块组织
//!
//! - `content` - 路径定位、字段类型判定、标记片段提取与写回
//! - `translation` - 配置、缓存、翻译引擎与服务入口
//! - `env` - 类型化的环境变量
//!
//! 库本身不安装日志订阅器，由调用方决定如何输出 `tracing` 事件。

pub mod content;
pub mod env;
pub mod translation;

// Re-export commonly used items for convenience
pub use content::{classify, resolve, set_value, short_name, FieldKind, PathExpr, Resolved};
pub use translation::{
    extract_fields, materialize, ExtractionResult, FieldConfig, MaterializedRecord,
    PipelineSettings, TranslationError, TranslationPattern, TranslationResult, TranslationService,
    Translator,
};
