//! 翻译系统核心模块
//!
//! - **服务层** (`service.rs`): 对外入口，协调配置存储、缓存、提取和存储形态生成
//! - **引擎层** (`engine.rs`): 单条记录的并发翻译与逐字段失败捕获
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── ConfigStore / ResultCache (storage/)
//!     ├── extract_fields (pipeline/collector.rs)
//!     ├── TranslationEngine (engine.rs)
//!     │       └── Translator (backend/)
//!     └── materialize (pipeline/materializer.rs)
//! ```

pub mod engine;
pub mod service;

pub use engine::{EngineReport, EngineStats, TranslationEngine};
pub use service::{
    ConfigSummary, ExtractionOutcome, PreviewField, TranslationOutcome, TranslationPreview,
    TranslationService, ValidationReport,
};
