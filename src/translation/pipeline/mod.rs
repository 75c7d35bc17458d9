//! 翻译管道模块
//!
//! 提供字段收集、批次分组和目标存储形态生成

pub mod batch;
pub mod collector;
pub mod materializer;

// 重新导出主要类型
pub use batch::BatchBucket;
pub use collector::{extract_fields, ExtractedField, ExtractionResult, FieldCollector, FieldMetadata};
pub use materializer::{materialize, FailurePolicy, FieldOutcome, FieldOutcomes, MaterializedRecord};
