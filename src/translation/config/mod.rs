//! 配置管理模块
//!
//! 两类配置：按 (客户端, 集合) 存储的 [`FieldConfig`]，以及进程级的
//! [`PipelineSettings`]（配置文件、环境变量和默认值）。

pub mod field_config;
pub mod manager;

// 重新导出主要类型
pub use field_config::{FieldConfig, RtlOverride, TranslationPattern};
pub use manager::{load_field_config, ConfigManager, PipelineSettings};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 缓存设置
    pub const DEFAULT_CONFIG_CACHE_TTL: Duration = Duration::from_secs(1800); // 30分钟
    pub const DEFAULT_EXTRACTION_CACHE_TTL: Duration = Duration::from_secs(600); // 10分钟
    pub const DEFAULT_VALIDATION_CACHE_TTL: Duration = Duration::from_secs(3600); // 1小时
    pub const DEFAULT_MAX_CACHEABLE_CONTENT_BYTES: usize = 50_000;
    pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(250);
    pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
    pub const CACHE_VERSION: u32 = 1;

    // 翻译设置
    pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 8;
    pub const DEFAULT_SOURCE_LOCALE: &str = "en";
    pub const DEFAULT_LOCALE_FIELD: &str = "languages_code";

    // 从右到左书写的语言
    pub const RTL_LOCALES: &[&str] = &["ar", "he", "fa", "ur", "yi", "ps", "sd", "ug", "dv", "ckb"];

    // 输出中的保留键
    pub const FAILED_FIELDS_KEY: &str = "_failed_fields";
    pub const METADATA_KEY: &str = "_translation_metadata";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "locplat.toml",
        ".locplat.toml",
        "~/.config/locplat/config.toml",
        "/etc/locplat/config.toml",
    ];

    pub const ENV_FILES: &[&str] = &[".env.local", ".env.development", ".env.production", ".env"];
}
