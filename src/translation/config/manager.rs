//! 管道设置管理器
//!
//! 加载顺序：`.env` 文件 → 设置文件（TOML 或 JSON）→ 环境变量覆盖 → 校验。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::{EnvResult, EnvVar};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::FailurePolicy;

use super::constants;
use super::FieldConfig;

/// 进程级管道设置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineSettings {
    // 缓存配置
    pub config_cache_ttl_secs: u64,
    pub extraction_cache_ttl_secs: u64,
    pub validation_cache_ttl_secs: u64,
    pub max_cacheable_content_bytes: usize,
    pub cache_timeout_ms: u64,
    pub cache_capacity: usize,
    pub cache_version: u32,

    // 翻译配置
    pub failure_policy: FailurePolicy,
    pub rtl_locales: Vec<String>,
    pub max_concurrent_calls: usize,
    pub source_locale: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            config_cache_ttl_secs: constants::DEFAULT_CONFIG_CACHE_TTL.as_secs(),
            extraction_cache_ttl_secs: constants::DEFAULT_EXTRACTION_CACHE_TTL.as_secs(),
            validation_cache_ttl_secs: constants::DEFAULT_VALIDATION_CACHE_TTL.as_secs(),
            max_cacheable_content_bytes: constants::DEFAULT_MAX_CACHEABLE_CONTENT_BYTES,
            cache_timeout_ms: constants::DEFAULT_CACHE_TIMEOUT.as_millis() as u64,
            cache_capacity: constants::DEFAULT_CACHE_CAPACITY,
            cache_version: constants::CACHE_VERSION,

            failure_policy: FailurePolicy::default(),
            rtl_locales: constants::RTL_LOCALES.iter().map(|s| s.to_string()).collect(),
            max_concurrent_calls: constants::DEFAULT_MAX_CONCURRENT_CALLS,
            source_locale: constants::DEFAULT_SOURCE_LOCALE.to_string(),
        }
    }
}

impl PipelineSettings {
    /// 验证设置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.config_cache_ttl_secs == 0
            || self.extraction_cache_ttl_secs == 0
            || self.validation_cache_ttl_secs == 0
        {
            return Err(TranslationError::Configuration("缓存TTL不能为0".to_string()));
        }

        if self.cache_capacity == 0 {
            return Err(TranslationError::Configuration("缓存容量不能为0".to_string()));
        }

        if self.cache_timeout_ms == 0 {
            return Err(TranslationError::Configuration("缓存超时不能为0".to_string()));
        }

        if self.max_concurrent_calls == 0 {
            return Err(TranslationError::Configuration("最大并发数不能为0".to_string()));
        }

        if self.source_locale.trim().is_empty() {
            return Err(TranslationError::Configuration("源语言不能为空".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖，只处理显式设置的变量
    ///
    /// 解析失败的变量会被记录并忽略；`strict` 为真时返回错误。
    pub fn apply_env_overrides(&mut self, strict: bool) -> TranslationResult<()> {
        use crate::env::{cache, pipeline};

        fn take<T>(result: Option<EnvResult<T>>, strict: bool) -> TranslationResult<Option<T>> {
            match result {
                None => Ok(None),
                Some(Ok(value)) => Ok(Some(value)),
                Some(Err(e)) if strict => Err(TranslationError::Configuration(e.to_string())),
                Some(Err(e)) => {
                    tracing::warn!("忽略无效的环境变量: {}", e);
                    Ok(None)
                }
            }
        }

        // 缓存相关环境变量
        if let Some(ttl) = take(cache::ConfigTtl::lookup(), strict)? {
            self.config_cache_ttl_secs = ttl.as_secs();
        }
        if let Some(ttl) = take(cache::ExtractionTtl::lookup(), strict)? {
            self.extraction_cache_ttl_secs = ttl.as_secs();
        }
        if let Some(ttl) = take(cache::ValidationTtl::lookup(), strict)? {
            self.validation_cache_ttl_secs = ttl.as_secs();
        }
        if let Some(bytes) = take(cache::MaxContentBytes::lookup(), strict)? {
            self.max_cacheable_content_bytes = bytes;
        }
        if let Some(timeout) = take(cache::TimeoutMs::lookup(), strict)? {
            self.cache_timeout_ms = timeout.as_millis() as u64;
        }
        if let Some(capacity) = take(cache::Capacity::lookup(), strict)? {
            self.cache_capacity = capacity;
        }

        // 翻译相关环境变量
        if let Some(locale) = take(pipeline::SourceLocale::lookup(), strict)? {
            self.source_locale = locale;
        }
        if let Some(locales) = take(pipeline::RtlLocales::lookup(), strict)? {
            tracing::info!("环境变量覆盖RTL语言列表: {:?}", locales);
            self.rtl_locales = locales;
        }
        if let Some(policy) = take(pipeline::FailurePolicy::lookup(), strict)? {
            self.failure_policy = policy;
        }
        if let Some(max_calls) = take(pipeline::MaxConcurrentCalls::lookup(), strict)? {
            self.max_concurrent_calls = max_calls;
        }

        Ok(())
    }

    /// 语言是否从右到左书写（按主语言子标签判断，`ar-SA` 视为 `ar`）
    pub fn is_rtl(&self, locale: &str) -> bool {
        let primary = locale
            .split(|c| c == '-' || c == '_')
            .next()
            .unwrap_or(locale)
            .to_ascii_lowercase();
        self.rtl_locales.iter().any(|rtl| rtl.eq_ignore_ascii_case(&primary))
    }

    pub fn config_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl_secs)
    }

    pub fn extraction_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.extraction_cache_ttl_secs)
    }

    pub fn validation_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.validation_cache_ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

/// 设置管理器
pub struct ConfigManager {
    settings: PipelineSettings,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 按搜索路径加载设置
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();

        let explicit = crate::env::core::SettingsFile::lookup().and_then(Result::ok);
        let path = match explicit {
            Some(path) => Some(PathBuf::from(shellexpand::tilde(&path).as_ref())),
            None => Self::find_config_file(),
        };

        match path {
            Some(path) => Self::from_file(path),
            None => {
                tracing::info!("未找到配置文件，使用默认配置");
                Self::finish(PipelineSettings::default(), None)
            }
        }
    }

    /// 从指定文件加载设置
    pub fn from_file(path: impl AsRef<Path>) -> TranslationResult<Self> {
        let path = path.as_ref();
        tracing::info!("加载配置文件: {}", path.display());
        let settings = Self::load_from_file(path)?;
        Self::finish(settings, Some(path.to_path_buf()))
    }

    /// 使用给定设置（仍会应用环境变量覆盖并校验）
    pub fn with_settings(settings: PipelineSettings) -> TranslationResult<Self> {
        Self::finish(settings, None)
    }

    fn finish(mut settings: PipelineSettings, source: Option<PathBuf>) -> TranslationResult<Self> {
        let strict = crate::env::StrictEnv::get_or_default(false);
        settings.apply_env_overrides(strict)?;
        settings.validate()?;
        Ok(Self { settings, source })
    }

    /// 获取设置
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn into_settings(self) -> PipelineSettings {
        self.settings
    }

    /// 设置来源文件，使用默认值时为 `None`
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn find_config_file() -> Option<PathBuf> {
        constants::CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    fn load_from_file(path: &Path) -> TranslationResult<PipelineSettings> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranslationError::Configuration(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;

        if path.extension().map_or(false, |ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::Configuration(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| TranslationError::Configuration(format!("解析TOML配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        for env_file in constants::ENV_FILES {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: impl AsRef<Path>) -> TranslationResult<()> {
        let content = toml::to_string_pretty(&PipelineSettings::default())
            .map_err(|e| TranslationError::Configuration(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| TranslationError::Configuration(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}

/// 从 JSON 或 TOML 文件读取字段配置
pub fn load_field_config(path: impl AsRef<Path>) -> TranslationResult<FieldConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        TranslationError::Configuration(format!("读取字段配置失败 {}: {}", path.display(), e))
    })?;

    let config: FieldConfig = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&content)
            .map_err(|e| TranslationError::Configuration(format!("解析字段配置失败: {}", e)))?
    };

    Ok(config)
}
