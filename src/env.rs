//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量管理。所有变量以 `LOCPLAT_` 为前缀，
//! 只在显式设置时覆盖配置文件中的值。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只在变量被显式设置时返回值，未设置时返回 `None`
    fn lookup() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "LOCPLAT_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 设置文件路径（优先于搜索路径）
    pub struct SettingsFile;
    impl EnvVar<String> for SettingsFile {
        const NAME: &'static str = "LOCPLAT_SETTINGS";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path to a TOML or JSON pipeline settings file";

        fn parse(value: &str) -> EnvResult<String> {
            let path = value.trim();
            if path.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Settings path cannot be empty".to_string(),
                });
            }
            Ok(path.to_string())
        }
    }
}

/// 翻译管道相关环境变量
pub mod pipeline {
    use super::*;
    use crate::translation::pipeline::FailurePolicy as Policy;

    /// 源语言
    pub struct SourceLocale;
    impl EnvVar<String> for SourceLocale {
        const NAME: &'static str = "LOCPLAT_SOURCE_LOCALE";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("en".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Default source locale for translation calls";

        fn parse(value: &str) -> EnvResult<String> {
            parse_locale(value, Self::NAME)
        }
    }

    /// 从右到左书写的语言列表
    pub struct RtlLocales;
    impl EnvVar<Vec<String>> for RtlLocales {
        const NAME: &'static str = "LOCPLAT_RTL_LOCALES";
        const DEFAULT: Option<Vec<String>> = None;
        const DESCRIPTION: &'static str = "Comma separated list of right-to-left locales";

        fn parse(value: &str) -> EnvResult<Vec<String>> {
            let locales: Vec<String> = value
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| parse_locale(s, Self::NAME))
                .collect::<EnvResult<_>>()?;

            if locales.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "At least one locale is required".to_string(),
                });
            }
            Ok(locales)
        }
    }

    /// 字段失败处理策略
    pub struct FailurePolicy;
    impl EnvVar<Policy> for FailurePolicy {
        const NAME: &'static str = "LOCPLAT_FAILURE_POLICY";
        const DEFAULT: Option<Policy> = None;
        const DESCRIPTION: &'static str = "Failed field policy: omit, mark";

        fn parse(value: &str) -> EnvResult<Policy> {
            value.parse::<Policy>().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: format!("Invalid failure policy '{}'. Use: omit, mark", value),
            })
        }
    }

    /// 单条记录最大并发后端调用数
    pub struct MaxConcurrentCalls;
    impl EnvVar<usize> for MaxConcurrentCalls {
        const NAME: &'static str = "LOCPLAT_MAX_CONCURRENT_CALLS";
        const DEFAULT: Option<usize> = Some(8);
        const DESCRIPTION: &'static str = "Maximum in-flight backend calls per record";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 256)
        }
    }
}

/// 缓存相关环境变量
pub mod cache {
    use super::*;

    /// 配置缓存TTL
    pub struct ConfigTtl;
    impl EnvVar<Duration> for ConfigTtl {
        const NAME: &'static str = "LOCPLAT_CACHE_CONFIG_TTL";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(1800));
        const DESCRIPTION: &'static str = "Config cache TTL in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_ttl(value, Self::NAME)
        }
    }

    /// 提取结果缓存TTL
    pub struct ExtractionTtl;
    impl EnvVar<Duration> for ExtractionTtl {
        const NAME: &'static str = "LOCPLAT_CACHE_EXTRACTION_TTL";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(600));
        const DESCRIPTION: &'static str = "Extraction cache TTL in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_ttl(value, Self::NAME)
        }
    }

    /// 路径校验缓存TTL
    pub struct ValidationTtl;
    impl EnvVar<Duration> for ValidationTtl {
        const NAME: &'static str = "LOCPLAT_CACHE_VALIDATION_TTL";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(3600));
        const DESCRIPTION: &'static str = "Validation cache TTL in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_ttl(value, Self::NAME)
        }
    }

    /// 可缓存内容的最大字节数
    pub struct MaxContentBytes;
    impl EnvVar<usize> for MaxContentBytes {
        const NAME: &'static str = "LOCPLAT_CACHE_MAX_CONTENT_BYTES";
        const DEFAULT: Option<usize> = Some(50_000);
        const DESCRIPTION: &'static str = "Records larger than this are never stored in the extraction cache";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 64 * 1024 * 1024)
        }
    }

    /// 单次缓存操作超时
    pub struct TimeoutMs;
    impl EnvVar<Duration> for TimeoutMs {
        const NAME: &'static str = "LOCPLAT_CACHE_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(250));
        const DESCRIPTION: &'static str = "Bound on every cache read/write in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let millis = parse_positive_usize(value, Self::NAME, 1, 60_000)?;
            Ok(Duration::from_millis(millis as u64))
        }
    }

    /// 本地缓存容量
    pub struct Capacity;
    impl EnvVar<usize> for Capacity {
        const NAME: &'static str = "LOCPLAT_CACHE_CAPACITY";
        const DEFAULT: Option<usize> = Some(1000);
        const DESCRIPTION: &'static str = "In-memory cache capacity per namespace (number of entries)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 10, 1_000_000)
        }
    }
}

fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_ttl(value: &str, var_name: &str) -> EnvResult<Duration> {
    let seconds: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of seconds".to_string(),
    })?;

    if seconds == 0 {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "TTL must be greater than 0".to_string(),
        });
    }

    if seconds > 86400 * 7 {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "TTL too long (maximum 7 days)".to_string(),
        });
    }

    Ok(Duration::from_secs(seconds))
}

fn parse_locale(value: &str, var_name: &str) -> EnvResult<String> {
    let locale = value.trim().to_lowercase();
    let valid = !locale.is_empty()
        && locale.len() <= 12
        && locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(locale)
    } else {
        Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid locale code '{}'", value),
        })
    }
}

/// 严格模式开关，为真时环境变量解析失败会中止启动
pub struct StrictEnv;
impl EnvVar<bool> for StrictEnv {
    const NAME: &'static str = "LOCPLAT_STRICT_ENV";
    const DEFAULT: Option<bool> = Some(false);
    const DESCRIPTION: &'static str = "Fail startup on malformed LOCPLAT_* variables";

    fn parse(value: &str) -> EnvResult<bool> {
        parse_bool(value, Self::NAME)
    }
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    docs.push_str("## Core\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: \"info\")\n",
        core::LogLevel::NAME,
        core::LogLevel::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        core::SettingsFile::NAME,
        core::SettingsFile::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        StrictEnv::NAME,
        StrictEnv::DESCRIPTION,
        StrictEnv::DEFAULT
    ));

    docs.push_str("\n## Pipeline\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: \"en\")\n",
        pipeline::SourceLocale::NAME,
        pipeline::SourceLocale::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        pipeline::RtlLocales::NAME,
        pipeline::RtlLocales::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: \"mark\")\n",
        pipeline::FailurePolicy::NAME,
        pipeline::FailurePolicy::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        pipeline::MaxConcurrentCalls::NAME,
        pipeline::MaxConcurrentCalls::DESCRIPTION,
        pipeline::MaxConcurrentCalls::DEFAULT
    ));

    docs.push_str("\n## Cache\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        cache::ConfigTtl::NAME,
        cache::ConfigTtl::DESCRIPTION,
        cache::ConfigTtl::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        cache::ExtractionTtl::NAME,
        cache::ExtractionTtl::DESCRIPTION,
        cache::ExtractionTtl::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        cache::ValidationTtl::NAME,
        cache::ValidationTtl::DESCRIPTION,
        cache::ValidationTtl::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        cache::MaxContentBytes::NAME,
        cache::MaxContentBytes::DESCRIPTION,
        cache::MaxContentBytes::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        cache::TimeoutMs::NAME,
        cache::TimeoutMs::DESCRIPTION,
        cache::TimeoutMs::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        cache::Capacity::NAME,
        cache::Capacity::DESCRIPTION,
        cache::Capacity::DEFAULT
    ));

    docs
}
