//! 字段配置模型
//!
//! 每个 (客户端, 集合) 对应一份 [`FieldConfig`]，决定提取哪些路径、
//! 如何处理标记以及译文写入哪种存储形态。

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::content::{FieldKind, PathExpr};
use crate::translation::error::{TranslationError, TranslationResult};

use super::constants;

/// 译文存储形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TranslationPattern {
    /// 独立的翻译表，按源记录ID与语言区分
    #[default]
    #[serde(alias = "collection_translations")]
    SideTableByLocale,
    /// 每种语言一个镜像集合
    #[serde(alias = "language_collections")]
    PerLocaleCollection,
    /// 按完整路径写回嵌套结构
    Custom,
}

impl TranslationPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationPattern::SideTableByLocale => "sideTableByLocale",
            TranslationPattern::PerLocaleCollection => "perLocaleCollection",
            TranslationPattern::Custom => "custom",
        }
    }

    pub fn requires_primary_collection(&self) -> bool {
        matches!(self, TranslationPattern::SideTableByLocale)
    }
}

/// 单个语言的覆盖设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtlOverride {
    #[serde(default, alias = "field_paths", skip_serializing_if = "Option::is_none")]
    pub field_paths: Option<Vec<String>>,
    #[serde(default = "default_true", alias = "sentence_level_markup")]
    pub sentence_level_markup: bool,
}

impl Default for RtlOverride {
    fn default() -> Self {
        Self {
            field_paths: None,
            sentence_level_markup: true,
        }
    }
}

/// 字段配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(alias = "field_paths")]
    pub field_paths: Vec<String>,

    #[serde(default, alias = "field_types")]
    pub field_types: BTreeMap<String, FieldKind>,

    #[serde(default, alias = "directus_translation_pattern")]
    pub pattern: TranslationPattern,

    #[serde(
        default,
        alias = "primary_collection",
        alias = "primaryCollection",
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_collection_name: Option<String>,

    #[serde(default, alias = "rtl_field_mapping")]
    pub rtl_overrides: BTreeMap<String, RtlOverride>,

    #[serde(default, alias = "batch_processing")]
    pub batch_processing: bool,

    #[serde(default = "default_true", alias = "preserve_html_structure")]
    pub preserve_markup_structure: bool,

    #[serde(default = "default_true", alias = "content_sanitization")]
    pub sanitize: bool,

    /// 翻译表中语言字段的名称
    #[serde(default = "default_locale_field", alias = "locale_field")]
    pub locale_field: String,
}

fn default_true() -> bool {
    true
}

fn default_locale_field() -> String {
    constants::DEFAULT_LOCALE_FIELD.to_string()
}

impl FieldConfig {
    /// 以默认选项创建配置
    pub fn new<I, S>(field_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_paths: field_paths.into_iter().map(Into::into).collect(),
            field_types: BTreeMap::new(),
            pattern: TranslationPattern::default(),
            primary_collection_name: None,
            rtl_overrides: BTreeMap::new(),
            batch_processing: false,
            preserve_markup_structure: true,
            sanitize: true,
            locale_field: default_locale_field(),
        }
    }

    pub fn with_pattern(mut self, pattern: TranslationPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_primary_collection(mut self, name: impl Into<String>) -> Self {
        self.primary_collection_name = Some(name.into());
        self
    }

    pub fn with_batch_processing(mut self, enabled: bool) -> Self {
        self.batch_processing = enabled;
        self
    }

    pub fn with_field_type(mut self, path: impl Into<String>, kind: FieldKind) -> Self {
        self.field_types.insert(path.into(), kind);
        self
    }

    pub fn with_rtl_override(mut self, locale: impl Into<String>, rtl: RtlOverride) -> Self {
        self.rtl_overrides.insert(locale.into(), rtl);
        self
    }

    /// 检查配置是否满足所选存储形态的要求
    pub fn validate(&self) -> TranslationResult<()> {
        let mut seen = HashSet::new();
        for path in self.field_paths.iter().chain(
            self.rtl_overrides
                .values()
                .filter_map(|o| o.field_paths.as_ref())
                .flatten(),
        ) {
            PathExpr::parse(path)?;
        }
        for path in &self.field_paths {
            if !seen.insert(path.as_str()) {
                return Err(TranslationError::Configuration(format!(
                    "字段路径重复: {}",
                    path
                )));
            }
        }

        if self.pattern.requires_primary_collection() {
            self.primary_collection()?;
        }

        if self.locale_field.trim().is_empty() {
            return Err(TranslationError::Configuration("localeField 不能为空".to_string()));
        }

        Ok(())
    }

    /// 主集合名称，缺失或为空时是配置错误
    pub fn primary_collection(&self) -> TranslationResult<&str> {
        match self.primary_collection_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(TranslationError::Configuration(format!(
                "{} 模式需要设置 primaryCollectionName",
                self.pattern.as_str()
            ))),
        }
    }

    /// 目标语言实际使用的字段路径
    pub fn effective_paths(&self, locale: &str, is_rtl: bool) -> &[String] {
        if is_rtl {
            if let Some(paths) = self
                .rtl_overrides
                .get(locale)
                .and_then(|o| o.field_paths.as_ref())
            {
                return paths;
            }
        }
        &self.field_paths
    }

    /// 目标语言是否允许整句标记策略
    pub fn sentence_level_enabled(&self, locale: &str) -> bool {
        self.rtl_overrides
            .get(locale)
            .map_or(true, |o| o.sentence_level_markup)
    }

    pub fn has_rtl_override(&self, locale: &str) -> bool {
        self.rtl_overrides.contains_key(locale)
    }

    pub fn kind_override(&self, path: &str) -> Option<FieldKind> {
        self.field_types.get(path).copied()
    }
}
