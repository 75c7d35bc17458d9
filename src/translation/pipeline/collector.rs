//! 字段收集器
//!
//! 按字段配置在记录中定位值、判定类型，生成 [`ExtractionResult`]。
//! 每个解析到非缺失值的路径在结果中恰好出现一次：要么是直接条目，
//! 要么在 `__batch__` 中，不会同时出现。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::classify::{classify_with_override, text_of};
use crate::content::markup::{sanitize, FragmentIndex, MarkupNode, MarkupStructure};
use crate::content::{FieldKind, PathExpr, Resolved};
use crate::translation::config::FieldConfig;
use crate::translation::error::TranslationError;

use super::batch::BatchBucket;

/// 字段附加信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<MarkupNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<MarkupStructure>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sanitized: bool,
    /// 片段结构不完整时的原因，此类字段原样透传
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

/// 单个直接条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: Value,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub metadata: FieldMetadata,
}

/// 提取结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub fields: BTreeMap<String, ExtractedField>,
    #[serde(rename = "__batch__", default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchBucket>,
    /// 提取时使用的路径顺序
    #[serde(default)]
    pub order: Vec<String>,
}

impl ExtractionResult {
    /// 直接条目或批次中是否包含该路径
    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path) || self.batch.as_ref().map_or(false, |b| b.contains(path))
    }

    /// 路径总数
    pub fn len(&self) -> usize {
        self.fields.len() + self.batch.as_ref().map_or(0, BatchBucket::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_batched(&self, path: &str) -> bool {
        self.batch.as_ref().map_or(false, |b| b.contains(path))
    }
}

/// 字段收集器
pub struct FieldCollector<'a> {
    config: &'a FieldConfig,
}

impl<'a> FieldCollector<'a> {
    pub fn new(config: &'a FieldConfig) -> Self {
        Self { config }
    }

    /// 从记录中提取目标语言需要的字段
    pub fn collect(&self, record: &Value, locale: &str, is_rtl: bool) -> ExtractionResult {
        let paths = self.config.effective_paths(locale, is_rtl);
        let mut result = ExtractionResult::default();
        let mut bucket = BatchBucket::new();

        for path in paths {
            let expr = match PathExpr::parse(path) {
                Ok(expr) => expr,
                Err(e) => {
                    tracing::warn!(path = %path, "跳过无效路径: {}", e);
                    continue;
                }
            };

            let value = match expr.resolve(record) {
                Resolved::Present(value) => value,
                Resolved::Absent => {
                    tracing::debug!(path = %path, "路径在记录中不存在");
                    continue;
                }
            };

            let kind = classify_with_override(path, value, self.config.kind_override(path));
            result.order.push(path.clone());

            match kind {
                FieldKind::ScalarText | FieldKind::MultilineText => {
                    let text = text_of(value).unwrap_or_default();
                    if self.config.batch_processing && !text.trim().is_empty() {
                        bucket.push(path.clone(), text, kind);
                    } else {
                        result.fields.insert(
                            path.clone(),
                            ExtractedField {
                                value: value.clone(),
                                kind,
                                metadata: text_metadata(&text),
                            },
                        );
                    }
                }
                FieldKind::Markup => {
                    let text = text_of(value).unwrap_or_default();
                    result.fields.insert(path.clone(), self.collect_markup(path, &text));
                }
                FieldKind::Structured => {
                    result.fields.insert(
                        path.clone(),
                        ExtractedField {
                            value: value.clone(),
                            kind,
                            metadata: FieldMetadata::default(),
                        },
                    );
                }
            }
        }

        if !bucket.is_empty() {
            result.batch = Some(bucket);
        }

        tracing::debug!(
            locale = %locale,
            direct = result.fields.len(),
            batched = result.batch.as_ref().map_or(0, BatchBucket::len),
            "字段提取完成"
        );
        result
    }

    fn collect_markup(&self, path: &str, markup: &str) -> ExtractedField {
        let (markup, sanitized) = if self.config.sanitize {
            match sanitize(markup) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    tracing::warn!(path = %path, "片段清理失败，使用原文: {}", e);
                    (markup.to_string(), false)
                }
            }
        } else {
            (markup.to_string(), false)
        };

        let mut metadata = text_metadata(&crate::content::markup::plain_text(&markup));
        metadata.sanitized = sanitized;

        match FragmentIndex::build(&markup) {
            Ok(index) => {
                metadata.structure = Some(index.structure());
                metadata.nodes = index.nodes().to_vec();
            }
            Err(TranslationError::MarkupParse(reason)) => {
                tracing::warn!(path = %path, "片段结构不完整，原样透传: {}", reason);
                metadata.parse_error = Some(reason);
            }
            Err(e) => {
                tracing::warn!(path = %path, "片段索引失败，原样透传: {}", e);
                metadata.parse_error = Some(e.to_string());
            }
        }

        ExtractedField {
            value: Value::String(markup),
            kind: FieldKind::Markup,
            metadata,
        }
    }
}

fn text_metadata(text: &str) -> FieldMetadata {
    FieldMetadata {
        length: Some(text.chars().count()),
        word_count: Some(text.split_whitespace().count()),
        ..FieldMetadata::default()
    }
}

/// 按配置提取字段
pub fn extract_fields(record: &Value, config: &FieldConfig, locale: &str, is_rtl: bool) -> ExtractionResult {
    FieldCollector::new(config).collect(record, locale, is_rtl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::config::{RtlOverride, TranslationPattern};
    use serde_json::json;

    fn config(paths: &[&str]) -> FieldConfig {
        FieldConfig::new(paths.iter().copied()).with_pattern(TranslationPattern::Custom)
    }

    #[test]
    fn test_batch_and_markup_split() {
        let record = json!({"title": "Hello", "content": "<p>Hi <strong>there</strong></p>"});
        let result = extract_fields(&record, &config(&["title", "content"]).with_batch_processing(true), "fr", false);

        let batch = result.batch.as_ref().unwrap();
        assert_eq!(batch.texts, vec!["Hello"]);
        assert_eq!(batch.index_to_path[&0], "title");

        let content = &result.fields["content"];
        assert_eq!(content.kind, FieldKind::Markup);
        let texts: Vec<_> = content.metadata.nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi", "there"]);
        assert!(!result.fields.contains_key("title"));
    }

    #[test]
    fn test_each_present_path_appears_once() {
        let record = json!({
            "a": "one", "b": "two\nlines", "c": null, "d": {"x": 1}, "e": "<b>x</b>"
        });
        let paths = ["a", "b", "c", "d", "e", "missing"];
        let result = extract_fields(&record, &config(&paths).with_batch_processing(true), "fr", false);

        assert_eq!(result.len(), 5);
        for path in ["a", "b", "c", "d", "e"] {
            let direct = result.fields.contains_key(path);
            let batched = result.is_batched(path);
            assert!(direct ^ batched, "路径 {} 应恰好出现一次", path);
        }
        assert!(!result.contains("missing"));
        assert_eq!(result.fields["c"].kind, FieldKind::Structured);
    }

    #[test]
    fn test_without_batching_fields_are_direct() {
        let record = json!({"title": "Hello", "count": 3});
        let cfg = config(&["title", "count"]).with_field_type("count", FieldKind::ScalarText);
        let result = extract_fields(&record, &cfg, "fr", false);

        assert!(result.batch.is_none());
        assert_eq!(result.fields["title"].metadata.word_count, Some(1));
        assert_eq!(result.fields["count"].kind, FieldKind::ScalarText);
    }

    #[test]
    fn test_malformed_markup_marked_for_passthrough() {
        let record = json!({"body": "<p>Hello <em>World</p>"});
        let result = extract_fields(&record, &config(&["body"]), "fr", false);

        let body = &result.fields["body"];
        assert!(body.metadata.parse_error.is_some());
        assert!(body.metadata.nodes.is_empty());
        assert_eq!(body.value, json!("<p>Hello <em>World</p>"));
    }

    #[test]
    fn test_sanitize_rewrites_value() {
        let record = json!({"body": "<p>Hi</p><script>x()</script>"});
        let result = extract_fields(&record, &config(&["body"]), "fr", false);
        assert_eq!(result.fields["body"].value, json!("<p>Hi</p>"));
        assert!(result.fields["body"].metadata.sanitized);
    }

    #[test]
    fn test_rtl_override_paths() {
        let record = json!({"title": "Hello", "body": "World"});
        let cfg = config(&["title", "body"]).with_rtl_override(
            "ar",
            RtlOverride {
                field_paths: Some(vec!["title".into()]),
                sentence_level_markup: true,
            },
        );

        assert_eq!(extract_fields(&record, &cfg, "ar", true).len(), 1);
        assert_eq!(extract_fields(&record, &cfg, "fr", false).len(), 2);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let record = json!({"title": "Hello", "content": "<p>Hi <em>a</em> <em>b</em></p>"});
        let cfg = config(&["content", "title"]).with_batch_processing(true);
        assert_eq!(
            extract_fields(&record, &cfg, "fr", false),
            extract_fields(&record, &cfg, "fr", false)
        );
    }
}
