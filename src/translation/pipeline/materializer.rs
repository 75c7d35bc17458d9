//! 目标存储形态生成
//!
//! 把 路径 → 译文 的映射按配置的存储形态组装成最终记录。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::path::{set_value, short_name};
use crate::translation::config::constants::{FAILED_FIELDS_KEY, METADATA_KEY};
use crate::translation::config::{FieldConfig, TranslationPattern};
use crate::translation::error::{TranslationError, TranslationResult};

/// 最终写入存储的记录
pub type MaterializedRecord = Map<String, Value>;

/// 失败字段的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 输出中不包含失败字段
    Omit,
    /// 保留原文并在 `_failed_fields` 中列出
    #[default]
    Mark,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Omit => "omit",
            FailurePolicy::Mark => "mark",
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "omit" => Ok(FailurePolicy::Omit),
            "mark" => Ok(FailurePolicy::Mark),
            other => Err(TranslationError::Configuration(format!(
                "未知的失败处理策略: {} (可选 omit, mark)",
                other
            ))),
        }
    }
}

/// 单个字段的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    /// 已翻译
    Translated(Value),
    /// 无需翻译或无法解析，原样透传
    Passthrough(Value),
    /// 翻译失败，保留原值
    Failed { source: Value, message: String },
}

impl FieldOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FieldOutcome::Failed { .. })
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, FieldOutcome::Translated(_))
    }
}

/// 按路径顺序排列的字段结果
pub type FieldOutcomes = Vec<(String, FieldOutcome)>;

/// 按存储形态组装记录
pub fn materialize(
    outcomes: &FieldOutcomes,
    config: &FieldConfig,
    source_id: Option<&Value>,
    locale: &str,
    policy: FailurePolicy,
) -> TranslationResult<MaterializedRecord> {
    match config.pattern {
        TranslationPattern::SideTableByLocale => {
            let primary = config.primary_collection()?;
            let id = required_id(source_id, config.pattern)?;

            let mut record = Map::new();
            record.insert("id".to_string(), Value::Null);
            record.insert(format!("{}_id", primary), id);
            record.insert(config.locale_field.clone(), Value::String(locale.to_string()));
            write_flat(&mut record, outcomes, policy);
            Ok(record)
        }
        TranslationPattern::PerLocaleCollection => {
            let id = required_id(source_id, config.pattern)?;

            let mut record = Map::new();
            record.insert("id".to_string(), id);
            write_flat(&mut record, outcomes, policy);
            Ok(record)
        }
        TranslationPattern::Custom => materialize_custom(outcomes, source_id, locale, policy),
    }
}

fn required_id(source_id: Option<&Value>, pattern: TranslationPattern) -> TranslationResult<Value> {
    match source_id {
        Some(id) if !id.is_null() => Ok(id.clone()),
        _ => Err(TranslationError::Configuration(format!(
            "{} 模式要求源记录包含 id",
            pattern.as_str()
        ))),
    }
}

/// 选出每个路径应使用的值，失败字段按策略处理
fn resolved_value<'a>(outcome: &'a FieldOutcome, policy: FailurePolicy) -> Option<&'a Value> {
    match outcome {
        FieldOutcome::Translated(value) | FieldOutcome::Passthrough(value) => Some(value),
        FieldOutcome::Failed { source, .. } => match policy {
            FailurePolicy::Omit => None,
            FailurePolicy::Mark => Some(source),
        },
    }
}

/// 按短名写入，重名时退回完整路径
fn write_flat(record: &mut MaterializedRecord, outcomes: &FieldOutcomes, policy: FailurePolicy) {
    let reserved: HashSet<String> = record.keys().cloned().collect();
    let mut failed = Map::new();

    for (path, outcome) in outcomes {
        let Some(value) = resolved_value(outcome, policy) else {
            continue;
        };

        let short = short_name(path);
        let key = if !record.contains_key(&short) {
            short
        } else if !record.contains_key(path.as_str()) {
            tracing::warn!(
                path = %path,
                short_name = %short,
                reserved = reserved.contains(&short),
                "短名冲突，改用完整路径作为输出键"
            );
            path.clone()
        } else {
            tracing::warn!(path = %path, "完整路径同样冲突，字段已跳过");
            continue;
        };

        if let FieldOutcome::Failed { message, .. } = outcome {
            failed.insert(key.clone(), Value::String(message.clone()));
        }
        record.insert(key, value.clone());
    }

    if policy == FailurePolicy::Mark && !failed.is_empty() {
        record.insert(FAILED_FIELDS_KEY.to_string(), Value::Object(failed));
    }
}

fn materialize_custom(
    outcomes: &FieldOutcomes,
    source_id: Option<&Value>,
    locale: &str,
    policy: FailurePolicy,
) -> TranslationResult<MaterializedRecord> {
    let mut root = Value::Object(Map::new());
    let mut failed = Map::new();
    let mut translated = 0usize;

    if let Value::Object(map) = &mut root {
        map.insert("id".to_string(), source_id.cloned().unwrap_or(Value::Null));
    }

    for (path, outcome) in outcomes {
        let Some(value) = resolved_value(outcome, policy) else {
            continue;
        };

        if let Err(e) = set_value(&mut root, path, value.clone()) {
            tracing::warn!(path = %path, "无法写入嵌套路径，字段已跳过: {}", e);
            continue;
        }

        match outcome {
            FieldOutcome::Translated(_) => translated += 1,
            FieldOutcome::Failed { message, .. } => {
                failed.insert(path.clone(), Value::String(message.clone()));
            }
            FieldOutcome::Passthrough(_) => {}
        }
    }

    let Value::Object(mut record) = root else {
        return Err(TranslationError::Internal("自定义记录根节点不是对象".to_string()));
    };

    if policy == FailurePolicy::Mark && !failed.is_empty() {
        record.insert(FAILED_FIELDS_KEY.to_string(), Value::Object(failed));
    }

    record.insert(
        METADATA_KEY.to_string(),
        serde_json::json!({
            "translated_at": chrono::Utc::now().to_rfc3339(),
            "target_language": locale,
            "fields_translated": translated,
        }),
    );

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcomes(entries: &[(&str, FieldOutcome)]) -> FieldOutcomes {
        entries
            .iter()
            .map(|(path, outcome)| (path.to_string(), outcome.clone()))
            .collect()
    }

    #[test]
    fn test_side_table_foreign_key_name() {
        let config = FieldConfig::new(["title"]).with_primary_collection("articles");
        let fields = outcomes(&[("title", FieldOutcome::Translated(json!("Bonjour")))]);

        let record = materialize(&fields, &config, Some(&json!(42)), "fr", FailurePolicy::Mark).unwrap();

        assert_eq!(record["id"], Value::Null);
        assert_eq!(record["articles_id"], json!(42));
        assert_eq!(record["languages_code"], json!("fr"));
        assert_eq!(record["title"], json!("Bonjour"));
        assert!(!record.contains_key("_id"));
    }

    #[test]
    fn test_side_table_without_primary_collection_is_error() {
        let config = FieldConfig::new(["title"]);
        let err = materialize(&Vec::new(), &config, Some(&json!(1)), "fr", FailurePolicy::Mark).unwrap_err();
        assert!(matches!(err, TranslationError::Configuration(_)));
    }

    #[test]
    fn test_per_locale_reuses_source_id() {
        let config = FieldConfig::new(["seo.title"]).with_pattern(TranslationPattern::PerLocaleCollection);
        let fields = outcomes(&[("seo.title", FieldOutcome::Translated(json!("Titre")))]);

        let record = materialize(&fields, &config, Some(&json!("abc")), "fr", FailurePolicy::Omit).unwrap();
        assert_eq!(record["id"], json!("abc"));
        assert_eq!(record["title"], json!("Titre"));

        let missing = materialize(&fields, &config, None, "fr", FailurePolicy::Omit);
        assert!(matches!(missing, Err(TranslationError::Configuration(_))));
    }

    #[test]
    fn test_failure_policies() {
        let config = FieldConfig::new(["title", "body"]).with_pattern(TranslationPattern::PerLocaleCollection);
        let fields = outcomes(&[
            ("title", FieldOutcome::Translated(json!("Titre"))),
            (
                "body",
                FieldOutcome::Failed {
                    source: json!("Body"),
                    message: "quota".into(),
                },
            ),
        ]);

        let omitted = materialize(&fields, &config, Some(&json!(1)), "fr", FailurePolicy::Omit).unwrap();
        assert!(!omitted.contains_key("body"));
        assert!(!omitted.contains_key(FAILED_FIELDS_KEY));

        let marked = materialize(&fields, &config, Some(&json!(1)), "fr", FailurePolicy::Mark).unwrap();
        assert_eq!(marked["body"], json!("Body"));
        assert_eq!(marked[FAILED_FIELDS_KEY]["body"], json!("quota"));
    }

    #[test]
    fn test_short_name_collisions_use_full_path() {
        let config = FieldConfig::new(["title", "seo.title", "meta.id"])
            .with_pattern(TranslationPattern::PerLocaleCollection);
        let fields = outcomes(&[
            ("title", FieldOutcome::Translated(json!("B"))),
            ("seo.title", FieldOutcome::Translated(json!("A"))),
            ("meta.id", FieldOutcome::Passthrough(json!(7))),
        ]);

        let record = materialize(&fields, &config, Some(&json!(1)), "fr", FailurePolicy::Mark).unwrap();
        assert_eq!(record["title"], json!("B"));
        assert_eq!(record["seo.title"], json!("A"));
        assert_eq!(record["id"], json!(1));
        assert_eq!(record["meta.id"], json!(7));
    }

    #[test]
    fn test_custom_writes_nested_paths() {
        let config = FieldConfig::new(["seo.title", "items[1].name"]).with_pattern(TranslationPattern::Custom);
        let fields = outcomes(&[
            ("seo.title", FieldOutcome::Translated(json!("Titre"))),
            ("items[1].name", FieldOutcome::Translated(json!("Nom"))),
        ]);

        let record = materialize(&fields, &config, Some(&json!(5)), "fr", FailurePolicy::Mark).unwrap();
        assert_eq!(record["id"], json!(5));
        assert_eq!(record["seo"]["title"], json!("Titre"));
        assert_eq!(record["items"][0], Value::Null);
        assert_eq!(record["items"][1]["name"], json!("Nom"));

        let metadata = &record[METADATA_KEY];
        assert_eq!(metadata["target_language"], json!("fr"));
        assert_eq!(metadata["fields_translated"], json!(2));
        assert!(chrono::DateTime::parse_from_rfc3339(metadata["translated_at"].as_str().unwrap()).is_ok());
    }
}
