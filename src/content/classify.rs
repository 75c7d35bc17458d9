//! 内容分类
//!
//! 按固定顺序判定字段类型：非字符串为结构化数据，含标签的字符串为标记，
//! 含换行的为多行文本，其余为单行文本。显式类型覆盖总是优先于推断。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 字段内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    #[serde(alias = "text", alias = "string", alias = "scalar_text")]
    ScalarText,
    #[serde(alias = "textarea", alias = "markdown", alias = "multiline_text")]
    MultilineText,
    #[serde(alias = "wysiwyg", alias = "html")]
    Markup,
    #[serde(alias = "json", alias = "relation")]
    Structured,
}

impl FieldKind {
    /// 可进入批量翻译的类型
    pub fn is_batchable(self) -> bool {
        matches!(self, FieldKind::ScalarText | FieldKind::MultilineText)
    }

    pub fn is_translatable(self) -> bool {
        !matches!(self, FieldKind::Structured)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::ScalarText => "scalarText",
            FieldKind::MultilineText => "multilineText",
            FieldKind::Markup => "markup",
            FieldKind::Structured => "structured",
        }
    }
}

static MARKUP_TAG: OnceLock<Option<Regex>> = OnceLock::new();

fn markup_regex() -> Option<&'static Regex> {
    MARKUP_TAG
        .get_or_init(|| Regex::new(r"<[A-Za-z!/][^>]*>").ok())
        .as_ref()
}

/// 字符串是否包含可识别的标签
pub fn is_markup(text: &str) -> bool {
    match markup_regex() {
        Some(re) => re.is_match(text),
        None => text.contains('<') && text.contains('>'),
    }
}

/// 按内容推断字段类型
pub fn classify(value: &Value) -> FieldKind {
    match value {
        Value::String(text) => classify_text(text),
        _ => FieldKind::Structured,
    }
}

fn classify_text(text: &str) -> FieldKind {
    if is_markup(text) {
        FieldKind::Markup
    } else if text.contains('\n') {
        FieldKind::MultilineText
    } else {
        FieldKind::ScalarText
    }
}

/// 应用显式类型覆盖
///
/// 文本类覆盖作用于数字或布尔值时翻译其显示字符串；
/// 作用于对象、数组或 `null` 时退化为结构化数据。
pub fn classify_with_override(path: &str, value: &Value, kind: Option<FieldKind>) -> FieldKind {
    let Some(kind) = kind else {
        return classify(value);
    };

    if kind == FieldKind::Structured {
        return kind;
    }

    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => kind,
        _ => {
            tracing::warn!(
                path = %path,
                requested = kind.as_str(),
                "类型覆盖无法作用于非标量值，按结构化数据透传"
            );
            FieldKind::Structured
        }
    }
}

/// 值的可翻译文本形式
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inference_order() {
        assert_eq!(classify(&json!("Hello")), FieldKind::ScalarText);
        assert_eq!(classify(&json!("line one\nline two")), FieldKind::MultilineText);
        assert_eq!(classify(&json!("<p>Hi\nthere</p>")), FieldKind::Markup);
        assert_eq!(classify(&json!(42)), FieldKind::Structured);
        assert_eq!(classify(&json!({"a": 1})), FieldKind::Structured);
        assert_eq!(classify(&Value::Null), FieldKind::Structured);
    }

    #[test]
    fn test_markup_detection() {
        assert!(is_markup("<br/>"));
        assert!(is_markup("text </em>"));
        assert!(is_markup("<!-- note -->"));
        assert!(!is_markup("a < b and c > d"));
        assert!(!is_markup("1 <2> 3"));
    }

    #[test]
    fn test_override_wins() {
        let value = json!("<b>not really html</b>");
        assert_eq!(
            classify_with_override("x", &value, Some(FieldKind::ScalarText)),
            FieldKind::ScalarText
        );
        assert_eq!(
            classify_with_override("x", &json!(3), Some(FieldKind::ScalarText)),
            FieldKind::ScalarText
        );
        assert_eq!(
            classify_with_override("x", &json!("plain"), Some(FieldKind::Structured)),
            FieldKind::Structured
        );
    }

    #[test]
    fn test_override_on_container_degrades() {
        assert_eq!(
            classify_with_override("x", &json!(["a"]), Some(FieldKind::Markup)),
            FieldKind::Structured
        );
    }

    #[test]
    fn test_original_type_names_deserialize() {
        let kinds: Vec<FieldKind> =
            serde_json::from_value(json!(["text", "textarea", "wysiwyg", "json", "markup"])).unwrap();
        assert_eq!(
            kinds,
            vec![
                FieldKind::ScalarText,
                FieldKind::MultilineText,
                FieldKind::Markup,
                FieldKind::Structured,
                FieldKind::Markup
            ]
        );
    }

    #[test]
    fn test_text_of_scalars() {
        assert_eq!(text_of(&json!(7)), Some("7".to_string()));
        assert_eq!(text_of(&json!(true)), Some("true".to_string()));
        assert_eq!(text_of(&json!(null)), None);
    }
}
