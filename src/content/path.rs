//! 字段路径解析
//!
//! 路径语法：以 `.` 分隔的标识符，每个标识符后可跟任意个 `[n]` 下标，
//! 例如 `metadata.seo.title`、`items[2].name`。根为数组时允许以下标开头
//! （`[0].title`）。
//!
//! 解析永远不修改输入；键不存在、下标越界或中间值不是容器时返回
//! [`Resolved::Absent`]，与值为 `null` 或空字符串的情况严格区分。

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::translation::error::{TranslationError, TranslationResult};

/// 路径中的单个步骤
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// 已解析的路径表达式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    raw: String,
    segments: Vec<PathSegment>,
}

/// 路径解析结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// 路径存在，值可能是 `null` 或空字符串
    Present(&'a Value),
    /// 路径不存在
    Absent,
}

impl<'a> Resolved<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Resolved::Present(value) => Some(value),
            Resolved::Absent => None,
        }
    }
}

impl PathExpr {
    /// 解析路径表达式
    pub fn parse(raw: &str) -> TranslationResult<Self> {
        if raw.is_empty() {
            return Err(TranslationError::InvalidPath("路径不能为空".to_string()));
        }

        let mut segments = Vec::new();
        for (position, part) in raw.split('.').enumerate() {
            Self::parse_segment(raw, part, position == 0, &mut segments)?;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn parse_segment(
        raw: &str,
        part: &str,
        leading: bool,
        segments: &mut Vec<PathSegment>,
    ) -> TranslationResult<()> {
        let invalid = |reason: &str| TranslationError::InvalidPath(format!("{}: {}", raw, reason));

        let (ident, mut rest) = match part.find('[') {
            Some(idx) => part.split_at(idx),
            None => (part, ""),
        };

        if ident.contains(']') {
            return Err(invalid("多余的 ']'"));
        }
        if ident.is_empty() {
            // 只有根数组允许省略标识符
            if !(leading && !rest.is_empty()) {
                return Err(invalid("空的路径段"));
            }
        } else {
            segments.push(PathSegment::Key(ident.to_string()));
        }

        while !rest.is_empty() {
            let inner = rest
                .strip_prefix('[')
                .ok_or_else(|| invalid("下标之后只能跟 '[' 或 '.'"))?;
            let close = inner.find(']').ok_or_else(|| invalid("未闭合的 '['"))?;
            let digits = &inner[..close];

            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("下标必须是非负整数"));
            }
            let index = digits
                .parse::<usize>()
                .map_err(|_| invalid("下标超出范围"))?;

            segments.push(PathSegment::Index(index));
            rest = &inner[close + 1..];
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// 最后一个标识符（去掉下标），用作物化输出中的字段名
    pub fn short_name(&self) -> &str {
        self.segments
            .iter()
            .rev()
            .find_map(|segment| match segment {
                PathSegment::Key(key) => Some(key.as_str()),
                PathSegment::Index(_) => None,
            })
            .unwrap_or(self.raw.as_str())
    }

    /// 在记录中定位值
    pub fn resolve<'a>(&self, record: &'a Value) -> Resolved<'a> {
        let mut current = record;

        for segment in &self.segments {
            let next = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key),
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
                _ => None,
            };

            match next {
                Some(value) => current = value,
                None => return Resolved::Absent,
            }
        }

        Resolved::Present(current)
    }

    /// 在记录中写入值，缺失的中间对象会被创建，数组不足时以 `null` 补齐
    pub fn set(&self, record: &mut Value, value: Value) -> TranslationResult<()> {
        let mut current = record;

        for segment in &self.segments {
            current = match segment {
                PathSegment::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    match current {
                        Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                        _ => {
                            return Err(TranslationError::InvalidPath(format!(
                                "{}: '{}' 的父级不是对象",
                                self.raw, key
                            )))
                        }
                    }
                }
                PathSegment::Index(index) => {
                    if current.is_null() {
                        *current = Value::Array(Vec::new());
                    }
                    match current {
                        Value::Array(items) => {
                            if items.len() <= *index {
                                items.resize(*index + 1, Value::Null);
                            }
                            &mut items[*index]
                        }
                        _ => {
                            return Err(TranslationError::InvalidPath(format!(
                                "{}: 下标 {} 的父级不是数组",
                                self.raw, index
                            )))
                        }
                    }
                }
            };
        }

        *current = value;
        Ok(())
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathExpr {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 按路径字符串定位值，语法错误视为不存在
pub fn resolve<'a>(record: &'a Value, path: &str) -> Resolved<'a> {
    match PathExpr::parse(path) {
        Ok(expr) => expr.resolve(record),
        Err(_) => Resolved::Absent,
    }
}

/// 按路径字符串写入值
pub fn set_value(record: &mut Value, path: &str, value: Value) -> TranslationResult<()> {
    PathExpr::parse(path)?.set(record, value)
}

/// 路径的短名称，语法错误时返回原路径
pub fn short_name(path: &str) -> String {
    match PathExpr::parse(path) {
        Ok(expr) => expr.short_name().to_string(),
        Err(_) => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "title": "Hello",
            "subtitle": null,
            "summary": "",
            "metadata": { "seo": { "title": "SEO" } },
            "items": [ { "name": "a" }, { "name": "b" }, { "name": "c" } ],
            "matrix": [[1, 2], [3, 4]]
        })
    }

    #[test]
    fn test_parse_segments() {
        let expr = PathExpr::parse("items[2].name").unwrap();
        assert_eq!(
            expr.segments(),
            &[
                PathSegment::Key("items".into()),
                PathSegment::Index(2),
                PathSegment::Key("name".into())
            ]
        );

        let nested = PathExpr::parse("matrix[1][0]").unwrap();
        assert_eq!(nested.segments().len(), 3);

        let rooted = PathExpr::parse("[0].title").unwrap();
        assert_eq!(rooted.segments()[0], PathSegment::Index(0));
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for bad in ["", "a..b", ".a", "a.", "a[", "a[x]", "a[-1]", "a[]", "a]b", "a[1]b", "a.[0]"] {
            assert!(
                matches!(PathExpr::parse(bad), Err(TranslationError::InvalidPath(_))),
                "应拒绝路径: {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_resolve_present_values() {
        let record = record();
        assert_eq!(resolve(&record, "title"), Resolved::Present(&json!("Hello")));
        assert_eq!(resolve(&record, "metadata.seo.title").value(), Some(&json!("SEO")));
        assert_eq!(resolve(&record, "items[2].name").value(), Some(&json!("c")));
        assert_eq!(resolve(&record, "matrix[1][0]").value(), Some(&json!(3)));
    }

    #[test]
    fn test_absent_differs_from_null_and_empty() {
        let record = record();
        assert_eq!(resolve(&record, "subtitle"), Resolved::Present(&Value::Null));
        assert_eq!(resolve(&record, "summary"), Resolved::Present(&json!("")));
        assert!(resolve(&record, "missing").is_absent());
        assert!(resolve(&record, "items[9].name").is_absent());
        assert!(resolve(&record, "title.length").is_absent());
        assert!(resolve(&record, "metadata[0]").is_absent());
        assert!(resolve(&record, "bad[").is_absent());
    }

    #[test]
    fn test_resolve_does_not_mutate() {
        let record = record();
        let before = record.clone();
        let _ = resolve(&record, "metadata.seo.missing.deeper");
        assert_eq!(record, before);
    }

    #[test]
    fn test_set_value_creates_intermediates() {
        let mut target = json!({ "id": 1 });
        set_value(&mut target, "metadata.seo.title", json!("标题")).unwrap();
        set_value(&mut target, "items[2].name", json!("c")).unwrap();

        assert_eq!(target["metadata"]["seo"]["title"], json!("标题"));
        assert_eq!(target["items"], json!([null, null, { "name": "c" }]));
    }

    #[test]
    fn test_set_value_rejects_scalar_parent() {
        let mut target = json!({ "title": "x" });
        let err = set_value(&mut target, "title.sub", json!(1)).unwrap_err();
        assert!(matches!(err, TranslationError::InvalidPath(_)));
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("items[2].name"), "name");
        assert_eq!(short_name("tags[0]"), "tags");
        assert_eq!(short_name("metadata.seo.title"), "title");
        assert_eq!(short_name("[0]"), "[0]");
    }
}
