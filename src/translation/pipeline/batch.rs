//! 批量分组
//!
//! 单行和多行文本字段按路径顺序放入同一个批次，一次调用提交；
//! 每个条目都记录来源路径，结果按下标分发回路径。标记字段永远不入批。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::FieldKind;
use crate::translation::error::{TranslationError, TranslationResult};

/// 批次内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBucket {
    pub texts: Vec<String>,
    pub index_to_path: BTreeMap<usize, String>,
    /// 每个入批路径的字段类型
    #[serde(default)]
    pub kinds: BTreeMap<String, FieldKind>,
}

impl BatchBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个字段，返回其批内下标
    pub fn push(&mut self, path: impl Into<String>, text: impl Into<String>, kind: FieldKind) -> usize {
        let path = path.into();
        let index = self.texts.len();
        self.texts.push(text.into());
        self.kinds.insert(path.clone(), kind);
        self.index_to_path.insert(index, path);
        index
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.kinds.contains_key(path)
    }

    /// 批内路径，按下标顺序
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.index_to_path.values().map(String::as_str)
    }

    /// 路径对应的原文
    pub fn text_for(&self, path: &str) -> Option<&str> {
        self.index_to_path
            .iter()
            .find(|(_, p)| p.as_str() == path)
            .and_then(|(index, _)| self.texts.get(*index))
            .map(String::as_str)
    }

    /// 按下标把译文分发回路径
    ///
    /// 译文数量与批次不一致时整个批次视为后端失败。
    pub fn scatter(&self, translated: Vec<String>) -> TranslationResult<BTreeMap<String, String>> {
        if translated.len() != self.texts.len() {
            return Err(TranslationError::Backend(format!(
                "批量译文数量不匹配: 提交 {}, 返回 {}",
                self.texts.len(),
                translated.len()
            )));
        }

        let mut scattered = BTreeMap::new();
        for (index, text) in translated.into_iter().enumerate() {
            let path = self.index_to_path.get(&index).ok_or_else(|| {
                TranslationError::Internal(format!("批内下标 {} 没有对应路径", index))
            })?;
            scattered.insert(path.clone(), text);
        }

        Ok(scattered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_lookup() {
        let mut bucket = BatchBucket::new();
        assert_eq!(bucket.push("title", "Hello", FieldKind::ScalarText), 0);
        assert_eq!(bucket.push("body", "a\nb", FieldKind::MultilineText), 1);

        assert_eq!(bucket.len(), 2);
        assert!(bucket.contains("body"));
        assert_eq!(bucket.text_for("body"), Some("a\nb"));
        assert_eq!(bucket.paths().collect::<Vec<_>>(), vec!["title", "body"]);
    }

    #[test]
    fn test_scatter_follows_index_not_path_order() {
        let mut bucket = BatchBucket::new();
        bucket.push("z.last", "one", FieldKind::ScalarText);
        bucket.push("a.first", "two", FieldKind::ScalarText);

        let scattered = bucket.scatter(vec!["uno".into(), "dos".into()]).unwrap();
        assert_eq!(scattered["z.last"], "uno");
        assert_eq!(scattered["a.first"], "dos");
    }

    #[test]
    fn test_scatter_length_mismatch_is_backend_failure() {
        let mut bucket = BatchBucket::new();
        bucket.push("title", "Hello", FieldKind::ScalarText);
        bucket.push("subtitle", "World", FieldKind::ScalarText);

        let err = bucket.scatter(vec!["Hola".into()]).unwrap_err();
        assert!(matches!(err, TranslationError::Backend(_)));
    }

    #[test]
    fn test_serialized_shape() {
        let mut bucket = BatchBucket::new();
        bucket.push("title", "Hello", FieldKind::ScalarText);
        let json = serde_json::to_value(&bucket).unwrap();
        assert_eq!(json["texts"], serde_json::json!(["Hello"]));
        assert_eq!(json["indexToPath"]["0"], "title");

        let back: BatchBucket = serde_json::from_value(json).unwrap();
        assert_eq!(back, bucket);
    }
}
