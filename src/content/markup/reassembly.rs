//! 译文写回
//!
//! 写回优先按文本节点的源码区间直接替换原字符串，片段的其余字节
//! （属性引号、标签大小写、自闭合写法、实体）保持不变。

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationResult;

use super::dom::{get_text, set_text, split_padding};
use super::extractor::{FragmentIndex, MarkupNode, StructuralPath};
use super::serializer::serialize_fragment;
use super::source::{splice, text_edit};

/// 一条写回指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    pub structural_path: StructuralPath,
    pub translated_text: String,
}

impl Replacement {
    pub fn new(structural_path: StructuralPath, translated_text: impl Into<String>) -> Self {
        Self {
            structural_path,
            translated_text: translated_text.into(),
        }
    }
}

impl FragmentIndex {
    /// 按结构地址替换文本
    ///
    /// 保留每个文本节点原有的首尾空白；所有替换都与原文相同时
    /// 原样返回输入字符串。源码位置无法对齐时退回重新序列化。
    pub fn apply(self, replacements: &[Replacement]) -> TranslationResult<String> {
        if let Some(output) = splice_replacements(&self.source, &self.nodes, replacements) {
            return Ok(output);
        }

        tracing::debug!("按源码位置写回失败，重新序列化片段");
        let mut changed = false;
        for replacement in replacements {
            changed |= self.replace_text(replacement);
        }

        if !changed {
            return Ok(self.source);
        }

        serialize_fragment(&self.fragment.root)
    }

    /// 在 DOM 中替换单个文本节点，返回内容是否发生变化
    pub(crate) fn replace_text(&self, replacement: &Replacement) -> bool {
        let Some(handle) = self.handles.get(&replacement.structural_path) else {
            tracing::warn!(
                address = %replacement.structural_path,
                "写回地址在片段中不存在，已忽略"
            );
            return false;
        };
        let Some(current) = get_text(handle) else {
            return false;
        };

        let (leading, _, trailing) = split_padding(&current);
        let updated = format!("{}{}{}", leading, replacement.translated_text.trim(), trailing);
        if updated == current {
            return false;
        }

        set_text(handle, &updated);
        true
    }
}

/// 在片段源码上按节点区间执行写回，不重新解析片段
///
/// 任一需要改动的节点缺少源码区间时返回 `None`。
pub fn splice_replacements(
    markup: &str,
    nodes: &[MarkupNode],
    replacements: &[Replacement],
) -> Option<String> {
    splice(markup, replacement_edits(markup, nodes, replacements)?)
}

/// 把写回指令转换为源码编辑
pub(crate) fn replacement_edits(
    markup: &str,
    nodes: &[MarkupNode],
    replacements: &[Replacement],
) -> Option<Vec<(Range<usize>, String)>> {
    let by_path: HashMap<&StructuralPath, &MarkupNode> =
        nodes.iter().map(|node| (&node.structural_path, node)).collect();

    let mut edits = Vec::new();
    for replacement in replacements {
        let Some(node) = by_path.get(&replacement.structural_path) else {
            tracing::warn!(
                address = %replacement.structural_path,
                "写回地址在片段中不存在，已忽略"
            );
            continue;
        };

        let translated = replacement.translated_text.trim();
        if translated == node.text {
            continue;
        }
        edits.push(text_edit(markup, node.source_span?.range(), &node.text, translated)?);
    }
    Some(edits)
}

/// 对片段字符串执行写回
pub fn reassemble(markup: &str, replacements: &[Replacement]) -> TranslationResult<String> {
    FragmentIndex::build(markup)?.apply(replacements)
}

/// 用提取阶段得到的节点写回，节点缺少源码区间时重新建立索引
pub fn reassemble_with_nodes(
    markup: &str,
    nodes: &[MarkupNode],
    replacements: &[Replacement],
) -> TranslationResult<String> {
    match splice_replacements(markup, nodes, replacements) {
        Some(output) => Ok(output),
        None => reassemble(markup, replacements),
    }
}
