//! 片段清理与结构检查
//!
//! html5ever 对任何输入都能构造出一棵树，因此"片段是否足够完整"由
//! 一次独立的标签配对扫描决定：未闭合的普通元素或多余的闭合标签都会
//! 被判定为 [`TranslationError::MarkupParse`]。

use std::sync::OnceLock;

use regex::Regex;

use crate::translation::error::{TranslationError, TranslationResult};

use super::dom::{collapse_whitespace, collect_text, fragment_to_dom, remove_elements};
use super::serializer::serialize_fragment;
use super::{OPTIONAL_END_TAGS, RAW_TEXT_TAGS, VOID_ELEMENTS};

static TAG: OnceLock<Option<Regex>> = OnceLock::new();
static COMMENT: OnceLock<Option<Regex>> = OnceLock::new();

fn tag_regex() -> TranslationResult<&'static Regex> {
    TAG.get_or_init(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9:-]*)([^>]*)>").ok())
        .as_ref()
        .ok_or_else(|| TranslationError::Internal("标签匹配表达式初始化失败".to_string()))
}

fn comment_regex() -> TranslationResult<&'static Regex> {
    COMMENT
        .get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<![^>]*>").ok())
        .as_ref()
        .ok_or_else(|| TranslationError::Internal("注释匹配表达式初始化失败".to_string()))
}

/// 检查片段的标签是否配对
pub fn check_well_formed(markup: &str) -> TranslationResult<()> {
    let stripped = comment_regex()?.replace_all(markup, "");
    let mut stack: Vec<String> = Vec::new();
    let mut raw_text_until: Option<String> = None;

    for caps in tag_regex()?.captures_iter(&stripped) {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let self_closing = caps[3].trim_end().ends_with('/');

        // 脚本和样式内部的内容不参与配对
        if let Some(raw) = &raw_text_until {
            if closing && &name == raw {
                raw_text_until = None;
                stack.pop();
            }
            continue;
        }

        if VOID_ELEMENTS.contains(&name.as_str()) {
            continue;
        }

        if !closing {
            if self_closing {
                continue;
            }
            if RAW_TEXT_TAGS.contains(&name.as_str()) {
                raw_text_until = Some(name.clone());
            }
            stack.push(name);
            continue;
        }

        let Some(position) = stack.iter().rposition(|open| *open == name) else {
            return Err(TranslationError::MarkupParse(format!("多余的闭合标签 </{}>", name)));
        };

        if let Some(unclosed) = stack[position + 1..]
            .iter()
            .find(|open| !OPTIONAL_END_TAGS.contains(&open.as_str()))
        {
            return Err(TranslationError::MarkupParse(format!(
                "</{}> 之前的 <{}> 未闭合",
                name, unclosed
            )));
        }
        stack.truncate(position);
    }

    if let Some(unclosed) = stack
        .iter()
        .find(|open| !OPTIONAL_END_TAGS.contains(&open.as_str()))
    {
        return Err(TranslationError::MarkupParse(format!("<{}> 未闭合", unclosed)));
    }

    Ok(())
}

/// 移除 `script` 与 `style` 元素
///
/// 没有需要移除的元素时原样返回输入。
pub fn sanitize(markup: &str) -> TranslationResult<(String, bool)> {
    let parsed = fragment_to_dom(markup);
    let removed = remove_elements(&parsed.root, &["script", "style"]);

    if removed == 0 {
        return Ok((markup.to_string(), false));
    }

    tracing::debug!("清理片段，移除 {} 个脚本/样式元素", removed);
    Ok((serialize_fragment(&parsed.root)?, true))
}

/// 片段的纯文本形式（去除标签，折叠空白）
pub fn plain_text(markup: &str) -> String {
    let parsed = fragment_to_dom(markup);
    let mut out = String::new();
    collect_text(&parsed.root, &mut out);
    collapse_whitespace(&out)
}
