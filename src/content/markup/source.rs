//! 片段源码位置
//!
//! html5ever 的树不记录源码位置，重新序列化会把属性引号、标签大小写、
//! `<br/>` 之类的写法统一改掉。这里用一次轻量的词法扫描把片段切分为
//! 标签、注释和文本，再按文档顺序与 DOM 文本节点逐个对齐。对齐成功后
//! 写回只替换文本所在的字节区间，片段其余部分逐字节保留。
//!
//! 对齐要求 DOM 与源码的文本顺序、数量和内容完全一致。解析器移动过
//! 文本（表格内容被移出表格、多余的结束标签导致文本合并等）时对齐失败，
//! 调用方退回整体序列化。

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, Node, NodeData};
use serde::{Deserialize, Serialize};

use super::dom::{fragment_to_dom, get_node_name, get_text, split_padding};

/// 内容不解码实体的元素
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript",
];

/// 内容解码实体但不识别标签的元素
const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

/// 文本在片段源码中的字节区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for SourceSpan {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text,
    /// 原始文本元素的内容
    RawText,
    StartTag(String),
    EndTag(String),
    /// 注释、文档类型声明等
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceToken {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl SourceToken {
    fn is_text(&self) -> bool {
        matches!(self.kind, TokenKind::Text | TokenKind::RawText)
    }
}

/// 把片段切分为标签、注释和文本
pub(crate) fn tokenize(markup: &str) -> Vec<SourceToken> {
    let bytes = markup.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let Some((end, kind)) = scan_markup(bytes, i) else {
            i += 1;
            continue;
        };

        push_text(&mut tokens, text_start..i, TokenKind::Text);

        let raw = match &kind {
            TokenKind::StartTag(name) if RAW_TEXT_ELEMENTS.contains(&name.as_str()) => {
                Some((name.clone(), TokenKind::RawText))
            }
            TokenKind::StartTag(name) if name == "plaintext" => {
                Some((name.clone(), TokenKind::RawText))
            }
            TokenKind::StartTag(name) if ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&name.as_str()) => {
                Some((name.clone(), TokenKind::Text))
            }
            _ => None,
        };

        tokens.push(SourceToken { kind, span: i..end });
        i = end;
        text_start = end;

        if let Some((name, text_kind)) = raw {
            let close = if name == "plaintext" {
                bytes.len()
            } else {
                find_end_tag(bytes, i, &name).unwrap_or(bytes.len())
            };
            push_text(&mut tokens, i..close, text_kind);
            i = close;
            text_start = close;
        }
    }

    push_text(&mut tokens, text_start..bytes.len(), TokenKind::Text);
    tokens
}

fn push_text(tokens: &mut Vec<SourceToken>, span: Range<usize>, kind: TokenKind) {
    if !span.is_empty() {
        tokens.push(SourceToken { kind, span });
    }
}

/// 识别 `at` 处以 `<` 开始的标记，返回终点和类型；不构成标记时返回 `None`
fn scan_markup(bytes: &[u8], at: usize) -> Option<(usize, TokenKind)> {
    let rest = &bytes[at..];

    if rest.starts_with(b"<!--") {
        if rest.starts_with(b"<!-->") {
            return Some((at + 5, TokenKind::Other));
        }
        if rest.starts_with(b"<!--->") {
            return Some((at + 6, TokenKind::Other));
        }
        let end = find(bytes, at + 4, b"-->").map_or(bytes.len(), |p| p + 3);
        return Some((end, TokenKind::Other));
    }

    if rest.starts_with(b"<!") || rest.starts_with(b"<?") {
        return Some((close_of(bytes, at + 2), TokenKind::Other));
    }

    if rest.starts_with(b"</") {
        return match rest.get(2) {
            Some(b) if b.is_ascii_alphabetic() => {
                let (end, name, closed) = scan_tag(bytes, at + 2);
                Some((end, if closed { TokenKind::EndTag(name) } else { TokenKind::Other }))
            }
            Some(b'>') => Some((at + 3, TokenKind::Other)),
            Some(_) => Some((close_of(bytes, at + 2), TokenKind::Other)),
            None => None,
        };
    }

    match rest.get(1) {
        Some(b) if b.is_ascii_alphabetic() => {
            let (end, name, closed) = scan_tag(bytes, at + 1);
            Some((end, if closed { TokenKind::StartTag(name) } else { TokenKind::Other }))
        }
        _ => None,
    }
}

/// 扫描标签名和属性，返回 (终点, 小写标签名, 是否以 `>` 结束)
fn scan_tag(bytes: &[u8], name_start: usize) -> (usize, String, bool) {
    let mut i = name_start;
    while i < bytes.len() && !is_tag_delimiter(bytes[i]) {
        i += 1;
    }
    let name = String::from_utf8_lossy(&bytes[name_start..i]).to_ascii_lowercase();

    let mut after_equals = false;
    while i < bytes.len() {
        match bytes[i] {
            b'>' => return (i + 1, name, true),
            b'=' => {
                after_equals = true;
                i += 1;
            }
            quote @ (b'"' | b'\'') if after_equals => {
                i = bytes[i + 1..]
                    .iter()
                    .position(|&b| b == quote)
                    .map_or(bytes.len(), |p| i + 1 + p + 1);
                after_equals = false;
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                after_equals = false;
                i += 1;
            }
        }
    }

    (bytes.len(), name, false)
}

fn is_tag_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>'
}

fn close_of(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'>')
        .map_or(bytes.len(), |p| from + p + 1)
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|p| from + p)
}

/// 查找原始文本元素的结束标签（不区分大小写）
fn find_end_tag(bytes: &[u8], from: usize, name: &str) -> Option<usize> {
    let mut at = from;
    while let Some(p) = find(bytes, at, b"</") {
        let name_end = p + 2 + name.len();
        let matches_name = bytes
            .get(p + 2..name_end)
            .map_or(false, |candidate| candidate.eq_ignore_ascii_case(name.as_bytes()));
        let delimited = bytes.get(name_end).map_or(true, |&b| is_tag_delimiter(b));
        if matches_name && delimited {
            return Some(p);
        }
        at = p + 2;
    }
    None
}

/// 源码文本片段解码后的内容
fn decoded(raw: &str, kind: &TokenKind) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    if *kind == TokenKind::RawText || !normalized.contains(&['&', '\0'][..]) {
        return normalized;
    }

    // 实体解码交给 html5ever，与 DOM 的结果保持一致
    let fragment = fragment_to_dom(&normalized);
    let children = fragment.root.children.borrow();
    children.iter().filter_map(get_text).collect()
}

/// 转义写回源码的文本
pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

/// 生成替换单个文本的编辑，保留源码中的首尾空白
///
/// 区间内容解码后与 `current` 不一致（位置来自另一份源码）时返回 `None`。
pub(crate) fn text_edit(
    source: &str,
    span: Range<usize>,
    current: &str,
    translated: &str,
) -> Option<(Range<usize>, String)> {
    let raw = source.get(span.clone())?;
    if decoded(raw, &TokenKind::Text).trim() != current {
        return None;
    }
    let (leading, _, trailing) = split_padding(raw);
    Some((span, format!("{}{}{}", leading, escape_text(translated), trailing)))
}

/// 在源码上执行一组互不重叠的编辑
pub(crate) fn splice(source: &str, mut edits: Vec<(Range<usize>, String)>) -> Option<String> {
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (range, text) in &edits {
        if range.start < cursor {
            return None;
        }
        out.push_str(source.get(cursor..range.start)?);
        out.push_str(text);
        cursor = range.end;
    }
    out.push_str(source.get(cursor..)?);
    Some(out)
}

/// DOM 文本节点与源码位置的对应关系
pub(crate) struct SourceMap {
    tokens: Vec<SourceToken>,
    text_tokens: HashMap<*const Node, usize>,
}

impl SourceMap {
    /// 按文档顺序对齐 DOM 文本节点与源码文本，不一致时返回 `None`
    pub(crate) fn align(source: &str, root: &Handle) -> Option<Self> {
        let tokens = tokenize(source);

        let mut texts = Vec::new();
        collect_text_nodes(root, &mut texts);

        let text_positions: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.is_text())
            .map(|(i, _)| i)
            .collect();
        if text_positions.len() != texts.len() {
            tracing::debug!(
                source_texts = text_positions.len(),
                dom_texts = texts.len(),
                "文本节点数量与源码不一致"
            );
            return None;
        }

        let mut text_tokens = HashMap::with_capacity(texts.len());
        for (handle, &position) in texts.iter().zip(&text_positions) {
            let token = &tokens[position];
            let expected = get_text(handle)?;
            let found = decoded(source.get(token.span.clone())?, &token.kind);
            // 解析器会丢弃 <pre>、<textarea> 开始标签后的第一个换行
            let same = found == expected || found.strip_prefix('\n') == Some(expected.as_str());
            if !same {
                tracing::debug!(offset = token.span.start, "文本节点内容与源码不一致");
                return None;
            }
            text_tokens.insert(Rc::as_ptr(handle), position);
        }

        Some(Self { tokens, text_tokens })
    }

    /// 文本节点的源码区间
    pub(crate) fn text_span(&self, handle: &Handle) -> Option<Range<usize>> {
        let position = *self.text_tokens.get(&Rc::as_ptr(handle))?;
        Some(self.tokens[position].span.clone())
    }

    /// 只含一个文本子节点的元素的开始标签和结束标签区间
    pub(crate) fn element_tags(&self, element: &Handle) -> Option<(Range<usize>, Range<usize>)> {
        let name = get_node_name(element)?;
        let children = element.children.borrow();
        let [text] = children.as_slice() else {
            return None;
        };
        let position = *self.text_tokens.get(&Rc::as_ptr(text))?;

        let open = self.tokens.get(position.checked_sub(1)?)?;
        let close = self.tokens.get(position + 1)?;
        match (&open.kind, &close.kind) {
            (TokenKind::StartTag(open_name), TokenKind::EndTag(close_name))
                if open_name == name && close_name == name =>
            {
                Some((open.span.clone(), close.span.clone()))
            }
            _ => None,
        }
    }
}

fn collect_text_nodes(node: &Handle, out: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { .. } => out.push(child.clone()),
            NodeData::Element {
                template_contents, ..
            } => {
                if let Some(contents) = template_contents.borrow().as_ref() {
                    collect_text_nodes(contents, out);
                }
                collect_text_nodes(child, out);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(markup: &str) -> Vec<(TokenKind, &str)> {
        tokenize(markup)
            .into_iter()
            .map(|token| (token.kind, &markup[token.span]))
            .collect()
    }

    #[test]
    fn test_tokenize_tags_and_text() {
        let tokens = kinds("<P CLASS='a>b'>Hi<br/>x &amp; y</P>");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::StartTag("p".into()), "<P CLASS='a>b'>"),
                (TokenKind::Text, "Hi"),
                (TokenKind::StartTag("br".into()), "<br/>"),
                (TokenKind::Text, "x &amp; y"),
                (TokenKind::EndTag("p".into()), "</P>"),
            ]
        );
    }

    #[test]
    fn test_tokenize_comments_and_raw_text() {
        let tokens = kinds("a<!-- <b> -->b<script>if (a<b) {}</script>c < d");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Text, "a"),
                (TokenKind::Other, "<!-- <b> -->"),
                (TokenKind::Text, "b"),
                (TokenKind::StartTag("script".into()), "<script>"),
                (TokenKind::RawText, "if (a<b) {}"),
                (TokenKind::EndTag("script".into()), "</script>"),
                (TokenKind::Text, "c < d"),
            ]
        );
    }

    #[test]
    fn test_align_maps_text_nodes() {
        let source = "<p CLASS=x>Hi &amp; there<br>next</p>";
        let fragment = fragment_to_dom(source);
        let map = SourceMap::align(source, &fragment.root).unwrap();

        let mut texts = Vec::new();
        collect_text_nodes(&fragment.root, &mut texts);
        let spans: Vec<_> = texts
            .iter()
            .map(|t| &source[map.text_span(t).unwrap()])
            .collect();
        assert_eq!(spans, vec!["Hi &amp; there", "next"]);
    }

    #[test]
    fn test_align_rejects_moved_text() {
        // 表格中的文本会被移到表格之前
        let source = "<table><tr><td>cell</td></tr>stray</table>";
        let fragment = fragment_to_dom(source);
        assert!(SourceMap::align(source, &fragment.root).is_none());
    }

    #[test]
    fn test_splice_keeps_untouched_bytes() {
        let source = "<p>a</p><p>b</p>";
        let output = splice(source, vec![(11..12, "B".into()), (3..4, "A".into())]).unwrap();
        assert_eq!(output, "<p>A</p><p>B</p>");
        assert!(splice(source, vec![(3..5, "x".into()), (4..6, "y".into())]).is_none());
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & c\u{a0}"), "a &lt; b &amp; c&nbsp;");
    }
}
