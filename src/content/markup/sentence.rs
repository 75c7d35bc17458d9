//! 从右到左语言的整句策略
//!
//! 逐片段翻译会打乱从右到左语言的语序，并可能让翻译后端在强调元素
//! 之后追加原文没有的解释性句子。因此对这类语言按"块"处理：
//!
//! 1. 块（最近的非行内祖先）内全部文本作为一句整体翻译；
//! 2. 每个行内包裹元素的文本单独做逐字翻译；
//! 3. 在整句译文中查找包裹元素的译文并重新包裹，找不到时把包裹元素
//!    追加到句末，而不是插入句子中间。
//!
//! 结构不满足条件的块退回逐片段模式。第 3 步是启发式对齐，
//! 不保证与原文短语一一对应。

use std::ops::Range;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::translation::error::{TranslationError, TranslationResult};

use super::dom::{
    collapse_whitespace, create_text, get_node_name, get_text, is_skipped, replace_children,
    split_padding,
};
use super::extractor::{FragmentIndex, MarkupNode};
use super::reassembly::{replacement_edits, Replacement};
use super::serializer::serialize_fragment;
use super::source::{escape_text, splice, SourceMap};
use super::INLINE_WRAPPERS;

/// 块内容在源码中的位置
#[derive(Debug, Clone, PartialEq)]
struct BlockSource {
    /// 首个子节点起点到末个子节点终点
    content: Range<usize>,
    /// 各包裹元素的原始开始标签与结束标签
    wrapper_tags: Vec<(String, String)>,
}

/// 块的文本部分，不持有 DOM 句柄
#[derive(Debug, Clone, PartialEq)]
pub struct BlockText {
    sentence: String,
    leading: String,
    trailing: String,
    wrappers: Vec<String>,
    source: Option<BlockSource>,
}

impl BlockText {
    /// 块的整句文本（空白已折叠）
    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    /// 各包裹元素的文本，按文档顺序
    pub fn wrapper_texts(&self) -> Vec<&str> {
        self.wrappers.iter().map(String::as_str).collect()
    }
}

/// 按整句翻译的块
pub struct SentenceBlock {
    handle: Handle,
    wrappers: Vec<Handle>,
    covered: Vec<Handle>,
    text: BlockText,
}

impl SentenceBlock {
    pub fn sentence(&self) -> &str {
        self.text.sentence()
    }

    pub fn wrapper_texts(&self) -> Vec<&str> {
        self.text.wrapper_texts()
    }

    pub fn tag(&self) -> Option<&str> {
        get_node_name(&self.handle)
    }
}

/// 单个块的译文
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceTranslation {
    pub sentence: String,
    pub wrappers: Vec<String>,
}

/// 片段的整句翻译计划
pub struct SentencePlan {
    index: FragmentIndex,
    blocks: Vec<SentenceBlock>,
    fallback: Vec<MarkupNode>,
}

impl SentencePlan {
    /// 划分整句块与逐片段回退节点
    pub fn build(markup: &str) -> TranslationResult<Self> {
        let index = FragmentIndex::build(markup)?;

        let mut blocks = Vec::new();
        let located = index.source_map.as_ref().map(|map| (map, index.source()));
        visit(index.root(), true, located, &mut blocks);

        let fallback = index
            .nodes()
            .iter()
            .filter(|node| {
                index.handle(&node.structural_path).map_or(true, |handle| {
                    !blocks
                        .iter()
                        .any(|block| block.covered.iter().any(|c| Rc::ptr_eq(c, handle)))
                })
            })
            .cloned()
            .collect();

        Ok(Self {
            index,
            blocks,
            fallback,
        })
    }

    pub fn blocks(&self) -> &[SentenceBlock] {
        &self.blocks
    }

    /// 不满足整句条件、按逐片段翻译的文本节点
    pub fn fallback_nodes(&self) -> &[MarkupNode] {
        &self.fallback
    }

    /// 复制出不含 DOM 句柄的计划，可以跨 `.await` 持有
    pub fn outline(&self) -> SentenceOutline {
        SentenceOutline {
            source: self.index.source().to_string(),
            blocks: self.blocks.iter().map(|block| block.text.clone()).collect(),
            fallback: self.fallback.clone(),
        }
    }

    /// 写回整句译文与回退节点译文
    pub fn render(
        self,
        translations: &[SentenceTranslation],
        fallback: &[Replacement],
    ) -> TranslationResult<String> {
        let texts: Vec<&BlockText> = self.blocks.iter().map(|block| &block.text).collect();
        check_counts(&texts, translations)?;

        let spliced = splice_blocks(
            self.index.source(),
            &texts,
            &self.fallback,
            translations,
            fallback,
        );
        if let Some(output) = spliced {
            return Ok(output);
        }

        tracing::debug!("整句块无法按源码位置写回，重新序列化片段");
        let mut changed = false;
        for (block, translation) in self.blocks.iter().zip(translations) {
            rewrap(block, translation);
            changed = true;
        }

        for replacement in fallback {
            changed |= self.index.replace_text(replacement);
        }

        if !changed {
            return Ok(self.index.source);
        }
        serialize_fragment(self.index.root())
    }
}

/// 不持有 DOM 句柄的整句计划
#[derive(Debug, Clone)]
pub struct SentenceOutline {
    source: String,
    blocks: Vec<BlockText>,
    fallback: Vec<MarkupNode>,
}

impl SentenceOutline {
    pub fn blocks(&self) -> &[BlockText] {
        &self.blocks
    }

    pub fn fallback_nodes(&self) -> &[MarkupNode] {
        &self.fallback
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.fallback.is_empty()
    }

    /// 写回译文，源码位置不可用时才重新解析片段
    pub fn render(
        &self,
        translations: &[SentenceTranslation],
        fallback: &[Replacement],
    ) -> TranslationResult<String> {
        let texts: Vec<&BlockText> = self.blocks.iter().collect();
        check_counts(&texts, translations)?;

        match splice_blocks(&self.source, &texts, &self.fallback, translations, fallback) {
            Some(output) => Ok(output),
            None => SentencePlan::build(&self.source)?.render(translations, fallback),
        }
    }
}

fn check_counts(blocks: &[&BlockText], translations: &[SentenceTranslation]) -> TranslationResult<()> {
    if translations.len() != blocks.len() {
        return Err(TranslationError::Internal(format!(
            "整句译文数量不匹配: 期望 {}, 实际 {}",
            blocks.len(),
            translations.len()
        )));
    }

    for (block, translation) in blocks.iter().zip(translations) {
        if translation.wrappers.len() != block.wrappers.len() {
            return Err(TranslationError::Internal(format!(
                "包裹元素译文数量不匹配: 期望 {}, 实际 {}",
                block.wrappers.len(),
                translation.wrappers.len()
            )));
        }
    }
    Ok(())
}

/// 在源码上替换各块内容和回退节点，任一部分缺少位置时返回 `None`
fn splice_blocks(
    source: &str,
    blocks: &[&BlockText],
    fallback_nodes: &[MarkupNode],
    translations: &[SentenceTranslation],
    fallback: &[Replacement],
) -> Option<String> {
    let mut edits = Vec::with_capacity(blocks.len() + fallback.len());

    for (block, translation) in blocks.iter().zip(translations) {
        let block_source = block.source.as_ref()?;
        let mut content = String::new();
        for piece in layout(block, translation) {
            match piece {
                Piece::Text(text) => content.push_str(&escape_text(&text)),
                Piece::Wrapper(i, text) => {
                    let (open, close) = block_source.wrapper_tags.get(i)?;
                    content.push_str(open);
                    content.push_str(&escape_text(text));
                    content.push_str(close);
                }
            }
        }
        edits.push((block_source.content.clone(), content));
    }

    edits.extend(replacement_edits(source, fallback_nodes, fallback)?);
    splice(source, edits)
}

/// 源码位置映射及其对应的源码
type Located<'a> = Option<(&'a SourceMap, &'a str)>;

fn visit(node: &Handle, is_root: bool, located: Located<'_>, blocks: &mut Vec<SentenceBlock>) {
    let inline = get_node_name(node).map_or(false, |name| INLINE_WRAPPERS.contains(&name));

    if is_root || !inline {
        if let Some(block) = block_candidate(node, located) {
            blocks.push(block);
            return;
        }
    }

    for child in node.children.borrow().iter() {
        if matches!(child.data, NodeData::Element { .. }) && !is_skipped(child) {
            visit(child, false, located, blocks);
        }
    }
}

/// 子节点只有文本和纯文本行内元素时构成整句块
fn block_candidate(node: &Handle, located: Located<'_>) -> Option<SentenceBlock> {
    let mut full_text = String::new();
    let mut wrappers = Vec::new();
    let mut wrapper_texts = Vec::new();
    let mut covered = Vec::new();

    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => {
                full_text.push_str(&contents.borrow());
                covered.push(child.clone());
            }
            NodeData::Element { .. } => {
                let name = get_node_name(child)?;
                if !INLINE_WRAPPERS.contains(&name) {
                    return None;
                }

                let mut wrapper_text = String::new();
                for inner in child.children.borrow().iter() {
                    wrapper_text.push_str(&get_text(inner)?);
                    covered.push(inner.clone());
                }

                let text = collapse_whitespace(&wrapper_text);
                if text.is_empty() {
                    return None;
                }
                full_text.push_str(&wrapper_text);
                wrappers.push(child.clone());
                wrapper_texts.push(text);
            }
            _ => return None,
        }
    }

    let sentence = collapse_whitespace(&full_text);
    if sentence.is_empty() {
        return None;
    }

    let (leading, _, trailing) = split_padding(&full_text);
    let source = located.and_then(|(map, source)| block_source(node, map, source));
    Some(SentenceBlock {
        handle: node.clone(),
        wrappers,
        covered,
        text: BlockText {
            sentence,
            leading: leading.to_string(),
            trailing: trailing.to_string(),
            wrappers: wrapper_texts,
            source,
        },
    })
}

/// 块的子节点在源码中必须首尾相接
fn block_source(node: &Handle, map: &SourceMap, source: &str) -> Option<BlockSource> {
    let mut content: Option<Range<usize>> = None;
    let mut wrapper_tags = Vec::new();

    for child in node.children.borrow().iter() {
        let span = match &child.data {
            NodeData::Text { .. } => map.text_span(child)?,
            _ => {
                let (open, close) = map.element_tags(child)?;
                wrapper_tags.push((
                    source.get(open.clone())?.to_string(),
                    source.get(close.clone())?.to_string(),
                ));
                open.start..close.end
            }
        };

        content = match content {
            None => Some(span),
            Some(previous) if previous.end == span.start => Some(previous.start..span.end),
            Some(_) => return None,
        };
    }

    Some(BlockSource {
        content: content?,
        wrapper_tags,
    })
}

enum Piece<'a> {
    Text(String),
    Wrapper(usize, &'a str),
}

/// 把整句译文切分为文本段和包裹元素段
fn layout<'a>(block: &BlockText, translation: &'a SentenceTranslation) -> Vec<Piece<'a>> {
    let sentence = translation.sentence.trim();

    // (起点, 终点, 包裹元素序号)
    let mut placed: Vec<(usize, usize, usize)> = Vec::new();
    let mut unplaced: Vec<usize> = Vec::new();

    for (i, wrapper_text) in translation.wrappers.iter().enumerate() {
        let needle = wrapper_text.trim();
        let spot = if needle.is_empty() {
            None
        } else {
            sentence
                .match_indices(needle)
                .map(|(start, _)| (start, start + needle.len()))
                .find(|&(start, end)| {
                    placed
                        .iter()
                        .all(|&(used_start, used_end, _)| end <= used_start || start >= used_end)
                })
        };

        match spot {
            Some((start, end)) => placed.push((start, end, i)),
            None => {
                tracing::debug!(
                    wrapper = %block.wrappers[i],
                    "整句译文中找不到包裹元素译文，追加到句末"
                );
                unplaced.push(i);
            }
        }
    }
    placed.sort_by_key(|&(start, _, _)| start);

    let mut pieces = Vec::new();
    let mut pending = block.leading.clone();
    let mut cursor = 0;

    for &(start, end, i) in &placed {
        pending.push_str(&sentence[cursor..start]);
        flush_text(&mut pending, &mut pieces);
        pieces.push(Piece::Wrapper(i, &sentence[start..end]));
        cursor = end;
    }
    pending.push_str(&sentence[cursor..]);

    for &i in &unplaced {
        if !pending.is_empty() || !pieces.is_empty() {
            pending.push(' ');
        }
        flush_text(&mut pending, &mut pieces);
        pieces.push(Piece::Wrapper(i, translation.wrappers[i].trim()));
    }

    pending.push_str(&block.trailing);
    flush_text(&mut pending, &mut pieces);
    pieces
}

fn flush_text(pending: &mut String, pieces: &mut Vec<Piece<'_>>) {
    if !pending.is_empty() {
        pieces.push(Piece::Text(std::mem::take(pending)));
    }
}

/// 用整句译文重建块的子节点
fn rewrap(block: &SentenceBlock, translation: &SentenceTranslation) {
    let children = layout(&block.text, translation)
        .into_iter()
        .map(|piece| match piece {
            Piece::Text(text) => create_text(&text),
            Piece::Wrapper(i, text) => {
                let wrapper = &block.wrappers[i];
                replace_children(wrapper, vec![create_text(text)]);
                wrapper.clone()
            }
        })
        .collect();

    replace_children(&block.handle, children);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate_all(plan: &SentencePlan, sentence: &str, wrappers: &[&str]) -> Vec<SentenceTranslation> {
        plan.blocks()
            .iter()
            .map(|_| SentenceTranslation {
                sentence: sentence.to_string(),
                wrappers: wrappers.iter().map(|w| w.to_string()).collect(),
            })
            .collect()
    }

    #[test]
    fn test_block_detection() {
        let plan = SentencePlan::build("<p>Hello <em>World</em>.</p>").unwrap();
        assert_eq!(plan.blocks().len(), 1);
        assert_eq!(plan.blocks()[0].sentence(), "Hello World.");
        assert_eq!(plan.blocks()[0].wrapper_texts(), vec!["World"]);
        assert_eq!(plan.blocks()[0].tag(), Some("p"));
        assert!(plan.fallback_nodes().is_empty());
    }

    #[test]
    fn test_rewrap_at_matching_phrase() {
        let plan = SentencePlan::build("<p>Hello <em>World</em>.</p>").unwrap();
        let translations = translate_all(&plan, "olleH dlroW.", &["dlroW"]);
        let output = plan.render(&translations, &[]).unwrap();
        assert_eq!(output, "<p>olleH <em>dlroW</em>.</p>");
    }

    #[test]
    fn test_unmatched_wrapper_appended_at_end() {
        let plan = SentencePlan::build("<p>Hello <em>World</em>.</p>").unwrap();
        let translations = translate_all(&plan, "olleH dlroW.", &["XYZ"]);
        let output = plan.render(&translations, &[]).unwrap();
        assert_eq!(output, "<p>olleH dlroW. <em>XYZ</em></p>");
        assert_eq!(output.matches("<em>").count(), 1);
    }

    #[test]
    fn test_repeated_phrases_use_distinct_occurrences() {
        let plan = SentencePlan::build("<p><b>a</b> and <i>a</i></p>").unwrap();
        let translations = translate_all(&plan, "x and x", &["x", "x"]);
        let output = plan.render(&translations, &[]).unwrap();
        assert_eq!(output, "<p><b>x</b> and <i>x</i></p>");
    }

    #[test]
    fn test_nested_structure_falls_back() {
        let source = "<div>Intro <p>Para <em>one</em></p><em>tail <b>x</b></em></div>";
        let plan = SentencePlan::build(source).unwrap();

        let sentences: Vec<_> = plan.blocks().iter().map(|b| b.sentence().to_string()).collect();
        assert_eq!(sentences, vec!["Para one"]);

        let fallback: Vec<_> = plan.fallback_nodes().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(fallback, vec!["Intro", "tail", "x"]);
    }

    #[test]
    fn test_padding_is_preserved() {
        let plan = SentencePlan::build("<p>\n  Hello <em>World</em>.\n</p>").unwrap();
        let translations = translate_all(&plan, "olleH dlroW.", &["dlroW"]);
        let output = plan.render(&translations, &[]).unwrap();
        assert_eq!(output, "<p>\n  olleH <em>dlroW</em>.\n</p>");
    }

    #[test]
    fn test_render_keeps_source_spelling() {
        let source = "<P CLASS='lead'>Hello <EM data-x=1>World</EM> &amp; more</P><p>Tail<br/>end</p>";
        let plan = SentencePlan::build(source).unwrap();
        assert_eq!(plan.blocks().len(), 1);

        let fallback: Vec<_> = plan
            .fallback_nodes()
            .iter()
            .map(|node| Replacement::new(node.structural_path.clone(), node.text.to_uppercase()))
            .collect();
        let translations = translate_all(&plan, "World & olleH", &["World"]);
        let output = plan.render(&translations, &fallback).unwrap();
        assert_eq!(
            output,
            "<P CLASS='lead'><EM data-x=1>World</EM> &amp; olleH</P><p>TAIL<br/>END</p>"
        );
    }

    #[test]
    fn test_outline_renders_without_plan() {
        let source = "<p>Hello <em>World</em>.</p><ul><li>one</ul>";
        let outline = SentencePlan::build(source).unwrap().outline();
        assert!(!outline.is_empty());
        assert_eq!(outline.blocks().len(), 2);
        assert_eq!(outline.blocks()[0].wrapper_texts(), vec!["World"]);

        let translations = vec![
            SentenceTranslation {
                sentence: "olleH dlroW.".into(),
                wrappers: vec!["dlroW".into()],
            },
            SentenceTranslation {
                sentence: "eno".into(),
                wrappers: vec![],
            },
        ];
        let output = outline.render(&translations, &[]).unwrap();
        assert_eq!(output, "<p>olleH <em>dlroW</em>.</p><ul><li>eno</ul>");
    }

    #[test]
    fn test_outline_falls_back_when_unaligned() {
        let source = "<table><tr><td>Hi <b>you</b></td></tr>stray</table>";
        let outline = SentencePlan::build(source).unwrap().outline();
        let translations = vec![SentenceTranslation {
            sentence: "uoy iH".into(),
            wrappers: vec!["uoy".into()],
        }];
        let fallback: Vec<_> = outline
            .fallback_nodes()
            .iter()
            .map(|node| Replacement::new(node.structural_path.clone(), "STRAY"))
            .collect();

        let output = outline.render(&translations, &fallback).unwrap();
        assert!(output.contains("<td><b>uoy</b> iH</td>"));
        assert!(output.contains("STRAY"));
    }

    #[test]
    fn test_mismatched_translation_count_is_error() {
        let plan = SentencePlan::build("<p>Hello</p>").unwrap();
        assert!(plan.render(&[], &[]).is_err());
    }
}
