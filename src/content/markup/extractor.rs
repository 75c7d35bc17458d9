//! 片段文本提取
//!
//! 深度优先访问片段中的文本节点，为每个非空文本生成 [`MarkupNode`]，
//! 同时建立 `StructuralPath → Handle` 的结构索引，并记录每个文本节点在
//! 源码中的字节区间（见 [`super::source`]）。写回按区间直接替换原字符串，
//! 区间不可用时复用同一索引重新序列化。

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use markup5ever_rcdom::{Handle, NodeData};
use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationResult;

use super::dom::{fragment_to_dom, get_node_attr, get_node_attrs, get_node_name, is_skipped, ParsedFragment};
use super::sanitize::check_well_formed;
use super::source::{SourceMap, SourceSpan};

/// 结构路径中的一级元素
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub tag: String,
    /// 同名兄弟元素多于一个时的序号（从1开始）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,
}

/// 文本节点的结构地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralPath {
    pub steps: Vec<PathStep>,
    /// 文本节点在父节点文本子节点中的序号
    pub text_index: usize,
}

impl fmt::Display for StructuralPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            match step.nth {
                Some(nth) => write!(f, "{}:nth-of-type({})", step.tag, nth)?,
                None => f.write_str(&step.tag)?,
            }
        }
        if !self.steps.is_empty() {
            f.write_str(" ")?;
        }
        write!(f, "#text({})", self.text_index)
    }
}

/// 提取出的文本节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupNode {
    /// 去除首尾空白后的文本
    pub text: String,
    pub structural_path: StructuralPath,
    /// 直接父元素，片段顶层文本为 `None`
    pub parent_tag: Option<String>,
    pub parent_attributes: BTreeMap<String, String>,
    /// 文本节点（含首尾空白）在片段源码中的位置，无法对齐时为 `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_span: Option<SourceSpan>,
}

/// 片段结构摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkupStructure {
    pub tags: Vec<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// 片段的结构索引
pub struct FragmentIndex {
    pub(crate) source: String,
    pub(crate) fragment: ParsedFragment,
    pub(crate) nodes: Vec<MarkupNode>,
    pub(crate) handles: HashMap<StructuralPath, Handle>,
    pub(crate) source_map: Option<SourceMap>,
}

impl FragmentIndex {
    /// 解析片段并建立索引，结构不完整的片段返回 `MarkupParse`
    pub fn build(markup: &str) -> TranslationResult<Self> {
        check_well_formed(markup)?;

        let fragment = fragment_to_dom(markup);
        let mut entries = Vec::new();
        walk(&fragment.root, &mut Vec::new(), &mut entries);

        let source_map = SourceMap::align(markup, &fragment.root);
        if source_map.is_none() {
            tracing::debug!("片段源码位置无法对齐，写回时将重新序列化");
        }

        let mut nodes = Vec::with_capacity(entries.len());
        let mut handles = HashMap::with_capacity(entries.len());
        for (mut node, handle) in entries {
            node.source_span = source_map
                .as_ref()
                .and_then(|map| map.text_span(&handle))
                .map(SourceSpan::from);
            handles.insert(node.structural_path.clone(), handle);
            nodes.push(node);
        }

        Ok(Self {
            source: markup.to_string(),
            fragment,
            nodes,
            handles,
            source_map,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[MarkupNode] {
        &self.nodes
    }

    pub fn root(&self) -> &Handle {
        &self.fragment.root
    }

    pub fn handle(&self, path: &StructuralPath) -> Option<&Handle> {
        self.handles.get(path)
    }

    /// 汇总标签、类名和属性名
    pub fn structure(&self) -> MarkupStructure {
        let mut structure = MarkupStructure::default();
        collect_structure(&self.fragment.root, &mut structure);
        structure
    }
}

fn walk(node: &Handle, steps: &mut Vec<PathStep>, out: &mut Vec<(MarkupNode, Handle)>) {
    let children = node.children.borrow();

    let mut tag_totals: HashMap<&str, usize> = HashMap::new();
    for child in children.iter() {
        if let Some(name) = get_node_name(child) {
            *tag_totals.entry(name).or_default() += 1;
        }
    }

    let mut tag_seen: HashMap<&str, usize> = HashMap::new();
    let mut text_index = 0;

    for child in children.iter() {
        match &child.data {
            NodeData::Text { contents } => {
                let index = text_index;
                text_index += 1;

                let text = contents.borrow().trim().to_string();
                if text.is_empty() {
                    continue;
                }

                let node_info = MarkupNode {
                    text,
                    structural_path: StructuralPath {
                        steps: steps.clone(),
                        text_index: index,
                    },
                    parent_tag: steps.last().map(|step| step.tag.clone()),
                    parent_attributes: get_node_attrs(node).into_iter().collect(),
                    source_span: None,
                };
                out.push((node_info, child.clone()));
            }
            NodeData::Element { .. } => {
                let Some(name) = get_node_name(child) else {
                    continue;
                };
                let seen = tag_seen.entry(name).or_default();
                *seen += 1;

                if is_skipped(child) {
                    continue;
                }

                let nth = (tag_totals.get(name).copied().unwrap_or(0) > 1).then_some(*seen);
                steps.push(PathStep {
                    tag: name.to_string(),
                    nth,
                });
                walk(child, steps, out);
                steps.pop();
            }
            _ => {}
        }
    }
}

fn collect_structure(node: &Handle, structure: &mut MarkupStructure) {
    for child in node.children.borrow().iter() {
        let Some(name) = get_node_name(child) else {
            continue;
        };

        structure.tags.push(name.to_string());

        if let Some(classes) = get_node_attr(child, "class") {
            for class in classes.split_whitespace() {
                if !structure.classes.iter().any(|c| c == class) {
                    structure.classes.push(class.to_string());
                }
            }
        }

        let names = structure.attributes.entry(name.to_string()).or_default();
        for (attr, _) in get_node_attrs(child) {
            if !names.contains(&attr) {
                names.push(attr);
            }
        }

        collect_structure(child, structure);
    }
}

/// 提取片段中的文本节点
pub fn extract_nodes(markup: &str) -> TranslationResult<Vec<MarkupNode>> {
    Ok(FragmentIndex::build(markup)?.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::error::TranslationError;

    #[test]
    fn test_extracts_text_nodes_in_order() {
        let nodes = extract_nodes("<p>Hi <strong>there</strong></p>").unwrap();
        let texts: Vec<_> = nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi", "there"]);

        assert_eq!(nodes[0].parent_tag.as_deref(), Some("p"));
        assert_eq!(nodes[1].structural_path.to_string(), "p > strong #text(0)");
    }

    #[test]
    fn test_sibling_disambiguation() {
        let nodes = extract_nodes("<p>one <em>a</em> two <em>b</em></p><div>x</div>").unwrap();
        let paths: Vec<_> = nodes.iter().map(|n| n.structural_path.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "p #text(0)",
                "p > em:nth-of-type(1) #text(0)",
                "p #text(1)",
                "p > em:nth-of-type(2) #text(0)",
                "div #text(0)",
            ]
        );
    }

    #[test]
    fn test_top_level_text_and_attributes() {
        let nodes = extract_nodes(r#"lead <a href="/x" title="t">link</a>"#).unwrap();
        assert_eq!(nodes[0].parent_tag, None);
        assert_eq!(nodes[0].structural_path.to_string(), "#text(0)");
        assert_eq!(nodes[1].parent_attributes.get("href").map(String::as_str), Some("/x"));
    }

    #[test]
    fn test_skipped_tags_are_not_extracted() {
        let nodes = extract_nodes("<p>run <code>ls -la</code></p><pre>raw</pre>").unwrap();
        let texts: Vec<_> = nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["run"]);
    }

    #[test]
    fn test_unbalanced_fragment_is_parse_error() {
        let err = extract_nodes("<p>Hello <em>World</p>").unwrap_err();
        assert!(matches!(err, TranslationError::MarkupParse(_)));
    }

    #[test]
    fn test_structure_summary() {
        let index = FragmentIndex::build(r#"<p class="a b"><em class="b" id="e">x</em></p>"#).unwrap();
        let structure = index.structure();
        assert_eq!(structure.tags, vec!["p", "em"]);
        assert_eq!(structure.classes, vec!["a", "b"]);
        assert_eq!(structure.attributes["em"], vec!["class", "id"]);
    }

    #[test]
    fn test_nodes_record_source_spans() {
        let source = "<P CLASS='x'> Hi &amp; there<br/><em>you</em></P>";
        let nodes = extract_nodes(source).unwrap();
        let raw: Vec<_> = nodes
            .iter()
            .map(|n| &source[n.source_span.unwrap().range()])
            .collect();
        assert_eq!(raw, vec![" Hi &amp; there", "you"]);
        assert_eq!(nodes[0].text, "Hi & there");
    }

    #[test]
    fn test_index_is_stable_across_rebuilds() {
        let source = "<ul><li>a</li><li>b <b>c</b></li></ul>";
        let first = FragmentIndex::build(source).unwrap();
        let second = FragmentIndex::build(source).unwrap();
        assert_eq!(first.nodes(), second.nodes());
        for node in first.nodes() {
            assert!(second.handle(&node.structural_path).is_some());
        }
    }
}
