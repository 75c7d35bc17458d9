use std::cell::RefCell;
use std::rc::Rc;

use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{local_name, namespace_url, ns, parse_fragment, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::SKIPPED_TAGS;

/// 解析后的标记片段
///
/// `root` 是解析器生成的 `<html>` 元素，其子节点即片段本身。
pub struct ParsedFragment {
    pub dom: RcDom,
    pub root: Handle,
}

/// 以 `<body>` 为上下文解析标记片段
pub fn fragment_to_dom(markup: &str) -> ParsedFragment {
    let dom = parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, ns!(html), local_name!("body")),
        vec![],
    )
    .one(markup);

    let root = dom
        .document
        .children
        .borrow()
        .iter()
        .find(|child| matches!(child.data, NodeData::Element { .. }))
        .cloned()
        .unwrap_or_else(|| dom.document.clone());

    ParsedFragment { dom, root }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 按文档顺序列出元素属性
pub fn get_node_attrs(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn is_skipped(node: &Handle) -> bool {
    get_node_name(node).map_or(false, |name| SKIPPED_TAGS.contains(&name))
}

/// 文本节点内容
pub fn get_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 替换文本节点内容
pub fn set_text(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        let mut contents = contents.borrow_mut();
        contents.clear();
        contents.push_slice(text);
    }
}

/// 创建游离的文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 用新的子节点列表替换原有子节点
pub fn replace_children(parent: &Handle, children: Vec<Handle>) {
    for child in &children {
        child.parent.set(Some(Rc::downgrade(parent)));
    }
    *parent.children.borrow_mut() = children;
}

/// 删除指定名称的元素（连同其子树），返回删除数量
pub fn remove_elements(node: &Handle, names: &[&str]) -> usize {
    let mut removed = 0;

    node.children.borrow_mut().retain(|child| {
        let drop = get_node_name(child).map_or(false, |name| names.contains(&name));
        if drop {
            removed += 1;
        }
        !drop
    });

    for child in node.children.borrow().iter() {
        removed += remove_elements(child, names);
    }

    removed
}

/// 收集节点下的可见文本（跳过脚本、代码等元素）
pub fn collect_text(node: &Handle, out: &mut String) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } if !is_skipped(child) => collect_text(child, out),
            _ => {}
        }
    }
}

/// 将连续空白折叠为单个空格并去除首尾空白
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 拆分首尾空白，返回 (前导空白, 主体, 尾随空白)
pub fn split_padding(text: &str) -> (&str, &str, &str) {
    let body_start = text.len() - text.trim_start().len();
    let body_end = text.trim_end().len().max(body_start);
    (&text[..body_start], &text[body_start..body_end], &text[body_end..])
}
