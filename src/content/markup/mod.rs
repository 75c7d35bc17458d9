//! 标记片段处理
//!
//! 提取片段中的可翻译文本节点，建立结构索引，并在翻译后按索引和
//! 源码位置写回译文。从右到左语言使用整句策略（见 [`sentence`]）。

pub mod dom;
pub mod extractor;
pub mod reassembly;
pub mod sanitize;
pub mod sentence;
pub mod serializer;
pub mod source;

pub use extractor::{
    extract_nodes, FragmentIndex, MarkupNode, MarkupStructure, PathStep, StructuralPath,
};
pub use reassembly::{reassemble, reassemble_with_nodes, splice_replacements, Replacement};
pub use sanitize::{check_well_formed, plain_text, sanitize};
pub use sentence::{BlockText, SentenceBlock, SentenceOutline, SentencePlan, SentenceTranslation};
pub use source::SourceSpan;

/// 内部文本永不提取的元素
pub const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "code", "pre"];

/// 整句策略中可以重新包裹的行内元素
pub const INLINE_WRAPPERS: &[&str] = &[
    "em", "strong", "b", "i", "u", "mark", "a", "span", "small", "sub", "sup", "s", "q", "cite",
    "abbr",
];

/// 空元素
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// 允许省略闭合标签的元素
pub const OPTIONAL_END_TAGS: &[&str] = &[
    "li", "p", "dt", "dd", "tr", "td", "th", "thead", "tbody", "tfoot", "option", "optgroup",
    "colgroup", "caption", "rb", "rt", "rp",
];

/// 内容按原始文本解析的元素
pub const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea", "title"];
