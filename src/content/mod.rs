//! 内容记录处理：路径定位、类型判定与标记片段处理

pub mod classify;
pub mod markup;
pub mod path;

pub use classify::{classify, classify_with_override, is_markup, FieldKind};
pub use path::{resolve, set_value, short_name, PathExpr, PathSegment, Resolved};
