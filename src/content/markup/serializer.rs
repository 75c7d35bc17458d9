use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use markup5ever_rcdom::{Handle, SerializableHandle};

use crate::translation::error::{TranslationError, TranslationResult};

/// 序列化片段根节点的全部子节点
pub fn serialize_fragment(root: &Handle) -> TranslationResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = root.clone().into();

    serialize(
        &mut buf,
        &serializable,
        SerializeOpts {
            traversal_scope: TraversalScope::ChildrenOnly(None),
            ..Default::default()
        },
    )
    .map_err(|e| TranslationError::Serialization(format!("无法将DOM序列化到缓冲区: {}", e)))?;

    String::from_utf8(buf)
        .map_err(|e| TranslationError::Serialization(format!("序列化结果不是有效的UTF-8: {}", e)))
}
