//! 翻译后端抽象
//!
//! 管道只通过 [`Translator`] 与外部翻译服务交互；选择哪个服务、如何重试
//! 都是调用方的事。每次调用都带有 [`InstructionMode`]：对孤立片段的调用
//! 必须使用 [`InstructionMode::FragmentExact`]，只允许逐字翻译。

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::translation::error::TranslationResult;

pub use mock::{MockMode, MockTranslator};

/// 翻译指令模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstructionMode {
    /// 只返回给定文本的直接译文，不得添加解释或句子
    FragmentExact,
    /// 完整句子，允许风格上的调整
    NaturalSentence,
}

impl InstructionMode {
    /// 后端应使用的提示文本
    pub fn instruction(&self, target_locale: &str) -> String {
        match self {
            InstructionMode::FragmentExact => format!(
                "Translate the following text fragment into {}. Return only the direct \
                 translation of the given text. Do not add explanations, notes or extra sentences.",
                target_locale
            ),
            InstructionMode::NaturalSentence => format!(
                "Translate the following text into {} naturally, keeping the cultural tone \
                 and intent of the original.",
                target_locale
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionMode::FragmentExact => "fragmentExact",
            InstructionMode::NaturalSentence => "naturalSentence",
        }
    }
}

/// 翻译后端
#[async_trait]
pub trait Translator: Send + Sync {
    /// 翻译单条文本
    async fn translate(
        &self,
        text: &str,
        source_locale: &str,
        target_locale: &str,
        mode: InstructionMode,
    ) -> TranslationResult<String>;

    /// 批量翻译，输出与输入一一对应
    async fn translate_batch(
        &self,
        texts: &[String],
        source_locale: &str,
        target_locale: &str,
    ) -> TranslationResult<Vec<String>>;

    /// 批量调用是否保证输出顺序；为假时管道逐条翻译
    fn preserves_batch_order(&self) -> bool {
        true
    }

    /// 用于日志的后端名称
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_natural_sentence_mentions_tone() {
        let exact = InstructionMode::FragmentExact.instruction("ar");
        let natural = InstructionMode::NaturalSentence.instruction("ar");

        assert!(exact.contains("Do not add"));
        assert!(!exact.contains("tone"));
        assert!(natural.contains("tone"));
        assert!(natural.contains("ar"));
    }
}
