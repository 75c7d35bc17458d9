//! 确定性的模拟翻译后端
//!
//! 不访问网络，供测试和命令行演示使用。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::translation::error::{TranslationError, TranslationResult};

use super::{InstructionMode, Translator};

/// 模拟翻译模式
#[derive(Debug, Clone)]
pub enum MockMode {
    /// 追加语言后缀: "hello" → "hello_fr"
    Suffix,

    /// 预定义映射 (文本, 目标语言) → 译文，未命中时退回后缀模式
    Mappings(HashMap<(String, String), String>),

    /// 转为大写
    Upper,

    /// 模拟后端错误
    Error(String),

    /// 原样返回
    NoOp,
}

/// 模拟翻译后端
#[derive(Debug, Clone)]
pub struct MockTranslator {
    mode: MockMode,
    delay_ms: u64,
    ordered_batches: bool,
}

impl MockTranslator {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode,
            delay_ms: 0,
            ordered_batches: true,
        }
    }

    /// 每次调用前模拟网络延迟
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// 声明批量调用是否保证顺序
    pub fn with_ordered_batches(mut self, ordered: bool) -> Self {
        self.ordered_batches = ordered;
        self
    }

    /// 由 (原文, 目标语言, 译文) 列表构造映射模式
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        let map = pairs
            .into_iter()
            .map(|(text, target, translated)| ((text.into(), target.into()), translated.into()))
            .collect();
        Self::new(MockMode::Mappings(map))
    }

    async fn apply_delay(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn apply_translation(&self, text: &str, target: &str) -> TranslationResult<String> {
        match &self.mode {
            MockMode::Suffix => Ok(format!("{}_{}", text, target)),
            MockMode::Mappings(map) => Ok(map
                .get(&(text.to_string(), target.to_string()))
                .cloned()
                .unwrap_or_else(|| format!("{}_{}", text, target))),
            MockMode::Upper => Ok(text.to_uppercase()),
            MockMode::Error(msg) => Err(TranslationError::Backend(msg.clone())),
            MockMode::NoOp => Ok(text.to_string()),
        }
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_locale: &str,
        target_locale: &str,
        _mode: InstructionMode,
    ) -> TranslationResult<String> {
        self.apply_delay().await;
        self.apply_translation(text, target_locale)
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _source_locale: &str,
        target_locale: &str,
    ) -> TranslationResult<Vec<String>> {
        // 延迟按批次计算，不按条目
        self.apply_delay().await;

        texts
            .iter()
            .map(|text| self.apply_translation(text, target_locale))
            .collect()
    }

    fn preserves_batch_order(&self) -> bool {
        self.ordered_batches
    }

    fn provider_name(&self) -> &str {
        "Mock Translator"
    }
}
