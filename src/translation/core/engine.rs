//! 单条记录的翻译引擎
//!
//! 接收一份 [`ExtractionResult`]，把批次、普通文本字段和标记字段的
//! 后端调用并发发出，全部返回后得到按路径排列的 [`FieldOutcomes`]。
//!
//! ## 调用方式
//! - 批次：一次 `translate_batch`；后端不保证顺序时逐条 `translate`
//! - 普通文本：`NaturalSentence`
//! - 标记片段：每个文本节点一次 `FragmentExact`
//! - 整句策略：整块文本 `NaturalSentence`，包裹元素文本 `FragmentExact`
//!
//! 单个字段内任一调用失败即视为该字段失败，其他字段不受影响。
//! 在途调用数由信号量限制。引擎不做重试。

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::content::classify::text_of;
use crate::content::markup::{
    extract_nodes, plain_text, reassemble_with_nodes, MarkupNode, Replacement, SentencePlan,
    SentenceTranslation,
};
use crate::content::FieldKind;
use crate::translation::backend::{InstructionMode, Translator};
use crate::translation::config::FieldConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{
    BatchBucket, ExtractedField, ExtractionResult, FieldOutcome, FieldOutcomes,
};

/// 引擎统计，使用原子计数器
#[derive(Debug, Default)]
pub struct EngineStats {
    pub calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub failed_calls: AtomicUsize,
    pub characters_sent: AtomicUsize,
    pub characters_received: AtomicUsize,
}

impl EngineStats {
    fn record_call(&self, sent: usize, received: Option<usize>) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.characters_sent.fetch_add(sent, Ordering::Relaxed);
        match received {
            Some(received) => {
                self.characters_received.fetch_add(received, Ordering::Relaxed);
            }
            None => {
                self.failed_calls.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// 当前统计快照
    pub fn report(&self, elapsed_ms: u64) -> EngineReport {
        EngineReport {
            calls: self.calls.load(Ordering::Relaxed),
            batch_calls: self.batch_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            characters_sent: self.characters_sent.load(Ordering::Relaxed),
            characters_received: self.characters_received.load(Ordering::Relaxed),
            elapsed_ms,
        }
    }
}

/// 一次记录翻译的统计报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReport {
    pub calls: usize,
    pub batch_calls: usize,
    pub failed_calls: usize,
    pub characters_sent: usize,
    pub characters_received: usize,
    pub elapsed_ms: u64,
}

/// 翻译引擎
pub struct TranslationEngine<'a> {
    translator: &'a dyn Translator,
    semaphore: Semaphore,
    source_locale: String,
    target_locale: String,
    sentence_level: bool,
    stats: EngineStats,
}

impl<'a> TranslationEngine<'a> {
    pub fn new(
        translator: &'a dyn Translator,
        source_locale: impl Into<String>,
        target_locale: impl Into<String>,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            translator,
            semaphore: Semaphore::new(max_concurrent_calls.max(1)),
            source_locale: source_locale.into(),
            target_locale: target_locale.into(),
            sentence_level: false,
            stats: EngineStats::default(),
        }
    }

    /// 标记字段使用整句策略
    pub fn with_sentence_level(mut self, enabled: bool) -> Self {
        self.sentence_level = enabled;
        self
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// 翻译提取结果中的全部字段，结果按提取顺序排列
    pub async fn translate(&self, extraction: &ExtractionResult, config: &FieldConfig) -> FieldOutcomes {
        let started = Instant::now();
        let mut tasks: Vec<BoxFuture<'_, Vec<(String, FieldOutcome)>>> = Vec::new();

        if let Some(bucket) = &extraction.batch {
            tasks.push(self.translate_bucket(bucket).boxed());
        }

        for (path, field) in &extraction.fields {
            tasks.push(
                async move { vec![(path.clone(), self.translate_field(path, field, config).await)] }.boxed(),
            );
        }

        tracing::debug!(
            provider = self.translator.provider_name(),
            locale = %self.target_locale,
            tasks = tasks.len(),
            sentence_level = self.sentence_level,
            "开始翻译记录字段"
        );

        let mut produced: Vec<(String, FieldOutcome)> = join_all(tasks).await.into_iter().flatten().collect();

        // 按提取顺序输出
        let mut outcomes = FieldOutcomes::with_capacity(produced.len());
        for path in &extraction.order {
            if let Some(position) = produced.iter().position(|(p, _)| p == path) {
                outcomes.push(produced.swap_remove(position));
            }
        }
        outcomes.extend(produced);

        let report = self.stats.report(started.elapsed().as_millis() as u64);
        tracing::info!(
            locale = %self.target_locale,
            fields = outcomes.len(),
            calls = report.calls,
            failed_calls = report.failed_calls,
            "记录字段翻译完成"
        );
        outcomes
    }

    // ------------------------------------------------------------------
    // 后端调用
    // ------------------------------------------------------------------

    async fn call(&self, text: &str, mode: InstructionMode) -> TranslationResult<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| TranslationError::Internal(format!("获取并发许可失败: {}", e)))?;

        let result = self
            .translator
            .translate(text, &self.source_locale, &self.target_locale, mode)
            .await;
        self.stats.record_call(
            text.chars().count(),
            result.as_ref().ok().map(|t| t.chars().count()),
        );
        result
    }

    async fn call_batch(&self, texts: &[String]) -> TranslationResult<Vec<String>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| TranslationError::Internal(format!("获取并发许可失败: {}", e)))?;

        self.stats.batch_calls.fetch_add(1, Ordering::Relaxed);
        let result = self
            .translator
            .translate_batch(texts, &self.source_locale, &self.target_locale)
            .await;
        self.stats.record_call(
            texts.iter().map(|t| t.chars().count()).sum(),
            result
                .as_ref()
                .ok()
                .map(|out| out.iter().map(|t| t.chars().count()).sum()),
        );
        result
    }

    /// 并发翻译多条文本，任一失败即整体失败
    async fn call_all(&self, items: Vec<(String, InstructionMode)>) -> TranslationResult<Vec<String>> {
        join_all(items.iter().map(|(text, mode)| self.call(text, *mode)))
            .await
            .into_iter()
            .collect()
    }

    // ------------------------------------------------------------------
    // 批次
    // ------------------------------------------------------------------

    async fn translate_bucket(&self, bucket: &BatchBucket) -> Vec<(String, FieldOutcome)> {
        if !self.translator.preserves_batch_order() {
            tracing::debug!(
                provider = self.translator.provider_name(),
                entries = bucket.len(),
                "后端不保证批量顺序，改为逐条翻译"
            );
            let calls = bucket.index_to_path.iter().map(|(index, path)| async move {
                let source = bucket.texts.get(*index).cloned().unwrap_or_default();
                let outcome = match self.call(&source, InstructionMode::NaturalSentence).await {
                    Ok(translated) => FieldOutcome::Translated(Value::String(translated)),
                    Err(e) => failed(path, Value::String(source), &e),
                };
                (path.clone(), outcome)
            });
            return join_all(calls).await;
        }

        match self.call_batch(&bucket.texts).await.and_then(|out| bucket.scatter(out)) {
            Ok(scattered) => scattered
                .into_iter()
                .map(|(path, text)| (path, FieldOutcome::Translated(Value::String(text))))
                .collect(),
            Err(e) => {
                tracing::warn!(entries = bucket.len(), "批量翻译失败，批内字段全部标记失败: {}", e);
                bucket
                    .index_to_path
                    .iter()
                    .map(|(index, path)| {
                        let source = bucket.texts.get(*index).cloned().unwrap_or_default();
                        (path.clone(), failed(path, Value::String(source), &e))
                    })
                    .collect()
            }
        }
    }

    // ------------------------------------------------------------------
    // 直接字段
    // ------------------------------------------------------------------

    async fn translate_field(&self, path: &str, field: &ExtractedField, config: &FieldConfig) -> FieldOutcome {
        match field.kind {
            FieldKind::Structured => FieldOutcome::Passthrough(field.value.clone()),
            FieldKind::ScalarText | FieldKind::MultilineText => {
                let text = text_of(&field.value).unwrap_or_default();
                if text.trim().is_empty() {
                    return FieldOutcome::Passthrough(field.value.clone());
                }
                match self.call(&text, InstructionMode::NaturalSentence).await {
                    Ok(translated) => FieldOutcome::Translated(Value::String(translated)),
                    Err(e) => failed(path, field.value.clone(), &e),
                }
            }
            FieldKind::Markup => {
                if let Some(reason) = &field.metadata.parse_error {
                    tracing::debug!(path = %path, reason = %reason, "标记字段原样透传");
                    return FieldOutcome::Passthrough(field.value.clone());
                }

                let markup = text_of(&field.value).unwrap_or_default();
                let result = if !config.preserve_markup_structure {
                    self.translate_plain(&markup).await
                } else if self.sentence_level {
                    self.translate_sentences(&markup).await
                } else {
                    self.translate_fragments(&markup, &field.metadata.nodes).await
                };

                match result {
                    Ok(Some(translated)) => FieldOutcome::Translated(Value::String(translated)),
                    Ok(None) => FieldOutcome::Passthrough(field.value.clone()),
                    Err(e) => failed(path, field.value.clone(), &e),
                }
            }
        }
    }

    /// 去掉标签后整体翻译
    async fn translate_plain(&self, markup: &str) -> TranslationResult<Option<String>> {
        let text = plain_text(markup);
        if text.is_empty() {
            return Ok(None);
        }
        self.call(&text, InstructionMode::NaturalSentence).await.map(Some)
    }

    /// 逐片段翻译
    ///
    /// 直接使用提取阶段记录的节点及其源码位置，只有节点缺失时才重新解析。
    async fn translate_fragments(
        &self,
        markup: &str,
        extracted: &[MarkupNode],
    ) -> TranslationResult<Option<String>> {
        let nodes = if extracted.is_empty() {
            Cow::Owned(extract_nodes(markup)?)
        } else {
            Cow::Borrowed(extracted)
        };
        if nodes.is_empty() {
            return Ok(None);
        }

        let translated = self
            .call_all(
                nodes
                    .iter()
                    .map(|node| (node.text.clone(), InstructionMode::FragmentExact))
                    .collect(),
            )
            .await?;

        let replacements = replacements_for(&nodes, translated);
        reassemble_with_nodes(markup, &nodes, &replacements).map(Some)
    }

    /// 整句策略
    async fn translate_sentences(&self, markup: &str) -> TranslationResult<Option<String>> {
        let outline = SentencePlan::build(markup)?.outline();
        if outline.is_empty() {
            return Ok(None);
        }

        let mut calls = Vec::new();
        for block in outline.blocks() {
            calls.push((block.sentence().to_string(), InstructionMode::NaturalSentence));
            calls.extend(
                block
                    .wrapper_texts()
                    .into_iter()
                    .map(|w| (w.to_string(), InstructionMode::FragmentExact)),
            );
        }
        calls.extend(
            outline
                .fallback_nodes()
                .iter()
                .map(|node| (node.text.clone(), InstructionMode::FragmentExact)),
        );

        let mut translated = self.call_all(calls).await?.into_iter();

        let mut translations = Vec::with_capacity(outline.blocks().len());
        for block in outline.blocks() {
            let sentence = translated.next().unwrap_or_default();
            let wrappers = translated.by_ref().take(block.wrapper_texts().len()).collect();
            translations.push(SentenceTranslation { sentence, wrappers });
        }
        let replacements = replacements_for(outline.fallback_nodes(), translated.collect());

        outline.render(&translations, &replacements).map(Some)
    }
}

fn replacements_for(nodes: &[MarkupNode], translated: Vec<String>) -> Vec<Replacement> {
    nodes
        .iter()
        .zip(translated)
        .map(|(node, text)| Replacement::new(node.structural_path.clone(), text))
        .collect()
}

fn failed(path: &str, source: Value, error: &TranslationError) -> FieldOutcome {
    tracing::warn!(path = %path, "字段翻译失败: {}", error);
    FieldOutcome::Failed {
        source,
        message: error.to_string(),
    }
}
