//! 翻译缓存模块
//!
//! 以单元标识为键保存翻译记录，并维护在途请求标记。
//! 引擎在单线程上运行，缓存不需要加锁。

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use crate::overlay::pipeline::UnitId;

// ============================================================================
// 核心类型
// ============================================================================

/// 译文内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslatedContent {
    /// 纯文本译文
    Plain(String),
    /// 与源分段一一对应的结构化译文
    Segments(Vec<String>),
}

impl TranslatedContent {
    pub fn is_structured(&self) -> bool {
        matches!(self, TranslatedContent::Segments(_))
    }

    /// 拼接后的完整译文
    pub fn joined(&self) -> String {
        match self {
            TranslatedContent::Plain(text) => text.clone(),
            TranslatedContent::Segments(parts) => parts.concat(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            TranslatedContent::Plain(text) => text.trim().is_empty(),
            TranslatedContent::Segments(parts) => parts.iter().all(|part| part.trim().is_empty()),
        }
    }
}

/// 单个单元的翻译记录
///
/// 只有非空译文才能构造记录，失败或空结果不会留下任何记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRecord {
    pub original_text: String,
    pub content: TranslatedContent,
    pub complete: bool,
}

impl TranslationRecord {
    pub fn plain(original_text: impl Into<String>, translated: impl Into<String>) -> Option<Self> {
        Self::new(original_text.into(), TranslatedContent::Plain(translated.into()))
    }

    pub fn structured(original_text: impl Into<String>, segments: Vec<String>) -> Option<Self> {
        Self::new(original_text.into(), TranslatedContent::Segments(segments))
    }

    fn new(original_text: String, content: TranslatedContent) -> Option<Self> {
        if content.is_empty() {
            return None;
        }
        Some(Self {
            original_text,
            content,
            complete: true,
        })
    }

    pub fn is_structured(&self) -> bool {
        self.content.is_structured()
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub in_flight: usize,
    pub rejected_puts: u64,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 翻译缓存
#[derive(Debug, Default)]
pub struct TranslationCache {
    records: HashMap<UnitId, TranslationRecord>,
    in_flight: HashSet<UnitId>,
    stats: Cell<CacheStats>,
}

// ============================================================================
// 实现
// ============================================================================

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, id: UnitId) -> bool {
        self.records.contains_key(&id)
    }

    /// 获取翻译记录
    pub fn get(&self, id: UnitId) -> Option<&TranslationRecord> {
        let record = self.records.get(&id);
        let mut stats = self.stats.get();
        stats.total_requests += 1;
        if record.is_some() {
            stats.cache_hits += 1;
        } else {
            stats.cache_misses += 1;
        }
        self.stats.set(stats);
        record
    }

    /// 写入翻译记录，替换旧记录
    ///
    /// 不完整或译文为空的记录被拒绝，返回 `false`。
    pub fn put(&mut self, id: UnitId, record: TranslationRecord) -> bool {
        if !record.complete || record.content.is_empty() {
            let mut stats = self.stats.get();
            stats.rejected_puts += 1;
            self.stats.set(stats);
            tracing::debug!("拒绝写入空翻译记录: {}", id);
            return false;
        }
        self.records.insert(id, record);
        true
    }

    /// 标记单元为在途状态
    ///
    /// 单元已缓存或已在途时返回 `false`，调用方不应再发出请求。
    pub fn mark_in_flight(&mut self, id: UnitId) -> bool {
        if self.records.contains_key(&id) {
            return false;
        }
        self.in_flight.insert(id)
    }

    /// 清除在途标记，只有第一次调用返回 `true`
    pub fn clear_in_flight(&mut self, id: UnitId) -> bool {
        self.in_flight.remove(&id)
    }

    pub fn is_in_flight(&self, id: UnitId) -> bool {
        self.in_flight.contains(&id)
    }

    /// 单元是否仍需要翻译
    pub fn needs_translation(&self, id: UnitId) -> bool {
        !self.has(id) && !self.is_in_flight(id)
    }

    /// 丢弃一组单元的记录与在途标记
    pub fn forget(&mut self, ids: &HashSet<UnitId>) {
        self.records.retain(|id, _| !ids.contains(id));
        self.in_flight.retain(|id| !ids.contains(id));
    }

    /// 丢弃全部记录与在途标记
    pub fn reset(&mut self) {
        self.records.clear();
        self.in_flight.clear();
        let mut stats = self.stats.get();
        stats.reset();
        self.stats.set(stats);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// 已缓存的单元标识
    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.records.keys().copied()
    }

    pub fn get_stats(&self) -> CacheStats {
        let mut stats = self.stats.get();
        stats.total_entries = self.records.len();
        stats.in_flight = self.in_flight.len();
        stats
    }
}
