//! 请求调度
//!
//! 将可见单元划分为当前视口与预读两个分区，按从上到下的阅读顺序排序，
//! 并在两级预算内挑选本轮要发出的请求。

use std::collections::HashSet;

use crate::overlay::config::OverlayConfig;
use crate::overlay::pipeline::UnitId;
use crate::overlay::storage::TranslationCache;
use crate::overlay::viewport::{ViewportWindow, VisibleUnit};

/// 调度配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 每轮最多发出的新请求数
    pub max_requests_per_pass: usize,
    /// 其中来自当前视口分区的上限
    pub max_current_requests: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for SchedulerConfig {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            max_requests_per_pass: config.max_requests_per_pass,
            max_current_requests: config.max_current_requests.min(config.max_requests_per_pass),
        }
    }
}

/// 单元所在分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Current,
    LookAhead,
}

/// 本轮调度计划
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchPlan {
    /// 按发出顺序排列：先当前视口，后预读
    pub requests: Vec<(UnitId, Partition)>,
    /// 已缓存或在途而被跳过的单元数
    pub skipped: usize,
    /// 超出预算而延后的单元数
    pub deferred: usize,
}

impl DispatchPlan {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.requests.iter().map(|(id, _)| *id)
    }

    pub fn count(&self, partition: Partition) -> usize {
        self.requests.iter().filter(|(_, p)| *p == partition).count()
    }
}

/// 请求调度器
#[derive(Debug, Clone, Default)]
pub struct RequestScheduler {
    config: SchedulerConfig,
}

impl RequestScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// 计算本轮要发出的请求
    ///
    /// 纯计算，不修改缓存；调用方在发出请求前逐个标记在途。
    pub fn plan(
        &self,
        visible: &[VisibleUnit],
        window: &ViewportWindow,
        cache: &TranslationCache,
    ) -> DispatchPlan {
        let mut plan = DispatchPlan::default();
        let mut seen = HashSet::new();
        let mut current = Vec::new();
        let mut lookahead = Vec::new();

        for unit in visible {
            if !seen.insert(unit.id) {
                continue;
            }
            if !cache.needs_translation(unit.id) {
                plan.skipped += 1;
                continue;
            }
            if window.is_current(&unit.rect) {
                current.push(unit);
            } else if unit.rect.top < window.lookahead_bottom {
                lookahead.push(unit);
            }
        }

        // 稳定排序，顶部相同时保持文档顺序
        current.sort_by(|a, b| a.rect.top.total_cmp(&b.rect.top));
        lookahead.sort_by(|a, b| a.rect.top.total_cmp(&b.rect.top));

        let total = self.config.max_requests_per_pass;
        let current_cap = self.config.max_current_requests.min(total);
        let take_current = current.len().min(current_cap);
        let take_lookahead = lookahead.len().min(total - take_current);

        plan.requests.extend(
            current
                .iter()
                .take(take_current)
                .map(|unit| (unit.id, Partition::Current)),
        );
        plan.requests.extend(
            lookahead
                .iter()
                .take(take_lookahead)
                .map(|unit| (unit.id, Partition::LookAhead)),
        );
        plan.deferred = current.len() + lookahead.len() - plan.requests.len();

        tracing::debug!(
            "调度计划: 当前 {} 个, 预读 {} 个, 跳过 {} 个, 延后 {} 个",
            take_current,
            take_lookahead,
            plan.skipped,
            plan.deferred
        );
        plan
    }
}
