//! 视口追踪
//!
//! 对已观察单元做交叉检测（根边界向下扩展一屏，进入预读窗口即唤醒），
//! 唤醒后按精确几何重新扫描，输出预读窗口内的全部单元。
//! 非立即触发经过防抖，新的触发总是取消尚未到期的旧定时器。

use std::collections::HashSet;
use std::time::Duration;

use tokio::runtime::Handle as RuntimeHandle;
use tokio::task::JoinHandle;

use super::layout::{LayoutProvider, Rect, ViewportWindow};
use crate::overlay::pipeline::{UnitId, UnitRegistry};

/// 单个单元的交叉检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub id: UnitId,
    pub rect: Rect,
    pub is_intersecting: bool,
}

/// 预读窗口内的单元
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleUnit {
    pub id: UnitId,
    pub rect: Rect,
}

/// 可取消的防抖定时器
#[derive(Debug)]
pub struct DebounceHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl DebounceHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

/// 扫描请求的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// 立即扫描
    Now,
    /// 已安排防抖扫描，到期后携带该代号回调
    Deferred(u64),
}

/// 视口追踪器
#[derive(Debug)]
pub struct ViewportTracker {
    lookahead_screens: f32,
    debounce: Duration,
    observed: Vec<UnitId>,
    observed_set: HashSet<UnitId>,
    pending: Option<DebounceHandle>,
    next_generation: u64,
}

impl ViewportTracker {
    pub fn new(lookahead_screens: f32, debounce: Duration) -> Self {
        Self {
            lookahead_screens,
            debounce,
            observed: Vec::new(),
            observed_set: HashSet::new(),
            pending: None,
            next_generation: 0,
        }
    }

    pub fn observe(&mut self, id: UnitId) {
        if self.observed_set.insert(id) {
            self.observed.push(id);
        }
    }

    /// 停止观察一组单元
    pub fn unobserve(&mut self, ids: &HashSet<UnitId>) {
        self.observed.retain(|id| !ids.contains(id));
        self.observed_set.retain(|id| !ids.contains(id));
    }

    pub fn unobserve_all(&mut self) {
        self.observed.clear();
        self.observed_set.clear();
    }

    pub fn observed(&self) -> &[UnitId] {
        &self.observed
    }

    /// 交叉检测的根边界扩展量
    pub fn root_margin(&self, layout: &dyn LayoutProvider) -> f32 {
        layout.viewport_height() * self.lookahead_screens
    }

    /// 当前几何下的视口窗口
    pub fn window(&self, layout: &dyn LayoutProvider) -> ViewportWindow {
        ViewportWindow::from_screen(layout.viewport_height(), self.lookahead_screens)
    }

    /// 对全部已观察单元做交叉检测
    pub fn intersections(
        &self,
        registry: &UnitRegistry,
        layout: &dyn LayoutProvider,
    ) -> Vec<IntersectionEntry> {
        let root_bottom = layout.viewport_height() + self.root_margin(layout);
        self.observed
            .iter()
            .filter_map(|&id| {
                let node = registry.resolve(id)?;
                let rect = layout.bounding_rect(id, &node)?;
                Some(IntersectionEntry {
                    id,
                    rect,
                    is_intersecting: rect.top < root_bottom && rect.bottom > 0.0,
                })
            })
            .collect()
    }

    /// 是否有单元进入扩展后的根边界
    pub fn should_wake(entries: &[IntersectionEntry]) -> bool {
        entries.iter().any(|entry| entry.is_intersecting)
    }

    /// 安排一次扫描
    ///
    /// 任何新的触发都会取消尚未到期的防抖定时器。`immediate` 或没有可用的
    /// tokio 运行时时返回 [`ScanTrigger::Now`]，由调用方立即扫描；否则在防抖
    /// 延迟后调用 `fire(generation)`。
    pub fn schedule<F>(&mut self, immediate: bool, fire: F) -> ScanTrigger
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel_pending();

        if immediate || self.debounce.is_zero() {
            return ScanTrigger::Now;
        }

        let runtime = match RuntimeHandle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::debug!("没有可用的异步运行时，跳过防抖直接扫描");
                return ScanTrigger::Now;
            }
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let delay = self.debounce;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fire(generation);
        });

        self.pending = Some(DebounceHandle { generation, task });
        ScanTrigger::Deferred(generation)
    }

    /// 到期回调是否对应当前的防抖定时器，是则清除
    pub fn take_due(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(handle) if handle.generation() == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.cancel();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// 精确几何扫描，按观察顺序返回预读窗口内的单元
    pub fn collect_visible(
        &self,
        registry: &UnitRegistry,
        layout: &dyn LayoutProvider,
    ) -> Vec<VisibleUnit> {
        let window = self.window(layout);
        self.observed
            .iter()
            .filter_map(|&id| {
                let node = registry.resolve(id)?;
                let rect = layout.bounding_rect(id, &node)?;
                window
                    .is_candidate(&rect)
                    .then_some(VisibleUnit { id, rect })
            })
            .collect()
    }
}

impl Drop for ViewportTracker {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
