//! 覆盖层引擎
//!
//! 宿主可见的全部操作都在这里：观察文档、切换模式、请求视口翻译、推送结果、
//! 清空与销毁。所有 DOM 访问和状态修改都发生在持有引擎的线程上；翻译请求作为
//! tokio 任务发出，完成结果经事件通道送回，再由 [`OverlayEngine::handle_event`]
//! 逐个应用。

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use markup5ever_rcdom::Handle;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::display::{DisplayController, DisplayMode};
use super::scheduler::{Partition, RequestScheduler, SchedulerConfig};
use super::service::TranslationService;
use crate::dom::get_node_attr;
use crate::overlay::config::{constants, OverlayConfig};
use crate::overlay::error::{OverlayError, OverlayResult};
use crate::overlay::pipeline::{
    split_segments, BlockExtractor, ExtractorConfig, StructuredRequest, UnitId, UnitRegistry,
};
use crate::overlay::storage::{CacheStats, TranslationCache, TranslationRecord};
use crate::overlay::viewport::{LayoutProvider, ScanTrigger, ViewportTracker};

// ============================================================================
// 事件
// ============================================================================

/// 送回引擎线程的事件
#[derive(Debug)]
pub enum EngineEvent {
    /// 防抖定时器到期
    ScanDue { generation: u64 },
    /// 翻译请求结束
    Completed(Completion),
}

/// 单个请求的结果
#[derive(Debug)]
pub struct Completion {
    pub id: UnitId,
    pub epoch: u64,
    pub partition: Partition,
    pub outcome: DispatchOutcome,
    /// 结构化请求失败后是否回退到了纯文本请求
    pub fell_back: bool,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Structured(Vec<String>),
    Plain(String),
    Failed(OverlayError),
}

/// 引擎统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub units_observed: usize,
    pub units_detached: usize,
    pub scans: u64,
    pub requests_current: u64,
    pub requests_lookahead: u64,
    pub completions: u64,
    pub failures: u64,
    pub structured_fallbacks: u64,
    pub stale_dropped: u64,
    pub rejected_modes: u64,
}

impl EngineStats {
    pub fn requests(&self) -> u64 {
        self.requests_current + self.requests_lookahead
    }
}

type NavigationHandler = Box<dyn FnMut(&str)>;

// ============================================================================
// 引擎
// ============================================================================

/// 增量、视口感知的翻译覆盖层
pub struct OverlayEngine {
    config: OverlayConfig,
    service: Arc<dyn TranslationService>,
    layout: Box<dyn LayoutProvider>,
    extractor: BlockExtractor,
    registry: UnitRegistry,
    cache: TranslationCache,
    tracker: ViewportTracker,
    scheduler: RequestScheduler,
    display: DisplayController,
    events_tx: UnboundedSender<EngineEvent>,
    events_rx: UnboundedReceiver<EngineEvent>,
    navigation: Option<NavigationHandler>,
    epoch: u64,
    torn_down: bool,
    stats: EngineStats,
}

impl OverlayEngine {
    /// 使用给定配置创建引擎，配置无效时返回错误
    pub fn new<L>(
        config: OverlayConfig,
        service: Arc<dyn TranslationService>,
        layout: L,
    ) -> OverlayResult<Self>
    where
        L: LayoutProvider + 'static,
    {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tracing::info!(
            "初始化翻译覆盖层: 服务={}, 每轮上限={}, 当前视口上限={}",
            service.name(),
            config.max_requests_per_pass,
            config.max_current_requests
        );

        Ok(Self {
            extractor: BlockExtractor::new(ExtractorConfig::from(&config)),
            registry: UnitRegistry::new(config.id_attribute.clone()),
            cache: TranslationCache::new(),
            tracker: ViewportTracker::new(config.lookahead_screens, config.debounce()),
            scheduler: RequestScheduler::new(SchedulerConfig::from(&config)),
            display: DisplayController::new(config.wrapper_class.clone()),
            layout: Box::new(layout),
            service,
            config,
            events_tx,
            events_rx,
            navigation: None,
            epoch: 0,
            torn_down: false,
            stats: EngineStats::default(),
        })
    }

    /// 使用默认配置创建引擎
    pub fn with_defaults<L>(service: Arc<dyn TranslationService>, layout: L) -> OverlayResult<Self>
    where
        L: LayoutProvider + 'static,
    {
        Self::new(OverlayConfig::default(), service, layout)
    }

    // ------------------------------------------------------------------------
    // 宿主操作
    // ------------------------------------------------------------------------

    /// 观察文档子树，登记新的翻译单元，返回新增单元数
    pub fn observe_document(&mut self, root: Option<&Handle>) -> usize {
        if self.torn_down {
            tracing::warn!("引擎已销毁，忽略 observe_document");
            return 0;
        }
        let Some(root) = root else {
            tracing::warn!("{}", OverlayError::MissingDocument);
            return 0;
        };

        self.registry.add_root(root);
        let candidates = self.extractor.extract(root);
        let wrapper_class = self.config.wrapper_class.clone();

        let mut added = 0;
        for node in candidates {
            if self.registry.is_registered(&node) {
                continue;
            }
            let text = self.extractor.unit_text(&node);
            let segments = split_segments(&node, &wrapper_class);
            if let Some(id) = self.registry.register(&node, text, segments) {
                self.tracker.observe(id);
                added += 1;
            }
        }

        self.stats.units_observed += added;
        tracing::info!("观察文档: 新增 {} 个单元, 共 {} 个", added, self.registry.len());

        if added > 0 {
            self.notify_scroll();
        }
        added
    }

    /// 按名称切换模式，无效名称被拒绝并保持原状态
    pub fn set_mode(&mut self, mode: &str) -> bool {
        match mode.parse::<DisplayMode>() {
            Ok(mode) => {
                self.set_display_mode(mode);
                true
            }
            Err(e) => {
                self.stats.rejected_modes += 1;
                tracing::warn!("{}", e);
                false
            }
        }
    }

    /// 切换模式
    ///
    /// 返回时所有已缓存单元都已按新模式重新渲染；从关闭状态启用时立即请求视口翻译。
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        let old = self.display.mode();
        if !self.display.set_mode(mode) {
            return;
        }
        tracing::info!("切换翻译模式: {} -> {}", old, mode);

        if mode == DisplayMode::Off {
            self.tracker.cancel_pending();
        }
        self.refresh_all();

        if old == DisplayMode::Off {
            self.request_for_viewport(true);
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.display.mode()
    }

    /// 请求为当前视口和预读窗口翻译
    ///
    /// `immediate` 用于翻页、跳转等重新定位，跳过防抖。
    pub fn request_for_viewport(&mut self, immediate: bool) {
        if self.torn_down || self.display.mode() == DisplayMode::Off {
            return;
        }

        let tx = self.events_tx.clone();
        let trigger = self.tracker.schedule(immediate, move |generation| {
            let _ = tx.send(EngineEvent::ScanDue { generation });
        });

        match trigger {
            ScanTrigger::Now => {
                self.scan();
            }
            ScanTrigger::Deferred(generation) => {
                tracing::debug!("已安排视口扫描: 代号 {}", generation);
            }
        }
    }

    /// 滚动或尺寸变化时的交叉检测，有单元进入扩展边界时安排防抖扫描
    pub fn notify_scroll(&mut self) {
        if self.torn_down || self.display.mode() == DisplayMode::Off {
            return;
        }
        self.prune_detached();
        let entries = self.tracker.intersections(&self.registry, self.layout.as_ref());
        if ViewportTracker::should_wake(&entries) {
            self.request_for_viewport(false);
        }
    }

    /// 推送某个单元的纯文本译文
    pub fn apply_result_by_id(&mut self, id: &str, text: &str) -> bool {
        if self.torn_down {
            return false;
        }
        let id = match id.parse::<UnitId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("{}", e);
                return false;
            }
        };
        let Some(unit) = self.registry.get(id) else {
            tracing::warn!("{}", OverlayError::UnknownUnit(id.to_string()));
            return false;
        };
        if self.registry.resolve(id).is_none() {
            tracing::warn!("单元 {} 的元素已不存在", id);
            return false;
        }

        // 空结果不能影响仍在途的请求
        let Some(record) = TranslationRecord::plain(unit.original_text.clone(), text) else {
            tracing::warn!("{}", OverlayError::EmptyTranslation(id.to_string()));
            self.stats.failures += 1;
            return false;
        };

        self.cache.clear_in_flight(id);
        self.cache.put(id, record);
        self.stats.completions += 1;
        self.render(id);
        true
    }

    /// 移除所有译文、恢复原文并清空缓存与注册信息，模式保持不变
    pub fn clear_all(&mut self) {
        for unit in self.registry.iter() {
            if let Some(node) = unit.node() {
                self.display.remove_translation(unit.id, &node);
            }
        }
        self.display.restore_all();

        self.tracker.cancel_pending();
        self.tracker.unobserve_all();
        self.registry.clear();
        self.cache.reset();
        self.epoch += 1;

        tracing::info!("已清空全部翻译");
    }

    /// 清空后停止工作，之后的宿主操作均被忽略
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.clear_all();
        self.navigation = None;
        self.torn_down = true;
        tracing::info!("翻译覆盖层已销毁");
    }

    /// 设置链接导航回调
    pub fn set_navigation_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + 'static,
    {
        self.navigation = Some(Box::new(handler));
    }

    /// 激活译文中的链接，交给阅读器内部导航处理
    pub fn activate_link(&mut self, anchor: &Handle) -> bool {
        if get_node_attr(anchor, constants::LINK_MARK_ATTRIBUTE).is_none() {
            return false;
        }
        let Some(href) = get_node_attr(anchor, "href") else {
            return false;
        };
        match self.navigation.as_mut() {
            Some(navigate) => {
                tracing::debug!("译文链接导航: {}", href);
                navigate(&href);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // 事件处理
    // ------------------------------------------------------------------------

    /// 处理一个事件
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ScanDue { generation } => {
                if self.tracker.take_due(generation)
                    && !self.torn_down
                    && self.display.mode() != DisplayMode::Off
                {
                    self.scan();
                }
            }
            EngineEvent::Completed(completion) => self.on_completion(completion),
        }
    }

    /// 处理所有已到达的事件，返回处理数量
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// 处理事件直到没有在途请求和待触发的扫描
    pub async fn run_until_idle(&mut self) {
        loop {
            self.drain_events();
            if self.cache.in_flight_count() == 0 && !self.tracker.has_pending() {
                break;
            }
            match self.events_rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    // ------------------------------------------------------------------------
    // 内部流程
    // ------------------------------------------------------------------------

    /// 精确扫描并发出本轮请求，返回发出的请求数
    fn scan(&mut self) -> usize {
        self.stats.scans += 1;
        self.prune_detached();
        let visible = self.tracker.collect_visible(&self.registry, self.layout.as_ref());
        let window = self.tracker.window(self.layout.as_ref());

        // 已翻译的可见单元只需要确认显示与模式一致
        for unit in &visible {
            if self.cache.has(unit.id) {
                self.refresh(unit.id);
            }
        }

        let plan = self.scheduler.plan(&visible, &window, &self.cache);
        let mut dispatched = 0;
        for (id, partition) in plan.requests {
            if self.dispatch(id, partition) {
                dispatched += 1;
            }
        }

        tracing::debug!("视口扫描: 可见 {} 个, 发出 {} 个请求", visible.len(), dispatched);
        dispatched
    }

    fn dispatch(&mut self, id: UnitId, partition: Partition) -> bool {
        let Some(unit) = self.registry.get(id) else {
            return false;
        };
        let text = unit.original_text.clone();
        let structured = if self.config.structured_links {
            unit.segments.clone().map(StructuredRequest::new)
        } else {
            None
        };

        let runtime = match RuntimeHandle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("没有可用的异步运行时，无法发出翻译请求: {}", id);
                return false;
            }
        };

        if !self.cache.mark_in_flight(id) {
            return false;
        }

        match partition {
            Partition::Current => self.stats.requests_current += 1,
            Partition::LookAhead => self.stats.requests_lookahead += 1,
        }

        let service = Arc::clone(&self.service);
        let tx = self.events_tx.clone();
        let epoch = self.epoch;
        runtime.spawn(async move {
            let request = run_request(&*service, text, structured);
            let (outcome, fell_back) = match AssertUnwindSafe(request).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    let err = OverlayError::Service(format!("{} 翻译任务异常终止", service.name()));
                    (DispatchOutcome::Failed(err), false)
                }
            };
            let _ = tx.send(EngineEvent::Completed(Completion {
                id,
                epoch,
                partition,
                outcome,
                fell_back,
            }));
        });
        true
    }

    /// 移除元素已不存在的单元，返回移除数量
    fn prune_detached(&mut self) -> usize {
        let detached: HashSet<UnitId> = self.registry.detached().into_iter().collect();
        if detached.is_empty() {
            return 0;
        }

        self.registry.remove_units(&detached);
        self.tracker.unobserve(&detached);
        self.cache.forget(&detached);
        self.display.forget(&detached);
        self.stats.units_detached += detached.len();

        tracing::debug!("移除 {} 个已脱离文档的单元", detached.len());
        detached.len()
    }

    fn on_completion(&mut self, completion: Completion) {
        let Completion {
            id,
            epoch,
            outcome,
            fell_back,
            ..
        } = completion;

        if epoch != self.epoch {
            self.stats.stale_dropped += 1;
            tracing::debug!("丢弃过期的翻译结果: {}", id);
            return;
        }
        if !self.cache.clear_in_flight(id) {
            tracing::debug!("单元 {} 没有在途请求，忽略结果", id);
            return;
        }
        if fell_back {
            self.stats.structured_fallbacks += 1;
        }

        let Some(original) = self.registry.get(id).map(|unit| unit.original_text.clone()) else {
            return;
        };

        let record = match outcome {
            DispatchOutcome::Structured(parts) => TranslationRecord::structured(original, parts),
            DispatchOutcome::Plain(text) => TranslationRecord::plain(original, text),
            DispatchOutcome::Failed(e) => {
                self.stats.failures += 1;
                tracing::warn!("单元 {} 翻译失败: {}", id, e);
                return;
            }
        };

        let Some(record) = record else {
            self.stats.failures += 1;
            tracing::warn!("{}", OverlayError::EmptyTranslation(id.to_string()));
            return;
        };

        self.cache.put(id, record);
        self.stats.completions += 1;
        self.render(id);
    }

    /// 注入最新译文并按当前模式显示
    fn render(&mut self, id: UnitId) {
        let Some(node) = self.registry.resolve(id) else {
            return;
        };
        let Some(record) = self.cache.get(id) else {
            return;
        };
        let segments = self.registry.get(id).and_then(|unit| unit.segments.as_deref());
        self.display.render_translation(id, &node, record, segments);
    }

    /// 按当前模式刷新单元，译文容器缺失时重新注入
    fn refresh(&mut self, id: UnitId) {
        let Some(node) = self.registry.resolve(id) else {
            return;
        };
        if self.display.find_wrapper(&node).is_none() {
            self.render(id);
            return;
        }
        let Some(record) = self.cache.get(id) else {
            return;
        };
        let has_links = self.registry.get(id).is_some_and(|unit| unit.has_links());
        self.display.apply_mode(id, &node, record, has_links);
    }

    fn refresh_all(&mut self) {
        let ids: Vec<UnitId> = self
            .registry
            .ids()
            .iter()
            .copied()
            .filter(|id| self.cache.has(*id))
            .collect();
        for id in ids {
            self.refresh(id);
        }
    }

    // ------------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    /// 已登记元素的标识
    pub fn unit_id_of(&self, node: &Handle) -> Option<UnitId> {
        self.registry.id_of(node)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn has_pending_scan(&self) -> bool {
        self.tracker.has_pending()
    }
}

/// 执行单个单元的翻译请求
///
/// 含链接的单元先尝试结构化请求；失败、分段数量不一致或结果全空时回退到纯文本。
async fn run_request(
    service: &dyn TranslationService,
    text: String,
    structured: Option<StructuredRequest>,
) -> (DispatchOutcome, bool) {
    let mut fell_back = false;

    if let Some(request) = structured {
        let expected = request.len();
        match service.translate_segments(request).await {
            Ok(parts) if parts.len() != expected => {
                let err = OverlayError::StructureMismatch {
                    expected,
                    actual: parts.len(),
                };
                tracing::warn!("{}，回退到纯文本请求", err);
            }
            Ok(parts) if parts.iter().all(|part| part.trim().is_empty()) => {
                tracing::debug!("结构化翻译结果为空，回退到纯文本请求");
            }
            Ok(parts) => return (DispatchOutcome::Structured(parts), false),
            Err(e) => {
                tracing::debug!("结构化翻译失败: {}，回退到纯文本请求", e);
            }
        }
        fell_back = true;
    }

    let outcome = match service.translate_text(text).await {
        Ok(translated) => DispatchOutcome::Plain(translated),
        Err(e) => DispatchOutcome::Failed(e),
    };
    (outcome, fell_back)
}
