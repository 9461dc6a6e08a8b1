//! 翻译覆盖层
//!
//! 为长文档提供增量的、视口感知的翻译显示：
//! - **pipeline**: 块级单元抽取、富文本分段与稳定标识
//! - **viewport**: 几何查询与可见性追踪
//! - **storage**: 翻译记录缓存与在途标记
//! - **core**: 请求调度、显示控制、翻译服务与引擎
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use reader_overlay::dom::parse_html;
//! use reader_overlay::overlay::{EchoService, OverlayEngine, StaticLayout};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dom = parse_html("<p>The cat sat.</p>");
//! let layout = Rc::new(StaticLayout::new(800.0));
//! let mut engine = OverlayEngine::with_defaults(Arc::new(EchoService), layout.clone())?;
//!
//! engine.observe_document(Some(&dom.document));
//! layout.flow(engine.registry(), 24.0, 60);
//! engine.set_mode("bilingual");
//! engine.run_until_idle().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块
pub mod config;

/// 核心模块 - 引擎、调度、显示与翻译服务
pub mod core;

/// 错误处理模块
pub mod error;

/// 单元发现流水线
pub mod pipeline;

/// 翻译记录存储
pub mod storage;

/// 视口几何与可见性追踪
pub mod viewport;

// ============================================================================
// 公共API导出
// ============================================================================

pub use config::{ConfigManager, OverlayConfig};
pub use self::core::{
    DisplayController, DisplayMode, EchoService, EngineEvent, EngineStats, OverlayEngine,
    Partition, RequestScheduler, TranslationService,
};
#[cfg(feature = "deeplx")]
pub use self::core::DeepLxService;
pub use error::{ErrorSeverity, OverlayError, OverlayResult};
pub use pipeline::{BlockExtractor, Segment, StructuredRequest, TranslatableUnit, UnitId, UnitRegistry};
pub use storage::{CacheStats, TranslatedContent, TranslationCache, TranslationRecord};
pub use viewport::{LayoutProvider, Rect, StaticLayout, ViewportTracker, ViewportWindow};
