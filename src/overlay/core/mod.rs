//! 覆盖层核心模块
//!
//! ## 模块依赖关系
//!
//! ```text
//! OverlayEngine (engine.rs)
//!     ├── BlockExtractor / UnitRegistry (pipeline/)
//!     ├── ViewportTracker (viewport/tracker.rs)
//!     ├── RequestScheduler (scheduler.rs)
//!     ├── TranslationCache (storage/cache.rs)
//!     ├── DisplayController (display.rs)
//!     └── TranslationService (service.rs)
//! ```

pub mod display;
pub mod engine;
pub mod scheduler;
pub mod service;

/// 覆盖层引擎 - 宿主的唯一入口
pub use engine::{Completion, DispatchOutcome, EngineEvent, EngineStats, OverlayEngine};

/// 显示模式与原文隐藏/恢复
pub use display::{DisplayController, DisplayMode, HideSnapshot};

/// 请求调度
pub use scheduler::{DispatchPlan, Partition, RequestScheduler, SchedulerConfig};

/// 翻译服务协作者
pub use service::{EchoService, TranslationService};

#[cfg(feature = "deeplx")]
pub use service::DeepLxService;
