//! # Reader Overlay
//!
//! 面向阅读器的增量翻译覆盖层：只为当前及即将可见的段落请求翻译，
//! 按单元缓存结果，并在四种显示模式之间可逆地切换。
//!
//! ## 模块组织
//!
//! - `dom` - 基于 html5ever 的 DOM 基础操作
//! - `env` - 类型安全的环境变量
//! - `overlay` - 覆盖层引擎及其组件

pub mod dom;
pub mod env;
pub mod overlay;

// Re-export commonly used items for convenience
pub use overlay::{DisplayMode, OverlayConfig, OverlayEngine, OverlayError, OverlayResult};
