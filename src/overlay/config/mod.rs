//! 覆盖层配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, OverlayConfig};

/// 配置常量
pub mod constants {
    // 调度预算
    pub const DEFAULT_MAX_REQUESTS_PER_PASS: usize = 12;
    pub const DEFAULT_MAX_CURRENT_REQUESTS: usize = 8;
    pub const DEFAULT_DEBOUNCE_MS: u64 = 120;
    pub const DEFAULT_LOOKAHEAD_SCREENS: f32 = 1.0;

    // DOM 标记
    pub const ID_ATTRIBUTE: &str = "data-overlay-id";
    pub const WRAPPER_CLASS: &str = "translated-text";
    pub const WRAPPER_MARK_ATTRIBUTE: &str = "data-translation-mark";
    pub const LINK_MARK_ATTRIBUTE: &str = "data-overlay-link";
    pub const WRAPPER_STYLE: &str = "display: block; margin-top: 0.2em";

    // 默认服务设置
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";
    pub const DEFAULT_SOURCE_LANG: &str = "auto";
    pub const DEFAULT_TARGET_LANG: &str = "zh";

    /// 作为原子翻译边界的块级元素
    pub const BLOCK_TAGS: &[&str] = &[
        "p", "li", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6", "figcaption", "dd", "dt",
    ];

    /// 永远不翻译的元素
    pub const REJECT_TAGS: &[&str] = &["pre", "code", "math", "style", "script"];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "overlay-config.toml",
        ".overlay-config.toml",
        "~/.config/reader-overlay/config.toml",
        "/etc/reader-overlay/config.toml",
    ];
}
