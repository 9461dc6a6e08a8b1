//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::overlay::error::{OverlayError, OverlayResult};

/// 覆盖层配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlayConfig {
    // 调度配置
    pub max_requests_per_pass: usize,
    pub max_current_requests: usize,
    pub debounce_ms: u64,
    pub lookahead_screens: f32,
    pub structured_links: bool,

    // 抽取配置
    pub block_tags: Vec<String>,
    pub reject_tags: Vec<String>,
    pub id_attribute: String,
    pub wrapper_class: String,

    // 服务配置
    pub source_lang: String,
    pub target_lang: String,
    pub api_url: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_requests_per_pass: constants::DEFAULT_MAX_REQUESTS_PER_PASS,
            max_current_requests: constants::DEFAULT_MAX_CURRENT_REQUESTS,
            debounce_ms: constants::DEFAULT_DEBOUNCE_MS,
            lookahead_screens: constants::DEFAULT_LOOKAHEAD_SCREENS,
            structured_links: true,

            block_tags: constants::BLOCK_TAGS.iter().map(|s| s.to_string()).collect(),
            reject_tags: constants::REJECT_TAGS.iter().map(|s| s.to_string()).collect(),
            id_attribute: constants::ID_ATTRIBUTE.to_string(),
            wrapper_class: constants::WRAPPER_CLASS.to_string(),

            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            target_lang: constants::DEFAULT_TARGET_LANG.to_string(),
            api_url: constants::DEFAULT_API_URL.to_string(),
        }
    }
}

impl OverlayConfig {
    /// 创建带指定语言的默认配置
    pub fn default_with_lang(target_lang: &str, api_url: Option<&str>) -> Self {
        let mut config = Self::default();
        config.target_lang = target_lang.to_string();
        if let Some(url) = api_url {
            config.api_url = url.to_string();
        }
        config
    }

    /// 验证配置
    pub fn validate(&self) -> OverlayResult<()> {
        if self.max_requests_per_pass == 0 {
            return Err(OverlayError::Config("每次调度的请求上限不能为0".to_string()));
        }

        if self.max_current_requests == 0 {
            return Err(OverlayError::Config("当前视口的请求上限不能为0".to_string()));
        }

        if self.max_current_requests > self.max_requests_per_pass {
            return Err(OverlayError::Config(format!(
                "当前视口的请求上限 ({}) 不能超过每次调度的请求上限 ({})",
                self.max_current_requests, self.max_requests_per_pass
            )));
        }

        if !(self.lookahead_screens > 0.0) {
            return Err(OverlayError::Config("预取屏数必须大于0".to_string()));
        }

        if self.block_tags.is_empty() {
            return Err(OverlayError::Config("块级元素列表不能为空".to_string()));
        }

        if self.id_attribute.trim().is_empty() || self.wrapper_class.trim().is_empty() {
            return Err(OverlayError::Config("标识属性和译文容器类名不能为空".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{scheduling, service, EnvVar};

        if let Some(max) = scheduling::MaxRequestsPerPass::get_set() {
            self.max_requests_per_pass = max;
        }

        if let Some(max) = scheduling::MaxCurrentRequests::get_set() {
            self.max_current_requests = max;
        }

        if let Some(ms) = scheduling::DebounceMs::get_set() {
            self.debounce_ms = ms;
        }

        if let Some(enabled) = scheduling::StructuredLinks::get_set() {
            self.structured_links = enabled;
        }

        if let Some(lang) = service::TargetLang::get_set() {
            self.target_lang = lang;
        }

        if let Some(url) = service::ApiUrl::get_set() {
            tracing::info!("环境变量覆盖 API URL: {}", url);
            self.api_url = url;
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: OverlayConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> OverlayResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 使用指定配置文件创建管理器
    pub fn from_path(path: &str) -> OverlayResult<Self> {
        Self::load_dotenv();
        let expanded = shellexpand::tilde(path);
        let mut config = Self::load_from_file(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &OverlayConfig {
        &self.config
    }

    /// 取出配置
    pub fn into_config(self) -> OverlayConfig {
        self.config
    }

    /// 从默认路径加载配置
    fn load_config() -> OverlayResult<OverlayConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(OverlayConfig::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &str) -> OverlayResult<OverlayConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OverlayError::Config(format!("读取配置文件失败: {}", e)))?;

        Self::parse_config(path, &content)
    }

    /// 根据扩展名解析配置内容
    pub fn parse_config(path: &str, content: &str) -> OverlayResult<OverlayConfig> {
        if path.ends_with(".toml") {
            toml::from_str(content)
                .map_err(|e| OverlayError::Config(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(content)
                .map_err(|e| OverlayError::Config(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }
}
