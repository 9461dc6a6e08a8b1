//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，用于覆盖文件配置中的调度与服务参数

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 仅在变量被显式设置时返回值，解析失败同样视为未设置
    fn get_set() -> Option<T> {
        env::var(Self::NAME).ok().and_then(|value| Self::parse(&value).ok())
    }
}

/// 日志相关环境变量
pub mod logging {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "OVERLAY_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 调度相关环境变量
pub mod scheduling {
    use super::*;

    /// 每次调度最多发出的请求数
    pub struct MaxRequestsPerPass;
    impl EnvVar<usize> for MaxRequestsPerPass {
        const NAME: &'static str = "OVERLAY_MAX_REQUESTS_PER_PASS";
        const DEFAULT: Option<usize> = Some(12);
        const DESCRIPTION: &'static str = "Maximum new translation requests per scheduling pass";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 256)
        }
    }

    /// 当前视口分区的请求上限
    pub struct MaxCurrentRequests;
    impl EnvVar<usize> for MaxCurrentRequests {
        const NAME: &'static str = "OVERLAY_MAX_CURRENT_REQUESTS";
        const DEFAULT: Option<usize> = Some(8);
        const DESCRIPTION: &'static str =
            "Maximum requests taken from the current viewport before look-ahead units fill the pass";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 256)
        }
    }

    /// 滚动防抖延迟（毫秒）
    pub struct DebounceMs;
    impl EnvVar<u64> for DebounceMs {
        const NAME: &'static str = "OVERLAY_DEBOUNCE_MS";
        const DEFAULT: Option<u64> = Some(120);
        const DESCRIPTION: &'static str = "Debounce delay for scroll-driven viewport scans";

        fn parse(value: &str) -> EnvResult<u64> {
            let ms: u64 = value.trim().parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid number of milliseconds".to_string(),
            })?;
            if ms > 5_000 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Value {} exceeds maximum 5000", ms),
                });
            }
            Ok(ms)
        }
    }

    /// 含链接单元是否请求结构化翻译
    pub struct StructuredLinks;
    impl EnvVar<bool> for StructuredLinks {
        const NAME: &'static str = "OVERLAY_STRUCTURED_LINKS";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Request structured (per-segment) translation for units with links";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 翻译服务相关环境变量
pub mod service {
    use super::*;

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "OVERLAY_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language for translation (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            let lang = value.trim().to_lowercase();
            if lang.len() < 2 || !lang.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Language code must look like 'zh' or 'pt-br'".to_string(),
                });
            }
            Ok(lang)
        }
    }

    /// 翻译 API 地址
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "OVERLAY_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "DeepLX-compatible translation endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "URL must start with http:// or https://".to_string(),
                })
            }
        }
    }
}

fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    docs.push_str("## Logging\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        logging::LogLevel::NAME,
        logging::LogLevel::DESCRIPTION,
        logging::LogLevel::DEFAULT
    ));

    docs.push_str("\n## Scheduling\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        scheduling::MaxRequestsPerPass::NAME,
        scheduling::MaxRequestsPerPass::DESCRIPTION,
        scheduling::MaxRequestsPerPass::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        scheduling::MaxCurrentRequests::NAME,
        scheduling::MaxCurrentRequests::DESCRIPTION,
        scheduling::MaxCurrentRequests::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        scheduling::DebounceMs::NAME,
        scheduling::DebounceMs::DESCRIPTION,
        scheduling::DebounceMs::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        scheduling::StructuredLinks::NAME,
        scheduling::StructuredLinks::DESCRIPTION,
        scheduling::StructuredLinks::DEFAULT
    ));

    docs.push_str("\n## Translation Service\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        service::TargetLang::NAME,
        service::TargetLang::DESCRIPTION,
        service::TargetLang::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        service::ApiUrl::NAME,
        service::ApiUrl::DESCRIPTION,
        service::ApiUrl::DEFAULT
    ));

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        assert!(scheduling::StructuredLinks::parse("true").unwrap());
        assert!(scheduling::StructuredLinks::parse("ON").unwrap());
        assert!(!scheduling::StructuredLinks::parse("0").unwrap());
        assert!(!scheduling::StructuredLinks::parse("disabled").unwrap());
        assert!(scheduling::StructuredLinks::parse("maybe").is_err());
    }

    #[test]
    fn test_budget_range_validation() {
        assert_eq!(scheduling::MaxRequestsPerPass::parse("12").unwrap(), 12);
        assert!(scheduling::MaxRequestsPerPass::parse("0").is_err());
        assert!(scheduling::MaxRequestsPerPass::parse("1000").is_err());
        assert!(scheduling::MaxCurrentRequests::parse("-1").is_err());
    }

    #[test]
    fn test_debounce_parsing() {
        assert_eq!(scheduling::DebounceMs::parse("100").unwrap(), 100);
        assert!(scheduling::DebounceMs::parse("9999").is_err());
        assert!(scheduling::DebounceMs::parse("soon").is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(logging::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(logging::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(service::ApiUrl::parse("http://localhost:1188/translate").is_ok());
        assert!(service::ApiUrl::parse("ftp://example.com").is_err());
        assert!(service::TargetLang::parse("pt-BR").is_ok());
        assert!(service::TargetLang::parse("中文").is_err());
    }

    #[test]
    fn test_env_docs_mention_every_variable() {
        let docs = generate_env_docs();
        for name in [
            logging::LogLevel::NAME,
            scheduling::MaxRequestsPerPass::NAME,
            scheduling::MaxCurrentRequests::NAME,
            scheduling::DebounceMs::NAME,
            scheduling::StructuredLinks::NAME,
            service::TargetLang::NAME,
            service::ApiUrl::NAME,
        ] {
            assert!(docs.contains(name), "missing {name}");
        }
    }
}
