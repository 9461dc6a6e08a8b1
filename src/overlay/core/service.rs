//! 翻译服务协作者
//!
//! 引擎只通过 [`TranslationService`] 与外部翻译后端交互。返回的 future 为
//! `'static`，可以直接交给 tokio 运行时执行；超时与重试策略由实现方负责。

use futures::future::BoxFuture;

use crate::overlay::error::{OverlayError, OverlayResult};
use crate::overlay::pipeline::StructuredRequest;

/// 异步翻译服务
pub trait TranslationService: Send + Sync {
    /// 服务名称，用于日志
    fn name(&self) -> &str;

    /// 翻译单段纯文本
    fn translate_text(&self, text: String) -> BoxFuture<'static, OverlayResult<String>>;

    /// 结构化翻译，返回与分段一一对应的译文
    ///
    /// 默认不支持，引擎会回退到纯文本请求。
    fn translate_segments(
        &self,
        _request: StructuredRequest,
    ) -> BoxFuture<'static, OverlayResult<Vec<String>>> {
        Box::pin(async { Err(OverlayError::StructuredUnsupported) })
    }
}

/// 离线预览服务，把文本转为大写
#[derive(Debug, Clone, Default)]
pub struct EchoService;

impl TranslationService for EchoService {
    fn name(&self) -> &str {
        "echo"
    }

    fn translate_text(&self, text: String) -> BoxFuture<'static, OverlayResult<String>> {
        Box::pin(async move { Ok(text.to_uppercase()) })
    }

    fn translate_segments(
        &self,
        request: StructuredRequest,
    ) -> BoxFuture<'static, OverlayResult<Vec<String>>> {
        Box::pin(async move {
            Ok(request
                .segments
                .iter()
                .map(|segment| segment.text().to_uppercase())
                .collect())
        })
    }
}

#[cfg(feature = "deeplx")]
pub use deeplx::DeepLxService;

#[cfg(feature = "deeplx")]
mod deeplx {
    use std::time::Duration;

    use futures::future::BoxFuture;
    use serde::{Deserialize, Serialize};

    use super::TranslationService;
    use crate::overlay::config::OverlayConfig;
    use crate::overlay::error::{OverlayError, OverlayResult};
    use crate::overlay::pipeline::StructuredRequest;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    #[derive(Debug, Serialize)]
    struct DeepLxRequest<'a> {
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    }

    #[derive(Debug, Deserialize)]
    struct DeepLxResponse {
        code: u16,
        #[serde(default)]
        data: String,
    }

    /// DeepLX 兼容接口的翻译服务
    #[derive(Debug, Clone)]
    pub struct DeepLxService {
        client: reqwest::Client,
        api_url: String,
        source_lang: String,
        target_lang: String,
    }

    impl DeepLxService {
        pub fn new(config: &OverlayConfig) -> OverlayResult<Self> {
            let client = reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?;

            Ok(Self {
                client,
                api_url: config.api_url.clone(),
                source_lang: config.source_lang.clone(),
                target_lang: config.target_lang.clone(),
            })
        }

        async fn request(self, text: String) -> OverlayResult<String> {
            let body = DeepLxRequest {
                text: &text,
                source_lang: &self.source_lang,
                target_lang: &self.target_lang,
            };

            let response = self.client.post(&self.api_url).json(&body).send().await?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                tracing::warn!("DeepLX 接口返回错误: {} - {}", status, detail);
                return Err(OverlayError::Service(format!("HTTP {}", status)));
            }

            let result: DeepLxResponse = response.json().await?;
            if result.code != 200 {
                return Err(OverlayError::Service(format!("DeepLX 返回代码 {}", result.code)));
            }
            Ok(result.data)
        }
    }

    impl TranslationService for DeepLxService {
        fn name(&self) -> &str {
            "deeplx"
        }

        fn translate_text(&self, text: String) -> BoxFuture<'static, OverlayResult<String>> {
            Box::pin(self.clone().request(text))
        }

        /// 各分段以换行拼接后一次性翻译，再按行拆回
        fn translate_segments(
            &self,
            request: StructuredRequest,
        ) -> BoxFuture<'static, OverlayResult<Vec<String>>> {
            let service = self.clone();
            Box::pin(async move {
                let expected = request.len();
                let joined = request
                    .segments
                    .iter()
                    .map(|segment| segment.text().trim())
                    .collect::<Vec<_>>()
                    .join("\n");

                let translated = service.request(joined).await?;
                let lines: Vec<String> = translated.lines().map(str::to_string).collect();
                if lines.len() != expected {
                    return Err(OverlayError::StructureMismatch {
                        expected,
                        actual: lines.len(),
                    });
                }

                // 译文按分段去掉了首尾空白，这里补回原分段的间隔
                Ok(request
                    .segments
                    .iter()
                    .zip(lines)
                    .map(|(segment, line)| {
                        let source = segment.text();
                        let lead = if source.starts_with(' ') { " " } else { "" };
                        let tail = if source.len() > 1 && source.ends_with(' ') { " " } else { "" };
                        format!("{}{}{}", lead, line.trim(), tail)
                    })
                    .collect())
            })
        }
    }
}
