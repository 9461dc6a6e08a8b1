// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

#![allow(dead_code)]

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, RcDom};

use reader_overlay::dom::{find_descendants, is_element_named};
use reader_overlay::overlay::{
    OverlayConfig, OverlayEngine, OverlayError, OverlayResult, StaticLayout, StructuredRequest,
    TranslationService, UnitId,
};

/// 模拟翻译服务的内部状态
#[derive(Default)]
struct MockState {
    responses: HashMap<String, String>,
    segment_responses: HashMap<String, Vec<String>>,
    structured: bool,
    delay: Option<Duration>,
    panics_remaining: usize,
    text_calls: Vec<String>,
    segment_calls: Vec<String>,
}

/// 记录调用的模拟翻译服务
///
/// 未配置的文本按 `[原文]` 返回。
#[derive(Clone, Default)]
pub struct MockService {
    state: Arc<Mutex<MockState>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某段原文配置纯文本译文
    pub fn respond(self, text: &str, translated: &str) -> Self {
        self.set_response(text, translated);
        self
    }

    pub fn set_response(&self, text: &str, translated: &str) {
        self.lock().responses.insert(text.to_string(), translated.to_string());
    }

    /// 为某个结构化请求（按完整文本匹配）配置分段译文，并启用结构化支持
    pub fn respond_segments(self, full_text: &str, parts: &[&str]) -> Self {
        {
            let mut state = self.lock();
            state.structured = true;
            state.segment_responses.insert(
                full_text.to_string(),
                parts.iter().map(|part| part.to_string()).collect(),
            );
        }
        self
    }

    /// 每个请求在返回前等待的时间
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = Some(delay);
        self
    }

    /// 前 `times` 次纯文本请求在执行时 panic
    pub fn panic_times(self, times: usize) -> Self {
        self.lock().panics_remaining = times;
        self
    }

    pub fn text_calls(&self) -> Vec<String> {
        self.lock().text_calls.clone()
    }

    pub fn segment_calls(&self) -> Vec<String> {
        self.lock().segment_calls.clone()
    }

    pub fn total_calls(&self) -> usize {
        let state = self.lock();
        state.text_calls.len() + state.segment_calls.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl TranslationService for MockService {
    fn name(&self) -> &str {
        "mock"
    }

    fn translate_text(&self, text: String) -> BoxFuture<'static, OverlayResult<String>> {
        let (response, delay, panics) = {
            let mut state = self.lock();
            state.text_calls.push(text.clone());
            let response = state
                .responses
                .get(&text)
                .cloned()
                .unwrap_or_else(|| format!("[{}]", text));
            let panics = state.panics_remaining > 0;
            if panics {
                state.panics_remaining -= 1;
            }
            (response, state.delay, panics)
        };

        // panic 发生在锁释放之后
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if panics {
                panic!("mock service failure");
            }
            Ok(response)
        })
    }

    fn translate_segments(
        &self,
        request: StructuredRequest,
    ) -> BoxFuture<'static, OverlayResult<Vec<String>>> {
        let (response, delay) = {
            let mut state = self.lock();
            state.segment_calls.push(request.full_text.clone());
            let response = if state.structured {
                state
                    .segment_responses
                    .get(&request.full_text)
                    .cloned()
                    .ok_or_else(|| OverlayError::Service("no structured response".to_string()))
            } else {
                Err(OverlayError::StructuredUnsupported)
            };
            (response, state.delay)
        };

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }
}

/// HTML 测试辅助
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 创建测试用 DOM
    pub fn create_test_dom(html: &str) -> RcDom {
        parse_document(RcDom::default(), Default::default()).one(html)
    }

    /// 按文档顺序返回指定标签的元素
    pub fn elements(dom: &RcDom, tag: &str) -> Vec<Handle> {
        find_descendants(&dom.document, |node| is_element_named(node, tag))
    }

    pub fn body(dom: &RcDom) -> Handle {
        Self::elements(dom, "body").remove(0)
    }

    /// 生成 `count` 个段落的页面
    pub fn paragraphs(count: usize) -> String {
        (1..=count)
            .map(|i| format!("<p>Paragraph number {}.</p>", i))
            .collect()
    }
}

/// 测试用引擎及其协作者
pub struct TestEngine {
    pub engine: OverlayEngine,
    pub layout: Rc<StaticLayout>,
    pub service: MockService,
    pub dom: RcDom,
}

impl TestEngine {
    pub fn new(html: &str, service: MockService) -> Self {
        Self::with_config(html, service, OverlayConfig::default(), 100.0)
    }

    pub fn with_config(
        html: &str,
        service: MockService,
        config: OverlayConfig,
        viewport_height: f32,
    ) -> Self {
        let dom = HtmlTestHelper::create_test_dom(html);
        let layout = Rc::new(StaticLayout::new(viewport_height));
        let engine = OverlayEngine::new(config, Arc::new(service.clone()), layout.clone())
            .expect("valid test config");

        Self {
            engine,
            layout,
            service,
            dom,
        }
    }

    /// 观察整个文档并返回新增单元数
    pub fn observe(&mut self) -> usize {
        let document = self.dom.document.clone();
        self.engine.observe_document(Some(&document))
    }

    /// 按给定的顶部坐标为 b1.. 设置高度为 10 的矩形
    pub fn place(&self, tops: &[f32]) {
        for (index, top) in tops.iter().enumerate() {
            self.layout
                .set_rect(UnitId(index as u64 + 1), *top, *top + 10.0);
        }
    }

    pub fn element(&self, tag: &str, index: usize) -> Handle {
        HtmlTestHelper::elements(&self.dom, tag).remove(index)
    }
}
