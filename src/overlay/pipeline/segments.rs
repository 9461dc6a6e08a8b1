//! 富文本分段
//!
//! 将含有超链接的翻译单元拆成交替的文本/链接分段，
//! 以便结构化翻译后重新生成可用的链接。

use markup5ever_rcdom::{Handle, NodeData};
use serde::{Deserialize, Serialize};

use crate::dom::{extract_text, get_node_attr, has_class, has_descendant, is_element_named};

/// 单元内容的一个分段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    /// 普通文本（已扁平化所有内联标记）
    Text { text: String },
    /// 链接，携带可见文本和目标地址
    Link { text: String, href: String },
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Text { text } | Segment::Link { text, .. } => text,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Segment::Link { .. })
    }

    pub fn href(&self) -> Option<&str> {
        match self {
            Segment::Link { href, .. } => Some(href),
            Segment::Text { .. } => None,
        }
    }

    /// 是否只包含空白
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }
}

/// 结构化翻译请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRequest {
    pub full_text: String,
    pub segments: Vec<Segment>,
}

impl StructuredRequest {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            full_text: full_text(&segments),
            segments,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// 元素是否为链接
pub fn is_anchor(node: &Handle) -> bool {
    is_element_named(node, "a")
}

/// 节点子树中是否存在链接
pub fn contains_anchor(node: &Handle) -> bool {
    has_descendant(node, is_anchor)
}

/// 拆分单元内容
///
/// 单元内没有链接时返回 `None`。深度优先遍历，除 `<a>` 外的内联标记全部扁平化；
/// `<a>` 作为不透明的链接分段输出。`skip_class` 标记的子树（已注入的译文）被忽略。
pub fn split_segments(unit: &Handle, skip_class: &str) -> Option<Vec<Segment>> {
    if !contains_anchor(unit) {
        return None;
    }

    let mut splitter = Splitter {
        skip_class,
        segments: Vec::new(),
        pending: String::new(),
    };
    splitter.walk(unit);
    splitter.flush();

    let mut segments = splitter.segments;
    trim_edges(&mut segments);
    segments.retain(|segment| segment.is_link() || !segment.text().is_empty());

    if segments.iter().any(Segment::is_link) {
        Some(segments)
    } else {
        None
    }
}

/// 分段拼接后的完整文本
pub fn full_text(segments: &[Segment]) -> String {
    let joined: String = segments.iter().map(Segment::text).collect();
    crate::dom::collapse_whitespace(&joined)
}

struct Splitter<'a> {
    skip_class: &'a str,
    segments: Vec<Segment>,
    pending: String,
}

impl Splitter<'_> {
    fn walk(&mut self, node: &Handle) {
        for child in node.children.borrow().iter() {
            match &child.data {
                NodeData::Text { contents } => self.pending.push_str(&contents.borrow()),
                NodeData::Element { .. } => {
                    if has_class(child, self.skip_class) {
                        continue;
                    }
                    if is_anchor(child) {
                        self.flush();
                        let skip_class = self.skip_class;
                        self.segments.push(Segment::Link {
                            text: extract_text(child, |node| has_class(node, skip_class)),
                            href: get_node_attr(child, "href").unwrap_or_default(),
                        });
                    } else if is_element_named(child, "br") {
                        self.pending.push(' ');
                    } else {
                        self.walk(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = collapse_inner(&self.pending);
        self.pending.clear();
        self.segments.push(Segment::Text { text });
    }
}

/// 合并连续空白，但保留首尾各一个空格，链接两侧的间隔因此不会丢失
fn collapse_inner(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn trim_edges(segments: &mut [Segment]) {
    if let Some(Segment::Text { text }) = segments.first_mut() {
        *text = text.trim_start().to_string();
    }
    if let Some(Segment::Text { text }) = segments.last_mut() {
        *text = text.trim_end().to_string();
    }
}
