//! 块级翻译单元抽取
//!
//! 遍历文档子树，按文档顺序返回所有符合条件的块级元素。抽取本身不修改 DOM，
//! 去重由调用方通过注册表完成。

use markup5ever_rcdom::Handle;

use crate::dom::{closest, extract_text, get_node_name, has_class, has_descendant, is_element_named};
use crate::overlay::config::OverlayConfig;

/// 抽取器配置
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// 作为翻译边界的块级标签
    pub block_tags: Vec<String>,
    /// 永远不翻译的标签
    pub reject_tags: Vec<String>,
    /// 已注入译文容器的 class
    pub wrapper_class: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::from(&OverlayConfig::default())
    }
}

impl From<&OverlayConfig> for ExtractorConfig {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            block_tags: config.block_tags.clone(),
            reject_tags: config.reject_tags.clone(),
            wrapper_class: config.wrapper_class.clone(),
        }
    }
}

/// 抽取统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    pub nodes_visited: usize,
    pub block_candidates: usize,
    pub inside_wrapper: usize,
    pub nested_list_items: usize,
    pub empty_blocks: usize,
    pub units_found: usize,
}

impl ExtractionStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 块级单元抽取器
pub struct BlockExtractor {
    config: ExtractorConfig,
    stats: ExtractionStats,
}

impl BlockExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            stats: ExtractionStats::default(),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// 最近一次抽取的统计
    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    /// 返回 `root` 之下所有符合条件的单元（不含 `root` 自身）
    pub fn extract(&mut self, root: &Handle) -> Vec<Handle> {
        self.stats.reset();
        let mut units = Vec::new();
        self.collect_recursive(root, &mut units);
        self.stats.units_found = units.len();

        tracing::debug!(
            "抽取完成: 访问 {} 个节点, 找到 {} 个单元",
            self.stats.nodes_visited,
            self.stats.units_found
        );
        units
    }

    fn collect_recursive(&mut self, node: &Handle, units: &mut Vec<Handle>) {
        for child in node.children.borrow().iter() {
            self.stats.nodes_visited += 1;
            if self.is_eligible(child) {
                units.push(child.clone());
            }
            self.collect_recursive(child, units);
        }
    }

    /// 按顺序应用资格规则
    pub fn is_eligible(&mut self, node: &Handle) -> bool {
        let Some(tag) = get_node_name(node) else {
            return false;
        };

        if !contains_tag(&self.config.block_tags, tag) {
            return false;
        }
        self.stats.block_candidates += 1;

        if contains_tag(&self.config.reject_tags, tag) {
            return false;
        }

        let wrapper_class = self.config.wrapper_class.as_str();
        if closest(node, |n| has_class(n, wrapper_class)).is_some() {
            self.stats.inside_wrapper += 1;
            return false;
        }

        if tag.eq_ignore_ascii_case("li") && has_descendant(node, |n| is_element_named(n, "p")) {
            self.stats.nested_list_items += 1;
            return false;
        }

        if self.unit_text(node).is_empty() {
            self.stats.empty_blocks += 1;
            return false;
        }

        true
    }

    /// 单元文本，排除已注入的译文
    pub fn unit_text(&self, node: &Handle) -> String {
        let wrapper_class = self.config.wrapper_class.as_str();
        extract_text(node, |n| has_class(n, wrapper_class))
    }
}

fn contains_tag(tags: &[String], tag: &str) -> bool {
    tags.iter().any(|candidate| candidate.eq_ignore_ascii_case(tag))
}
