//! 显示控制
//!
//! 按当前模式决定每个单元显示原文、译文或两者。隐藏原文时为每个被修改的
//! 子节点记录一次快照（元素的原始 `style` 属性、文本节点的原始内容），恢复时
//! 严格按快照回写，原文因此在任意次模式切换后保持逐字节一致。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use markup5ever_rcdom::{Handle, NodeData};
use serde::{Deserialize, Serialize};

use crate::dom::{
    append_child, create_element, create_text, get_node_attr, has_class, remove_child,
    set_node_attr, set_style_display, set_text,
};
use crate::overlay::config::constants;
use crate::overlay::error::OverlayError;
use crate::overlay::pipeline::segments::{contains_anchor, is_anchor};
use crate::overlay::pipeline::{Segment, UnitId};
use crate::overlay::storage::{TranslatedContent, TranslationRecord};

/// 显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    #[default]
    Off,
    TranslationOnly,
    OriginalOnly,
    Bilingual,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 4] = [
        DisplayMode::Off,
        DisplayMode::TranslationOnly,
        DisplayMode::OriginalOnly,
        DisplayMode::Bilingual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Off => "off",
            DisplayMode::TranslationOnly => "translation-only",
            DisplayMode::OriginalOnly => "original-only",
            DisplayMode::Bilingual => "bilingual",
        }
    }

    pub fn shows_original(&self) -> bool {
        !matches!(self, DisplayMode::TranslationOnly)
    }

    pub fn shows_translation(&self) -> bool {
        matches!(self, DisplayMode::TranslationOnly | DisplayMode::Bilingual)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| OverlayError::InvalidMode(s.to_string()))
    }
}

#[derive(Debug)]
enum Captured {
    /// 元素隐藏前的 `style` 属性，`None` 表示原本没有该属性
    Style(Option<String>),
    /// 文本节点隐藏前的内容
    Text(String),
}

#[derive(Debug)]
struct HiddenEntry {
    node: Handle,
    captured: Captured,
}

/// 单元原文隐藏快照
#[derive(Debug)]
pub struct HideSnapshot {
    entries: Vec<HiddenEntry>,
    keep_links: bool,
}

impl HideSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 隐藏时是否保留了链接
    pub fn keeps_links(&self) -> bool {
        self.keep_links
    }
}

/// 显示控制器
///
/// 持有全局唯一的当前模式，所有读写都经过这里。
#[derive(Debug)]
pub struct DisplayController {
    mode: DisplayMode,
    wrapper_class: String,
    snapshots: HashMap<UnitId, HideSnapshot>,
}

impl DisplayController {
    pub fn new(wrapper_class: impl Into<String>) -> Self {
        Self {
            mode: DisplayMode::Off,
            wrapper_class: wrapper_class.into(),
            snapshots: HashMap::new(),
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// 切换模式，模式发生变化时返回 `true`
    pub fn set_mode(&mut self, mode: DisplayMode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }

    pub fn wrapper_class(&self) -> &str {
        &self.wrapper_class
    }

    /// 单元内已注入的译文容器
    pub fn find_wrapper(&self, unit: &Handle) -> Option<Handle> {
        unit.children
            .borrow()
            .iter()
            .find(|child| has_class(child, &self.wrapper_class))
            .cloned()
    }

    /// 注入（或替换）单元的译文并按当前模式显示
    pub fn render_translation(
        &mut self,
        id: UnitId,
        unit: &Handle,
        record: &TranslationRecord,
        source_segments: Option<&[Segment]>,
    ) -> Handle {
        while let Some(existing) = self.find_wrapper(unit) {
            remove_child(unit, &existing);
        }

        let wrapper = self.build_wrapper(record, source_segments);
        append_child(unit, wrapper.clone());
        self.apply_mode(id, unit, record, source_segments.is_some());
        wrapper
    }

    /// 按当前模式刷新单元显示
    ///
    /// `has_links` 为单元原文是否含有链接，决定译文仅为纯文本时是否保留原链接。
    pub fn apply_mode(&mut self, id: UnitId, unit: &Handle, record: &TranslationRecord, has_links: bool) {
        let wrapper = self.find_wrapper(unit);

        match self.mode {
            DisplayMode::TranslationOnly => {
                let keep_links = has_links && !record.is_structured();
                self.hide_original(id, unit, keep_links);
            }
            DisplayMode::Off | DisplayMode::OriginalOnly | DisplayMode::Bilingual => {
                self.restore_original(id);
            }
        }

        if let Some(wrapper) = wrapper {
            let display = if self.mode.shows_translation() { "block" } else { "none" };
            set_style_display(&wrapper, display);
        }
    }

    /// 隐藏单元原文
    ///
    /// 已隐藏时不会覆盖已记录的原始状态；仅当链接保留策略变化时先恢复再重新隐藏。
    pub fn hide_original(&mut self, id: UnitId, unit: &Handle, keep_links: bool) {
        match self.snapshots.get(&id) {
            Some(snapshot) if snapshot.keep_links == keep_links => return,
            Some(_) => {
                self.restore_original(id);
            }
            None => {}
        }

        let mut entries = Vec::new();
        self.capture_children(unit, keep_links, &mut entries);
        tracing::debug!("隐藏单元 {} 的原文: {} 个节点", id, entries.len());
        self.snapshots.insert(id, HideSnapshot { entries, keep_links });
    }

    fn capture_children(&self, node: &Handle, keep_links: bool, entries: &mut Vec<HiddenEntry>) {
        for child in node.children.borrow().iter() {
            match &child.data {
                NodeData::Element { .. } => {
                    if has_class(child, &self.wrapper_class) {
                        continue;
                    }
                    if keep_links && is_anchor(child) {
                        continue;
                    }
                    if keep_links && contains_anchor(child) {
                        self.capture_children(child, keep_links, entries);
                        continue;
                    }
                    entries.push(HiddenEntry {
                        node: child.clone(),
                        captured: Captured::Style(get_node_attr(child, "style")),
                    });
                    set_style_display(child, "none");
                }
                NodeData::Text { contents } => {
                    let original = contents.borrow().to_string();
                    entries.push(HiddenEntry {
                        node: child.clone(),
                        captured: Captured::Text(original),
                    });
                    set_text(child, "");
                }
                _ => {}
            }
        }
    }

    /// 恢复单元原文，未隐藏时不做任何事并返回 `false`
    pub fn restore_original(&mut self, id: UnitId) -> bool {
        let Some(snapshot) = self.snapshots.remove(&id) else {
            return false;
        };

        for entry in snapshot.entries.into_iter().rev() {
            match entry.captured {
                Captured::Style(style) => set_node_attr(&entry.node, "style", style),
                Captured::Text(text) => set_text(&entry.node, &text),
            }
        }
        true
    }

    pub fn is_hidden(&self, id: UnitId) -> bool {
        self.snapshots.contains_key(&id)
    }

    pub fn snapshot(&self, id: UnitId) -> Option<&HideSnapshot> {
        self.snapshots.get(&id)
    }

    /// 恢复原文并移除单元内的译文
    pub fn remove_translation(&mut self, id: UnitId, unit: &Handle) {
        self.restore_original(id);
        while let Some(existing) = self.find_wrapper(unit) {
            remove_child(unit, &existing);
        }
    }

    /// 丢弃已脱离文档的单元的快照，不做恢复
    pub fn forget(&mut self, ids: &HashSet<UnitId>) {
        self.snapshots.retain(|id, _| !ids.contains(id));
    }

    /// 恢复全部仍被隐藏的原文
    pub fn restore_all(&mut self) -> usize {
        let ids: Vec<UnitId> = self.snapshots.keys().copied().collect();
        ids.into_iter().filter(|id| self.restore_original(*id)).count()
    }

    fn build_wrapper(&self, record: &TranslationRecord, source_segments: Option<&[Segment]>) -> Handle {
        let wrapper = create_element(
            "span",
            &[
                ("class", self.wrapper_class.as_str()),
                (constants::WRAPPER_MARK_ATTRIBUTE, "1"),
                ("style", constants::WRAPPER_STYLE),
            ],
        );

        match (&record.content, source_segments) {
            (TranslatedContent::Segments(parts), Some(sources)) if parts.len() == sources.len() => {
                for (source, translated) in sources.iter().zip(parts) {
                    match source {
                        Segment::Link { href, .. } => {
                            let anchor = create_element(
                                "a",
                                &[("href", href.as_str()), (constants::LINK_MARK_ATTRIBUTE, "1")],
                            );
                            append_child(&anchor, create_text(translated));
                            append_child(&wrapper, anchor);
                        }
                        Segment::Text { .. } => append_child(&wrapper, create_text(translated)),
                    }
                }
            }
            (content, _) => append_child(&wrapper, create_text(&content.joined())),
        }

        wrapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_descendants, inner_html, is_element_named, parse_html, visible_lines};
    use crate::overlay::pipeline::split_segments;

    fn unit(html: &str) -> (markup5ever_rcdom::RcDom, Handle) {
        let dom = parse_html(html);
        let p = find_descendants(&dom.document, |n| is_element_named(n, "p")).remove(0);
        (dom, p)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("translation-only".parse::<DisplayMode>().unwrap(), DisplayMode::TranslationOnly);
        assert_eq!("bilingual".parse::<DisplayMode>().unwrap(), DisplayMode::Bilingual);
        assert!(matches!(
            "sideways".parse::<DisplayMode>(),
            Err(OverlayError::InvalidMode(_))
        ));
        assert_eq!(DisplayMode::OriginalOnly.to_string(), "original-only");
        assert_eq!(
            serde_json::to_string(&DisplayMode::TranslationOnly).unwrap(),
            "\"translation-only\""
        );
    }

    #[test]
    fn test_hide_restore_is_exact_inverse() {
        let (_dom, p) = unit(r#"<p>The <em style="color: red">cat</em> <b>sat</b>.</p>"#);
        let before = inner_html(&p);
        let mut display = DisplayController::new("translated-text");

        for _ in 0..3 {
            display.hide_original(UnitId(1), &p, false);
            assert!(visible_lines(&p).is_empty());
            assert!(display.restore_original(UnitId(1)));
            assert_eq!(inner_html(&p), before);
        }
    }

    #[test]
    fn test_double_hide_keeps_first_capture() {
        let (_dom, p) = unit(r#"<p><em>cat</em> sat</p>"#);
        let before = inner_html(&p);
        let mut display = DisplayController::new("translated-text");

        display.hide_original(UnitId(1), &p, false);
        display.hide_original(UnitId(1), &p, false);
        assert_eq!(display.snapshot(UnitId(1)).unwrap().len(), 2);

        assert!(display.restore_original(UnitId(1)));
        assert!(!display.restore_original(UnitId(1)));
        assert_eq!(inner_html(&p), before);
    }

    #[test]
    fn test_mode_table() {
        let (_dom, p) = unit("<p>The cat sat.</p>");
        let record = TranslationRecord::plain("The cat sat.", "El gato se sentó.").unwrap();
        let mut display = DisplayController::new("translated-text");
        display.render_translation(UnitId(1), &p, &record, None);

        let expected = [
            (DisplayMode::Off, vec!["The cat sat."]),
            (DisplayMode::TranslationOnly, vec!["El gato se sentó."]),
            (DisplayMode::OriginalOnly, vec!["The cat sat."]),
            (DisplayMode::Bilingual, vec!["The cat sat.", "El gato se sentó."]),
        ];
        for (mode, lines) in expected {
            display.set_mode(mode);
            display.apply_mode(UnitId(1), &p, &record, false);
            assert_eq!(visible_lines(&p), lines, "mode {mode}");
        }
    }

    #[test]
    fn test_plain_translation_keeps_links_visible() {
        let (_dom, p) = unit(r#"<p>See <em>also <a href="/ch2">Read more</a></em> here</p>"#);
        let before = inner_html(&p);
        let record = TranslationRecord::plain("See also Read more here", "Lee más").unwrap();
        let mut display = DisplayController::new("translated-text");
        display.set_mode(DisplayMode::TranslationOnly);
        display.render_translation(UnitId(1), &p, &record, None);
        display.apply_mode(UnitId(1), &p, &record, true);

        assert_eq!(visible_lines(&p), vec!["Read more", "Lee más"]);
        let anchor = find_descendants(&p, |n| is_element_named(n, "a")).remove(0);
        assert_eq!(get_node_attr(&anchor, "style"), None);

        display.remove_translation(UnitId(1), &p);
        assert_eq!(inner_html(&p), before);
    }

    #[test]
    fn test_structured_translation_renders_links() {
        let (_dom, p) = unit(r#"<p>Go <a href="/ch2">Read more</a> now</p>"#);
        let sources = split_segments(&p, "translated-text").unwrap();
        let record = TranslationRecord::structured(
            "Go Read more now",
            vec!["Ve ".to_string(), "Lee más".to_string(), " ya".to_string()],
        )
        .unwrap();
        let mut display = DisplayController::new("translated-text");
        display.set_mode(DisplayMode::TranslationOnly);
        let wrapper = display.render_translation(UnitId(1), &p, &record, Some(&sources));

        assert_eq!(visible_lines(&p), vec!["Ve Lee más ya"]);
        assert!(display.snapshot(UnitId(1)).is_some_and(|s| !s.keeps_links()));

        let anchors = find_descendants(&wrapper, |n| is_element_named(n, "a"));
        assert_eq!(anchors.len(), 1);
        assert_eq!(get_node_attr(&anchors[0], "href").as_deref(), Some("/ch2"));
        assert_eq!(get_node_attr(&anchors[0], "data-overlay-link").as_deref(), Some("1"));
    }

    #[test]
    fn test_rerender_replaces_wrapper() {
        let (_dom, p) = unit("<p>Text</p>");
        let mut display = DisplayController::new("translated-text");
        display.set_mode(DisplayMode::Bilingual);
        let first = TranslationRecord::plain("Text", "Uno").unwrap();
        let second = TranslationRecord::plain("Text", "Dos").unwrap();

        display.render_translation(UnitId(1), &p, &first, None);
        display.render_translation(UnitId(1), &p, &second, None);

        assert_eq!(visible_lines(&p), vec!["Text", "Dos"]);
    }
}
