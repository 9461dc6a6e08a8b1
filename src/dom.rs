//! DOM 基础操作
//!
//! 覆盖层只通过这里的函数读写 `markup5ever_rcdom` 树：属性、父子关系、
//! 文本抽取以及内联 `style` 中的 display 声明。

use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::overlay::error::{OverlayError, OverlayResult};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> OverlayResult<RcDom> {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .map_err(|e| OverlayError::Parse(format!("HTML 解析失败: {}", e)))
}

/// 解析 HTML 字符串
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 序列化节点的全部子节点
pub fn inner_html(node: &Handle) -> String {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();

    if let Err(e) = serialize(&mut buf, &serializable, SerializeOpts::default()) {
        tracing::warn!("DOM 序列化失败: {}", e);
        return String::new();
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 元素标签名是否等于 `tag`（不区分大小写）
pub fn is_element_named(node: &Handle, tag: &str) -> bool {
    get_node_name(node).is_some_and(|name| name.eq_ignore_ascii_case(tag))
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 设置节点属性，`None` 表示删除
///
/// 已存在的属性原地修改，保持属性顺序不变。
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(value);
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: StrTendril::from(value),
                });
            }
        }
    }
}

/// 元素的 class 列表是否包含 `class`
pub fn has_class(node: &Handle, class: &str) -> bool {
    get_node_attr(node, "class")
        .map(|value| value.split_ascii_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// 获取父节点
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 从节点自身开始向上查找第一个满足条件的祖先
pub fn closest<F>(node: &Handle, predicate: F) -> Option<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if predicate(&candidate) {
            return Some(candidate);
        }
        current = get_parent_node(&candidate);
    }
    None
}

/// 按文档顺序收集满足条件的后代节点（不含自身）
pub fn find_descendants<F>(node: &Handle, predicate: F) -> Vec<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut found = Vec::new();
    collect_descendants(node, &predicate, &mut found);
    found
}

fn collect_descendants<F>(node: &Handle, predicate: &F, found: &mut Vec<Handle>)
where
    F: Fn(&Handle) -> bool,
{
    for child in node.children.borrow().iter() {
        if predicate(child) {
            found.push(child.clone());
        }
        collect_descendants(child, predicate, found);
    }
}

/// 是否存在满足条件的后代节点
pub fn has_descendant<F>(node: &Handle, predicate: F) -> bool
where
    F: Fn(&Handle) -> bool + Copy,
{
    node.children
        .borrow()
        .iter()
        .any(|child| predicate(child) || has_descendant(child, predicate))
}

/// 创建 HTML 元素
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from(*value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 移除子节点
pub fn remove_child(parent: &Handle, child: &Handle) {
    parent
        .children
        .borrow_mut()
        .retain(|candidate| !Rc::ptr_eq(candidate, child));
    child.parent.set(None);
}

/// 替换文本节点内容
pub fn set_text(node: &Handle, text: &str) {
    if let NodeData::Text { contents } = &node.data {
        let mut content_ref = contents.borrow_mut();
        content_ref.clear();
        content_ref.push_slice(text);
    }
}

/// 抽取节点的文本内容，跳过满足 `skip` 的元素子树
///
/// `<br>` 视为空白，返回结果合并连续空白并去除首尾空白。
pub fn extract_text<F>(node: &Handle, skip: F) -> String
where
    F: Fn(&Handle) -> bool,
{
    let mut raw = String::new();
    push_raw_text(node, &skip, &mut raw);
    collapse_whitespace(&raw)
}

fn push_raw_text<F>(node: &Handle, skip: &F, out: &mut String)
where
    F: Fn(&Handle) -> bool,
{
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => {
                if skip(child) {
                    continue;
                }
                if is_element_named(child, "br") {
                    out.push(' ');
                    continue;
                }
                push_raw_text(child, skip, out);
            }
            _ => {}
        }
    }
}

/// 合并连续空白并去除首尾空白
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 读取内联样式中的 display 值
pub fn style_display(node: &Handle) -> Option<String> {
    let style = get_node_attr(node, "style")?;
    style.split(';').find_map(|declaration| {
        let (name, value) = declaration.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("display") {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

/// 设置内联样式中的 display 值，保留其他声明
pub fn set_style_display(node: &Handle, display: &str) {
    let style = get_node_attr(node, "style").unwrap_or_default();
    let mut replaced = false;
    let mut declarations: Vec<String> = Vec::new();

    for declaration in style.split(';') {
        let trimmed = declaration.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once(':') {
            Some((name, _)) if name.trim().eq_ignore_ascii_case("display") => {
                if !replaced {
                    declarations.push(format!("display: {}", display));
                    replaced = true;
                }
            }
            _ => declarations.push(trimmed.to_string()),
        }
    }

    if !replaced {
        declarations.push(format!("display: {}", display));
    }

    set_node_attr(node, "style", Some(declarations.join("; ")));
}

/// 元素是否被内联样式隐藏
pub fn is_display_none(node: &Handle) -> bool {
    style_display(node).is_some_and(|display| display.eq_ignore_ascii_case("none"))
}

/// 按行渲染节点的可见文本
///
/// 被 `display: none` 隐藏的子树不参与渲染；内联样式为 `display: block`
/// 的元素单独成行。用于诊断输出和测试断言。
pub fn visible_lines(node: &Handle) -> Vec<String> {
    let mut lines = vec![String::new()];
    push_visible(node, &mut lines);
    lines
        .iter()
        .map(|line| collapse_whitespace(line))
        .filter(|line| !line.is_empty())
        .collect()
}

fn push_visible(node: &Handle, lines: &mut Vec<String>) {
    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => {
                if let Some(line) = lines.last_mut() {
                    line.push_str(&contents.borrow());
                }
            }
            NodeData::Element { .. } => {
                if is_display_none(child) {
                    continue;
                }
                let block = style_display(child)
                    .is_some_and(|display| display.eq_ignore_ascii_case("block"));
                if block {
                    lines.push(String::new());
                }
                push_visible(child, lines);
                if block {
                    lines.push(String::new());
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(dom: &RcDom, tag: &str) -> Handle {
        find_descendants(&dom.document, |node| is_element_named(node, tag))
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn test_attr_set_preserves_order() {
        let dom = parse_html(r#"<p id="a" style="color: red" class="x">hi</p>"#);
        let p = first(&dom, "p");

        set_node_attr(&p, "style", Some("display: none".to_string()));
        assert_eq!(inner_html(&first(&dom, "body")), r#"<p id="a" style="display: none" class="x">hi</p>"#);

        set_node_attr(&p, "style", None);
        assert_eq!(get_node_attr(&p, "style"), None);
        assert_eq!(get_node_attr(&p, "class").as_deref(), Some("x"));
    }

    #[test]
    fn test_style_display_roundtrip_keeps_other_declarations() {
        let dom = parse_html(r#"<p style="color: red; display: inline">hi</p>"#);
        let p = first(&dom, "p");

        assert_eq!(style_display(&p).as_deref(), Some("inline"));
        set_style_display(&p, "none");
        assert_eq!(get_node_attr(&p, "style").as_deref(), Some("color: red; display: none"));
        assert!(is_display_none(&p));
    }

    #[test]
    fn test_extract_text_collapses_whitespace_and_skips() {
        let dom = parse_html("<p>  The <em>cat</em>\n sat.<span class=\"skip\">NO</span><br>Yes</p>");
        let p = first(&dom, "p");
        let text = extract_text(&p, |node| has_class(node, "skip"));
        assert_eq!(text, "The cat sat. Yes");
    }

    #[test]
    fn test_parent_lookup_is_non_destructive() {
        let dom = parse_html("<div><p><a href=\"#\">x</a></p></div>");
        let a = first(&dom, "a");

        let parent = get_parent_node(&a).unwrap();
        assert!(is_element_named(&parent, "p"));
        // 第二次查询仍然可以拿到父节点
        assert!(get_parent_node(&a).is_some());

        let div = closest(&a, |node| is_element_named(node, "div")).unwrap();
        assert!(is_element_named(&div, "div"));
    }

    #[test]
    fn test_append_and_remove_child() {
        let dom = parse_html("<p>x</p>");
        let p = first(&dom, "p");
        let span = create_element("span", &[("class", "translated-text")]);
        append_child(&p, span.clone());
        append_child(&span, create_text("y"));

        assert_eq!(inner_html(&p), r#"x<span class="translated-text">y</span>"#);
        assert!(Rc::ptr_eq(&get_parent_node(&span).unwrap(), &p));

        remove_child(&p, &span);
        assert_eq!(inner_html(&p), "x");
        assert!(get_parent_node(&span).is_none());
    }

    #[test]
    fn test_visible_lines() {
        let dom = parse_html(
            r#"<p>One <b style="display: none">hidden</b>two<span style="display: block">Three</span></p>"#,
        );
        let p = first(&dom, "p");
        assert_eq!(visible_lines(&p), vec!["One two".to_string(), "Three".to_string()]);
    }

    #[test]
    fn test_html_to_dom_decodes_charset() {
        let bytes = encoding_rs::WINDOWS_1252.encode("<p>caf\u{e9}</p>").0;
        let dom = html_to_dom(&bytes, "windows-1252").unwrap();
        let p = first(&dom, "p");
        assert_eq!(extract_text(&p, |_| false), "café");
    }
}
