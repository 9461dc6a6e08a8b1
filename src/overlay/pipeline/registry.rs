//! 翻译单元注册表
//!
//! 为每个块级元素分配稳定的 `b<N>` 标识，并同时写入元素属性，
//! 以便在弱引用失效时仍能通过属性重新定位元素。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use markup5ever_rcdom::{Handle, Node};

use super::segments::Segment;
use crate::dom::{find_descendants, get_node_attr, set_node_attr};
use crate::overlay::error::OverlayError;

/// 翻译单元标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl FromStr for UnitId {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('b')
            .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<u64>().ok())
            .map(UnitId)
            .ok_or_else(|| OverlayError::UnknownUnit(s.to_string()))
    }
}

/// 已注册的翻译单元
#[derive(Debug, Clone)]
pub struct TranslatableUnit {
    pub id: UnitId,
    node: Weak<Node>,
    pub original_text: String,
    pub segments: Option<Vec<Segment>>,
}

impl TranslatableUnit {
    /// 元素仍在内存中时返回其句柄
    pub fn node(&self) -> Option<Handle> {
        self.node.upgrade()
    }

    pub fn has_links(&self) -> bool {
        self.segments.is_some()
    }
}

/// 单元注册表
///
/// 标识从 1 开始，计数器在 `clear` 之后继续递增。
#[derive(Debug)]
pub struct UnitRegistry {
    id_attribute: String,
    next_id: u64,
    units: HashMap<UnitId, TranslatableUnit>,
    order: Vec<UnitId>,
    seen: HashMap<*const Node, (Weak<Node>, UnitId)>,
    roots: Vec<Weak<Node>>,
}

impl UnitRegistry {
    pub fn new(id_attribute: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            next_id: 1,
            units: HashMap::new(),
            order: Vec::new(),
            seen: HashMap::new(),
            roots: Vec::new(),
        }
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// 记录可用于属性回退查找的根节点
    pub fn add_root(&mut self, root: &Handle) {
        if !self.roots.iter().any(|known| known.as_ptr() == Rc::as_ptr(root)) {
            self.roots.push(Rc::downgrade(root));
        }
    }

    /// 已注册元素对应的标识
    pub fn id_of(&self, node: &Handle) -> Option<UnitId> {
        let (weak, id) = self.seen.get(&Rc::as_ptr(node))?;
        // 指针可能被新节点复用，需要确认弱引用仍指向同一节点
        if weak.upgrade().is_some_and(|alive| Rc::ptr_eq(&alive, node)) {
            Some(*id)
        } else {
            None
        }
    }

    pub fn is_registered(&self, node: &Handle) -> bool {
        self.id_of(node).is_some()
    }

    /// 注册元素，返回其标识；已注册的元素返回 `None`
    ///
    /// 元素上已带有未被占用的标识属性时沿用该标识。
    pub fn register(
        &mut self,
        node: &Handle,
        original_text: String,
        segments: Option<Vec<Segment>>,
    ) -> Option<UnitId> {
        if self.is_registered(node) {
            return None;
        }

        let carried = get_node_attr(node, &self.id_attribute)
            .and_then(|value| value.parse::<UnitId>().ok())
            .filter(|id| !self.units.contains_key(id));
        let id = match carried {
            Some(id) => {
                self.next_id = self.next_id.max(id.0 + 1);
                id
            }
            None => {
                let id = UnitId(self.next_id);
                self.next_id += 1;
                id
            }
        };

        set_node_attr(node, &self.id_attribute, Some(id.to_string()));
        self.seen
            .insert(Rc::as_ptr(node), (Rc::downgrade(node), id));
        self.units.insert(
            id,
            TranslatableUnit {
                id,
                node: Rc::downgrade(node),
                original_text,
                segments,
            },
        );
        self.order.push(id);
        Some(id)
    }

    pub fn get(&self, id: UnitId) -> Option<&TranslatableUnit> {
        self.units.get(&id)
    }

    /// 定位单元元素
    ///
    /// 优先使用弱引用；失效时在已知根节点下按标识属性查找。
    pub fn resolve(&self, id: UnitId) -> Option<Handle> {
        if let Some(node) = self.units.get(&id).and_then(TranslatableUnit::node) {
            return Some(node);
        }

        let wanted = id.to_string();
        self.roots
            .iter()
            .filter_map(Weak::upgrade)
            .find_map(|root| {
                find_descendants(&root, |node| {
                    get_node_attr(node, &self.id_attribute).as_deref() == Some(wanted.as_str())
                })
                .into_iter()
                .next()
            })
    }

    /// 按注册顺序遍历单元
    pub fn iter(&self) -> impl Iterator<Item = &TranslatableUnit> {
        self.order.iter().filter_map(|id| self.units.get(id))
    }

    pub fn ids(&self) -> &[UnitId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// 元素已无法定位的单元
    ///
    /// 弱引用失效且已知根节点下找不到标识属性时视为已脱离文档。
    pub fn detached(&mut self) -> Vec<UnitId> {
        self.roots.retain(|root| root.strong_count() > 0);
        self.order
            .iter()
            .copied()
            .filter(|id| self.resolve(*id).is_none())
            .collect()
    }

    /// 移除一组单元，返回实际移除的数量
    pub fn remove_units(&mut self, ids: &HashSet<UnitId>) -> usize {
        let before = self.units.len();
        self.units.retain(|id, _| !ids.contains(id));
        self.order.retain(|id| !ids.contains(id));
        self.seen.retain(|_, (_, id)| !ids.contains(id));
        before - self.units.len()
    }

    /// 清空注册信息并移除元素上的标识属性
    pub fn clear(&mut self) {
        for unit in self.units.values() {
            if let Some(node) = unit.node() {
                set_node_attr(&node, &self.id_attribute, None);
            }
        }
        self.units.clear();
        self.order.clear();
        self.seen.clear();
        self.roots.clear();
    }
}
