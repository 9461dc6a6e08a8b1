//! 几何信息
//!
//! 覆盖层本身不做排版。宿主通过 [`LayoutProvider`] 提供视口高度和每个单元
//! 在客户区坐标系中的矩形；[`StaticLayout`] 是基于文档坐标和滚动偏移的简单实现。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::overlay::pipeline::{UnitId, UnitRegistry};

/// 垂直方向的矩形范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(top: f32, bottom: f32) -> Self {
        Self { top, bottom }
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// 向上平移
    pub fn shifted(&self, offset: f32) -> Self {
        Self {
            top: self.top - offset,
            bottom: self.bottom - offset,
        }
    }
}

/// 当前视口与预读窗口
///
/// 当前窗口为 `[0, current_bottom)`，预读窗口为 `[0, lookahead_bottom)`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportWindow {
    pub current_bottom: f32,
    pub lookahead_bottom: f32,
}

impl ViewportWindow {
    pub fn from_screen(screen_height: f32, lookahead_screens: f32) -> Self {
        Self {
            current_bottom: screen_height,
            lookahead_bottom: screen_height * (1.0 + lookahead_screens),
        }
    }

    /// 单元既不完全位于预读窗口下方，也不完全位于顶部之上
    pub fn is_candidate(&self, rect: &Rect) -> bool {
        rect.top < self.lookahead_bottom && rect.bottom > 0.0
    }

    pub fn is_current(&self, rect: &Rect) -> bool {
        rect.top < self.current_bottom
    }
}

/// 宿主提供的几何查询接口
pub trait LayoutProvider {
    /// 物理视口高度
    fn viewport_height(&self) -> f32;

    /// 单元当前的客户区矩形，元素未渲染时返回 `None`
    fn bounding_rect(&self, id: UnitId, node: &Handle) -> Option<Rect>;
}

impl<T: LayoutProvider + ?Sized> LayoutProvider for Rc<T> {
    fn viewport_height(&self) -> f32 {
        (**self).viewport_height()
    }

    fn bounding_rect(&self, id: UnitId, node: &Handle) -> Option<Rect> {
        (**self).bounding_rect(id, node)
    }
}

/// 基于文档坐标的静态布局
///
/// 矩形以文档坐标保存，查询时减去滚动偏移。内部可变，宿主可以在引擎持有
/// 布局的同时滚动或调整视口。
#[derive(Debug, Default)]
pub struct StaticLayout {
    viewport_height: Cell<f32>,
    scroll_top: Cell<f32>,
    rects: RefCell<HashMap<UnitId, Rect>>,
}

impl StaticLayout {
    pub fn new(viewport_height: f32) -> Self {
        Self {
            viewport_height: Cell::new(viewport_height),
            ..Self::default()
        }
    }

    /// 设置单元在文档坐标中的矩形
    pub fn set_rect(&self, id: UnitId, top: f32, bottom: f32) {
        self.rects.borrow_mut().insert(id, Rect::new(top, bottom));
    }

    pub fn remove_rect(&self, id: UnitId) {
        self.rects.borrow_mut().remove(&id);
    }

    pub fn scroll_to(&self, scroll_top: f32) {
        self.scroll_top.set(scroll_top);
    }

    pub fn scroll_top(&self) -> f32 {
        self.scroll_top.get()
    }

    pub fn set_viewport_height(&self, height: f32) {
        self.viewport_height.set(height);
    }

    /// 按阅读顺序自上而下排布所有已注册单元
    ///
    /// 每个单元的高度按原文字符数折行估算。
    pub fn flow(&self, registry: &UnitRegistry, line_height: f32, chars_per_line: usize) {
        let chars_per_line = chars_per_line.max(1);
        let mut top = 0.0_f32;
        let mut rects = self.rects.borrow_mut();

        for unit in registry.iter() {
            let chars = unit.original_text.chars().count();
            let lines = chars.div_ceil(chars_per_line).max(1);
            let bottom = top + lines as f32 * line_height;
            rects.insert(unit.id, Rect::new(top, bottom));
            top = bottom;
        }
    }
}

impl LayoutProvider for StaticLayout {
    fn viewport_height(&self) -> f32 {
        self.viewport_height.get()
    }

    fn bounding_rect(&self, id: UnitId, _node: &Handle) -> Option<Rect> {
        self.rects
            .borrow()
            .get(&id)
            .map(|rect| rect.shifted(self.scroll_top.get()))
    }
}
