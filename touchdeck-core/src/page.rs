//! Pages: a grid plus the widgets packed into it.
//!
//! Widgets live in one arena per page, in the order they were added. That
//! order is the z-order: later widgets draw on top and win hit tests. A
//! group's children come after the group itself and point back to it.

use serde::{Deserialize, Serialize};

use crate::canvas::Painter;
use crate::color::{Rgba, hex};
use crate::error::LayoutError;
use crate::event::{Binding, BindingHandle, Context, Event, EventKind};
use crate::geometry::{CellRect, Rect};
use crate::layout::{Grid, GridMetrics};
use crate::widget::{Frame, Label, Widget, WidgetHandle, WidgetState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageHandle(pub usize);

/// Tab and background styling for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageStyle {
    pub outline: Rgba,
    /// Tab fill and top of the page gradient.
    pub fill1: Rgba,
    /// Bottom of the page gradient; `None` for a flat page.
    pub fill2: Option<Rgba>,
    /// Tab title color.
    pub color: Rgba,
    /// Large faint text in the lower-right corner.
    pub label: Option<String>,
    pub label_color: Rgba,
    pub label_size: f32,
}

impl Default for PageStyle {
    fn default() -> Self {
        Self {
            outline: hex("fff"),
            fill1: hex("345"),
            fill2: None,
            color: hex("fff"),
            label: None,
            label_color: hex("fff1"),
            label_size: 200.0,
        }
    }
}

impl PageStyle {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_gradient(mut self, top: Rgba, bottom: Rgba) -> Self {
        self.fill1 = top;
        self.fill2 = Some(bottom);
        self
    }
}

pub(crate) struct Slot {
    pub widget: Widget,
    pub cells: CellRect,
    pub parent: Option<usize>,
    pub state: WidgetState,
    pub rect: Rect,
    pub bindings: Vec<Binding>,
}

pub struct Page {
    index: usize,
    title: String,
    grid: Grid,
    style: PageStyle,
    slots: Vec<Slot>,
    next_binding: u64,
}

impl Page {
    pub(crate) fn new(index: usize, title: String, grid: Grid, style: PageStyle) -> Self {
        Self {
            index,
            title,
            grid,
            style,
            slots: Vec::new(),
            next_binding: 1,
        }
    }

    pub fn handle(&self) -> PageHandle {
        PageHandle(self.index)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn style(&self) -> &PageStyle {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut PageStyle {
        &mut self.style
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = WidgetHandle> + '_ {
        (0..self.slots.len()).map(|index| WidgetHandle {
            page: self.index,
            index,
        })
    }

    // ════════════════════════════════════════════════════════════════════
    // Packing
    // ════════════════════════════════════════════════════════════════════

    fn push(&mut self, widget: Widget, cells: CellRect, parent: Option<usize>) -> WidgetHandle {
        tracing::debug!("page {:?}: {} at {}", self.title, widget.kind(), cells);
        self.slots.push(Slot {
            widget,
            cells,
            parent,
            state: WidgetState::default(),
            rect: Rect::default(),
            bindings: Vec::new(),
        });
        WidgetHandle {
            page: self.index,
            index: self.slots.len() - 1,
        }
    }

    /// Place `widget` on cells `(x, y)` to `(x + w, y + h)`.
    pub fn pack(&mut self, x: u16, y: u16, w: u16, h: u16, widget: impl Into<Widget>) -> Result<WidgetHandle, LayoutError> {
        let span = CellRect::new(x, y, w, h);
        self.grid.claim(span)?;
        Ok(self.push(widget.into(), span, None))
    }

    /// Move the packing cursor and start a new run there.
    pub fn locate(&mut self, x: u16, y: u16) {
        self.grid.locate(x, y);
    }

    /// Place `widget` at the cursor, right of the previously packed one.
    pub fn pack_next(&mut self, w: u16, h: u16, widget: impl Into<Widget>) -> Result<WidgetHandle, LayoutError> {
        let span = self.grid.next_span(w, h);
        self.grid.claim(span)?;
        Ok(self.push(widget.into(), span, None))
    }

    pub fn newline(&mut self) {
        self.grid.newline();
    }

    /// Caption the current run with a barred label in the row above it.
    pub fn add_group_label(&mut self, text: impl Into<String>) -> Result<WidgetHandle, LayoutError> {
        let span = self.grid.group_label_span()?;
        self.grid.reserve(span)?;
        Ok(self.push(Label::caption(text).into(), span, None))
    }

    /// Place `widget` inside the group `group`, on the group's own grid.
    pub fn pack_in(
        &mut self,
        group: WidgetHandle,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        widget: impl Into<Widget>,
    ) -> Result<WidgetHandle, LayoutError> {
        let index = self.check_handle(group)?;
        let span = CellRect::new(x, y, w, h);
        match &mut self.slots[index].widget {
            Widget::Group(g) => g.grid.claim(span)?,
            _ => return Err(LayoutError::NotAContainer(index)),
        }
        Ok(self.push(widget.into(), span, Some(index)))
    }

    // ════════════════════════════════════════════════════════════════════
    // Widgets
    // ════════════════════════════════════════════════════════════════════

    fn check_handle(&self, handle: WidgetHandle) -> Result<usize, LayoutError> {
        if handle.page != self.index || handle.index >= self.slots.len() {
            return Err(LayoutError::UnknownWidget {
                page: handle.page,
                index: handle.index,
            });
        }
        Ok(handle.index)
    }

    fn slot(&self, handle: WidgetHandle) -> Option<&Slot> {
        self.check_handle(handle).ok().map(|i| &self.slots[i])
    }

    pub(crate) fn slot_mut(&mut self, handle: WidgetHandle) -> Option<&mut Slot> {
        self.check_handle(handle).ok().map(move |i| &mut self.slots[i])
    }

    pub fn widget(&self, handle: WidgetHandle) -> Option<&Widget> {
        self.slot(handle).map(|s| &s.widget)
    }

    pub fn widget_mut(&mut self, handle: WidgetHandle) -> Option<&mut Widget> {
        self.slot_mut(handle).map(|s| &mut s.widget)
    }

    pub fn state(&self, handle: WidgetHandle) -> Option<WidgetState> {
        self.slot(handle).map(|s| s.state)
    }

    pub fn cells(&self, handle: WidgetHandle) -> Option<CellRect> {
        self.slot(handle).map(|s| s.cells)
    }

    /// Pixel rectangle from the most recent layout.
    pub fn rect(&self, handle: WidgetHandle) -> Option<Rect> {
        self.slot(handle).map(|s| s.rect)
    }

    pub fn parent(&self, handle: WidgetHandle) -> Option<WidgetHandle> {
        self.slot(handle)?.parent.map(|index| WidgetHandle {
            page: self.index,
            index,
        })
    }

    pub fn set_visible(&mut self, handle: WidgetHandle, visible: bool) -> bool {
        self.slot_mut(handle).map(|s| s.state.visible = visible).is_some()
    }

    pub fn set_enabled(&mut self, handle: WidgetHandle, enabled: bool) -> bool {
        self.slot_mut(handle)
            .map(|s| {
                s.state.enabled = enabled;
                if !enabled {
                    s.state.pressed = false;
                }
            })
            .is_some()
    }

    /// Visible itself and through every enclosing group.
    pub fn is_shown(&self, handle: WidgetHandle) -> bool {
        let mut cursor = self.check_handle(handle).ok();
        while let Some(i) = cursor {
            if !self.slots[i].state.visible {
                return false;
            }
            cursor = self.slots[i].parent;
        }
        handle.page == self.index
    }

    /// Register `handler` for `kind` events on `widget`. Handlers for the same
    /// widget and kind run in registration order.
    pub fn bind<F>(&mut self, widget: WidgetHandle, kind: EventKind, handler: F) -> Result<BindingHandle, LayoutError>
    where
        F: FnMut(&mut Context<'_>, &Event) + 'static,
    {
        let index = self.check_handle(widget)?;
        let id = self.next_binding;
        self.next_binding += 1;
        self.slots[index].bindings.push(Binding {
            id,
            kind,
            handler: Box::new(handler),
        });
        Ok(BindingHandle { widget, kind, id })
    }

    pub fn unbind(&mut self, binding: BindingHandle) -> bool {
        let Some(slot) = self.slot_mut(binding.widget) else {
            return false;
        };
        let before = slot.bindings.len();
        slot.bindings.retain(|b| b.id != binding.id);
        slot.bindings.len() != before
    }

    pub fn binding_count(&self, widget: WidgetHandle, kind: EventKind) -> usize {
        self.slot(widget)
            .map(|s| s.bindings.iter().filter(|b| b.kind == kind).count())
            .unwrap_or(0)
    }

    // ════════════════════════════════════════════════════════════════════
    // Layout, hit testing, rendering
    // ════════════════════════════════════════════════════════════════════

    /// Recompute every widget's pixel rectangle for `area`.
    pub fn layout(&mut self, area: Rect, scale: f32) {
        let metrics = self.grid.metrics(area, scale);
        let mut inner: Vec<Option<GridMetrics>> = Vec::with_capacity(self.slots.len());
        for i in 0..self.slots.len() {
            let cells = self.slots[i].cells;
            let rect = match self.slots[i].parent {
                None => metrics.cell_rect(cells),
                Some(p) => match inner.get(p).copied().flatten() {
                    Some(m) => m.cell_rect(cells),
                    None => Rect::default(),
                },
            };
            self.slots[i].rect = rect;
            inner.push(match &self.slots[i].widget {
                Widget::Group(g) => Some(g.grid.metrics(g.inner(rect, scale), scale)),
                _ => None,
            });
        }
    }

    /// Topmost shown widget containing `(x, y)`.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<WidgetHandle> {
        (0..self.slots.len())
            .rev()
            .map(|index| WidgetHandle {
                page: self.index,
                index,
            })
            .find(|h| {
                let slot = &self.slots[h.index];
                self.is_shown(*h) && slot.widget.hit_test(slot.rect, x, y)
            })
    }

    pub fn render(&self, painter: &mut Painter<'_>, frame: &Frame<'_>) {
        for handle in self.handles() {
            if !self.is_shown(handle) {
                continue;
            }
            let slot = &self.slots[handle.index];
            slot.widget.render(painter, slot.rect, slot.state, frame);
        }
    }
}
