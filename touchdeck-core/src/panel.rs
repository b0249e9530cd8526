//! The Panel: every page, the tab bar that switches between them, and the
//! corner text (the HH:MM clock) drawn in the bar.

use crate::canvas::{Align, Canvas, Painter, fit_text};
use crate::color::{Rgba, hex};
use crate::error::LayoutError;
use crate::event::{BindingHandle, Context, Event, EventKind};
use crate::geometry::Rect;
use crate::layout::Grid;
use crate::page::{Page, PageHandle, PageStyle};
use crate::widget::{Frame, Widget, WidgetHandle};

/// Tab bar metrics in abstract units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabStyle {
    pub size: f32,
    pub padx: f32,
    pub pady: f32,
    /// Outline width.
    pub width: f32,
    pub radius: f32,
    /// Brightness of inactive tabs.
    pub fading: f32,
    pub corner_color: Rgba,
}

impl Default for TabStyle {
    fn default() -> Self {
        Self {
            size: 50.0,
            padx: 50.0,
            pady: 25.0,
            width: 3.0,
            radius: 25.0,
            fading: 0.5,
            corner_color: hex("888"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct TabGeom {
    x0: f32,
    text_x: f32,
    x1: f32,
}

/// Pixel geometry of the tab bar for the current window size.
#[derive(Debug, Clone, Default)]
struct BarLayout {
    width: f32,
    height: f32,
    outline: f32,
    radius: f32,
    text_size: f32,
    text_y: f32,
    bar_y0: f32,
    bar_y1: f32,
    button_y1: f32,
    tabs: Vec<TabGeom>,
    corner_x: f32,
    /// Fitted page labels, one per page.
    labels: Vec<Option<(f32, f32, f32)>>,
}

pub struct Panel {
    pages: Vec<Page>,
    active: usize,
    tab_style: TabStyle,
    corner_text: Option<String>,
    show_clock: bool,
    bar: BarLayout,
    /// Window size the current layout was computed for.
    laid_out: Option<(u32, u32)>,
}

impl Default for Panel {
    fn default() -> Self {
        Self::new()
    }
}

impl Panel {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            active: 0,
            tab_style: TabStyle::default(),
            corner_text: None,
            show_clock: true,
            bar: BarLayout::default(),
            laid_out: None,
        }
    }

    pub fn with_tab_style(mut self, style: TabStyle) -> Self {
        self.tab_style = style;
        self
    }

    /// Keep the corner text as set instead of showing the time.
    pub fn without_clock(mut self) -> Self {
        self.show_clock = false;
        self
    }

    pub fn shows_clock(&self) -> bool {
        self.show_clock
    }

    // ════════════════════════════════════════════════════════════════════
    // Pages
    // ════════════════════════════════════════════════════════════════════

    pub fn add_page(&mut self, title: impl Into<String>, grid: Grid) -> PageHandle {
        self.add_page_styled(title, grid, PageStyle::default())
    }

    pub fn add_page_styled(&mut self, title: impl Into<String>, grid: Grid, style: PageStyle) -> PageHandle {
        let index = self.pages.len();
        let title = title.into();
        tracing::info!("page {} {:?} ({}x{} grid)", index, title, grid.cols(), grid.rows());
        self.pages.push(Page::new(index, title, grid, style));
        self.laid_out = None;
        PageHandle(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    pub fn page(&self, handle: PageHandle) -> Result<&Page, LayoutError> {
        self.pages.get(handle.0).ok_or(LayoutError::UnknownPage(handle.0))
    }

    pub fn page_mut(&mut self, handle: PageHandle) -> Result<&mut Page, LayoutError> {
        self.laid_out = None;
        self.pages.get_mut(handle.0).ok_or(LayoutError::UnknownPage(handle.0))
    }

    pub fn active(&self) -> PageHandle {
        PageHandle(self.active)
    }

    pub fn active_page(&self) -> Option<&Page> {
        self.pages.get(self.active)
    }

    pub fn is_active(&self, handle: PageHandle) -> bool {
        handle.0 == self.active && handle.0 < self.pages.len()
    }

    pub fn set_active(&mut self, handle: PageHandle) -> Result<(), LayoutError> {
        if handle.0 >= self.pages.len() {
            return Err(LayoutError::UnknownPage(handle.0));
        }
        if handle.0 != self.active {
            tracing::info!("switching to page {:?}", self.pages[handle.0].title());
            self.active = handle.0;
        }
        Ok(())
    }

    pub fn corner_text(&self) -> Option<&str> {
        self.corner_text.as_deref()
    }

    pub fn set_corner_text(&mut self, text: Option<String>) {
        if self.corner_text != text {
            self.corner_text = text;
            self.laid_out = None;
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // Widgets, across pages
    // ════════════════════════════════════════════════════════════════════

    pub fn widget(&self, handle: WidgetHandle) -> Option<&Widget> {
        self.pages.get(handle.page)?.widget(handle)
    }

    pub fn widget_mut(&mut self, handle: WidgetHandle) -> Option<&mut Widget> {
        self.pages.get_mut(handle.page)?.widget_mut(handle)
    }

    pub fn widget_rect(&self, handle: WidgetHandle) -> Option<Rect> {
        self.pages.get(handle.page)?.rect(handle)
    }

    pub fn bind<F>(&mut self, widget: WidgetHandle, kind: EventKind, handler: F) -> Result<BindingHandle, LayoutError>
    where
        F: FnMut(&mut Context<'_>, &Event) + 'static,
    {
        self.pages
            .get_mut(widget.page)
            .ok_or(LayoutError::UnknownPage(widget.page))?
            .bind(widget, kind, handler)
    }

    pub fn unbind(&mut self, binding: BindingHandle) -> bool {
        self.pages
            .get_mut(binding.widget.page)
            .is_some_and(|p| p.unbind(binding))
    }

    pub fn set_enabled(&mut self, widget: WidgetHandle, enabled: bool) -> bool {
        self.pages
            .get_mut(widget.page)
            .is_some_and(|p| p.set_enabled(widget, enabled))
    }

    pub fn set_visible(&mut self, widget: WidgetHandle, visible: bool) -> bool {
        self.pages
            .get_mut(widget.page)
            .is_some_and(|p| p.set_visible(widget, visible))
    }

    pub(crate) fn page_at_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    // ════════════════════════════════════════════════════════════════════
    // Layout
    // ════════════════════════════════════════════════════════════════════

    pub fn needs_layout(&self, size: (u32, u32)) -> bool {
        self.laid_out != Some(size)
    }

    /// Lay out the bar and every page for a `width` x `height` window.
    pub fn layout(&mut self, metrics: &dyn Canvas, width: u32, height: u32) {
        let scale = width.min(height) as f32 / 1000.0;
        let px = |u: f32| (u * scale).round();
        let s = self.tab_style;
        let (w, h) = (width as f32, height as f32);

        let outline = px(s.width);
        let padx = px(s.padx);
        let pady = px(s.pady);
        let text_size = px(s.size);
        let text_y = outline + pady;
        let bar_y0 = text_y + text_size + pady;
        let bar_y1 = bar_y0 + outline;
        let radius = px(s.radius);

        let mut tabs = Vec::with_capacity(self.pages.len());
        let mut labels = Vec::with_capacity(self.pages.len());
        let mut bx = 0.0;
        let page_area = Rect::from_edges(0.0, bar_y1, w, h);
        for page in &self.pages {
            let x0 = bx;
            let text_x = x0 + outline + padx;
            bx = text_x + metrics.text_width(page.title(), text_size) + padx;
            tabs.push(TabGeom {
                x0,
                text_x,
                x1: bx + outline,
            });
            labels.push(page.style().label.as_deref().and_then(|label| {
                let lpadx = px(page.style().label_size / 6.0);
                let max = Rect::from_edges(page_area.x + lpadx, page_area.y, page_area.right() - lpadx, page_area.bottom());
                let lines = fit_text(metrics, max, px(page.style().label_size), label, Align::End, Align::End);
                lines.first().map(|l| (l.rect.x, l.rect.y, l.size))
            }));
        }

        let corner_x = match &self.corner_text {
            Some(text) => w - (text_size / 4.0).floor() - metrics.text_width(text, text_size),
            None => w,
        };

        self.bar = BarLayout {
            width: w,
            height: h,
            outline,
            radius,
            text_size,
            text_y,
            bar_y0,
            bar_y1,
            button_y1: bar_y1 + radius + outline,
            tabs,
            corner_x,
            labels,
        };
        for page in &mut self.pages {
            page.layout(page_area, scale);
        }
        self.laid_out = Some((width, height));
        tracing::debug!("layout for {}x{} (scale {:.3})", width, height, scale);
    }

    /// Area below the tab bar.
    pub fn page_area(&self) -> Rect {
        Rect::from_edges(0.0, self.bar.bar_y1, self.bar.width, self.bar.height)
    }

    /// The page whose tab is at `(x, y)`, if the point is in the tab bar.
    pub fn tab_at(&self, x: f32, y: f32) -> Option<PageHandle> {
        if y < 0.0 || y >= self.bar.bar_y1 {
            return None;
        }
        self.bar
            .tabs
            .iter()
            .position(|t| t.x0 <= x && x < t.x1)
            .map(PageHandle)
    }

    pub fn tab_rect(&self, page: PageHandle) -> Option<Rect> {
        let tab = self.bar.tabs.get(page.0)?;
        Some(Rect::from_edges(tab.x0, 0.0, tab.x1, self.bar.bar_y1))
    }

    pub fn in_tab_bar(&self, y: f32) -> bool {
        y < self.bar.bar_y1
    }

    /// Topmost widget at `(x, y)` on the active page.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<WidgetHandle> {
        if self.in_tab_bar(y) {
            return None;
        }
        self.active_page()?.hit_test(x, y)
    }

    // ════════════════════════════════════════════════════════════════════
    // Rendering
    // ════════════════════════════════════════════════════════════════════

    fn draw_tab(&self, painter: &mut Painter<'_>, index: usize) {
        let (Some(page), Some(tab)) = (self.pages.get(index), self.bar.tabs.get(index)) else {
            return;
        };
        let b = &self.bar;
        let style = page.style();
        let fade = if index == self.active { 1.0 } else { self.tab_style.fading };
        let fill = style.fill1.scale(fade);
        painter.outline_box(
            Rect::from_edges(tab.x0, 0.0, tab.x1, b.button_y1),
            b.outline,
            style.outline.scale(fade),
            fill,
            fill,
            b.radius,
            Default::default(),
        );
        painter.text_line(tab.text_x, b.text_y, b.text_size, page.title(), style.color.scale(fade));
    }

    /// Tab bar, page background and page label; widgets draw on top.
    pub fn render_chrome(&self, painter: &mut Painter<'_>) {
        let b = &self.bar;
        if let Some(text) = &self.corner_text {
            painter.text_line(b.corner_x, b.text_y, b.text_size, text, self.tab_style.corner_color);
        }
        for i in (0..self.pages.len()).filter(|i| *i != self.active) {
            self.draw_tab(painter, i);
        }
        let Some(page) = self.active_page() else {
            tracing::warn!("no pages to draw");
            return;
        };
        self.draw_tab(painter, self.active);

        let style = page.style();
        if let Some(tab) = b.tabs.get(self.active) {
            if b.outline > 0.0 {
                if tab.x0 > 0.0 {
                    painter.fill(Rect::from_edges(0.0, b.bar_y0, tab.x0 + b.outline, b.bar_y1), style.outline, 0.0);
                }
                if tab.x1 < b.width {
                    painter.fill(Rect::from_edges(tab.x1 - b.outline, b.bar_y0, b.width, b.bar_y1), style.outline, 0.0);
                }
            }
        }
        painter.gradient(self.page_area(), style.fill1, style.fill2.unwrap_or(style.fill1), 0.0);
        if let (Some(label), Some(Some((x, y, size)))) = (&style.label, b.labels.get(self.active)) {
            if *size > 1.0 {
                painter.text_line(*x, *y, *size, label, style.label_color);
            }
        }
    }

    pub fn render(&self, painter: &mut Painter<'_>, frame: &Frame<'_>) {
        self.render_chrome(painter);
        if let Some(page) = self.active_page() {
            page.render(painter, frame);
        }
    }
}
