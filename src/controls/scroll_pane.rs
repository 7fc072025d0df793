/*
 * A child window that scrolls a logical content area larger than itself.
 *
 * The pane keeps its two scrollbars consistent with the content `extent`: it
 * decides which bars are visible, sets their track range and page size, and
 * keeps `position` clamped to `[0, extent - viewport]` on both axes. Whenever
 * the position actually changes, the scroll policy is invoked with the new
 * position and the delta; the default policy shifts the client content (and
 * the child windows on it) by the opposite of the delta.
 *
 * Showing or hiding a scrollbar changes the client area and the platform
 * reports that synchronously as a resize, which would re-enter the
 * reconfiguration. The `configuring` flag turns that nested pass into a no-op.
 */

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::custom_window::{self, CustomWindowClass, Owned};
use crate::error::Result as PlatformResult;
use crate::geometry::{Dimension, Point, Rect, WindowHandle};
use crate::message::{Message, Reply, ScrollAction, ScrollBar};
use crate::native::{self, CreateParams, WindowStyle};
use crate::reflection::reflect_message;
use crate::window::{Window, Wrapper, default_window_proc};

/// Page increment sentinel: step by the scrollbar's own page size.
pub const USE_PAGE_SIZE: i32 = -1;

/// Receives `(pane, new_position, delta)` after every effective position change.
pub type ScrollPolicy = Rc<dyn Fn(&ScrollPane, Point, Point)>;

#[derive(Debug, Clone, Copy)]
struct ScrollState {
    extent: Dimension,
    position: Point,
    line_increment: Dimension,
    page_increment: Dimension,
    always_on: bool,
}

impl Default for ScrollState {
    fn default() -> Self {
        Self {
            extent: Dimension::default(),
            position: Point::ORIGIN,
            line_increment: Dimension::new(1, 1),
            page_increment: Dimension::new(USE_PAGE_SIZE, USE_PAGE_SIZE),
            always_on: false,
        }
    }
}

pub struct ScrollPane {
    window: Window,
    state: RefCell<ScrollState>,
    policy: RefCell<Option<ScrollPolicy>>,
    configuring: Cell<bool>,
}

/* Clears the reentry flag on every exit path. */
struct ConfiguringGuard<'a>(&'a Cell<bool>);

impl Drop for ConfiguringGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn axis(point: Point, bar: ScrollBar) -> i32 {
    match bar {
        ScrollBar::Horizontal => point.x,
        ScrollBar::Vertical => point.y,
    }
}

fn dimension_axis(size: Dimension, bar: ScrollBar) -> i32 {
    match bar {
        ScrollBar::Horizontal => size.w,
        ScrollBar::Vertical => size.h,
    }
}

fn with_axis(point: Point, bar: ScrollBar, value: i32) -> Point {
    match bar {
        ScrollBar::Horizontal => Point::new(value, point.y),
        ScrollBar::Vertical => Point::new(point.x, value),
    }
}

/*
 * Which bars the as-needed policy shows, given the viewport with no bars
 * visible. A single overflowing axis still needs the other bar when that
 * bar's own gutter makes the remaining axis overflow too.
 */
fn bars_needed(extent: Dimension, full: Dimension, gutters: Dimension) -> (bool, bool) {
    let overflow_w = extent.w > full.w;
    let overflow_h = extent.h > full.h;
    match (overflow_w, overflow_h) {
        (false, false) => (false, false),
        (true, false) => (true, extent.h > full.h - gutters.h),
        (false, true) => (extent.w > full.w - gutters.w, true),
        (true, true) => (true, true),
    }
}

impl ScrollPane {
    /// Creates a visible pane at `rect` (parent-client coordinates) inside `parent`.
    pub fn create(parent: WindowHandle, rect: Rect) -> PlatformResult<Owned<ScrollPane>> {
        let params = CreateParams::child(parent, rect).with_style(
            WindowStyle::CLIPCHILDREN | WindowStyle::HSCROLL | WindowStyle::VSCROLL,
        );
        let pane = custom_window::create(ScrollPane::deferred(), &params)?;
        pane.reconfigure();
        Ok(pane)
    }

    pub fn extent(&self) -> Dimension {
        self.state.borrow().extent
    }

    pub fn set_extent(&self, extent: Dimension) {
        log::trace!("ScrollPane: extent {extent:?}");
        self.state.borrow_mut().extent = extent;
        self.reconfigure();
    }

    /// Sets the extent to the area covered by the current children.
    pub fn fit_extent_to_children(&self) {
        let position = self.position();
        let visible = self.window.extent_of_children();
        // Children sit at content coordinates shifted by the current scroll position.
        self.set_extent(Dimension::new(visible.w + position.x, visible.h + position.y));
    }

    pub fn position(&self) -> Point {
        self.state.borrow().position
    }

    /// Clamps `position`, moves the thumbs, and runs the policy if it changed.
    pub fn set_position(&self, position: Point) {
        let clamped = self.clamp(position);
        let previous = std::mem::replace(&mut self.state.borrow_mut().position, clamped);
        let handle = self.window.handle();
        let system = native::system();
        system.set_scroll_position(handle, ScrollBar::Horizontal, clamped.x);
        system.set_scroll_position(handle, ScrollBar::Vertical, clamped.y);

        let delta = clamped - previous;
        if delta != Point::ORIGIN {
            log::trace!("ScrollPane: position {previous:?} -> {clamped:?}");
            self.notify_scrolled(clamped, delta);
        }
    }

    pub fn always_on(&self) -> bool {
        self.state.borrow().always_on
    }

    pub fn set_always_on(&self, always_on: bool) {
        self.state.borrow_mut().always_on = always_on;
        self.reconfigure();
    }

    pub fn line_increment(&self) -> Dimension {
        self.state.borrow().line_increment
    }

    pub fn set_line_increment(&self, increment: Dimension) {
        self.state.borrow_mut().line_increment = increment;
    }

    /// `USE_PAGE_SIZE` on an axis means "step by the scrollbar page".
    pub fn page_increment(&self) -> Dimension {
        self.state.borrow().page_increment
    }

    pub fn set_page_increment(&self, increment: Dimension) {
        self.state.borrow_mut().page_increment = increment;
    }

    pub fn set_scroll_policy(&self, policy: impl Fn(&ScrollPane, Point, Point) + 'static) {
        *self.policy.borrow_mut() = Some(Rc::new(policy));
    }

    /// Restores the default policy of shifting the content.
    pub fn clear_scroll_policy(&self) {
        self.policy.borrow_mut().take();
    }

    /// Visible client area of the pane.
    pub fn viewport(&self) -> Dimension {
        self.window.client_size()
    }

    fn clamp(&self, position: Point) -> Point {
        let extent = self.extent();
        let viewport = self.viewport();
        Point::new(
            position.x.clamp(0, (extent.w - viewport.w).max(0)),
            position.y.clamp(0, (extent.h - viewport.h).max(0)),
        )
    }

    fn notify_scrolled(&self, position: Point, delta: Point) {
        let policy = self.policy.borrow().clone();
        match policy {
            Some(policy) => policy(self, position, delta),
            None => {
                let handle = self.window.handle();
                let system = native::system();
                system.scroll_window(handle, Point::new(-delta.x, -delta.y));
                system.update_window(handle);
            }
        }
    }

    fn reconfigure(&self) {
        if self.configuring.replace(true) {
            log::trace!("ScrollPane: nested reconfiguration ignored");
            return;
        }
        let guard = ConfiguringGuard(&self.configuring);

        let handle = self.window.handle();
        let system = native::system();
        let ScrollState {
            extent, always_on, ..
        } = *self.state.borrow();

        let (show_h, show_v) = if always_on {
            (true, true)
        } else {
            let gutters = system.scroll_bar_metrics();
            let client = system.client_size(handle);
            let style = system.style(handle);
            let mut full = client;
            if style.contains(WindowStyle::VSCROLL) {
                full.w += gutters.w;
            }
            if style.contains(WindowStyle::HSCROLL) {
                full.h += gutters.h;
            }
            bars_needed(extent, full, gutters)
        };
        system.show_scroll_bar(handle, ScrollBar::Horizontal, show_h);
        system.show_scroll_bar(handle, ScrollBar::Vertical, show_v);

        let viewport = system.client_size(handle);
        system.set_scroll_range(handle, ScrollBar::Horizontal, extent.w, viewport.w);
        system.set_scroll_range(handle, ScrollBar::Vertical, extent.h, viewport.h);
        log::trace!(
            "ScrollPane: extent {extent:?} in viewport {viewport:?}, bars h={show_h} v={show_v}"
        );
        drop(guard);

        self.set_position(self.position());
    }

    /// Applies one scrollbar action on `bar` to the position.
    pub fn handle_scroll(&self, bar: ScrollBar, action: ScrollAction) {
        let handle = self.window.handle();
        let system = native::system();
        let info = system.scroll_info(handle, bar);
        let (line, page) = {
            let state = self.state.borrow();
            let page = dimension_axis(state.page_increment, bar);
            (
                dimension_axis(state.line_increment, bar),
                if page == USE_PAGE_SIZE { info.page } else { page },
            )
        };

        let target = match action {
            ScrollAction::LineUp => info.pos.saturating_sub(line),
            ScrollAction::LineDown => info.pos.saturating_add(line),
            ScrollAction::PageUp => info.pos.saturating_sub(page),
            ScrollAction::PageDown => info.pos.saturating_add(page),
            ScrollAction::ThumbTrack | ScrollAction::ThumbPosition => info.track_pos,
            ScrollAction::Top => info.min,
            ScrollAction::Bottom => info.max,
            ScrollAction::EndScroll | ScrollAction::Other(_) => return,
        };

        let accepted = system.set_scroll_position(handle, bar, target);
        let current = self.position();
        if accepted != axis(current, bar) {
            self.set_position(with_axis(current, bar, accepted));
        }
    }
}

impl Wrapper for ScrollPane {
    fn window(&self) -> &Window {
        &self.window
    }

    fn window_proc(&self, handle: WindowHandle, message: &Message) -> Reply {
        match message {
            Message::Size { .. } => {
                self.reconfigure();
                Reply::Handled(0)
            }
            Message::HScroll {
                action,
                source: None,
                ..
            } => {
                self.handle_scroll(ScrollBar::Horizontal, *action);
                Reply::Handled(0)
            }
            Message::VScroll {
                action,
                source: None,
                ..
            } => {
                self.handle_scroll(ScrollBar::Vertical, *action);
                Reply::Handled(0)
            }
            Message::Command { .. }
            | Message::Notify(_)
            | Message::HScroll { .. }
            | Message::VScroll { .. } => reflect_message(handle, message),
            _ => default_window_proc(message),
        }
    }
}

impl CustomWindowClass for ScrollPane {
    const CLASS_NAME: &'static str = "ctlwrap.ScrollPane";

    fn deferred() -> Self {
        ScrollPane {
            window: Window::new(),
            state: RefCell::new(ScrollState::default()),
            policy: RefCell::new(None),
            configuring: Cell::new(false),
        }
    }
}
