/*
 * The identity base shared by every wrapper.
 *
 * A `Window` exclusively owns the binding to one native handle. It is bound
 * exactly once (by the creation hook for custom windows, or by a control
 * wrapper attaching to an existing handle) and detached exactly once, either
 * because the native window was destroyed or because the owning object is
 * being torn down. All accessors require an attached handle; using one on an
 * unbound or detached window is a programming error and panics.
 */

use std::cell::Cell;

use crate::error;
use crate::geometry::{Dimension, Point, Rect, WindowHandle};
use crate::message::{Message, Reply};
use crate::native::{self, WindowStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Attached(WindowHandle),
    Detached,
}

#[derive(Debug)]
pub struct Window {
    binding: Cell<Binding>,
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}

impl Window {
    pub const fn new() -> Self {
        Self {
            binding: Cell::new(Binding::Unbound),
        }
    }

    pub fn state(&self) -> Binding {
        self.binding.get()
    }

    pub fn try_handle(&self) -> Option<WindowHandle> {
        match self.binding.get() {
            Binding::Attached(handle) => Some(handle),
            Binding::Unbound | Binding::Detached => None,
        }
    }

    pub fn handle(&self) -> WindowHandle {
        match self.binding.get() {
            Binding::Attached(handle) => handle,
            state => panic!("Window: handle requested while {state:?}"),
        }
    }

    /// Binds this window to `handle`. Panics unless the window is still unbound.
    pub fn bind(&self, handle: WindowHandle) {
        match self.binding.get() {
            Binding::Unbound => self.binding.set(Binding::Attached(handle)),
            state => panic!("Window: cannot bind {handle:?} while {state:?}"),
        }
    }

    /// Ends the binding and returns the handle it held, if any.
    pub fn detach(&self) -> Option<WindowHandle> {
        let previous = self.try_handle();
        if previous.is_some() {
            self.binding.set(Binding::Detached);
        }
        previous
    }

    pub fn size(&self) -> Dimension {
        native::system().window_rect(self.handle()).size
    }

    pub fn set_size(&self, size: Dimension) {
        native::system().move_window(self.handle(), None, Some(size));
    }

    pub fn client_size(&self) -> Dimension {
        native::system().client_size(self.handle())
    }

    /*
     * Grows the outer size by the frame and by the gutter of every visible
     * scrollbar: a vertical bar takes width, a horizontal bar takes height.
     */
    pub fn set_client_size(&self, client: Dimension) {
        let handle = self.handle();
        let system = native::system();
        let mut outer = system.outer_size_for_client(handle, client);
        let style = system.style(handle);
        let gutters = system.scroll_bar_metrics();
        if style.contains(WindowStyle::VSCROLL) {
            outer.w += gutters.w;
        }
        if style.contains(WindowStyle::HSCROLL) {
            outer.h += gutters.h;
        }
        system.move_window(handle, None, Some(outer));
    }

    /// Parent-client coordinates for child windows, screen coordinates otherwise.
    pub fn position(&self) -> Point {
        self.bounds().position
    }

    pub fn set_position(&self, position: Point) {
        native::system().move_window(self.handle(), Some(position), None);
    }

    pub fn bounds(&self) -> Rect {
        let handle = self.handle();
        let system = native::system();
        let screen = system.window_rect(handle);
        match self.coordinate_parent(handle) {
            Some(parent) => Rect::from_parts(
                system.screen_to_client(parent, screen.position),
                screen.size,
            ),
            None => screen,
        }
    }

    pub fn set_bounds(&self, bounds: Rect) {
        native::system().move_window(self.handle(), Some(bounds.position), Some(bounds.size));
    }

    pub fn text(&self) -> String {
        native::system().text(self.handle())
    }

    pub fn set_text(&self, text: &str) {
        native::system().set_text(self.handle(), text);
    }

    pub fn is_visible(&self) -> bool {
        native::system().is_visible(self.handle())
    }

    pub fn set_visible(&self, visible: bool) {
        native::system().set_visible(self.handle(), visible);
    }

    pub fn style(&self) -> WindowStyle {
        native::system().style(self.handle())
    }

    pub fn ex_style(&self) -> u32 {
        native::system().ex_style(self.handle())
    }

    pub fn has_style(&self, style: WindowStyle) -> bool {
        self.style().contains(style)
    }

    pub fn class_name(&self) -> String {
        native::system().class_name(self.handle())
    }

    pub fn parent(&self) -> Option<WindowHandle> {
        native::system().parent(self.handle())
    }

    pub fn children(&self) -> Vec<WindowHandle> {
        native::system().children(self.handle())
    }

    /// Bottom-right corner of the union of all children, in client coordinates.
    pub fn extent_of_children(&self) -> Dimension {
        let handle = self.handle();
        let system = native::system();
        system
            .children(handle)
            .into_iter()
            .map(|child| {
                let screen = system.window_rect(child);
                let local = system.screen_to_client(handle, screen.position);
                Rect::from_parts(local, screen.size).bottom_right()
            })
            .fold(Dimension::default(), |extent, corner| {
                Dimension::new(extent.w.max(corner.x), extent.h.max(corner.y))
            })
    }

    /// Sends `message` and re-raises any panic a handler raised while it was delivered.
    pub fn send_message(&self, message: &Message) -> isize {
        let result = native::system().send_message(self.handle(), message);
        error::raise_reported_panic();
        result
    }

    fn coordinate_parent(&self, handle: WindowHandle) -> Option<WindowHandle> {
        let system = native::system();
        if system.style(handle).contains(WindowStyle::CHILD) {
            system.parent(handle)
        } else {
            None
        }
    }
}

/// Capability shared by every managed object that wraps a native window.
pub trait Wrapper: 'static {
    fn window(&self) -> &Window;

    /*
     * Invoked when `parent` reflects a notification this window raised. Return
     * `Reply::Default` for anything not recognized so the parent falls back to
     * default processing.
     */
    fn handle_reflected_message(&self, _parent: WindowHandle, _message: &Message) -> Reply {
        Reply::Default
    }

    /// Window procedure of custom windows. Unused for stock controls.
    fn window_proc(&self, _handle: WindowHandle, message: &Message) -> Reply {
        default_window_proc(message)
    }
}

/// Closing is left to the owner, everything else gets default processing.
pub fn default_window_proc(message: &Message) -> Reply {
    match message {
        Message::Close => Reply::Handled(0),
        _ => Reply::Default,
    }
}
