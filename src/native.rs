/*
 * The boundary between the toolkit core and the native windowing system.
 *
 * `NativeSystem` lists every primitive the core needs. Each UI thread has one
 * installed backend, returned by `system()`. On Windows the default is the
 * Win32 backend in `window_common`; elsewhere it is the in-memory
 * `HeadlessSystem`. Tests install a fresh headless backend explicitly.
 *
 * Backends must not hold internal borrows while calling back into toolkit code
 * (`custom_window::attach_on_create`, `custom_window::deliver`), since those
 * callbacks are free to call straight back into the backend.
 */

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::error::Result as PlatformResult;
use crate::geometry::{AcceleratorHandle, ClassToken, Dimension, Point, Rect, WindowHandle};
use crate::message::{Fetched, Message, QueuedMessage, ScrollBar};

bitflags! {
    /// Window style bits, numbered as on Win32.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowStyle: u32 {
        const POPUP = 0x8000_0000;
        const CHILD = 0x4000_0000;
        const MINIMIZE = 0x2000_0000;
        const VISIBLE = 0x1000_0000;
        const DISABLED = 0x0800_0000;
        const CLIPSIBLINGS = 0x0400_0000;
        const CLIPCHILDREN = 0x0200_0000;
        const MAXIMIZE = 0x0100_0000;
        const BORDER = 0x0080_0000;
        const DLGFRAME = 0x0040_0000;
        const VSCROLL = 0x0020_0000;
        const HSCROLL = 0x0010_0000;
        const SYSMENU = 0x0008_0000;
        const THICKFRAME = 0x0004_0000;
        const MINIMIZEBOX = 0x0002_0000;
        const MAXIMIZEBOX = 0x0001_0000;

        const CAPTION = Self::BORDER.bits() | Self::DLGFRAME.bits();
        const OVERLAPPEDWINDOW = Self::CAPTION.bits()
            | Self::SYSMENU.bits()
            | Self::THICKFRAME.bits()
            | Self::MINIMIZEBOX.bits()
            | Self::MAXIMIZEBOX.bits();
    }
}

impl WindowStyle {
    /// Style bit that makes the given scrollbar visible.
    pub const fn scroll_bar(bar: ScrollBar) -> WindowStyle {
        match bar {
            ScrollBar::Horizontal => WindowStyle::HSCROLL,
            ScrollBar::Vertical => WindowStyle::VSCROLL,
        }
    }
}

/// Everything a backend needs to create one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateParams {
    pub style: WindowStyle,
    pub ex_style: u32,
    pub parent: Option<WindowHandle>,
    /// `None` lets the system choose. Children are placed in parent-client coordinates.
    pub rect: Option<Rect>,
    pub text: String,
}

impl CreateParams {
    pub fn top_level(text: impl Into<String>) -> Self {
        Self {
            style: WindowStyle::OVERLAPPEDWINDOW | WindowStyle::CLIPCHILDREN,
            ex_style: 0,
            parent: None,
            rect: None,
            text: text.into(),
        }
    }

    pub fn child(parent: WindowHandle, rect: Rect) -> Self {
        Self {
            style: WindowStyle::CHILD | WindowStyle::VISIBLE,
            ex_style: 0,
            parent: Some(parent),
            rect: Some(rect),
            text: String::new(),
        }
    }

    pub fn with_style(mut self, style: WindowStyle) -> Self {
        self.style |= style;
        self
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Snapshot of one native scrollbar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollInfo {
    pub min: i32,
    pub max: i32,
    pub page: i32,
    pub pos: i32,
    pub track_pos: i32,
}

pub trait NativeSystem {
    /// Registers a window class whose messages are routed to `custom_window::deliver`.
    /// Registering a name the backend already knows returns the existing token.
    fn register_class(&self, name: &str) -> PlatformResult<ClassToken>;
    fn create_window(&self, class_name: &str, params: &CreateParams)
    -> PlatformResult<WindowHandle>;
    fn destroy_window(&self, handle: WindowHandle) -> PlatformResult<()>;
    fn is_window(&self, handle: WindowHandle) -> bool;

    fn parent(&self, handle: WindowHandle) -> Option<WindowHandle>;
    fn children(&self, handle: WindowHandle) -> Vec<WindowHandle>;

    /// Outer rectangle in screen coordinates.
    fn window_rect(&self, handle: WindowHandle) -> Rect;
    fn client_size(&self, handle: WindowHandle) -> Dimension;
    fn screen_to_client(&self, handle: WindowHandle, point: Point) -> Point;
    /// Moves and/or resizes. `position` is in parent-client coordinates for children.
    fn move_window(&self, handle: WindowHandle, position: Option<Point>, size: Option<Dimension>);
    /// Outer size for a given client size, counting the frame but not scrollbars.
    fn outer_size_for_client(&self, handle: WindowHandle, client: Dimension) -> Dimension;

    fn style(&self, handle: WindowHandle) -> WindowStyle;
    fn ex_style(&self, handle: WindowHandle) -> u32;
    fn class_name(&self, handle: WindowHandle) -> String;
    fn text(&self, handle: WindowHandle) -> String;
    fn set_text(&self, handle: WindowHandle, text: &str);
    fn is_visible(&self, handle: WindowHandle) -> bool;
    fn set_visible(&self, handle: WindowHandle, visible: bool);

    /// Delivers `message` synchronously and returns the native result.
    fn send_message(&self, handle: WindowHandle, message: &Message) -> isize;

    /// Width of a vertical scrollbar and height of a horizontal one.
    fn scroll_bar_metrics(&self) -> Dimension;
    fn show_scroll_bar(&self, handle: WindowHandle, bar: ScrollBar, show: bool);
    fn scroll_info(&self, handle: WindowHandle, bar: ScrollBar) -> ScrollInfo;
    /// Sets the track range to `[0, max]` and the page size.
    fn set_scroll_range(&self, handle: WindowHandle, bar: ScrollBar, max: i32, page: i32);
    /// Moves the thumb and returns the position the scrollbar actually accepted.
    fn set_scroll_position(&self, handle: WindowHandle, bar: ScrollBar, position: i32) -> i32;
    /// Shifts the client content (and children) by `delta`.
    fn scroll_window(&self, handle: WindowHandle, delta: Point);
    fn update_window(&self, handle: WindowHandle);

    /// Blocks for the next queued message.
    fn get_message(&self) -> PlatformResult<Fetched>;
    fn is_dialog_message(&self, dialog: WindowHandle, message: &QueuedMessage) -> bool;
    fn translate_accelerator(&self, table: AcceleratorHandle, message: &QueuedMessage) -> bool;
    fn translate_and_dispatch(&self, message: &QueuedMessage);
    fn post_quit(&self, exit_code: i32);
}

thread_local! {
    static INSTALLED: RefCell<Option<Rc<dyn NativeSystem>>> = const { RefCell::new(None) };
}

/// Makes `system` the backend for the calling thread and returns the previous one.
pub fn install(system: Rc<dyn NativeSystem>) -> Option<Rc<dyn NativeSystem>> {
    INSTALLED.with(|slot| slot.borrow_mut().replace(system))
}

/// The backend of the calling thread, installing the platform default on first use.
pub fn system() -> Rc<dyn NativeSystem> {
    if let Some(system) = INSTALLED.with(|slot| slot.borrow().clone()) {
        return system;
    }
    let system = platform_default();
    install(Rc::clone(&system));
    system
}

#[cfg(target_os = "windows")]
fn platform_default() -> Rc<dyn NativeSystem> {
    log::debug!("Native: installing Win32 backend for this thread");
    Rc::new(crate::window_common::Win32System::new())
}

#[cfg(not(target_os = "windows"))]
fn platform_default() -> Rc<dyn NativeSystem> {
    log::debug!("Native: no native windowing system, installing headless backend");
    Rc::new(crate::headless::HeadlessSystem::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapped_window_style_matches_native_value() {
        assert_eq!(WindowStyle::OVERLAPPEDWINDOW.bits(), 0x00CF_0000);
        assert_eq!(WindowStyle::CAPTION.bits(), 0x00C0_0000);
    }

    #[test]
    fn child_params_are_visible_children_of_parent() {
        // Arrange
        let parent = WindowHandle::from_raw(0x1234).unwrap();
        // Act
        let params = CreateParams::child(parent, Rect::new(1, 2, 3, 4))
            .with_style(WindowStyle::HSCROLL | WindowStyle::VSCROLL);
        // Assert
        assert!(params.style.contains(WindowStyle::CHILD | WindowStyle::VISIBLE));
        assert!(params.style.contains(WindowStyle::scroll_bar(ScrollBar::Vertical)));
        assert_eq!(params.parent, Some(parent));
    }

    #[test]
    fn installed_backend_is_returned_to_the_same_thread() {
        let headless: Rc<dyn NativeSystem> = Rc::new(crate::headless::HeadlessSystem::new());
        install(Rc::clone(&headless));
        assert!(std::ptr::addr_eq(
            Rc::as_ptr(&system()),
            Rc::as_ptr(&headless)
        ));
    }
}
