/*
 * In-memory implementation of `NativeSystem`.
 *
 * It models just enough of the Win32 window manager for the core to run
 * without a display: a window tree with styles, text and rectangles, frame
 * and scrollbar gutters when computing client sizes, scrollbar ranges that
 * clamp the thumb the way native scrollbars do, a FIFO message queue, and
 * synchronous delivery to windows of registered classes. Default window
 * processing is not emulated: an unhandled message simply yields 0.
 *
 * Dialog and accelerator matching are driven by predicates supplied by the
 * caller, and every routing decision is appended to an event log, so message
 * pump behavior can be asserted precisely.
 */

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::custom_window;
use crate::error::{PlatformError, Result as PlatformResult};
use crate::geometry::{AcceleratorHandle, ClassToken, Dimension, Point, Rect, WindowHandle};
use crate::message::{Fetched, Message, QueuedMessage, RawMessage, Reply, ScrollBar, SizingEdge};
use crate::native::{self, CreateParams, NativeSystem, ScrollInfo, WindowStyle};

const SCROLL_BAR_METRICS: Dimension = Dimension::new(17, 17);
const DEFAULT_TOP_LEVEL_RECT: Rect = Rect::new(100, 100, 640, 480);
const FIRST_HANDLE: usize = 0x0001_0000;
const HANDLE_STRIDE: usize = 4;
const FIRST_CLASS_ATOM: u32 = 0xC000;

/// One routing decision taken by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessEvent {
    DialogOffered(WindowHandle, RawMessage),
    AcceleratorOffered(AcceleratorHandle, RawMessage),
    Dispatched(RawMessage),
    Scrolled(WindowHandle, Point),
    Destroyed(WindowHandle),
}

type DialogMatcher = Rc<dyn Fn(WindowHandle, &QueuedMessage) -> bool>;
type AcceleratorMatcher = Rc<dyn Fn(AcceleratorHandle, &QueuedMessage) -> bool>;
type DispatchHook = Rc<dyn Fn(&QueuedMessage)>;

#[derive(Default)]
struct Hooks {
    dialog_matcher: Option<DialogMatcher>,
    accelerator_matcher: Option<AcceleratorMatcher>,
    on_dispatch: Option<DispatchHook>,
}

#[derive(Debug, Clone)]
struct HeadlessWindow {
    class_name: String,
    routed: bool,
    parent: Option<WindowHandle>,
    style: WindowStyle,
    ex_style: u32,
    text: String,
    /// Screen coordinates for top-level windows, parent-client for children.
    rect: Rect,
    horizontal: ScrollInfo,
    vertical: ScrollInfo,
}

impl HeadlessWindow {
    fn scroll(&self, bar: ScrollBar) -> &ScrollInfo {
        match bar {
            ScrollBar::Horizontal => &self.horizontal,
            ScrollBar::Vertical => &self.vertical,
        }
    }

    fn scroll_mut(&mut self, bar: ScrollBar) -> &mut ScrollInfo {
        match bar {
            ScrollBar::Horizontal => &mut self.horizontal,
            ScrollBar::Vertical => &mut self.vertical,
        }
    }

    fn is_child(&self) -> bool {
        self.style.contains(WindowStyle::CHILD) && self.parent.is_some()
    }

    /// Frame thickness as `(left, top, right, bottom)`.
    fn frame(&self) -> (i32, i32, i32, i32) {
        if self.style.contains(WindowStyle::CAPTION) {
            (8, 31, 8, 8)
        } else if self.style.contains(WindowStyle::BORDER) {
            (1, 1, 1, 1)
        } else {
            (0, 0, 0, 0)
        }
    }

    fn client_size(&self) -> Dimension {
        let (left, top, right, bottom) = self.frame();
        let mut w = self.rect.size.w - left - right;
        let mut h = self.rect.size.h - top - bottom;
        if self.style.contains(WindowStyle::VSCROLL) {
            w -= SCROLL_BAR_METRICS.w;
        }
        if self.style.contains(WindowStyle::HSCROLL) {
            h -= SCROLL_BAR_METRICS.h;
        }
        Dimension::new(w.max(0), h.max(0))
    }
}

/// Position a scrollbar accepts for `requested`, as native scrollbars clamp it.
fn clamp_thumb(info: &ScrollInfo, requested: i32) -> i32 {
    let upper = (info.max - (info.page - 1).max(0)).max(info.min);
    requested.clamp(info.min, upper)
}

struct State {
    next_handle: usize,
    next_atom: u32,
    next_accelerator: usize,
    classes: HashMap<String, ClassToken>,
    windows: BTreeMap<WindowHandle, HeadlessWindow>,
    queue: VecDeque<Fetched>,
    events: Vec<HeadlessEvent>,
    destroyed: usize,
}

impl State {
    fn window(&self, handle: WindowHandle) -> Option<&HeadlessWindow> {
        self.windows.get(&handle)
    }

    fn screen_position(&self, handle: WindowHandle) -> Point {
        match self.window(handle) {
            Some(window) if window.is_child() => match window.parent {
                Some(parent) => self.client_origin(parent) + window.rect.position,
                None => window.rect.position,
            },
            Some(window) => window.rect.position,
            None => Point::ORIGIN,
        }
    }

    fn client_origin(&self, handle: WindowHandle) -> Point {
        let (left, top, _, _) = self.window(handle).map_or((0, 0, 0, 0), HeadlessWindow::frame);
        self.screen_position(handle).offset(left, top)
    }

    fn children(&self, handle: WindowHandle) -> Vec<WindowHandle> {
        self.windows
            .iter()
            .filter(|(_, window)| window.parent == Some(handle))
            .map(|(child, _)| *child)
            .collect()
    }

    /// `handle` followed by all its descendants, parents before children.
    fn subtree(&self, handle: WindowHandle) -> Vec<WindowHandle> {
        let mut order = vec![handle];
        let mut cursor = 0;
        while cursor < order.len() {
            let next = self.children(order[cursor]);
            order.extend(next);
            cursor += 1;
        }
        order
    }

    fn routed_client_size(&self, handle: WindowHandle) -> Option<Dimension> {
        self.window(handle)
            .filter(|window| window.routed)
            .map(HeadlessWindow::client_size)
    }
}

pub struct HeadlessSystem {
    state: RefCell<State>,
    hooks: RefCell<Hooks>,
}

impl Default for HeadlessSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSystem {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                next_handle: FIRST_HANDLE,
                next_atom: FIRST_CLASS_ATOM,
                next_accelerator: FIRST_HANDLE,
                classes: HashMap::new(),
                windows: BTreeMap::new(),
                queue: VecDeque::new(),
                events: Vec::new(),
                destroyed: 0,
            }),
            hooks: RefCell::new(Hooks::default()),
        }
    }

    /// Creates a fresh backend and installs it for the calling thread.
    pub fn install() -> Rc<HeadlessSystem> {
        let system = Rc::new(HeadlessSystem::new());
        native::install(system.clone());
        system
    }

    /// Creates a window that never routes messages, whatever its class.
    pub fn create_stock_window(
        &self,
        class_name: &str,
        params: &CreateParams,
    ) -> PlatformResult<WindowHandle> {
        self.create(class_name, params, false)
    }

    pub fn allocate_accelerator(&self) -> AcceleratorHandle {
        let mut state = self.state.borrow_mut();
        let raw = state.next_accelerator;
        state.next_accelerator += HANDLE_STRIDE;
        AcceleratorHandle(raw)
    }

    pub fn post(&self, target: Option<WindowHandle>, message: &Message) {
        self.post_queued(QueuedMessage::new(target, message.encode()));
    }

    pub fn post_queued(&self, message: QueuedMessage) {
        self.state
            .borrow_mut()
            .queue
            .push_back(Fetched::Message(message));
    }

    pub fn set_dialog_matcher(&self, matcher: impl Fn(WindowHandle, &QueuedMessage) -> bool + 'static) {
        self.hooks.borrow_mut().dialog_matcher = Some(Rc::new(matcher));
    }

    pub fn set_accelerator_matcher(
        &self,
        matcher: impl Fn(AcceleratorHandle, &QueuedMessage) -> bool + 'static,
    ) {
        self.hooks.borrow_mut().accelerator_matcher = Some(Rc::new(matcher));
    }

    /// Runs `hook` after every message that reaches default dispatch.
    pub fn set_dispatch_hook(&self, hook: impl Fn(&QueuedMessage) + 'static) {
        self.hooks.borrow_mut().on_dispatch = Some(Rc::new(hook));
    }

    /// Simulates the user dragging the thumb of `bar` to `position`.
    pub fn set_track_position(&self, handle: WindowHandle, bar: ScrollBar, position: i32) {
        if let Some(window) = self.state.borrow_mut().windows.get_mut(&handle) {
            window.scroll_mut(bar).track_pos = position;
        }
    }

    /*
     * Simulates one step of the user dragging `edge` of `handle` towards
     * `proposed`. The window's size policy may rewrite the rectangle before it
     * is applied; the applied rectangle is returned.
     */
    pub fn drag_resize(&self, handle: WindowHandle, edge: SizingEdge, proposed: Rect) -> Rect {
        let applied = match self.deliver(handle, &Message::Sizing { edge, rect: proposed }) {
            Reply::Resized(rect) => rect,
            Reply::Handled(_) | Reply::Default => proposed,
        };
        self.move_window(handle, Some(applied.position), Some(applied.size));
        applied
    }

    pub fn is_scroll_bar_visible(&self, handle: WindowHandle, bar: ScrollBar) -> bool {
        self.style(handle).contains(WindowStyle::scroll_bar(bar))
    }

    pub fn events(&self) -> Vec<HeadlessEvent> {
        self.state.borrow().events.clone()
    }

    pub fn take_events(&self) -> Vec<HeadlessEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    pub fn registered_class_count(&self) -> usize {
        self.state.borrow().classes.len()
    }

    pub fn window_count(&self) -> usize {
        self.state.borrow().windows.len()
    }

    pub fn destroyed_count(&self) -> usize {
        self.state.borrow().destroyed
    }

    fn create(
        &self,
        class_name: &str,
        params: &CreateParams,
        route: bool,
    ) -> PlatformResult<WindowHandle> {
        let handle = {
            let mut state = self.state.borrow_mut();
            if let Some(parent) = params.parent
                && !state.windows.contains_key(&parent)
            {
                return Err(PlatformError::InvalidHandle(format!(
                    "parent {parent:?} of new '{class_name}' window does not exist"
                )));
            }
            let raw = state.next_handle;
            state.next_handle += HANDLE_STRIDE;
            let handle = WindowHandle(raw);
            let rect = params.rect.unwrap_or(if params.parent.is_some() {
                Rect::default()
            } else {
                DEFAULT_TOP_LEVEL_RECT
            });
            let routed = route && state.classes.contains_key(class_name);
            state.windows.insert(
                handle,
                HeadlessWindow {
                    class_name: class_name.to_string(),
                    routed,
                    parent: params.parent,
                    style: params.style,
                    ex_style: params.ex_style,
                    text: params.text.clone(),
                    rect,
                    horizontal: ScrollInfo::default(),
                    vertical: ScrollInfo::default(),
                },
            );
            if !routed {
                return Ok(handle);
            }
            handle
        };

        custom_window::attach_on_create(handle, class_name);
        if custom_window::deliver(handle, &Message::Create) == Reply::Handled(-1) {
            log::debug!("Headless: '{class_name}' {handle:?} refused creation");
            self.destroy_window(handle)?;
            return Err(PlatformError::WindowCreationFailed(format!(
                "'{class_name}' window refused creation"
            )));
        }
        self.notify_resized(handle);
        Ok(handle)
    }

    fn deliver(&self, handle: WindowHandle, message: &Message) -> Reply {
        let routed = self
            .state
            .borrow()
            .window(handle)
            .is_some_and(|window| window.routed);
        if routed {
            custom_window::deliver(handle, message)
        } else {
            Reply::Default
        }
    }

    fn notify_resized(&self, handle: WindowHandle) {
        let size = self.state.borrow().routed_client_size(handle);
        if let Some(size) = size {
            custom_window::deliver(handle, &Message::Size { kind: 0, size });
        }
    }

    fn with_window<R>(&self, handle: WindowHandle, default: R, f: impl FnOnce(&HeadlessWindow) -> R) -> R {
        match self.state.borrow().window(handle) {
            Some(window) => f(window),
            None => {
                log::warn!("Headless: query on unknown window {handle:?}");
                default
            }
        }
    }

    fn update_window_state(&self, handle: WindowHandle, f: impl FnOnce(&mut HeadlessWindow)) {
        match self.state.borrow_mut().windows.get_mut(&handle) {
            Some(window) => f(window),
            None => log::warn!("Headless: update of unknown window {handle:?}"),
        }
    }
}

impl NativeSystem for HeadlessSystem {
    fn register_class(&self, name: &str) -> PlatformResult<ClassToken> {
        let mut state = self.state.borrow_mut();
        if let Some(token) = state.classes.get(name) {
            return Ok(*token);
        }
        let token = ClassToken(state.next_atom);
        state.next_atom += 1;
        state.classes.insert(name.to_string(), token);
        Ok(token)
    }

    fn create_window(
        &self,
        class_name: &str,
        params: &CreateParams,
    ) -> PlatformResult<WindowHandle> {
        self.create(class_name, params, true)
    }

    fn destroy_window(&self, handle: WindowHandle) -> PlatformResult<()> {
        let doomed = {
            let state = self.state.borrow();
            if state.window(handle).is_none() {
                return Err(PlatformError::InvalidHandle(format!(
                    "{handle:?} is not a window"
                )));
            }
            state.subtree(handle)
        };
        for window in &doomed {
            self.deliver(*window, &Message::Destroy);
        }
        let mut state = self.state.borrow_mut();
        for window in doomed {
            if state.windows.remove(&window).is_some() {
                state.destroyed += 1;
                state.events.push(HeadlessEvent::Destroyed(window));
            }
        }
        Ok(())
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        self.state.borrow().windows.contains_key(&handle)
    }

    fn parent(&self, handle: WindowHandle) -> Option<WindowHandle> {
        self.with_window(handle, None, |window| window.parent)
    }

    fn children(&self, handle: WindowHandle) -> Vec<WindowHandle> {
        self.state.borrow().children(handle)
    }

    fn window_rect(&self, handle: WindowHandle) -> Rect {
        let state = self.state.borrow();
        match state.window(handle) {
            Some(window) => Rect::from_parts(state.screen_position(handle), window.rect.size),
            None => {
                log::warn!("Headless: window_rect of unknown window {handle:?}");
                Rect::default()
            }
        }
    }

    fn client_size(&self, handle: WindowHandle) -> Dimension {
        self.with_window(handle, Dimension::default(), HeadlessWindow::client_size)
    }

    fn screen_to_client(&self, handle: WindowHandle, point: Point) -> Point {
        point - self.state.borrow().client_origin(handle)
    }

    fn move_window(&self, handle: WindowHandle, position: Option<Point>, size: Option<Dimension>) {
        let mut resized = false;
        self.update_window_state(handle, |window| {
            if let Some(position) = position {
                window.rect.position = position;
            }
            if let Some(size) = size
                && size != window.rect.size
            {
                window.rect.size = size;
                resized = true;
            }
        });
        if resized {
            self.notify_resized(handle);
        }
    }

    fn outer_size_for_client(&self, handle: WindowHandle, client: Dimension) -> Dimension {
        let (left, top, right, bottom) = self.with_window(handle, (0, 0, 0, 0), HeadlessWindow::frame);
        Dimension::new(client.w + left + right, client.h + top + bottom)
    }

    fn style(&self, handle: WindowHandle) -> WindowStyle {
        self.with_window(handle, WindowStyle::empty(), |window| window.style)
    }

    fn ex_style(&self, handle: WindowHandle) -> u32 {
        self.with_window(handle, 0, |window| window.ex_style)
    }

    fn class_name(&self, handle: WindowHandle) -> String {
        self.with_window(handle, String::new(), |window| window.class_name.clone())
    }

    fn text(&self, handle: WindowHandle) -> String {
        self.with_window(handle, String::new(), |window| window.text.clone())
    }

    fn set_text(&self, handle: WindowHandle, text: &str) {
        self.update_window_state(handle, |window| window.text = text.to_string());
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.style(handle).contains(WindowStyle::VISIBLE)
    }

    fn set_visible(&self, handle: WindowHandle, visible: bool) {
        self.update_window_state(handle, |window| {
            window.style.set(WindowStyle::VISIBLE, visible)
        });
    }

    fn send_message(&self, handle: WindowHandle, message: &Message) -> isize {
        if !self.is_window(handle) {
            log::warn!("Headless: {message:?} sent to unknown window {handle:?}");
            return 0;
        }
        match self.deliver(handle, message) {
            Reply::Handled(result) => result,
            Reply::Resized(_) => 1,
            Reply::Default => 0,
        }
    }

    fn scroll_bar_metrics(&self) -> Dimension {
        SCROLL_BAR_METRICS
    }

    /* Toggling a scrollbar changes the client area, which is reported as a resize. */
    fn show_scroll_bar(&self, handle: WindowHandle, bar: ScrollBar, show: bool) {
        let flag = WindowStyle::scroll_bar(bar);
        let mut changed = false;
        self.update_window_state(handle, |window| {
            if window.style.contains(flag) != show {
                window.style.set(flag, show);
                changed = true;
            }
        });
        if changed {
            self.notify_resized(handle);
        }
    }

    fn scroll_info(&self, handle: WindowHandle, bar: ScrollBar) -> ScrollInfo {
        self.with_window(handle, ScrollInfo::default(), |window| *window.scroll(bar))
    }

    fn set_scroll_range(&self, handle: WindowHandle, bar: ScrollBar, max: i32, page: i32) {
        self.update_window_state(handle, |window| {
            let info = window.scroll_mut(bar);
            info.min = 0;
            info.max = max;
            info.page = page.max(0);
            info.pos = clamp_thumb(info, info.pos);
            info.track_pos = info.pos;
        });
    }

    fn set_scroll_position(&self, handle: WindowHandle, bar: ScrollBar, position: i32) -> i32 {
        let mut accepted = 0;
        self.update_window_state(handle, |window| {
            let info = window.scroll_mut(bar);
            info.pos = clamp_thumb(info, position);
            info.track_pos = info.pos;
            accepted = info.pos;
        });
        accepted
    }

    /* Moves the children along with the content, as native scrolling does. */
    fn scroll_window(&self, handle: WindowHandle, delta: Point) {
        let mut state = self.state.borrow_mut();
        for child in state.children(handle) {
            if let Some(window) = state.windows.get_mut(&child) {
                window.rect.position = window.rect.position + delta;
            }
        }
        state.events.push(HeadlessEvent::Scrolled(handle, delta));
    }

    fn update_window(&self, _handle: WindowHandle) {}

    fn get_message(&self) -> PlatformResult<Fetched> {
        self.state
            .borrow_mut()
            .queue
            .pop_front()
            .ok_or_else(|| PlatformError::MessageLoop("headless message queue is empty".to_string()))
    }

    fn is_dialog_message(&self, dialog: WindowHandle, message: &QueuedMessage) -> bool {
        self.state
            .borrow_mut()
            .events
            .push(HeadlessEvent::DialogOffered(dialog, message.raw));
        let matcher = self.hooks.borrow().dialog_matcher.clone();
        matcher.is_some_and(|matches| matches(dialog, message))
    }

    fn translate_accelerator(&self, table: AcceleratorHandle, message: &QueuedMessage) -> bool {
        self.state
            .borrow_mut()
            .events
            .push(HeadlessEvent::AcceleratorOffered(table, message.raw));
        let matcher = self.hooks.borrow().accelerator_matcher.clone();
        matcher.is_some_and(|matches| matches(table, message))
    }

    fn translate_and_dispatch(&self, message: &QueuedMessage) {
        self.state
            .borrow_mut()
            .events
            .push(HeadlessEvent::Dispatched(message.raw));
        if let Some(target) = message.target {
            let decoded = Message::decode(message.raw, |_| None);
            self.deliver(target, &decoded);
        }
        let hook = self.hooks.borrow().on_dispatch.clone();
        if let Some(hook) = hook {
            hook(message);
        }
    }

    fn post_quit(&self, exit_code: i32) {
        self.state
            .borrow_mut()
            .queue
            .push_back(Fetched::Quit(exit_code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_level(system: &HeadlessSystem) -> WindowHandle {
        system
            .create_stock_window(
                "frame",
                &CreateParams::top_level("top").with_rect(Rect::new(0, 0, 400, 300)),
            )
            .unwrap()
    }

    #[test]
    fn thumb_is_clamped_like_a_native_scrollbar() {
        // Arrange
        let system = HeadlessSystem::new();
        let window = top_level(&system);
        system.set_scroll_range(window, ScrollBar::Vertical, 1000, 400);
        // Act
        let accepted = system.set_scroll_position(window, ScrollBar::Vertical, 5000);
        let below = system.set_scroll_position(window, ScrollBar::Vertical, -3);
        // Assert
        assert_eq!(accepted, 601);
        assert_eq!(below, 0);
    }

    #[test]
    fn visible_scrollbars_shrink_the_client_area() {
        let system = HeadlessSystem::new();
        let window = top_level(&system);
        let before = system.client_size(window);
        system.show_scroll_bar(window, ScrollBar::Vertical, true);
        let after = system.client_size(window);
        assert_eq!(after, Dimension::new(before.w - 17, before.h));
        assert!(system.is_scroll_bar_visible(window, ScrollBar::Vertical));
    }

    #[test]
    fn destroying_a_parent_destroys_its_children() {
        // Arrange
        let system = HeadlessSystem::new();
        let parent = top_level(&system);
        let child = system
            .create_stock_window("STATIC", &CreateParams::child(parent, Rect::new(0, 0, 5, 5)))
            .unwrap();
        // Act
        system.destroy_window(parent).unwrap();
        // Assert
        assert!(!system.is_window(child));
        assert_eq!(
            system.events(),
            vec![
                HeadlessEvent::Destroyed(parent),
                HeadlessEvent::Destroyed(child)
            ]
        );
        assert!(system.destroy_window(parent).is_err());
    }

    #[test]
    fn queue_yields_messages_then_quit_then_error() {
        let system = HeadlessSystem::new();
        system.post(None, &Message::Close);
        system.post_quit(3);
        assert!(matches!(system.get_message(), Ok(Fetched::Message(_))));
        assert_eq!(system.get_message().unwrap(), Fetched::Quit(3));
        assert!(matches!(
            system.get_message(),
            Err(PlatformError::MessageLoop(_))
        ));
    }

    #[test]
    fn scrolling_moves_children_with_the_content() {
        let system = HeadlessSystem::new();
        let parent = top_level(&system);
        let child = system
            .create_stock_window("STATIC", &CreateParams::child(parent, Rect::new(50, 60, 5, 5)))
            .unwrap();
        system.scroll_window(parent, Point::new(-10, -20));
        let origin = system.window_rect(parent).position.offset(8, 31);
        assert_eq!(
            system.screen_to_client(parent, system.window_rect(child).position),
            Point::new(40, 40)
        );
        assert_eq!(system.window_rect(child).position, origin.offset(40, 40));
    }

    #[test]
    fn registering_a_known_name_returns_its_token() {
        let system = HeadlessSystem::new();
        let first = system.register_class("x").unwrap();
        assert_eq!(system.register_class("x").unwrap(), first);
        assert_ne!(system.register_class("y").unwrap(), first);
    }
}
