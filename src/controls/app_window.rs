/*
 * Top-level application window.
 *
 * Acts as the reflecting parent for the controls placed on it: notify and
 * scroll messages go straight to the wrapper of the child that raised them,
 * and `WM_COMMAND` is classified as menu, accelerator or control before the
 * command subscribers run (control commands are then reflected as well).
 * While the user drags a border, the size policy may rewrite the proposed
 * rectangle, e.g. to enforce a minimum size or an aspect ratio.
 * Closing only notifies the close subscribers; what happens next is up to the
 * application, typically dropping the `Owned<AppWindow>` or posting quit.
 */

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::custom_window::{self, CustomWindowClass, Owned};
use crate::error::Result as PlatformResult;
use crate::geometry::{Dimension, Rect, WindowHandle};
use crate::message::{CommandEvent, CommandKind, Message, Reply, SizingEdge};
use crate::message_pump;
use crate::native::CreateParams;
use crate::reflection::reflect_message;
use crate::window::{Window, Wrapper, default_window_proc};

type CloseHandler = Rc<dyn Fn(&AppWindow)>;
type CommandHandler = Rc<dyn Fn(&AppWindow, &CommandEvent)>;
type LayoutPolicy = Rc<dyn Fn(&AppWindow, Dimension)>;
type SizePolicy = Rc<dyn Fn(&AppWindow, SizingEdge, Rect) -> Rect>;

pub struct AppWindow {
    window: Window,
    close_handlers: RefCell<Vec<CloseHandler>>,
    command_handlers: RefCell<Vec<CommandHandler>>,
    layout_policy: RefCell<Option<LayoutPolicy>>,
    size_policy: RefCell<Option<SizePolicy>>,
    quit_on_destroy: Cell<bool>,
}

impl AppWindow {
    /// Creates a hidden top-level window. `rect` of `None` lets the system place it.
    pub fn create(title: &str, rect: Option<Rect>) -> PlatformResult<Owned<AppWindow>> {
        let mut params = CreateParams::top_level(title);
        params.rect = rect;
        custom_window::create(AppWindow::deferred(), &params)
    }

    pub fn on_close(&self, handler: impl Fn(&AppWindow) + 'static) {
        self.close_handlers.borrow_mut().push(Rc::new(handler));
    }

    pub fn on_command(&self, handler: impl Fn(&AppWindow, &CommandEvent) + 'static) {
        self.command_handlers.borrow_mut().push(Rc::new(handler));
    }

    /// Subscribes to commands with identifier `id`, whatever their origin.
    pub fn on_command_id(&self, id: u16, handler: impl Fn(&AppWindow) + 'static) {
        self.on_command(move |window, event| {
            if event.id == id {
                handler(window);
            }
        });
    }

    /// Runs `policy` with the new client size whenever the window is resized.
    pub fn set_layout_policy(&self, policy: impl Fn(&AppWindow, Dimension) + 'static) {
        *self.layout_policy.borrow_mut() = Some(Rc::new(policy));
    }

    /// Lets `policy` adjust the outer rectangle proposed while `edge` is dragged.
    pub fn set_size_policy(&self, policy: impl Fn(&AppWindow, SizingEdge, Rect) -> Rect + 'static) {
        *self.size_policy.borrow_mut() = Some(Rc::new(policy));
    }

    /// Posts quit with exit code 0 when the native window is destroyed.
    pub fn set_quit_on_destroy(&self, quit: bool) {
        self.quit_on_destroy.set(quit);
    }

    fn fire_close(&self) {
        let handlers = self.close_handlers.borrow().clone();
        for handler in handlers {
            handler(self);
        }
    }

    fn fire_command(&self, event: &CommandEvent) {
        let handlers = self.command_handlers.borrow().clone();
        for handler in handlers {
            handler(self, event);
        }
    }
}

impl Wrapper for AppWindow {
    fn window(&self) -> &Window {
        &self.window
    }

    fn window_proc(&self, handle: WindowHandle, message: &Message) -> Reply {
        match message {
            Message::Close => {
                log::debug!("AppWindow: close requested for {handle:?}");
                self.fire_close();
                Reply::Handled(0)
            }
            Message::Notify(_) | Message::HScroll { .. } | Message::VScroll { .. } => {
                reflect_message(handle, message)
            }
            Message::Command { .. } => {
                let Some(event) = CommandEvent::from_message(message) else {
                    return Reply::Default;
                };
                log::trace!("AppWindow: {:?} command {}", event.kind, event.id);
                self.fire_command(&event);
                match event.kind {
                    CommandKind::Control => reflect_message(handle, message),
                    CommandKind::Menu | CommandKind::Accelerator => Reply::Handled(0),
                }
            }
            Message::Size { size, .. } => {
                let policy = self.layout_policy.borrow().clone();
                if let Some(policy) = policy {
                    policy(self, *size);
                }
                Reply::Default
            }
            Message::Sizing { edge, rect } => {
                let policy = self.size_policy.borrow().clone();
                match policy {
                    Some(policy) => Reply::Resized(policy(self, *edge, *rect)),
                    None => Reply::Default,
                }
            }
            Message::Destroy => {
                if self.quit_on_destroy.get() {
                    message_pump::post_quit(0);
                }
                Reply::Default
            }
            _ => default_window_proc(message),
        }
    }
}

impl CustomWindowClass for AppWindow {
    const CLASS_NAME: &'static str = "ctlwrap.AppWindow";

    fn deferred() -> Self {
        AppWindow {
            window: Window::new(),
            close_handlers: RefCell::new(Vec::new()),
            command_handlers: RefCell::new(Vec::new()),
            layout_policy: RefCell::new(None),
            size_policy: RefCell::new(None),
            quit_on_destroy: Cell::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association;
    use crate::headless::HeadlessSystem;
    use crate::message::{Fetched, NotifyHeader};
    use crate::native::NativeSystem;

    struct Button {
        window: Window,
        clicks: Cell<u32>,
    }

    impl Wrapper for Button {
        fn window(&self) -> &Window {
            &self.window
        }

        fn handle_reflected_message(&self, _parent: WindowHandle, message: &Message) -> Reply {
            match message {
                Message::Command { code: 0, .. } => {
                    self.clicks.set(self.clicks.get() + 1);
                    Reply::Handled(0)
                }
                _ => Reply::Default,
            }
        }
    }

    fn button_on(system: &HeadlessSystem, parent: WindowHandle) -> Rc<Button> {
        let handle = system
            .create_stock_window("BUTTON", &CreateParams::child(parent, Rect::new(10, 10, 80, 24)))
            .unwrap();
        let button = Rc::new(Button {
            window: Window::new(),
            clicks: Cell::new(0),
        });
        button.window.bind(handle);
        association::attach(handle, &button);
        button
    }

    #[test]
    fn close_notifies_subscribers_and_keeps_the_window() {
        // Arrange
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", None).unwrap();
        let closed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&closed);
        app.on_close(move |_| counter.set(counter.get() + 1));
        // Act
        let result = app.window().send_message(&Message::Close);
        // Assert
        assert_eq!(result, 0);
        assert_eq!(closed.get(), 1);
        assert!(system.is_window(app.window().handle()));
    }

    #[test]
    fn control_command_is_classified_and_reflected_to_the_button() {
        // Arrange
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", Some(Rect::new(0, 0, 300, 200))).unwrap();
        let button = button_on(&system, app.window().handle());
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&kinds);
        app.on_command(move |_, event| seen.borrow_mut().push(event.kind));
        // Act
        app.window().send_message(&Message::Command {
            id: 42,
            code: 0,
            source: button.window.try_handle(),
        });
        // Assert
        assert_eq!(button.clicks.get(), 1);
        assert_eq!(kinds.borrow().as_slice(), &[CommandKind::Control]);
    }

    #[test]
    fn menu_and_accelerator_commands_are_not_reflected() {
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", None).unwrap();
        let button = button_on(&system, app.window().handle());
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        app.on_command_id(7, move |_| counter.set(counter.get() + 1));
        for code in [0, 1] {
            app.window().send_message(&Message::Command {
                id: 7,
                code,
                source: None,
            });
        }
        assert_eq!(fired.get(), 2);
        assert_eq!(button.clicks.get(), 0);
    }

    #[test]
    fn notifications_from_unwrapped_children_fall_back_to_default() {
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", None).unwrap();
        let stock = system
            .create_stock_window(
                "STATIC",
                &CreateParams::child(app.window().handle(), Rect::new(0, 0, 1, 1)),
            )
            .unwrap();
        let reply = app.window_proc(
            app.window().handle(),
            &Message::Notify(NotifyHeader {
                source: stock,
                id: 1,
                code: 2,
                payload: 0,
            }),
        );
        assert_eq!(reply, Reply::Default);
    }

    #[test]
    fn layout_policy_sees_new_client_size() {
        // Arrange
        crate::test_support::init_logging();
        HeadlessSystem::install();
        let app = AppWindow::create("main", Some(Rect::new(0, 0, 300, 200))).unwrap();
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&sizes);
        app.set_layout_policy(move |_, size| seen.borrow_mut().push(size));
        // Act
        app.window().set_client_size(Dimension::new(500, 400));
        // Assert
        assert_eq!(sizes.borrow().as_slice(), &[Dimension::new(500, 400)]);
    }

    #[test]
    fn size_policy_rewrites_the_dragged_rectangle() {
        // Arrange
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", Some(Rect::new(0, 0, 640, 480))).unwrap();
        let edges = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&edges);
        app.set_size_policy(move |_, edge, rect| {
            seen.borrow_mut().push(edge);
            let size = Dimension::new(rect.size.w.max(320), rect.size.h.max(240));
            Rect::from_parts(rect.position, size)
        });
        // Act
        let applied = system.drag_resize(
            app.window().handle(),
            SizingEdge::BottomRight,
            Rect::new(0, 0, 100, 500),
        );
        // Assert
        assert_eq!(applied, Rect::new(0, 0, 320, 500));
        assert_eq!(app.window().size(), Dimension::new(320, 500));
        assert_eq!(edges.borrow().as_slice(), &[SizingEdge::BottomRight]);
    }

    #[test]
    fn dragging_without_size_policy_keeps_the_proposal() {
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", Some(Rect::new(0, 0, 640, 480))).unwrap();
        let proposed = Rect::new(0, 0, 100, 80);
        let applied = system.drag_resize(app.window().handle(), SizingEdge::Left, proposed);
        assert_eq!(applied, proposed);
        assert_eq!(app.window().size(), Dimension::new(100, 80));
    }

    #[test]
    fn quit_on_destroy_posts_quit() {
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let app = AppWindow::create("main", None).unwrap();
        app.set_quit_on_destroy(true);
        drop(app);
        // Dropping the owner detaches first, so the window proc never sees Destroy.
        assert!(system.get_message().is_err());

        let app = AppWindow::create("main", None).unwrap();
        app.set_quit_on_destroy(true);
        system.destroy_window(app.window().handle()).unwrap();
        assert_eq!(system.get_message().unwrap(), Fetched::Quit(0));
    }
}
