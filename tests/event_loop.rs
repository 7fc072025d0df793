//! Drives the public API end to end on the headless backend.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ctlwrap::headless::HeadlessSystem;
use ctlwrap::{
    AppWindow, Dimension, Message, MessagePump, NativeSystem, Point, Rect, ScrollBar, ScrollPane,
    Wrapper, message_pump,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn pump_delivers_commands_and_exits_with_the_posted_code() {
    // Arrange
    init_logging();
    let system = HeadlessSystem::install();
    let app = AppWindow::create("event loop", Some(Rect::new(0, 0, 640, 480))).unwrap();
    let handle = app.window().handle();
    let saves = Rc::new(Cell::new(0));
    let counter = Rc::clone(&saves);
    app.on_command_id(5, move |_| counter.set(counter.get() + 1));
    app.on_close(|_| message_pump::post_quit(3));
    let command = Message::Command {
        id: 5,
        code: 0,
        source: None,
    };
    system.post(Some(handle), &command);
    system.post(Some(handle), &command);
    system.post(Some(handle), &Message::Close);
    // Act
    let exit_code = MessagePump::new().pump().unwrap();
    // Assert
    assert_eq!(exit_code, 3);
    assert_eq!(saves.get(), 2);
    assert!(system.is_window(handle));
}

#[test]
fn panicking_handler_unwinds_out_of_the_pump() {
    init_logging();
    let system = HeadlessSystem::install();
    let app = AppWindow::create("event loop", None).unwrap();
    app.on_close(|_| panic!("close handler failed"));
    system.post(Some(app.window().handle()), &Message::Close);

    let pump = MessagePump::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pump.pump()));

    let payload = result.unwrap_err();
    assert_eq!(
        ctlwrap::error::panic_message(&payload),
        "close handler failed"
    );
    assert!(!ctlwrap::error::has_reported_panic());
}

#[test]
fn scroll_pane_follows_its_extent_inside_an_app_window() {
    // Arrange
    init_logging();
    let system = HeadlessSystem::install();
    let app = AppWindow::create("pane host", Some(Rect::new(0, 0, 1024, 768))).unwrap();
    let pane = ScrollPane::create(app.window().handle(), Rect::new(0, 0, 400, 400)).unwrap();
    let pane_handle = pane.window().handle();
    let deltas = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&deltas);
    pane.set_scroll_policy(move |_, position, delta| sink.borrow_mut().push((position, delta)));
    // Act
    pane.set_extent(Dimension::new(1000, 1000));
    let grown = (
        system.is_scroll_bar_visible(pane_handle, ScrollBar::Horizontal),
        system.is_scroll_bar_visible(pane_handle, ScrollBar::Vertical),
        system.scroll_info(pane_handle, ScrollBar::Horizontal),
    );
    pane.set_position(Point::new(200, 300));
    pane.set_extent(Dimension::new(300, 300));
    // Assert
    assert!(grown.0 && grown.1);
    assert_eq!((grown.2.max, grown.2.page), (1000, 383));
    assert!(!system.is_scroll_bar_visible(pane_handle, ScrollBar::Horizontal));
    assert!(!system.is_scroll_bar_visible(pane_handle, ScrollBar::Vertical));
    assert_eq!(pane.position(), Point::ORIGIN);
    assert_eq!(
        deltas.borrow().as_slice(),
        &[
            (Point::new(200, 300), Point::new(200, 300)),
            (Point::ORIGIN, Point::new(-200, -300)),
        ]
    );
}

#[test]
fn dropping_the_host_destroys_the_pane_window() {
    init_logging();
    let system = HeadlessSystem::install();
    let app = AppWindow::create("pane host", Some(Rect::new(0, 0, 800, 600))).unwrap();
    let pane = ScrollPane::create(app.window().handle(), Rect::new(10, 10, 200, 200)).unwrap();
    let pane_handle = pane.window().handle();

    drop(app);

    assert!(!system.is_window(pane_handle));
    assert!(pane.window().try_handle().is_none());
    assert!(!ctlwrap::association::is_associated(pane_handle));
}
