/*
 * Provides the public entry point for the ctlwrap crate, the core of a Win32
 * control-wrapping toolkit. Every wrapper type associates a Rust object with one
 * native window handle and receives the notification messages that concern it.
 *
 * The core covers window identity and lifetime for toolkit-defined window
 * classes, reflection of child notifications back to their wrappers, the
 * per-thread message pump, and a scrollable pane. All native calls go through
 * the `NativeSystem` trait. Windows builds use the Win32 backend by default;
 * the headless backend is compiled everywhere so non-Windows builds and tests
 * can exercise the same logic.
 */
pub mod association;
pub mod controls;
pub mod custom_window;
pub mod error;
pub mod geometry;
pub mod headless;
pub mod message;
pub mod message_pump;
pub mod native;
pub mod reflection;
pub mod window;
#[cfg(target_os = "windows")]
pub(crate) mod window_common;

pub use controls::app_window::AppWindow;
pub use controls::scroll_pane::{ScrollPane, ScrollPolicy, USE_PAGE_SIZE};
pub use custom_window::{CustomWindowClass, Owned};
pub use error::{PlatformError, Result as PlatformResult};
pub use geometry::{AcceleratorHandle, ClassToken, Dimension, Point, Rect, WindowHandle};
pub use message::{
    CommandEvent, CommandKind, Message, NotifyHeader, Reply, ScrollAction, ScrollBar, SizingEdge,
};
pub use message_pump::{MessagePump, default_pump};
pub use native::{CreateParams, NativeSystem, ScrollInfo, WindowStyle};
pub use reflection::reflect_message;
pub use window::{Binding, Window, Wrapper};

#[cfg(test)]
pub(crate) mod test_support {
    /// Routes `log` output through the test harness.
    pub(crate) fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
