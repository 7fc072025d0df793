/*
 * Concrete wrappers built on the core: the scrollable pane and the top-level
 * application window that reflects child notifications.
 */
pub mod app_window;
pub mod scroll_pane;
