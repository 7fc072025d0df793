/*
 * Message reflection: a parent hands a notification raised by one of its
 * children back to the wrapper of that child.
 *
 * Parents call `reflect_message` from their window procedure for command,
 * notify and scroll messages, passing the message unchanged. When no wrapper
 * owns the source (stock control without a wrapper, menu or accelerator
 * command, the window's own scrollbar) the result is `Reply::Default` and the
 * parent must fall back to default processing itself.
 */

use crate::association;
use crate::geometry::WindowHandle;
use crate::message::{Message, Reply};

/// Forwards `message` to the wrapper that owns its source window.
pub fn reflect_message(parent: WindowHandle, message: &Message) -> Reply {
    let source = match message {
        Message::Notify(header) => Some(header.source),
        Message::Command { source, .. }
        | Message::HScroll { source, .. }
        | Message::VScroll { source, .. } => *source,
        other => panic!("Reflection: {other:?} is not a reflectable notification"),
    };
    let Some(source) = source else {
        log::trace!("Reflection: {message:?} at {parent:?} has no source window");
        return Reply::Default;
    };
    match association::owner(source) {
        Some(owner) => {
            log::trace!("Reflection: {message:?} from {source:?} reflected by {parent:?}");
            owner.handle_reflected_message(parent, message)
        }
        None => Reply::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NotifyHeader, ScrollAction};
    use crate::window::{Window, Wrapper};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        window: Window,
        seen: RefCell<Vec<(WindowHandle, Message)>>,
    }

    impl Wrapper for Recorder {
        fn window(&self) -> &Window {
            &self.window
        }

        fn handle_reflected_message(&self, parent: WindowHandle, message: &Message) -> Reply {
            self.seen.borrow_mut().push((parent, *message));
            match message {
                Message::Notify(_) => Reply::Handled(7),
                _ => Reply::Default,
            }
        }
    }

    fn handle(raw: usize) -> WindowHandle {
        WindowHandle::from_raw(raw).unwrap()
    }

    fn recorder(at: WindowHandle) -> Rc<Recorder> {
        let recorder = Rc::new(Recorder {
            window: Window::new(),
            seen: RefCell::new(Vec::new()),
        });
        recorder.window.bind(at);
        association::attach(at, &recorder);
        recorder
    }

    #[test]
    fn notify_is_routed_by_header_source_unchanged() {
        // Arrange
        let parent = handle(0x10);
        let child = recorder(handle(0x20));
        let message = Message::Notify(NotifyHeader {
            source: handle(0x20),
            id: 5,
            code: 0xFFFF_FFF0,
            payload: 0x4000,
        });
        // Act
        let reply = reflect_message(parent, &message);
        // Assert
        assert_eq!(reply, Reply::Handled(7));
        assert_eq!(child.seen.borrow().as_slice(), &[(parent, message)]);
    }

    #[test]
    fn handler_default_is_passed_back_to_parent() {
        let _child = recorder(handle(0x30));
        let message = Message::HScroll {
            action: ScrollAction::LineDown,
            position: 0,
            source: Some(handle(0x30)),
        };
        assert_eq!(reflect_message(handle(0x10), &message), Reply::Default);
    }

    #[test]
    fn messages_without_owner_or_source_are_not_handled() {
        let menu = Message::Command {
            id: 100,
            code: 0,
            source: None,
        };
        let stock = Message::Command {
            id: 101,
            code: 0,
            source: Some(handle(0x77)),
        };
        assert_eq!(reflect_message(handle(0x10), &menu), Reply::Default);
        assert_eq!(reflect_message(handle(0x10), &stock), Reply::Default);
    }

    #[test]
    #[should_panic(expected = "not a reflectable notification")]
    fn non_notification_messages_are_rejected() {
        reflect_message(handle(0x10), &Message::Close);
    }
}
