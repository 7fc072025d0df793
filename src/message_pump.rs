/*
 * The per-thread message loop.
 *
 * Each retrieved message is offered to the registered modal dialogs first
 * (the first dialog that claims it consumes it), then to the registered
 * accelerator tables (first match wins), and otherwise translated and
 * dispatched. Handlers running inside dispatch may add or remove dialogs and
 * accelerators, and may even run a nested `process_message`. Removal therefore
 * only tombstones the entry in place; the registries are compacted once the
 * outermost `process_message` has finished scanning.
 */

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{self, Result as PlatformResult};
use crate::geometry::{AcceleratorHandle, WindowHandle};
use crate::message::{Fetched, QueuedMessage};
use crate::native;

#[derive(Debug, Default)]
pub struct MessagePump {
    dialogs: RefCell<Vec<Option<WindowHandle>>>,
    accelerators: RefCell<Vec<Option<AcceleratorHandle>>>,
    changed: Cell<bool>,
    matching_depth: Cell<usize>,
}

/* Keeps `matching_depth` balanced even when a handler unwinds. */
struct MatchingScope<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> MatchingScope<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for MatchingScope<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// Reads slot `index` without keeping the registry borrowed.
fn slot<T: Copy>(registry: &RefCell<Vec<Option<T>>>, index: usize) -> Option<T> {
    registry.borrow().get(index).copied().flatten()
}

fn tombstone<T: PartialEq>(registry: &RefCell<Vec<Option<T>>>, target: T) -> bool {
    let mut registry = registry.borrow_mut();
    match registry.iter_mut().find(|entry| entry.as_ref() == Some(&target)) {
        Some(entry) => {
            *entry = None;
            true
        }
        None => false,
    }
}

impl MessagePump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dialog(&self, dialog: WindowHandle) {
        self.dialogs.borrow_mut().push(Some(dialog));
        self.changed.set(true);
    }

    /// Tombstones the first live entry for `dialog`. Returns whether one was found.
    pub fn remove_dialog(&self, dialog: WindowHandle) -> bool {
        let removed = tombstone(&self.dialogs, dialog);
        self.changed.set(true);
        removed
    }

    pub fn add_accelerator(&self, table: AcceleratorHandle) {
        self.accelerators.borrow_mut().push(Some(table));
        self.changed.set(true);
    }

    pub fn remove_accelerator(&self, table: AcceleratorHandle) -> bool {
        let removed = tombstone(&self.accelerators, table);
        self.changed.set(true);
        removed
    }

    pub fn dialogs(&self) -> Vec<WindowHandle> {
        self.dialogs.borrow().iter().flatten().copied().collect()
    }

    pub fn accelerators(&self) -> Vec<AcceleratorHandle> {
        self.accelerators.borrow().iter().flatten().copied().collect()
    }

    /// Runs the loop until quit and returns the quit exit code.
    pub fn pump(&self) -> PlatformResult<i32> {
        let system = native::system();
        loop {
            match system.get_message()? {
                Fetched::Quit(exit_code) => {
                    log::debug!("MessagePump: quit received, exit code {exit_code}");
                    return Ok(exit_code);
                }
                Fetched::Message(message) => self.process_message(&message),
            }
        }
    }

    /// Routes one message, then re-raises any panic its handlers deferred.
    pub fn process_message(&self, message: &QueuedMessage) {
        {
            let _scope = MatchingScope::enter(&self.matching_depth);
            self.route(message);
        }
        if self.matching_depth.get() == 0 && self.changed.replace(false) {
            self.compact();
        }
        error::raise_reported_panic();
    }

    fn route(&self, message: &QueuedMessage) {
        let system = native::system();

        let dialog_count = self.dialogs.borrow().len();
        for index in 0..dialog_count {
            if let Some(dialog) = slot(&self.dialogs, index)
                && system.is_dialog_message(dialog, message)
            {
                log::trace!("MessagePump: {:?} consumed by dialog {dialog:?}", message.raw);
                return;
            }
        }

        let accelerator_count = self.accelerators.borrow().len();
        for index in 0..accelerator_count {
            if let Some(table) = slot(&self.accelerators, index)
                && system.translate_accelerator(table, message)
            {
                log::trace!("MessagePump: {:?} translated by {table:?}", message.raw);
                return;
            }
        }

        system.translate_and_dispatch(message);
    }

    fn compact(&self) {
        self.dialogs.borrow_mut().retain(Option::is_some);
        self.accelerators.borrow_mut().retain(Option::is_some);
        log::trace!(
            "MessagePump: compacted to {} dialog(s), {} accelerator table(s)",
            self.dialogs.borrow().len(),
            self.accelerators.borrow().len()
        );
    }

    #[cfg(test)]
    fn slot_count(&self) -> (usize, usize) {
        (self.dialogs.borrow().len(), self.accelerators.borrow().len())
    }
}

thread_local! {
    static DEFAULT_PUMP: Rc<MessagePump> = Rc::new(MessagePump::new());
}

/// The pump of the calling thread.
pub fn default_pump() -> Rc<MessagePump> {
    DEFAULT_PUMP.with(Rc::clone)
}

/// Asks the running loop of this thread to exit with `exit_code`.
pub fn post_quit(exit_code: i32) {
    native::system().post_quit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessEvent, HeadlessSystem};
    use crate::message::{Message, RawMessage, WM_CHAR, WM_KEYDOWN};

    fn key(code: usize) -> QueuedMessage {
        QueuedMessage::new(None, RawMessage::new(WM_KEYDOWN, code, 0))
    }

    fn handle(raw: usize) -> WindowHandle {
        WindowHandle::from_raw(raw).unwrap()
    }

    #[test]
    fn removal_tombstones_until_compaction() {
        // Arrange
        crate::test_support::init_logging();
        HeadlessSystem::install();
        let pump = MessagePump::new();
        pump.add_dialog(handle(0x10));
        pump.add_dialog(handle(0x20));
        // Act
        assert!(pump.remove_dialog(handle(0x10)));
        let before = pump.slot_count();
        pump.process_message(&key(1));
        // Assert
        assert_eq!(before, (2, 0));
        assert_eq!(pump.slot_count(), (1, 0));
        assert_eq!(pump.dialogs(), vec![handle(0x20)]);
    }

    #[test]
    fn removing_unknown_entries_reports_false() {
        let pump = MessagePump::new();
        assert!(!pump.remove_dialog(handle(0x10)));
        assert!(!pump.remove_accelerator(AcceleratorHandle::from_raw(0x30).unwrap()));
    }

    #[test]
    fn accelerator_match_skips_dispatch() {
        // Arrange
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let table = system.allocate_accelerator();
        system.set_accelerator_matcher(move |t, m| t == table && m.raw.msg == WM_KEYDOWN);
        let pump = MessagePump::new();
        pump.add_accelerator(table);
        // Act
        pump.process_message(&key(b'S' as usize));
        pump.process_message(&QueuedMessage::new(None, RawMessage::new(WM_CHAR, 0x61, 0)));
        // Assert
        let dispatched: Vec<_> = system
            .events()
            .into_iter()
            .filter(|e| matches!(e, HeadlessEvent::Dispatched(_)))
            .collect();
        assert_eq!(
            dispatched,
            vec![HeadlessEvent::Dispatched(RawMessage::new(WM_CHAR, 0x61, 0))]
        );
    }

    #[test]
    fn pump_returns_quit_code_and_dispatches_everything_before_it() {
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        system.post(None, &Message::Close);
        system.post(None, &Message::Close);
        post_quit(17);
        let exit_code = MessagePump::new().pump().unwrap();
        assert_eq!(exit_code, 17);
        assert_eq!(system.events().len(), 2);
    }

    #[test]
    fn pump_reports_retrieval_failure() {
        crate::test_support::init_logging();
        HeadlessSystem::install();
        assert!(MessagePump::new().pump().is_err());
    }

    #[test]
    fn dialog_match_consumes_before_accelerators_and_dispatch() {
        // Arrange
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let d1 = handle(0x100);
        let a1 = system.allocate_accelerator();
        let a2 = system.allocate_accelerator();
        system.set_dialog_matcher(move |dialog, m| dialog == d1 && m.raw.msg == WM_KEYDOWN);
        system.set_accelerator_matcher(|_, _| false);
        let pump = MessagePump::new();
        pump.add_accelerator(a1);
        pump.add_accelerator(a2);
        pump.add_dialog(d1);
        let tab = key(0x09);
        let other = QueuedMessage::new(None, RawMessage::new(WM_CHAR, 0x61, 0));
        // Act
        pump.process_message(&tab);
        let consumed = system.take_events();
        pump.process_message(&other);
        let routed = system.take_events();
        // Assert
        assert_eq!(consumed, vec![HeadlessEvent::DialogOffered(d1, tab.raw)]);
        assert_eq!(
            routed,
            vec![
                HeadlessEvent::DialogOffered(d1, other.raw),
                HeadlessEvent::AcceleratorOffered(a1, other.raw),
                HeadlessEvent::AcceleratorOffered(a2, other.raw),
                HeadlessEvent::Dispatched(other.raw),
            ]
        );
    }

    #[test]
    fn dialog_removed_during_dispatch_is_skipped_by_nested_processing() {
        // Arrange
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let d1 = handle(0x100);
        let d2 = handle(0x200);
        system.set_dialog_matcher(|_, _| false);
        let pump = Rc::new(MessagePump::new());
        pump.add_dialog(d1);
        pump.add_dialog(d2);
        let first = key(1);
        let nested = key(2);
        let inner = Rc::clone(&pump);
        system.set_dispatch_hook(move |m| {
            if m.raw == first.raw {
                assert!(inner.remove_dialog(d1));
                inner.process_message(&nested);
            }
        });
        // Act
        pump.process_message(&first);
        // Assert
        let offered_nested: Vec<_> = system
            .events()
            .into_iter()
            .filter_map(|e| match e {
                HeadlessEvent::DialogOffered(dialog, raw) if raw == nested.raw => Some(dialog),
                _ => None,
            })
            .collect();
        assert_eq!(offered_nested, vec![d2]);
        assert_eq!(pump.slot_count(), (1, 0));
        assert_eq!(pump.dialogs(), vec![d2]);
    }

    #[test]
    fn deferred_panic_is_raised_after_compaction() {
        crate::test_support::init_logging();
        let system = HeadlessSystem::install();
        let d1 = handle(0x100);
        let pump = Rc::new(MessagePump::new());
        pump.add_dialog(d1);
        let inner = Rc::clone(&pump);
        system.set_dispatch_hook(move |_| {
            inner.remove_dialog(d1);
            error::report_panic(Box::new("handler failed"));
        });
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pump.process_message(&key(1));
        }));
        assert!(result.is_err());
        assert_eq!(pump.slot_count(), (0, 0));
        assert!(!error::has_reported_panic());
    }

    #[test]
    fn default_pump_is_shared_per_thread() {
        assert!(Rc::ptr_eq(&default_pump(), &default_pump()));
    }
}
