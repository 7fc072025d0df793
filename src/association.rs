/*
 * Per-thread side table from native handle to the wrapper that owns it.
 *
 * An entry exists exactly while its wrapper is attached. `Borrowed` entries
 * point at wrappers owned elsewhere (user code, through `Owned<T>` or its own
 * `Rc`); `Adopted` entries own the wrapper outright because the dispatcher
 * built it for a window the system created on its own. Entries are always
 * removed from the table before the wrapper they name is dropped, so a wrapper's
 * `Drop` can safely call back into this module.
 */

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::geometry::WindowHandle;
use crate::window::Wrapper;

enum Association {
    Borrowed(Weak<dyn Wrapper>),
    Adopted(Rc<dyn Wrapper>),
}

impl Association {
    fn owner(&self) -> Option<Rc<dyn Wrapper>> {
        match self {
            Association::Borrowed(weak) => weak.upgrade(),
            Association::Adopted(rc) => Some(Rc::clone(rc)),
        }
    }

    fn into_owner(self) -> Option<Rc<dyn Wrapper>> {
        match self {
            Association::Borrowed(weak) => weak.upgrade(),
            Association::Adopted(rc) => Some(rc),
        }
    }
}

thread_local! {
    static TABLE: RefCell<HashMap<WindowHandle, Association>> = RefCell::new(HashMap::new());
}

/// Records `wrapper` as the owner of `handle` without taking ownership of it.
pub fn attach<W: Wrapper>(handle: WindowHandle, wrapper: &Rc<W>) {
    let weak: Weak<W> = Rc::downgrade(wrapper);
    let weak: Weak<dyn Wrapper> = weak;
    attach_weak(handle, weak);
}

pub(crate) fn attach_weak(handle: WindowHandle, wrapper: Weak<dyn Wrapper>) {
    insert(handle, Association::Borrowed(wrapper));
}

/// Records `wrapper` as the owner of `handle`; the table keeps it alive until release.
pub(crate) fn adopt(handle: WindowHandle, wrapper: Rc<dyn Wrapper>) {
    insert(handle, Association::Adopted(wrapper));
}

fn insert(handle: WindowHandle, entry: Association) {
    let replaced = TABLE.with(|table| table.borrow_mut().insert(handle, entry));
    if replaced.is_some() {
        log::warn!("Association: {handle:?} was already associated, replacing its owner");
    }
    // `replaced` drops here, outside the table borrow.
}

/// The wrapper that owns `handle`, if it is still alive.
pub fn owner(handle: WindowHandle) -> Option<Rc<dyn Wrapper>> {
    TABLE.with(|table| table.borrow().get(&handle).and_then(Association::owner))
}

pub fn is_associated(handle: WindowHandle) -> bool {
    TABLE.with(|table| table.borrow().contains_key(&handle))
}

/*
 * Removes the entry for `handle` and returns its wrapper. For an adopted
 * wrapper this is the last strong reference: dropping it frees the wrapper.
 */
pub fn release(handle: WindowHandle) -> Option<Rc<dyn Wrapper>> {
    let entry = TABLE.with(|table| table.borrow_mut().remove(&handle));
    entry.and_then(Association::into_owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Window;

    struct Probe {
        window: Window,
    }

    impl Wrapper for Probe {
        fn window(&self) -> &Window {
            &self.window
        }
    }

    fn probe() -> Rc<Probe> {
        Rc::new(Probe {
            window: Window::new(),
        })
    }

    fn handle(raw: usize) -> WindowHandle {
        WindowHandle::from_raw(raw).unwrap()
    }

    #[test]
    fn borrowed_owner_is_found_until_released() {
        // Arrange
        let wrapper = probe();
        attach(handle(0x100), &wrapper);
        // Act
        let found = owner(handle(0x100));
        let released = release(handle(0x100));
        // Assert
        assert!(found.is_some());
        assert!(released.is_some());
        assert!(owner(handle(0x100)).is_none());
        assert!(!is_associated(handle(0x100)));
    }

    #[test]
    fn borrowed_entry_does_not_keep_the_wrapper_alive() {
        let wrapper = probe();
        attach(handle(0x200), &wrapper);
        drop(wrapper);
        assert!(is_associated(handle(0x200)));
        assert!(owner(handle(0x200)).is_none());
        release(handle(0x200));
    }

    #[test]
    fn adopted_wrapper_is_freed_by_release() {
        // Arrange
        let wrapper = probe();
        let watcher = Rc::downgrade(&wrapper);
        adopt(handle(0x300), wrapper);
        assert!(watcher.upgrade().is_some());
        // Act
        drop(release(handle(0x300)));
        // Assert
        assert!(watcher.upgrade().is_none());
    }

    #[test]
    fn unknown_handle_has_no_owner() {
        assert!(owner(handle(0x999)).is_none());
        assert!(release(handle(0x999)).is_none());
    }
}
