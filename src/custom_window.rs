/*
 * Registration and lifetime of toolkit-defined window classes.
 *
 * A custom window comes into existence in one of two ways:
 *
 * - The wrapper drives creation (`create`). The wrapper is moved into an `Rc`,
 *   a weak creation context is parked for its class, and the backend creates
 *   the window. The backend's pre-creation hook calls `attach_on_create`,
 *   which consumes the context, binds the handle and records a borrowed
 *   association before any other message reaches the window. The caller gets an
 *   `Owned<T>` guard back.
 * - The system drives creation (a window of a registered class created by
 *   someone else). No context is parked, so `attach_on_create` builds a wrapper
 *   with `CustomWindowClass::deferred` and the association table adopts it.
 *
 * Teardown also has two triggers. When the native window is destroyed first,
 * `dispatch` releases the association, detaches the wrapper and drops the
 * table's reference (freeing adopted wrappers). When the `Owned<T>` guard is
 * dropped first, it releases the association and detaches *before* asking the
 * backend to destroy the window, so the destroy notification finds no owner.
 */

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::association;
use crate::error::{self, Result as PlatformResult};
use crate::geometry::{ClassToken, WindowHandle};
use crate::message::{Message, Reply};
use crate::native::{self, CreateParams};
use crate::window::Wrapper;

/// A wrapper type backed by its own native window class.
pub trait CustomWindowClass: Wrapper + Sized {
    /// Native class name. Must be unique per type.
    const CLASS_NAME: &'static str;

    /// A placeholder instance that performs no native work, used when the
    /// system creates a window of this class on its own.
    fn deferred() -> Self;
}

struct ClassEntry {
    name: &'static str,
    token: ClassToken,
    factory: fn() -> Rc<dyn Wrapper>,
}

struct PendingCreation {
    class_name: &'static str,
    wrapper: Weak<dyn Wrapper>,
}

thread_local! {
    static REGISTRY: RefCell<HashMap<TypeId, ClassEntry>> = RefCell::new(HashMap::new());
    static PENDING: RefCell<Vec<PendingCreation>> = const { RefCell::new(Vec::new()) };
}

fn build_deferred<T: CustomWindowClass>() -> Rc<dyn Wrapper> {
    Rc::new(T::deferred())
}

/// Registers the class of `T` once per thread; later calls return the same token.
pub fn register<T: CustomWindowClass>() -> PlatformResult<ClassToken> {
    let type_id = TypeId::of::<T>();
    if let Some(token) = REGISTRY.with(|r| r.borrow().get(&type_id).map(|entry| entry.token)) {
        return Ok(token);
    }

    let token = native::system().register_class(T::CLASS_NAME)?;
    REGISTRY.with(|r| {
        r.borrow_mut().insert(
            type_id,
            ClassEntry {
                name: T::CLASS_NAME,
                token,
                factory: build_deferred::<T>,
            },
        )
    });
    log::debug!(
        "CustomWindow: registered class '{}' as {token:?}",
        T::CLASS_NAME
    );
    Ok(token)
}

pub fn is_registered<T: CustomWindowClass>() -> bool {
    REGISTRY.with(|r| r.borrow().contains_key(&TypeId::of::<T>()))
}

fn factory_for(class_name: &str) -> Option<fn() -> Rc<dyn Wrapper>> {
    REGISTRY.with(|r| {
        r.borrow()
            .values()
            .find(|entry| entry.name == class_name)
            .map(|entry| entry.factory)
    })
}

/// Creates the native window for `wrapper` and returns the guard that owns both.
pub fn create<T: CustomWindowClass>(wrapper: T, params: &CreateParams) -> PlatformResult<Owned<T>> {
    register::<T>()?;

    let wrapper = Rc::new(wrapper);
    let context: Weak<T> = Rc::downgrade(&wrapper);
    let context: Weak<dyn Wrapper> = context;
    PENDING.with(|p| {
        p.borrow_mut().push(PendingCreation {
            class_name: T::CLASS_NAME,
            wrapper: context,
        })
    });

    let created = native::system().create_window(T::CLASS_NAME, params);

    // A backend that failed before its pre-creation hook leaves the context parked.
    let target = Rc::as_ptr(&wrapper) as *const ();
    PENDING.with(|p| {
        p.borrow_mut()
            .retain(|pending| pending.wrapper.as_ptr() as *const () != target)
    });

    let owned = Owned { inner: wrapper };
    error::raise_reported_panic();
    let handle = created?;

    if owned.window().try_handle() != Some(handle) {
        log::warn!(
            "CustomWindow: '{}' {handle:?} skipped the creation hook, attaching late",
            T::CLASS_NAME
        );
        owned.window().bind(handle);
        association::attach(handle, &owned.inner);
    }
    Ok(owned)
}

/*
 * Pre-creation hook. Backends call this for every window of a registered class
 * before delivering any other message to it.
 */
pub fn attach_on_create(handle: WindowHandle, class_name: &str) {
    error::catch_at_boundary((), || attach_pending_or_adopt(handle, class_name));
}

fn attach_pending_or_adopt(handle: WindowHandle, class_name: &str) {
    let pending = PENDING.with(|p| {
        let mut p = p.borrow_mut();
        let index = p.iter().rposition(|c| c.class_name == class_name)?;
        Some(p.remove(index))
    });

    if let Some(wrapper) = pending.and_then(|c| c.wrapper.upgrade()) {
        wrapper.window().bind(handle);
        association::attach_weak(handle, Rc::downgrade(&wrapper));
        log::debug!("CustomWindow: attached '{class_name}' {handle:?} to its creator");
        return;
    }

    match factory_for(class_name) {
        Some(factory) => {
            let wrapper = factory();
            wrapper.window().bind(handle);
            association::adopt(handle, wrapper);
            log::debug!("CustomWindow: adopted system-created '{class_name}' {handle:?}");
        }
        None => log::warn!("CustomWindow: no registered class '{class_name}' for {handle:?}"),
    }
}

/// Backend entry point for every message after creation. Never unwinds.
pub fn deliver(handle: WindowHandle, message: &Message) -> Reply {
    error::catch_at_boundary(Reply::Default, || dispatch(handle, message))
}

/// Routes `message` to the owner of `handle`, handling the destroy notification.
pub fn dispatch(handle: WindowHandle, message: &Message) -> Reply {
    if let Message::Destroy = message {
        if let Some(owner) = association::owner(handle) {
            let _teardown = DestroyTeardown {
                handle,
                owner: Rc::clone(&owner),
            };
            owner.window_proc(handle, message);
        }
        return Reply::Default;
    }

    match association::owner(handle) {
        Some(owner) => owner.window_proc(handle, message),
        None => {
            log::trace!("CustomWindow: {message:?} for ownerless {handle:?}");
            Reply::Default
        }
    }
}

/* Releases and detaches the owner once its destroy handler is done, even if it unwinds. */
struct DestroyTeardown {
    handle: WindowHandle,
    owner: Rc<dyn Wrapper>,
}

impl Drop for DestroyTeardown {
    fn drop(&mut self) {
        drop(association::release(self.handle));
        self.owner.window().detach();
        log::debug!("CustomWindow: {:?} destroyed, owner detached", self.handle);
    }
}

/// Owning guard for a wrapper created with `create`.
pub struct Owned<T: Wrapper> {
    inner: Rc<T>,
}

impl<T: Wrapper> Owned<T> {
    /// Shared reference to the wrapper. It stays usable after the guard drops,
    /// but its window will be detached.
    pub fn share(this: &Self) -> Rc<T> {
        Rc::clone(&this.inner)
    }
}

impl<T: Wrapper> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Wrapper> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("binding", &self.inner.window().state())
            .finish()
    }
}

impl<T: Wrapper> Drop for Owned<T> {
    fn drop(&mut self) {
        let Some(handle) = self.inner.window().try_handle() else {
            return;
        };
        drop(association::release(handle));
        self.inner.window().detach();
        log::debug!("CustomWindow: owner dropped, destroying {handle:?}");
        if let Err(e) = native::system().destroy_window(handle) {
            log::warn!("CustomWindow: destroying {handle:?} failed: {e}");
        }
        // Destroy handlers of child windows may have parked a panic.
        error::settle_reported_panic();
    }
}
