/*
 * Error types for the toolkit plus the machinery that keeps panics from
 * crossing the native callback boundary.
 *
 * Window procedures are invoked by the windowing system, and unwinding through
 * those frames is not allowed. Every entry from a backend into toolkit code
 * therefore runs inside `catch_at_boundary`, which parks the panic payload in a
 * per-thread slot. Code that regains control after a native call returns
 * (window creation, `Window::send_message`, the message pump) calls
 * `raise_reported_panic` to resume the unwind where it is safe to do so. A
 * panic that arrives while another one is still parked cannot be re-raised
 * and is handed to the panic sink instead.
 */

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("window class registration failed: {0}")]
    ClassRegistrationFailed(String),
    #[error("window creation failed: {0}")]
    WindowCreationFailed(String),
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("message loop failed: {0}")]
    MessageLoop(String),
    #[cfg(target_os = "windows")]
    #[error("Win32 call failed: {0}")]
    Win32(#[from] windows::core::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

pub type PanicPayload = Box<dyn Any + Send + 'static>;
type PanicSink = Box<dyn Fn(PanicPayload)>;

thread_local! {
    static REPORTED_PANIC: RefCell<Option<PanicPayload>> = const { RefCell::new(None) };
    static PANIC_SINK: RefCell<Option<PanicSink>> = const { RefCell::new(None) };
}

/// Runs `f`, converting a panic into a parked payload and `fallback`.
pub fn catch_at_boundary<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            log::debug!(
                "Boundary: captured panic from callback: {}",
                panic_message(&payload)
            );
            report_panic(payload);
            fallback
        }
    }
}

/// Parks `payload` for a later `raise_reported_panic`, or sinks it if the slot is taken.
pub fn report_panic(payload: PanicPayload) {
    let orphan = REPORTED_PANIC.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            Some(payload)
        } else {
            *slot = Some(payload);
            None
        }
    });
    if let Some(orphan) = orphan {
        deliver_to_sink(orphan);
    }
}

pub fn has_reported_panic() -> bool {
    REPORTED_PANIC.with(|slot| slot.borrow().is_some())
}

pub fn take_reported_panic() -> Option<PanicPayload> {
    REPORTED_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Resumes unwinding with the parked panic, if there is one.
pub fn raise_reported_panic() {
    if let Some(payload) = take_reported_panic() {
        log::debug!(
            "Boundary: re-raising deferred panic: {}",
            panic_message(&payload)
        );
        panic::resume_unwind(payload);
    }
}

/// Like `raise_reported_panic`, but hands the parked panic to the sink while
/// the thread is already unwinding, where resuming would abort.
pub fn settle_reported_panic() {
    if !std::thread::panicking() {
        raise_reported_panic();
    } else if let Some(payload) = take_reported_panic() {
        deliver_to_sink(payload);
    }
}

/// Replaces the receiver of panics that could not be parked. The default logs them.
pub fn set_panic_sink(sink: impl Fn(PanicPayload) + 'static) {
    PANIC_SINK.with(|slot| *slot.borrow_mut() = Some(Box::new(sink)));
}

fn deliver_to_sink(payload: PanicPayload) {
    let sink = PANIC_SINK.with(|slot| slot.borrow_mut().take());
    match sink {
        Some(sink) => {
            sink(payload);
            PANIC_SINK.with(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.is_none() {
                    *slot = Some(sink);
                }
            });
        }
        None => log::error!(
            "Boundary: panic raised while another was pending, dropping it: {}",
            panic_message(&payload)
        ),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &PanicPayload) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
