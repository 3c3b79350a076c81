//! Fault capture at the generator boundary.
//!
//! Generator code is third-party code. Every call into it goes through [`guard`], which turns both
//! returned errors and panics into a [`Fault`] value. The guard runs on the generator's side of the module
//! boundary so unwinding never crosses into the host.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error as _;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::generator::GeneratorError;

/// Category reported for panics.
pub const PANIC_CATEGORY: &str = "panic";

/// A captured failure from generator code: what kind of fault, where, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub category: String,
    pub trace: String,
    pub message: String,
}

impl Fault {
    pub fn new(category: impl Into<String>, trace: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            trace: trace.into(),
            message: message.into(),
        }
    }

    /// Build a fault from a returned error; the trace is the error's source chain.
    pub fn from_error(error: &GeneratorError) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        let trace = if chain.is_empty() {
            "<returned error>".to_string()
        } else {
            chain.join(" <- ")
        };
        Self::new(error.category(), trace, error.to_string())
    }

    fn from_panic(payload: Box<dyn Any + Send>, captured: Option<CapturedPanic>) -> Self {
        let message = panic_message(payload.as_ref());
        match captured {
            Some(captured) => {
                let trace = match captured.location {
                    Some(location) => format!("at {location}\n{}", captured.backtrace),
                    None => captured.backtrace,
                };
                Self::new(PANIC_CATEGORY, trace, message)
            }
            None => Self::new(PANIC_CATEGORY, "<no trace captured>", message),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for Fault {}

struct CapturedPanic {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: RefCell<Option<CapturedPanic>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Record panics raised inside a guard instead of printing them; defer to the previous hook otherwise.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(|depth| depth.get()) == 0 {
                previous(info);
                return;
            }
            let captured = CapturedPanic {
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(captured));
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Run generator code, converting returned errors and panics into a [`Fault`].
pub fn guard<R>(f: impl FnOnce() -> Result<R, GeneratorError>) -> Result<R, Fault> {
    install_hook();
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Fault::from_error(&error)),
        Err(payload) => {
            let captured = LAST_PANIC.with(|slot| slot.borrow_mut().take());
            Err(Fault::from_panic(payload, captured))
        }
    }
}
