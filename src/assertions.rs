//! Assertions for test bodies.
//!
//! All helpers panic with a message naming what was expected and what
//! happened, and report the caller's location.

use std::fmt::{Debug, Display};
use std::panic::{self, UnwindSafe};

/// Assert that `result` is `Ok` and return the value.
#[track_caller]
pub fn assert_ok<T, E: Display>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("expected Ok, got error: {error}"),
    }
}

/// Assert that `result` is `Err` and return the error.
#[track_caller]
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("expected an error, got Ok({value:?})"),
        Err(error) => error,
    }
}

/// Assert that `result` is an error whose message contains `needle`.
#[track_caller]
pub fn assert_error_contains<T: Debug, E: Display>(result: Result<T, E>, needle: &str) -> E {
    let error = assert_err(result);
    let message = error.to_string();
    if !message.contains(needle) {
        panic!("error '{message}' did not contain '{needle}'");
    }
    error
}

/// Assert that `f` panics, and return the panic message.
#[track_caller]
pub fn assert_panics<R: Debug>(f: impl FnOnce() -> R + UnwindSafe) -> String {
    match panic::catch_unwind(f) {
        Ok(value) => panic!("expected a panic, got {value:?}"),
        Err(payload) => panic_message(payload.as_ref()),
    }
}

/// Assert that `f` returns normally, and return its value.
#[track_caller]
pub fn assert_does_not_panic<R>(f: impl FnOnce() -> R + UnwindSafe) -> R {
    match panic::catch_unwind(f) {
        Ok(value) => value,
        Err(payload) => panic!("unexpected panic: {}", panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
