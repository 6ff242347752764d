//! Tests for the whole-run retry driver

use std::cell::Cell;
use std::time::Duration;

use vault_core::{Error, RepositoryError, RetryDriver};

fn transient() -> Error {
    Error::from(RepositoryError::Transient {
        message: "timeout".into(),
    })
}

fn fast(max_retries: u32) -> RetryDriver {
    RetryDriver::new(max_retries).with_fixed_delay(Duration::ZERO)
}

#[test]
fn test_zero_retries_invokes_once_and_returns_error_unchanged() {
    let calls = Cell::new(0);

    let result: Result<(), Error> = fast(0).run(|_| {
        calls.set(calls.get() + 1);
        Err(transient())
    });

    assert_eq!(calls.get(), 1);
    assert_eq!(result.unwrap_err().to_string(), transient().to_string());
}

#[test]
fn test_n_failures_then_success_uses_n_plus_one_attempts() {
    let calls = Cell::new(0);
    let n = 4;

    let result = fast(n).run(|attempt| {
        calls.set(calls.get() + 1);
        if attempt <= n { Err(transient()) } else { Ok(attempt) }
    });

    assert_eq!(result.unwrap(), n + 1);
    assert_eq!(calls.get(), n + 1);
}

#[test]
fn test_exhausted_schedule_returns_last_error() {
    let calls = Cell::new(0);

    let result: Result<(), Error> = fast(2).run(|_| {
        calls.set(calls.get() + 1);
        Err(transient())
    });

    assert_eq!(calls.get(), 3);
    assert!(result.is_err());
}

#[test]
fn test_fatal_error_is_not_retried() {
    let calls = Cell::new(0);

    let result: Result<(), Error> = fast(5).run(|_| {
        calls.set(calls.get() + 1);
        Err(Error::from(RepositoryError::Authentication {
            message: "bad password".into(),
        }))
    });

    assert_eq!(calls.get(), 1);
    assert!(result.unwrap_err().is_session_level());
}

#[test]
fn test_interruption_is_not_retried() {
    let calls = Cell::new(0);

    let result: Result<(), Error> = fast(5).run(|_| {
        calls.set(calls.get() + 1);
        Err(Error::Interrupted)
    });

    assert_eq!(calls.get(), 1);
    assert!(matches!(result, Err(Error::Interrupted)));
}
