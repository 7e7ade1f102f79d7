//! The current thread's space and the hooks a test runner calls around each test.
//!
//! A runner must, for every test: run the body, then verify regardless of how the
//! body ended, then tear down regardless of both. [`run_test`] does exactly that and
//! [`DoubleScope`] does it on drop.

use std::{
    any::Any,
    cell::RefCell,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    thread,
};

use crate::{
    error::{DoubleError, DoubleResult},
    space::Space,
};

#[derive(Default)]
struct SpaceSlot {
    space: Option<Space>,
    torn_down: bool,
}

thread_local! {
    static CURRENT: RefCell<SpaceSlot> = RefCell::new(SpaceSlot::default());
}

/// Runs `f` against the current thread's space, creating it on first use.
pub fn with_current_space<R>(f: impl FnOnce(&mut Space) -> R) -> R {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.torn_down = false;
        let space = slot.space.get_or_insert_with(|| {
            tracing::debug!("space created");
            Space::new()
        });
        f(space)
    })
}

/// Whether a space with doubles is currently active on this thread.
#[must_use]
pub fn has_current_space() -> bool {
    CURRENT.with(|slot| slot.borrow().space.is_some())
}

/// Verifies every expectation of the current space.
///
/// # Errors
/// `MockExpectation` for the first unsatisfied rule; `NoSpace` when the space was
/// torn down and nothing has been doubled since.
pub fn verify() -> DoubleResult<()> {
    let torn_down = CURRENT.with(|slot| {
        let slot = slot.borrow();
        slot.space.is_none() && slot.torn_down
    });
    if torn_down {
        return Err(DoubleError::NoSpace(
            "Cannot verify doubles: the space has already been torn down.".to_owned(),
        ));
    }
    with_current_space(Space::verify)
}

/// Restores everything and discards the space. Safe to call any number of times.
pub fn teardown() {
    discard(true);
}

/// Like [`teardown`], but a later [`verify`] does not fail with `NoSpace`.
pub fn clear() {
    discard(false);
}

fn discard(mark_torn_down: bool) {
    let space = CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if mark_torn_down {
            slot.torn_down = true;
        }
        slot.space.take()
    });
    // restore outside the borrow: restoring touches live objects only
    if let Some(mut space) = space {
        space.teardown();
    }
}

// ============================================================================
// Runner hooks
// ============================================================================

/// A test that failed in its body, its verification, or both.
#[derive(Debug)]
pub struct TestFailure {
    panic: Option<String>,
    verification: Option<DoubleError>,
}

impl TestFailure {
    /// The panic message of the test body, if it panicked.
    #[must_use]
    pub fn panic_message(&self) -> Option<&str> {
        self.panic.as_deref()
    }

    #[must_use]
    pub fn verification(&self) -> Option<&DoubleError> {
        self.verification.as_ref()
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.panic, &self.verification) {
            (Some(panic), Some(error)) => write!(f, "test panicked: {panic}\nverification also failed: {error}"),
            (Some(panic), None) => write!(f, "test panicked: {panic}"),
            (None, Some(error)) => write!(f, "{error}"),
            (None, None) => f.write_str("test failed"),
        }
    }
}

impl std::error::Error for TestFailure {}

/// Runs a test body, then verifies, then tears down.
///
/// Verification runs even when the body panics, and teardown runs last no matter
/// what. When both fail, the returned failure carries both.
pub fn run_test<R>(body: impl FnOnce() -> R) -> Result<R, TestFailure> {
    let outcome = catch_unwind(AssertUnwindSafe(body));
    let verification = verify().err();
    teardown();
    match (outcome, verification) {
        (Ok(value), None) => Ok(value),
        (Ok(_), Some(error)) => Err(TestFailure {
            panic: None,
            verification: Some(error),
        }),
        (Err(payload), verification) => Err(TestFailure {
            panic: Some(panic_message(payload.as_ref())),
            verification,
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Verifies and tears down the current space when dropped.
///
/// ```
/// let scope = dobles::scope();
/// // ... double and exercise code ...
/// scope.finish().unwrap();
/// ```
///
/// Dropped without [`finish`](Self::finish), a verification failure panics. While
/// the thread is already panicking the failure is logged instead, so the original
/// panic is not masked.
#[must_use = "the space is verified and torn down when the scope is dropped"]
#[derive(Debug)]
pub struct DoubleScope {
    finished: bool,
}

/// Starts a scope over a fresh space.
pub fn scope() -> DoubleScope {
    clear();
    DoubleScope { finished: false }
}

impl DoubleScope {
    /// Verifies and tears down now, returning the verification result.
    pub fn finish(mut self) -> DoubleResult<()> {
        self.finished = true;
        let result = verify();
        teardown();
        result
    }
}

impl Drop for DoubleScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let result = verify();
        teardown();
        if let Err(error) = result {
            if thread::panicking() {
                tracing::error!(%error, "verification failed while the test was already panicking");
            } else {
                panic!("{error}");
            }
        }
    }
}
