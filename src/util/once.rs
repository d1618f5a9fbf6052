//! Run-once initialisation with a shared outcome.

use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

enum State<T> {
    NotStarted,
    Running,
    Done(Result<Arc<T>>),
}

/// Runs an initialiser at most once and hands its outcome to every caller.
///
/// Concurrent first callers block until the running initialiser finishes and
/// then observe the same value, or the same error. A failure is remembered;
/// later calls return it without retrying. If the initialiser panics the
/// state is reset so that a later caller can try again.
pub struct OnceCall<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

impl<T> Default for OnceCall<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OnceCall<T> {
    /// Creates an instance whose initialiser has not run.
    pub fn new() -> Self {
        Self { state: Mutex::new(State::NotStarted), done: Condvar::new() }
    }

    /// Runs `init` if no caller has, otherwise waits for and returns the
    /// recorded outcome.
    pub fn call<F>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        {
            let mut state = self.state.lock();
            loop {
                match &*state {
                    State::Done(outcome) => return outcome.clone(),
                    State::Running => self.done.wait(&mut state),
                    State::NotStarted => {
                        *state = State::Running;
                        break;
                    }
                }
            }
        }

        let mut guard = ResetOnUnwind { once: self, armed: true };
        let outcome = init().map(Arc::new);
        guard.armed = false;

        *self.state.lock() = State::Done(outcome.clone());
        self.done.notify_all();
        outcome
    }

    /// True once an initialiser has finished, successfully or not.
    pub fn has_called(&self) -> bool {
        matches!(&*self.state.lock(), State::Done(_))
    }

    /// The value, if an initialiser finished successfully.
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.state.lock() {
            State::Done(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }
}

struct ResetOnUnwind<'a, T> {
    once: &'a OnceCall<T>,
    armed: bool,
}

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            *self.once.state.lock() = State::NotStarted;
            self.once.done.notify_all();
        }
    }
}
