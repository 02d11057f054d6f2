//! The deferred value and its settle-once state machine.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send>;
type FailureCallback<E> = Box<dyn FnOnce(&E) + Send>;
type ProgressCallback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Observable state of a [`Deferred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Not settled yet; progress notifications are still delivered.
    Pending,
    /// Settled with a success value.
    Resolved,
    /// Settled with a failure reason.
    Rejected,
}

enum Outcome<T, E> {
    Pending,
    Resolved(Arc<T>),
    Rejected(Arc<E>),
}

impl<T, E> Outcome<T, E> {
    fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    fn state(&self) -> DeferredState {
        match self {
            Outcome::Pending => DeferredState::Pending,
            Outcome::Resolved(_) => DeferredState::Resolved,
            Outcome::Rejected(_) => DeferredState::Rejected,
        }
    }

    fn value(&self) -> Option<Arc<T>> {
        match self {
            Outcome::Resolved(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    fn reason(&self) -> Option<Arc<E>> {
        match self {
            Outcome::Rejected(reason) => Some(Arc::clone(reason)),
            _ => None,
        }
    }
}

impl<T: Clone, E: Clone> Outcome<T, E> {
    fn cloned(&self) -> Option<Result<T, E>> {
        match self {
            Outcome::Pending => None,
            Outcome::Resolved(value) => Some(Ok(T::clone(value))),
            Outcome::Rejected(reason) => Some(Err(E::clone(reason))),
        }
    }
}

struct Inner<T, E, P> {
    outcome: Outcome<T, E>,
    on_success: Vec<SuccessCallback<T>>,
    on_failure: Vec<FailureCallback<E>>,
    on_progress: Vec<ProgressCallback<P>>,
    progress: Vec<Arc<P>>,
}

struct Shared<T, E, P> {
    inner: Mutex<Inner<T, E, P>>,
    settled: Condvar,
}

/// A value that settles at most once, with a progress channel while pending.
///
/// `Deferred` is a shared handle: clones observe and settle the same value.
/// The first call to [`resolve`](Self::resolve) or [`reject`](Self::reject)
/// wins; later calls are no-ops and return `false`.
///
/// Callbacks run synchronously, either on the thread that settles (or
/// notifies) or on the thread that subscribes to an already-settled value.
/// No internal lock is held while a callback runs, so callbacks may freely
/// subscribe to or inspect the same `Deferred`.
pub struct Deferred<T, E, P = ()> {
    shared: Arc<Shared<T, E, P>>,
}

impl<T, E, P> Clone for Deferred<T, E, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E, P> Default for Deferred<T, E, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E, P> fmt::Debug for Deferred<T, E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T, E, P> Deferred<T, E, P> {
    /// Create a pending value.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    outcome: Outcome::Pending,
                    on_success: Vec::new(),
                    on_failure: Vec::new(),
                    on_progress: Vec::new(),
                    progress: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Create a value that is already resolved.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// Create a value that is already rejected.
    pub fn rejected(reason: E) -> Self {
        let deferred = Self::new();
        deferred.reject(reason);
        deferred
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E, P>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> DeferredState {
        self.lock().outcome.state()
    }

    pub fn is_settled(&self) -> bool {
        !self.lock().outcome.is_pending()
    }

    /// Register a success and a failure callback at once.
    ///
    /// Exactly one of the two will ever run.
    pub fn subscribe<S, F>(&self, on_success: S, on_failure: F) -> &Self
    where
        S: FnOnce(&T) + Send + 'static,
        F: FnOnce(&E) + Send + 'static,
    {
        self.on_success(on_success).on_failure(on_failure)
    }

    /// Register a success callback.
    ///
    /// Runs immediately if the value is already resolved, never if it was
    /// rejected.
    pub fn on_success<S>(&self, callback: S) -> &Self
    where
        S: FnOnce(&T) + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.outcome.is_pending() {
            inner.on_success.push(Box::new(callback));
        } else if let Some(value) = inner.outcome.value() {
            drop(inner);
            callback(&value);
        }
        self
    }

    /// Register a failure callback.
    ///
    /// Runs immediately if the value is already rejected, never if it was
    /// resolved.
    pub fn on_failure<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.outcome.is_pending() {
            inner.on_failure.push(Box::new(callback));
        } else if let Some(reason) = inner.outcome.reason() {
            drop(inner);
            callback(&reason);
        }
        self
    }

    /// Register a progress callback.
    ///
    /// Receives every message passed to [`notify`](Self::notify) after
    /// registration and before settlement. Registering on a settled value
    /// does nothing.
    pub fn on_progress<N>(&self, callback: N) -> &Self
    where
        N: Fn(&P) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        if inner.outcome.is_pending() {
            inner.on_progress.push(Arc::new(callback));
        }
        self
    }

    /// Settle with a success value.
    ///
    /// Returns `false` (and drops `value`) if already settled.
    pub fn resolve(&self, value: T) -> bool {
        let value = Arc::new(value);
        let callbacks = {
            let mut inner = self.lock();
            if !inner.outcome.is_pending() {
                tracing::trace!(state = ?inner.outcome.state(), "ignoring resolve of settled value");
                return false;
            }
            inner.outcome = Outcome::Resolved(Arc::clone(&value));
            inner.on_failure.clear();
            inner.on_progress.clear();
            std::mem::take(&mut inner.on_success)
        };
        self.shared.settled.notify_all();

        for callback in callbacks {
            callback(&value);
        }
        true
    }

    /// Settle with a failure reason.
    ///
    /// Returns `false` (and drops `reason`) if already settled.
    pub fn reject(&self, reason: E) -> bool {
        let reason = Arc::new(reason);
        let callbacks = {
            let mut inner = self.lock();
            if !inner.outcome.is_pending() {
                tracing::trace!(state = ?inner.outcome.state(), "ignoring reject of settled value");
                return false;
            }
            inner.outcome = Outcome::Rejected(Arc::clone(&reason));
            inner.on_success.clear();
            inner.on_progress.clear();
            std::mem::take(&mut inner.on_failure)
        };
        self.shared.settled.notify_all();

        for callback in callbacks {
            callback(&reason);
        }
        true
    }

    /// Deliver a progress message to the current progress subscribers.
    ///
    /// Returns `false` once settled. Callbacks run after the lock is
    /// released, so progress is only guaranteed to precede the outcome when
    /// the same thread notifies and settles. A `resolve` or `reject` racing
    /// on another clone may deliver its outcome before this message's
    /// callbacks have run.
    pub fn notify(&self, message: P) -> bool {
        let message = Arc::new(message);
        let callbacks = {
            let mut inner = self.lock();
            if !inner.outcome.is_pending() {
                return false;
            }
            inner.progress.push(Arc::clone(&message));
            inner.on_progress.clone()
        };

        for callback in callbacks {
            callback(&message);
        }
        true
    }

    /// Every progress message delivered so far, in order.
    pub fn progress_history(&self) -> Vec<P>
    where
        P: Clone,
    {
        self.lock()
            .progress
            .iter()
            .map(|message| P::clone(message))
            .collect()
    }

    /// Block until settled and return a copy of the outcome.
    pub fn wait(&self) -> Result<T, E>
    where
        T: Clone,
        E: Clone,
    {
        let mut inner = self.lock();
        loop {
            if let Some(outcome) = inner.outcome.cloned() {
                return outcome;
            }
            inner = self
                .shared
                .settled
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until settled or until `timeout` elapses.
    ///
    /// Returns `None` if the value is still pending at the deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(outcome) = inner.outcome.cloned() {
                return Some(outcome);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            inner = self
                .shared
                .settled
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
