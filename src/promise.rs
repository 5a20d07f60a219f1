//! Promise Module
//!
//! One-shot handle carrying the value for a single key lookup.
//!
//! ## Responsibilities
//! - Deliver exactly one outcome (value or failure) per registered waiter
//! - Support blocking waits, bounded waits, polling, and `.await`
//! - Keep the outcome until the holder takes it, so late observers still see it
//!
//! ## Structure
//! A pending promise shares a `Slot` with a crate-private `Resolver`. The
//! resolver is consumed on fulfilment, so a second write cannot happen. A
//! resolver dropped without fulfilling closes the slot instead.

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{FutureKvError, Result};

/// Shared state between a pending promise and its resolver
struct Slot<V> {
    state: Mutex<SlotState<V>>,
    ready: Condvar,
}

enum SlotState<V> {
    /// Nothing delivered yet; holds the waker of the last async poll
    Pending { waker: Option<Waker> },

    /// Outcome delivered, not yet taken
    Done(Result<V>),

    /// Resolver dropped without delivering anything
    Closed,

    /// Outcome handed to the promise holder
    Taken,
}

impl<V> SlotState<V> {
    fn is_pending(&self) -> bool {
        matches!(self, SlotState::Pending { .. })
    }

    /// Take the outcome if one is available, leaving the slot drained
    fn take(&mut self) -> Option<Result<V>> {
        match mem::replace(self, SlotState::Taken) {
            SlotState::Pending { waker } => {
                *self = SlotState::Pending { waker };
                None
            }
            SlotState::Done(outcome) => Some(outcome),
            SlotState::Closed => {
                *self = SlotState::Closed;
                Some(Err(FutureKvError::MapDropped))
            }
            SlotState::Taken => Some(Err(FutureKvError::AlreadyTaken)),
        }
    }
}

impl<V> Slot<V> {
    /// Store the final state and wake blocked threads
    ///
    /// Returns the waker of the last async poll. The caller wakes it, so that
    /// no foreign code runs while the caller still holds its own locks.
    fn complete(&self, final_state: SlotState<V>) -> Option<Waker> {
        let previous = {
            let mut state = self.state.lock();
            if !state.is_pending() {
                return None;
            }
            mem::replace(&mut *state, final_state)
        };
        self.ready.notify_all();

        match previous {
            SlotState::Pending { waker } => waker,
            _ => None,
        }
    }
}

/// Handle that will carry the value for a key
///
/// Returned by [`FutureMap::get`](crate::FutureMap::get) and
/// [`FutureMap::get_else_set`](crate::FutureMap::get_else_set). A promise for
/// a key nobody ever resolves stays pending forever; use
/// [`wait_timeout`](Promise::wait_timeout) when a bounded wait is needed.
pub struct Promise<V> {
    state: PromiseState<V>,
}

enum PromiseState<V> {
    /// Fulfilled at creation (value was already in the map)
    Immediate(Result<V>),

    /// Fulfilled later through a resolver
    Deferred(Arc<Slot<V>>),

    /// Outcome already handed out
    Taken,
}

impl<V> Promise<V> {
    /// Create a promise that is already fulfilled with `value`
    pub fn ready(value: V) -> Self {
        Self {
            state: PromiseState::Immediate(Ok(value)),
        }
    }

    /// Create a linked resolver/promise pair
    pub(crate) fn pending() -> (Resolver<V>, Self) {
        let slot = Arc::new(Slot {
            state: Mutex::new(SlotState::Pending { waker: None }),
            ready: Condvar::new(),
        });
        let resolver = Resolver {
            slot: Some(Arc::clone(&slot)),
        };
        let promise = Self {
            state: PromiseState::Deferred(slot),
        };
        (resolver, promise)
    }

    /// Whether an outcome has been delivered (or already taken)
    pub fn is_ready(&self) -> bool {
        match &self.state {
            PromiseState::Immediate(_) | PromiseState::Taken => true,
            PromiseState::Deferred(slot) => !slot.state.lock().is_pending(),
        }
    }

    /// Take the outcome without blocking
    ///
    /// Returns `None` while still pending. The outcome is yielded once; later
    /// calls return `Some(Err(FutureKvError::AlreadyTaken))`.
    pub fn try_take(&mut self) -> Option<Result<V>> {
        let outcome = match &self.state {
            PromiseState::Immediate(_) => None,
            PromiseState::Deferred(slot) => Some(slot.state.lock().take()?),
            PromiseState::Taken => return Some(Err(FutureKvError::AlreadyTaken)),
        };

        match mem::replace(&mut self.state, PromiseState::Taken) {
            PromiseState::Immediate(immediate) => Some(immediate),
            _ => outcome,
        }
    }

    /// Block the current thread until the outcome arrives
    pub fn wait(mut self) -> Result<V> {
        if let PromiseState::Deferred(slot) = &self.state {
            let mut state = slot.state.lock();
            while state.is_pending() {
                slot.ready.wait(&mut state);
            }
        }
        self.try_take().unwrap_or(Err(FutureKvError::AlreadyTaken))
    }

    /// Block the current thread for at most `timeout`
    ///
    /// Returns `Err(FutureKvError::Timeout)` if nothing arrived in time.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<V> {
        if let PromiseState::Deferred(slot) = &self.state {
            let mut state = slot.state.lock();
            match Instant::now().checked_add(timeout) {
                Some(deadline) => {
                    while state.is_pending() {
                        if slot.ready.wait_until(&mut state, deadline).timed_out()
                            && state.is_pending()
                        {
                            return Err(FutureKvError::Timeout);
                        }
                    }
                }
                // Deadline not representable: wait without one
                None => {
                    while state.is_pending() {
                        slot.ready.wait(&mut state);
                    }
                }
            }
        }
        self.try_take().unwrap_or(Err(FutureKvError::Timeout))
    }
}

// The value is never pinned in place; it is only moved out once delivered.
impl<V> Unpin for Promise<V> {}

impl<V> Future for Promise<V> {
    type Output = Result<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let PromiseState::Deferred(slot) = &this.state {
            let mut state = slot.state.lock();
            if let SlotState::Pending { waker } = &mut *state {
                match waker {
                    Some(existing) if existing.will_wake(cx.waker()) => {}
                    _ => *waker = Some(cx.waker().clone()),
                }
                return Poll::Pending;
            }
        }

        match this.try_take() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<V> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PromiseState::Immediate(_) => "ready",
            PromiseState::Deferred(_) if self.is_ready() => "ready",
            PromiseState::Deferred(_) => "pending",
            PromiseState::Taken => "taken",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

/// Producer side of a pending promise
///
/// Fulfilling consumes the resolver. Dropping it unfulfilled closes the
/// promise, which then yields `FutureKvError::MapDropped`.
pub(crate) struct Resolver<V> {
    slot: Option<Arc<Slot<V>>>,
}

impl<V> Resolver<V> {
    /// Deliver a value, returning the waker the caller must wake
    #[must_use]
    pub(crate) fn resolve(self, value: V) -> Option<Waker> {
        self.fulfil(Ok(value))
    }

    /// Deliver a failure, returning the waker the caller must wake
    #[must_use]
    pub(crate) fn reject(self, error: FutureKvError) -> Option<Waker> {
        self.fulfil(Err(error))
    }

    fn fulfil(mut self, outcome: Result<V>) -> Option<Waker> {
        self.slot
            .take()
            .and_then(|slot| slot.complete(SlotState::Done(outcome)))
    }
}

impl<V> Drop for Resolver<V> {
    fn drop(&mut self) {
        if let Some(waker) = self.slot.take().and_then(|slot| slot.complete(SlotState::Closed)) {
            waker.wake();
        }
    }
}
