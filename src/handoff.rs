// baton/src/handoff.rs
//
//! The one-slot context hand-off coordinator.
//!
//! The slot holds the detached context object itself, so "holding the permit"
//! and "owning the context" are the same thing: a context that is current on
//! some thread is, by construction, not in the slot, and nobody else can get
//! at it until its guard is dropped.

use crate::error::Error;

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A shared handle to the hand-off coordinator for a single context.
///
/// Handles are cheap to clone; pass one clone to whatever registers the
/// native engine callbacks and keep another on the application thread. The
/// hand-off starts out *empty*: the thread that performs one-time GL setup
/// must detach the context from itself and [`deposit`](Self::deposit) it
/// before anyone can acquire.
///
/// Waiters are served in arrival order, so a sustained resize drag cannot
/// starve the engine's render callbacks and vice versa.
pub struct ContextHandoff<C> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    state: Mutex<State<C>>,
    available: Condvar,
}

struct State<C> {
    slot: Option<C>,
    queue: VecDeque<u64>,
    next_ticket: u64,
    shut_down: bool,
}

impl<C> Clone for ContextHandoff<C> {
    fn clone(&self) -> ContextHandoff<C> {
        ContextHandoff {
            inner: self.inner.clone(),
        }
    }
}

impl<C> Default for ContextHandoff<C> {
    fn default() -> ContextHandoff<C> {
        ContextHandoff::new()
    }
}

impl<C> ContextHandoff<C> {
    /// Creates a hand-off with an empty slot.
    pub fn new() -> ContextHandoff<C> {
        ContextHandoff {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slot: None,
                    queue: VecDeque::new(),
                    next_ticket: 0,
                    shut_down: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Places the context in the slot, unblocking the first waiter.
    ///
    /// Call this exactly once, after the initial GL setup has finished and
    /// the context has been detached from the setup thread. Panics if a
    /// context is already in the slot: with one context there is no valid
    /// way to deposit twice without an intervening acquire.
    pub fn deposit(&self, context: C) {
        let mut state = self.inner.state.lock().unwrap();
        assert!(
            state.slot.is_none(),
            "a context is already in the hand-off slot"
        );
        state.slot = Some(context);
        drop(state);
        self.inner.available.notify_all();
    }

    /// Blocks until the context is available and this caller is at the front
    /// of the queue.
    ///
    /// Returns [`Error::WaitInterrupted`] if the hand-off is shut down,
    /// whether before the call or while blocked. In that case no permit was
    /// consumed and the caller must not touch the context.
    pub fn acquire(&self) -> Result<ContextGuard<C>, Error> {
        self.acquire_with_deadline(None)
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`Error::WaitTimedOut`] once `timeout` has elapsed.
    ///
    /// Meant for paths that can afford to skip a turn, such as a resize
    /// handler that must not hang the event loop behind a stuck render
    /// callback.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<ContextGuard<C>, Error> {
        self.acquire_with_deadline(Some(Instant::now() + timeout))
    }

    fn acquire_with_deadline(&self, deadline: Option<Instant>) -> Result<ContextGuard<C>, Error> {
        let mut state = self.inner.state.lock().unwrap();
        if state.shut_down {
            return Err(Error::WaitInterrupted);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        loop {
            if state.shut_down {
                state.queue.retain(|&waiting| waiting != ticket);
                drop(state);
                self.inner.available.notify_all();
                return Err(Error::WaitInterrupted);
            }

            // Only the front of the queue may take the slot.
            if state.queue.front() == Some(&ticket) {
                if let Some(context) = state.slot.take() {
                    state.queue.pop_front();
                    return Ok(ContextGuard {
                        handoff: self.clone(),
                        context: Some(context),
                    });
                }
            }

            state = match deadline {
                None => self.inner.available.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.queue.retain(|&waiting| waiting != ticket);
                        drop(state);
                        // The next waiter in line may now be at the front.
                        self.inner.available.notify_all();
                        return Err(Error::WaitTimedOut);
                    }
                    self.inner
                        .available
                        .wait_timeout(state, deadline - now)
                        .unwrap()
                        .0
                }
            };
        }
    }

    /// Cancels all current and future acquires with
    /// [`Error::WaitInterrupted`].
    ///
    /// The slot contents are left as they are; a guard that is out when this
    /// is called still returns the context on drop, so shutdown never races
    /// a render section. Call this when the window is closing, before the
    /// engine is torn down.
    pub fn shut_down(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.shut_down = true;
        drop(state);
        self.inner.available.notify_all();
    }

    fn release(&self, context: C) {
        let mut state = self.inner.state.lock().unwrap();
        debug_assert!(state.slot.is_none());
        state.slot = Some(context);
        drop(state);
        self.inner.available.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn slot_occupied(&self) -> bool {
        self.inner.state.lock().unwrap().slot.is_some()
    }
}

/// Exclusive ownership of the context, from a successful acquire until drop.
///
/// Dropping the guard returns the context to the slot and wakes the next
/// waiter. Because release rides on `Drop`, it happens on every exit path
/// out of the critical section, early returns, `?` and panics included;
/// there is no way to leak the permit and deadlock later acquirers.
pub struct ContextGuard<C> {
    pub(crate) handoff: ContextHandoff<C>,
    pub(crate) context: Option<C>,
}

impl<C> Deref for ContextGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.context.as_ref().unwrap()
    }
}

impl<C> DerefMut for ContextGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.context.as_mut().unwrap()
    }
}

impl<C> Drop for ContextGuard<C> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.handoff.release(context);
        }
    }
}
