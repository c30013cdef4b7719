// baton/src/context.rs
//
//! Binding the held context to the calling thread.
//!
//! The hand-off does not know how to make a context current; that primitive
//! belongs to the windowing toolkit and is injected through
//! [`BindableContext`]. What this module adds is the pairing: a context is
//! only ever made current through a [`ContextGuard`], and the resulting
//! [`CurrentContext`] detaches before the guard releases, in that order, on
//! every exit path.

use crate::error::Error;
use crate::handoff::ContextGuard;

use log::warn;

/// The windowing toolkit's context-binding primitive.
///
/// Implementations wrap whatever the toolkit offers (a glutin context and
/// surface, a GLFW render context, an EGL context/surface pair) and map its
/// failures to [`Error::ContextOperationFailed`]. All three operations are
/// only ever invoked by the thread that currently holds the hand-off guard.
pub trait BindableContext {
    /// Makes the context current on the calling thread.
    fn make_current(&mut self) -> Result<(), Error>;

    /// Detaches the context from the calling thread.
    fn make_not_current(&mut self) -> Result<(), Error>;

    /// Swaps the back and front buffers. Only valid while current.
    fn swap_buffers(&mut self) -> Result<(), Error>;
}

impl<C> ContextGuard<C>
where
    C: BindableContext,
{
    /// Makes the held context current, consuming the guard.
    ///
    /// On failure the error propagates *after* the guard has been dropped,
    /// so the context is back in the slot and the next waiter can proceed; a
    /// failed make-current can never wedge the hand-off.
    pub fn make_current(mut self) -> Result<CurrentContext<C>, Error> {
        match self.context.as_mut().unwrap().make_current() {
            Ok(()) => Ok(CurrentContext { guard: self }),
            // `self` drops here, releasing the permit.
            Err(err) => Err(err),
        }
    }
}

/// A context that is current on this thread, until drop.
///
/// Derefs to the underlying [`BindableContext`] so the holder can swap
/// buffers or reach toolkit-specific operations. Dropping it detaches the
/// context from this thread and then releases it back to the hand-off. A
/// failing detach is logged rather than propagated: the release must happen
/// regardless, and the next holder's make-current supersedes a stale
/// binding anyway.
pub struct CurrentContext<C>
where
    C: BindableContext,
{
    guard: ContextGuard<C>,
}

impl<C> std::ops::Deref for CurrentContext<C>
where
    C: BindableContext,
{
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard
    }
}

impl<C> std::ops::DerefMut for CurrentContext<C>
where
    C: BindableContext,
{
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard
    }
}

impl<C> Drop for CurrentContext<C>
where
    C: BindableContext,
{
    fn drop(&mut self) {
        if let Err(err) = self.guard.make_not_current() {
            warn!("failed to detach context before release: {:?}", err);
        }
        // The inner guard drops next, returning the context to the slot.
    }
}
