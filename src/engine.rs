// baton/src/engine.rs
//
//! Bridge between a native video engine's callbacks and the hand-off.
//!
//! Media engines that render through an application-supplied GL context all
//! speak roughly the same callback protocol: resolve a GL symbol by name,
//! enter the rendering section, present a finished frame, leave the
//! section, and tell the application where to report output size changes.
//! [`EngineBridge`] maps that protocol onto a [`ContextHandoff`], keeping
//! the acquire/release pairing out of the per-engine FFI glue.
//!
//! Every method here may be invoked from the engine's own native thread,
//! with no guarantee it is the same thread from one callback to the next.

use crate::context::{BindableContext, CurrentContext};
use crate::handoff::ContextHandoff;

use euclid::default::Size2D;
use log::{debug, warn};
use std::os::raw::c_void;
use std::sync::{Arc, Mutex};

/// GL symbol loader injected by the application.
///
/// Engines resolve symbols while their rendering section is active, but the
/// loaders the windowing toolkits provide (`eglGetProcAddress` and friends)
/// do not themselves need the context, so the bridge keeps the loader out
/// of the hand-off slot.
pub type SymbolLoader = Box<dyn Fn(&str) -> *const c_void + Send + Sync>;

/// The object to register the native engine's callbacks against.
///
/// The callback protocol is strictly bracketed: [`enter_render`] then any
/// number of [`present`] calls then [`leave_render`]. A `false` return from
/// any of them means "this section could not proceed"; the engine is
/// expected to simply try again on a later callback, and the bridge
/// guarantees the hand-off is left acquirable whenever it returns `false`.
///
/// [`enter_render`]: Self::enter_render
/// [`present`]: Self::present
/// [`leave_render`]: Self::leave_render
pub struct EngineBridge<C>
where
    C: BindableContext,
{
    handoff: ContextHandoff<C>,
    active: Mutex<Option<CurrentContext<C>>>,
    loader: SymbolLoader,
    size_report: SizeReport,
}

impl<C> EngineBridge<C>
where
    C: BindableContext,
{
    /// Creates a bridge over `handoff`, resolving GL symbols via `loader`.
    pub fn new(handoff: ContextHandoff<C>, loader: SymbolLoader) -> EngineBridge<C> {
        EngineBridge {
            handoff,
            active: Mutex::new(None),
            loader,
            size_report: SizeReport::new(),
        }
    }

    /// Resolves a GL function pointer by name.
    pub fn resolve(&self, name: &str) -> *const c_void {
        (self.loader)(name)
    }

    /// Enters the rendering section: acquires the context and makes it
    /// current on the calling thread.
    ///
    /// Returns `false` if the hand-off was shut down or the context could
    /// not be made current; in both cases nothing is held and the engine
    /// may retry on its next callback.
    pub fn enter_render(&self) -> bool {
        let guard = match self.handoff.acquire() {
            Ok(guard) => guard,
            Err(err) => {
                debug!("render section not entered: {:?}", err);
                return false;
            }
        };
        match guard.make_current() {
            Ok(current) => {
                let previous = self.active.lock().unwrap().replace(current);
                debug_assert!(previous.is_none(), "unbalanced enter_render");
                true
            }
            Err(err) => {
                warn!("could not make context current for engine: {:?}", err);
                false
            }
        }
    }

    /// Leaves the rendering section: detaches the context from the calling
    /// thread and releases it, in that order.
    ///
    /// Returns `false` if no section was active. The release happens even
    /// if the detach underneath fails.
    pub fn leave_render(&self) -> bool {
        match self.active.lock().unwrap().take() {
            Some(current) => {
                drop(current);
                true
            }
            None => {
                warn!("leave_render with no active render section");
                false
            }
        }
    }

    /// Presents the finished frame by swapping buffers.
    ///
    /// Only valid between [`enter_render`](Self::enter_render) and
    /// [`leave_render`](Self::leave_render).
    pub fn present(&self) -> bool {
        match self.active.lock().unwrap().as_mut() {
            Some(current) => match current.swap_buffers() {
                Ok(()) => true,
                Err(err) => {
                    warn!("buffer swap failed: {:?}", err);
                    false
                }
            },
            None => {
                warn!("present outside a render section");
                false
            }
        }
    }

    /// The channel through which the application reports output size
    /// changes to the engine.
    pub fn size_report(&self) -> &SizeReport {
        &self.size_report
    }
}

/// Synchronized slot for the engine's size-changed callback.
///
/// The engine registers its callback from its own thread while the
/// windowing toolkit may be delivering resize events on another, so both
/// the registration and the invocation go through one mutex; there is no
/// window in which a half-written callback reference can be observed.
#[derive(Clone)]
pub struct SizeReport {
    callback: Arc<Mutex<Option<Box<dyn FnMut(Size2D<u32>) + Send>>>>,
}

impl SizeReport {
    pub fn new() -> SizeReport {
        SizeReport {
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Registers the engine's callback, replacing any previous one.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(Size2D<u32>) + Send + 'static,
    {
        *self.callback.lock().unwrap() = Some(Box::new(callback));
    }

    /// Unregisters the callback. Subsequent reports are dropped.
    pub fn clear_callback(&self) {
        *self.callback.lock().unwrap() = None;
    }

    /// Reports a new output size to the engine, if it registered interest.
    pub fn report(&self, size: Size2D<u32>) {
        if let Some(callback) = self.callback.lock().unwrap().as_mut() {
            callback(size);
        }
    }
}

impl Default for SizeReport {
    fn default() -> SizeReport {
        SizeReport::new()
    }
}
