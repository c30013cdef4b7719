// baton/src/lib.rs
//
//! Hand a single OpenGL context between threads, safely.
//!
//! Native media engines (libVLC and friends) render video by invoking
//! callbacks on their own threads: "make the GL context current", "present
//! this frame", "leave the rendering section". The application, meanwhile,
//! owns the window, the event loop and sometimes a resize handler that also
//! needs the context for a moment. An OpenGL context can only be current on
//! one thread at a time, so those two sides must take turns.
//!
//! `baton` is that turn-taking. A [`ContextHandoff`] is a one-slot, FIFO-fair
//! hand-off primitive whose slot holds the detached context object itself:
//! whoever holds the [`ContextGuard`] owns the context, and dropping the
//! guard on any exit path, panics included, passes it back. On top of that,
//! [`EngineBridge`] maps a media engine's callback sequence (resolve symbol,
//! enter/leave render, present, size changed) onto the hand-off.
//!
//! This crate does not create windows or contexts. The windowing toolkit's
//! make-current/detach/swap primitive is injected through the
//! [`BindableContext`] trait; see the demos under `demos/` for a
//! winit + glutin wiring.

pub mod error;
pub use crate::error::Error;

mod handoff;
pub use crate::handoff::{ContextGuard, ContextHandoff};

mod context;
pub use crate::context::{BindableContext, CurrentContext};

mod engine;
pub use crate::engine::{EngineBridge, SizeReport, SymbolLoader};

#[cfg(test)]
mod tests;
