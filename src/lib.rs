//! # Cooperative Coroutine Kernel
//!
//! Weft runs coroutines cooperatively on strands, single threaded, on top
//! of a pluggable event loop. A strand is a lightweight thread of execution
//! that owns an explicit call stack of coroutine frames.
//!
//! ## Features
//!
//! * Explicit frame stacks with nested coroutine calls and failure propagation
//! * Kernel requests for sleep, manual suspension, time limits and select
//! * Forced termination that gives every frame a chance to clean up
//! * Stackful coroutines based on `generator`
//! * Simulated clock event loop for deterministic tests
//! * Wall clock event loop with resumption from other threads
//!

// #![deny(missing_docs)]

#[macro_use]
#[doc(hidden)]
extern crate log;

mod config;
mod error;
mod join;
mod kernel;
#[macro_use]
mod macros;
mod stackful;
mod strand;
mod suspend;
mod timeout_list;
mod value;

pub mod api;
pub mod coroutine;
pub mod event_loop;

pub use crate::api::Request;
pub use crate::config::Config;
pub use crate::coroutine::{Coroutine, IntoCoroutine, Resume, Step};
pub use crate::error::{Failure, ProtocolViolation, SchedulingError, UnhandledFailure};
pub use crate::event_loop::{Event, EventLoop, Injector, SimLoop, SystemLoop, TimerHandle};
pub use crate::join::Selected;
pub use crate::kernel::Kernel;
pub use crate::strand::{State, Strand, StrandId};
pub use crate::suspend::{RemoteResumer, Suspended};
pub use crate::value::Value;

/// Run `coroutine` to completion on a fresh wall clock kernel.
///
/// Returns the outcome of the root strand. A root strand that is still
/// suspended when nothing is left to wake it is reported as cancelled.
pub fn run<C: IntoCoroutine>(coroutine: C) -> Result<Value, Failure> {
    let mut kernel = Kernel::new();
    let strand = kernel.execute(coroutine);
    kernel.run();
    match strand.outcome() {
        Some(outcome) => outcome,
        None => {
            drop(kernel);
            strand.outcome().unwrap_or(Err(Failure::Cancelled))
        }
    }
}
