//! The coroutine contract and the basic coroutine flavors.
//!
//! Every frame on a strand's call stack is a [`Coroutine`]. The strand
//! advances a frame with [`Coroutine::call`] and feeds back the outcome of
//! whatever the frame asked for through the `resume_*` methods. Each of
//! them answers with a [`Step`] telling the strand what to do next.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use weft::coroutine::{from_fn, Resume, Step};
//! use weft::{api, Kernel, SimLoop, Value};
//!
//! let mut kernel = Kernel::with_event_loop(SimLoop::new());
//! let strand = kernel.execute(from_fn(|_strand, resume| match resume {
//!     Resume::Start => api::sleep(Duration::from_millis(10)),
//!     Resume::Value(_) => Step::Return(Value::new("woke up")),
//!     Resume::Failure(f) => Step::Throw(f),
//! }));
//! kernel.run();
//!
//! let value = strand.outcome().unwrap().unwrap();
//! assert_eq!(value.get::<&str>(), Some("woke up"));
//! ```

use std::fmt;

use crate::api::Request;
use crate::error::Failure;
use crate::strand::Strand;
use crate::value::Value;

pub use crate::stackful::{stackful, Stackful, Yielder};

/// What a frame asks its strand to do next.
pub enum Step {
    /// push a nested coroutine and run it until it finishes
    Call(Box<dyn Coroutine>),
    /// hand a request to the kernel
    Api(Request),
    /// finish the frame with a value
    Return(Value),
    /// finish the frame with a failure
    Throw(Failure),
}

impl Step {
    /// push `coroutine` as a nested frame
    pub fn call<C: IntoCoroutine>(coroutine: C) -> Step {
        Step::Call(coroutine.into_coroutine())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Call(_) => f.write_str("Call(..)"),
            Step::Api(request) => f.debug_tuple("Api").field(request).finish(),
            Step::Return(value) => f.debug_tuple("Return").field(value).finish(),
            Step::Throw(failure) => f.debug_tuple("Throw").field(failure).finish(),
        }
    }
}

/// The input a frame is driven with.
#[derive(Debug, Clone)]
pub enum Resume {
    /// the first visit of the frame
    Start,
    Value(Value),
    Failure(Failure),
}

impl Resume {
    /// the outcome carried by this input, `Start` carries no value
    pub fn into_result(self) -> Result<Value, Failure> {
        match self {
            Resume::Start => Ok(Value::none()),
            Resume::Value(value) => Ok(value),
            Resume::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<Value, Failure>> for Resume {
    fn from(outcome: Result<Value, Failure>) -> Self {
        match outcome {
            Ok(value) => Resume::Value(value),
            Err(failure) => Resume::Failure(failure),
        }
    }
}

/// The contract every suspendable unit satisfies.
///
/// A frame is `call`ed exactly once before any `resume_*`, and `finalize`d
/// exactly once after it leaves the stack. When the strand is terminated
/// `terminate` runs first, innermost frame first.
pub trait Coroutine {
    /// called once, right before the first `call`
    fn initialize(&mut self, _strand: &Strand) {}

    /// advance the coroutine from its first visit
    fn call(&mut self, strand: &Strand) -> Step;

    /// deliver the value of the nested frame or request
    ///
    /// by default the coroutine completes with that value
    fn resume_with_value(&mut self, _strand: &Strand, value: Value) -> Step {
        Step::Return(value)
    }

    /// deliver the failure of the nested frame or request
    ///
    /// by default the failure propagates to the calling frame
    fn resume_with_failure(&mut self, _strand: &Strand, failure: Failure) -> Step {
        Step::Throw(failure)
    }

    /// the strand is being terminated, release what the frame holds
    fn terminate(&mut self, _strand: &Strand) {}

    /// the frame has left the stack
    fn finalize(&mut self, _strand: &Strand) {}
}

/// Conversion into a boxed coroutine.
pub trait IntoCoroutine {
    fn into_coroutine(self) -> Box<dyn Coroutine>;
}

impl<C: Coroutine + 'static> IntoCoroutine for C {
    fn into_coroutine(self) -> Box<dyn Coroutine> {
        Box::new(self)
    }
}

impl IntoCoroutine for Box<dyn Coroutine> {
    fn into_coroutine(self) -> Box<dyn Coroutine> {
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Flavors
////////////////////////////////////////////////////////////////////////////////

/// A coroutine that completes immediately with a value.
pub struct Ready(Option<Result<Value, Failure>>);

impl Coroutine for Ready {
    fn call(&mut self, _strand: &Strand) -> Step {
        match self.0.take() {
            Some(Ok(value)) => Step::Return(value),
            Some(Err(failure)) => Step::Throw(failure),
            None => Step::Return(Value::none()),
        }
    }
}

/// completes with `value`
pub fn value(value: Value) -> Ready {
    Ready(Some(Ok(value)))
}

/// fails with `failure`
pub fn failure(failure: Failure) -> Ready {
    Ready(Some(Err(failure)))
}

/// A coroutine written as a state machine closure.
pub struct FromFn<F> {
    f: F,
}

/// build a coroutine from a closure driven with every [`Resume`] input
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&Strand, Resume) -> Step,
{
    FromFn { f }
}

impl<F> Coroutine for FromFn<F>
where
    F: FnMut(&Strand, Resume) -> Step,
{
    fn call(&mut self, strand: &Strand) -> Step {
        (self.f)(strand, Resume::Start)
    }

    fn resume_with_value(&mut self, strand: &Strand, value: Value) -> Step {
        (self.f)(strand, Resume::Value(value))
    }

    fn resume_with_failure(&mut self, strand: &Strand, failure: Failure) -> Step {
        (self.f)(strand, Resume::Failure(failure))
    }
}
