//! The kernel api: scheduling requests a coroutine can yield.
//!
//! A frame answers `Step::Api(request)` to ask the kernel for something.
//! The constructors in this module build those steps. Every request is
//! interpreted synchronously against the issuing strand: it either resumes
//! the strand right away or leaves it suspended with exactly one
//! well-defined source of resumption.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::coroutine::{Coroutine, IntoCoroutine, Step};
use crate::error::{Failure, ProtocolViolation};
use crate::event_loop::Event;
use crate::join::{SelectWait, Selected, TimeoutRace, Waiter};
use crate::kernel::Shared;
use crate::strand::{Pending, State, Strand};
use crate::suspend::Suspended;
use crate::value::Value;

/// A scheduling request.
pub enum Request {
    /// resume with no value after the duration
    Sleep(Duration),
    /// suspend until the callback's token is used
    Suspend(Box<dyn FnOnce(Suspended)>),
    /// run the coroutine on a child strand with a time limit
    Timeout(Duration, Box<dyn Coroutine>),
    /// resume immediately with no value
    Noop,
    /// resume with no value on the next tick
    Cooperate,
    /// run the coroutine on a new strand, resume with its handle
    Execute(Box<dyn Coroutine>),
    /// resume with the [`Selected`] first of the strands to exit
    Select(Vec<Strand>),
    /// finish the current frame with a value
    Return(Value),
    /// finish the current frame with a failure
    Throw(Failure),
    /// terminate the strand
    Terminate,
    /// resume with the handle of the current strand
    CurrentStrand,
}

impl Request {
    fn suspends(&self) -> bool {
        matches!(
            self,
            Request::Sleep(_)
                | Request::Suspend(_)
                | Request::Timeout(..)
                | Request::Cooperate
                | Request::Select(_)
        )
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Request::Sleep(d) => f.debug_tuple("Sleep").field(d).finish(),
            Request::Suspend(_) => f.write_str("Suspend"),
            Request::Timeout(d, _) => f.debug_tuple("Timeout").field(d).finish(),
            Request::Noop => f.write_str("Noop"),
            Request::Cooperate => f.write_str("Cooperate"),
            Request::Execute(_) => f.write_str("Execute"),
            Request::Select(strands) => {
                let ids: Vec<_> = strands.iter().map(|s| s.id()).collect();
                f.debug_tuple("Select").field(&ids).finish()
            }
            Request::Return(v) => f.debug_tuple("Return").field(v).finish(),
            Request::Throw(e) => f.debug_tuple("Throw").field(e).finish(),
            Request::Terminate => f.write_str("Terminate"),
            Request::CurrentStrand => f.write_str("CurrentStrand"),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Request constructors
////////////////////////////////////////////////////////////////////////////////

/// Suspend the strand for `timeout`.
pub fn sleep(timeout: Duration) -> Step {
    Step::Api(Request::Sleep(timeout))
}

/// Suspend the strand until it is resumed manually.
///
/// `callback` runs synchronously once the strand is suspended and receives
/// the token that resumes it.
pub fn suspend<F>(callback: F) -> Step
where
    F: FnOnce(Suspended) + 'static,
{
    Step::Api(Request::Suspend(Box::new(callback)))
}

/// Run `coroutine` with a time limit.
///
/// The strand resumes with the coroutine's outcome if it finishes in time,
/// otherwise the coroutine is terminated and the strand resumes with
/// `Failure::Timeout`.
pub fn timeout<C: IntoCoroutine>(timeout: Duration, coroutine: C) -> Step {
    Step::Api(Request::Timeout(timeout, coroutine.into_coroutine()))
}

/// Resume the strand immediately.
pub fn noop() -> Step {
    Step::Api(Request::Noop)
}

/// Resume the strand on the next tick, letting other ready strands run.
pub fn cooperate() -> Step {
    Step::Api(Request::Cooperate)
}

/// Run `coroutine` on its own strand, the caller resumes with a `Strand`
/// handle without waiting for it.
pub fn execute<C: IntoCoroutine>(coroutine: C) -> Step {
    Step::Api(Request::Execute(coroutine.into_coroutine()))
}

/// Wait for the first of `strands` to exit, the caller resumes with a
/// [`Selected`]. The other strands keep running.
pub fn select<I>(strands: I) -> Step
where
    I: IntoIterator<Item = Strand>,
{
    Step::Api(Request::Select(strands.into_iter().collect()))
}

/// Return `value` to the calling frame.
pub fn return_(value: Value) -> Step {
    Step::Api(Request::Return(value))
}

/// Throw `failure` to the calling frame.
pub fn throw(failure: Failure) -> Step {
    Step::Api(Request::Throw(failure))
}

/// Terminate the strand.
pub fn terminate() -> Step {
    Step::Api(Request::Terminate)
}

/// Get the handle of the current strand.
pub fn strand() -> Step {
    Step::Api(Request::CurrentStrand)
}

////////////////////////////////////////////////////////////////////////////////
// Dispatch
////////////////////////////////////////////////////////////////////////////////

/// What the strand does once a request was handled.
pub(crate) enum Dispatch {
    /// feed the outcome to the current frame
    Resume(Result<Value, Failure>),
    /// finish the current frame with the outcome
    Unwind(Result<Value, Failure>),
    Suspend,
    Terminate,
}

pub(crate) fn dispatch(kernel: &Shared, strand: &Strand, request: Request) -> Dispatch {
    trace!("{} requests {:?}", strand.id(), request);
    // the wait of the previous suspension was consumed when this drive began
    if request.suspends() && strand.has_pending() {
        let violation = ProtocolViolation::AlreadySuspended(strand.id());
        return Dispatch::Resume(Err(kernel.violation(violation)));
    }

    match request {
        Request::Sleep(timeout) => sleep_impl(kernel, strand, timeout),
        Request::Suspend(callback) => suspend_impl(strand, callback),
        Request::Timeout(timeout, coroutine) => timeout_impl(kernel, strand, timeout, coroutine),
        Request::Noop => Dispatch::Resume(Ok(Value::none())),
        Request::Cooperate => cooperate_impl(kernel, strand),
        Request::Execute(coroutine) => Dispatch::Resume(Ok(Value::new(kernel.spawn(coroutine)))),
        Request::Select(strands) => select_impl(kernel, strand, strands),
        Request::Return(value) => Dispatch::Unwind(Ok(value)),
        Request::Throw(failure) => Dispatch::Unwind(Err(failure)),
        Request::Terminate => Dispatch::Terminate,
        Request::CurrentStrand => Dispatch::Resume(Ok(Value::new(strand.clone()))),
    }
}

fn sleep_impl(kernel: &Shared, strand: &Strand, timeout: Duration) -> Dispatch {
    let event = Event::timer(strand.id(), strand.generation());
    match kernel.schedule_timer(timeout, event) {
        Ok(timer) => {
            strand.set_pending(Pending::Sleep(timer));
            Dispatch::Suspend
        }
        Err(err) => Dispatch::Resume(Err(err.into())),
    }
}

fn suspend_impl(strand: &Strand, callback: Box<dyn FnOnce(Suspended)>) -> Dispatch {
    strand.set_pending(Pending::Suspend);
    // the callback may resume or terminate the strand right away
    strand.set_state(State::Suspended);
    callback(Suspended::new(strand));
    Dispatch::Suspend
}

fn timeout_impl(
    kernel: &Shared,
    strand: &Strand,
    timeout: Duration,
    coroutine: Box<dyn Coroutine>,
) -> Dispatch {
    let event = Event::timer(strand.id(), strand.generation());
    let timer = match kernel.schedule_timer(timeout, event) {
        Ok(timer) => timer,
        Err(err) => return Dispatch::Resume(Err(err.into())),
    };
    let race = Rc::new(TimeoutRace::new(strand, timeout, timer));
    let child = kernel.spawn(coroutine);
    race.set_child(&child);
    child.add_waiter(Waiter::Timeout(race.clone()));
    strand.set_pending(Pending::Timeout(race));
    Dispatch::Suspend
}

fn cooperate_impl(kernel: &Shared, strand: &Strand) -> Dispatch {
    kernel.register_ready(Event::ready(strand.id(), strand.generation()));
    strand.set_pending(Pending::Cooperate);
    Dispatch::Suspend
}

fn select_impl(kernel: &Shared, strand: &Strand, strands: Vec<Strand>) -> Dispatch {
    if strands.is_empty() {
        return Dispatch::Resume(Err(kernel.violation(ProtocolViolation::EmptySelect)));
    }
    if strands.contains(strand) {
        let violation = ProtocolViolation::SelfSelect(strand.id());
        return Dispatch::Resume(Err(kernel.violation(violation)));
    }
    if let Some(selected) = Selected::first_exited(&strands) {
        return Dispatch::Resume(Ok(Value::new(selected)));
    }

    let select = Rc::new(SelectWait::new(strand, strands));
    for watched in select.strands() {
        watched.add_waiter(Waiter::Select(select.clone()));
    }
    strand.set_pending(Pending::Select(select));
    Dispatch::Suspend
}
