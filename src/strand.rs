//! The strand execution engine.
//!
//! A strand owns a call stack of coroutine frames. Driving it runs the top
//! frame and interprets the [`Step`] it answers with: nested coroutines are
//! pushed, finished frames are popped and their outcome fed to the frame
//! below, and kernel requests are handed to the api layer which decides
//! when the strand runs again. All of this happens synchronously until the
//! strand suspends or exits.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::api::{self, Dispatch};
use crate::coroutine::{Coroutine, Resume, Step};
use crate::error::{Failure, ProtocolViolation};
use crate::event_loop::TimerHandle;
use crate::join::{SelectWait, TimeoutRace, Waiter};
use crate::kernel::Shared;
use crate::value::Value;

/// Identifier of a strand, unique within its kernel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrandId(u64);

impl StrandId {
    pub(crate) fn new(id: u64) -> StrandId {
        StrandId(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for StrandId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "strand#{}", self.0)
    }
}

impl fmt::Display for StrandId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "strand#{}", self.0)
    }
}

/// Lifecycle state of a strand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// created, waiting for its first drive
    Pending,
    Running,
    /// waiting for a kernel request to resume it
    Suspended,
    /// unwinding its stack after a terminate
    Terminating,
    Terminated,
    Completed,
    Failed,
}

impl State {
    pub fn has_exited(self) -> bool {
        matches!(self, State::Terminated | State::Completed | State::Failed)
    }
}

// the one outstanding resumption source of a suspended strand
#[derive(Clone)]
pub(crate) enum Pending {
    Sleep(TimerHandle),
    Suspend,
    Cooperate,
    Timeout(Rc<TimeoutRace>),
    Select(Rc<SelectWait>),
}

struct Frame {
    co: Box<dyn Coroutine>,
    started: bool,
}

impl Frame {
    fn new(co: Box<dyn Coroutine>) -> Frame {
        Frame { co, started: false }
    }
}

struct Inner {
    id: StrandId,
    kernel: Weak<Shared>,
    state: Cell<State>,
    // bumped on every resumption and on exit, events tagged with an older
    // generation are stale
    generation: Cell<u64>,
    stack: RefCell<SmallVec<[Frame; 8]>>,
    pending: RefCell<Option<Pending>>,
    outcome: RefCell<Option<Result<Value, Failure>>>,
    waiters: RefCell<Vec<Waiter>>,
    terminate_requested: Cell<bool>,
}

/// A handle to a strand.
///
/// Handles are cheap to clone and stay valid after the strand exits, its
/// outcome remains readable.
#[derive(Clone)]
pub struct Strand {
    inner: Rc<Inner>,
}

impl PartialEq for Strand {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Strand {}

impl fmt::Debug for Strand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Strand")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("depth", &self.depth())
            .finish()
    }
}

impl Strand {
    pub(crate) fn new(id: StrandId, kernel: Weak<Shared>, co: Box<dyn Coroutine>) -> Strand {
        let mut stack = SmallVec::new();
        stack.push(Frame::new(co));
        Strand {
            inner: Rc::new(Inner {
                id,
                kernel,
                state: Cell::new(State::Pending),
                generation: Cell::new(0),
                stack: RefCell::new(stack),
                pending: RefCell::new(None),
                outcome: RefCell::new(None),
                waiters: RefCell::new(Vec::new()),
                terminate_requested: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> StrandId {
        self.inner.id
    }

    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    pub fn has_exited(&self) -> bool {
        self.state().has_exited()
    }

    /// Number of frames on the call stack.
    pub fn depth(&self) -> usize {
        self.inner.stack.borrow().len()
    }

    /// The result of the strand once it exited.
    ///
    /// A terminated strand reports `Failure::Cancelled`.
    pub fn outcome(&self) -> Option<Result<Value, Failure>> {
        self.inner.outcome.borrow().clone()
    }

    /// Force the strand to exit.
    ///
    /// Every frame is told to `terminate`, innermost first, then finalized.
    /// A strand terminating itself from inside one of its frames unwinds as
    /// soon as that frame returns control.
    pub fn terminate(&self) {
        match self.kernel() {
            Some(kernel) => self.force_terminate(&kernel),
            None => debug!("{} outlived its kernel, ignore terminate", self.id()),
        }
    }

    pub(crate) fn kernel(&self) -> Option<Rc<Shared>> {
        self.inner.kernel.upgrade()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.get()
    }

    fn bump_generation(&self) {
        self.inner.generation.set(self.generation() + 1);
    }

    pub(crate) fn set_state(&self, state: State) {
        self.inner.state.set(state);
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    pub(crate) fn pending(&self) -> Option<Pending> {
        self.inner.pending.borrow().clone()
    }

    pub(crate) fn set_pending(&self, pending: Pending) {
        *self.inner.pending.borrow_mut() = Some(pending);
    }

    // consume a resumption: the outstanding wait is over and every event
    // tagged with the current generation becomes stale
    pub(crate) fn accept(&self) {
        self.bump_generation();
        self.inner.pending.borrow_mut().take();
    }

    pub(crate) fn add_waiter(&self, waiter: Waiter) {
        self.inner.waiters.borrow_mut().push(waiter);
    }

    pub(crate) fn remove_select(&self, select: &Rc<SelectWait>) {
        self.inner
            .waiters
            .borrow_mut()
            .retain(|waiter| !waiter.is_select(select));
    }

    fn push_frame(&self, frame: Frame) {
        self.inner.stack.borrow_mut().push(frame);
    }

    fn pop_frame(&self) -> Option<Frame> {
        self.inner.stack.borrow_mut().pop()
    }

    /// drive the strand until it suspends or exits
    pub(crate) fn drive(&self, kernel: &Shared, input: Resume) {
        let mut input = input;
        self.set_state(State::Running);
        loop {
            if self.inner.terminate_requested.get() {
                return self.tear_down(kernel);
            }
            let mut frame = match self.pop_frame() {
                Some(frame) => frame,
                None => return,
            };

            let step = match input {
                Resume::Start => {
                    frame.started = true;
                    frame.co.initialize(self);
                    frame.co.call(self)
                }
                Resume::Value(value) => frame.co.resume_with_value(self, value),
                Resume::Failure(failure) => frame.co.resume_with_failure(self, failure),
            };

            if self.inner.terminate_requested.get() {
                self.push_frame(frame);
                return self.tear_down(kernel);
            }

            input = match step {
                Step::Call(co) => {
                    self.push_frame(frame);
                    self.push(kernel, co)
                }
                Step::Api(request) => {
                    self.push_frame(frame);
                    match api::dispatch(kernel, self, request) {
                        _ if self.has_exited() => return,
                        Dispatch::Resume(outcome) => outcome.into(),
                        Dispatch::Suspend => {
                            self.set_state(State::Suspended);
                            debug!("{} suspended at depth {}", self.id(), self.depth());
                            return;
                        }
                        Dispatch::Unwind(outcome) => match self.pop_frame() {
                            Some(frame) => match self.unwind(kernel, frame, outcome) {
                                Some(input) => input,
                                None => return,
                            },
                            None => return,
                        },
                        Dispatch::Terminate => return self.tear_down(kernel),
                    }
                }
                Step::Return(value) => match self.unwind(kernel, frame, Ok(value)) {
                    Some(input) => input,
                    None => return,
                },
                Step::Throw(failure) => match self.unwind(kernel, frame, Err(failure)) {
                    Some(input) => input,
                    None => return,
                },
            };
        }
    }

    // push a nested frame, the frame below gets a failure past the limit
    fn push(&self, kernel: &Shared, co: Box<dyn Coroutine>) -> Resume {
        let limit = kernel.config().get_stack_limit();
        if self.depth() >= limit {
            return Resume::Failure(kernel.violation(ProtocolViolation::StackOverflow { limit }));
        }
        self.push_frame(Frame::new(co));
        trace!("{} push frame, depth={}", self.id(), self.depth());
        Resume::Start
    }

    // finalize a finished frame, return the input for the frame below or
    // None when the strand exited
    fn unwind(
        &self,
        kernel: &Shared,
        mut frame: Frame,
        outcome: Result<Value, Failure>,
    ) -> Option<Resume> {
        frame.co.finalize(self);
        drop(frame);
        trace!("{} pop frame, depth={}", self.id(), self.depth());
        if self.depth() > 0 {
            return Some(outcome.into());
        }
        match outcome {
            Ok(value) => self.exit(kernel, State::Completed, Ok(value)),
            Err(failure) => self.exit(kernel, State::Failed, Err(failure)),
        }
        None
    }

    /// terminate the strand, deferred to the end of the current step when
    /// one of its frames is executing
    pub(crate) fn force_terminate(&self, kernel: &Shared) {
        match self.state() {
            State::Running => self.inner.terminate_requested.set(true),
            State::Terminating => {}
            state if state.has_exited() => {}
            _ => self.tear_down(kernel),
        }
    }

    // unwind every frame now, the caller guarantees none of them executes
    pub(crate) fn tear_down(&self, kernel: &Shared) {
        if self.has_exited() || self.state() == State::Terminating {
            return;
        }
        debug!("{} terminating at depth {}", self.id(), self.depth());
        self.inner.terminate_requested.set(false);
        self.set_state(State::Terminating);

        let pending = self.inner.pending.borrow_mut().take();
        if let Some(pending) = pending {
            kernel.abandon(pending);
        }

        let mut frames = mem::take(&mut *self.inner.stack.borrow_mut());
        // innermost first, frames that never ran have nothing to release
        for frame in frames.iter_mut().rev().filter(|frame| frame.started) {
            frame.co.terminate(self);
        }
        while let Some(mut frame) = frames.pop() {
            if frame.started {
                frame.co.finalize(self);
            }
        }

        self.exit(kernel, State::Terminated, Err(Failure::Cancelled));
    }

    fn exit(&self, kernel: &Shared, state: State, outcome: Result<Value, Failure>) {
        self.set_state(state);
        self.bump_generation();
        *self.inner.outcome.borrow_mut() = Some(outcome.clone());
        kernel.retire(self);

        let waiters = mem::take(&mut *self.inner.waiters.borrow_mut());
        match outcome {
            Err(ref failure) if state == State::Failed && waiters.is_empty() => {
                kernel.report_unhandled(self, failure.clone());
            }
            _ => debug!("{} exited {:?}", self.id(), state),
        }
        for waiter in waiters {
            waiter.notify(kernel, self);
        }
    }
}
