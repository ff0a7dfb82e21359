//! Waits on the exit of other strands.
//!
//! A `timeout` races a timer against a child strand, a `select` waits for
//! the first of several strands. Both register a [`Waiter`] on the strands
//! they watch; the watched strand notifies it when it exits.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use smallvec::SmallVec;

use crate::coroutine::Resume;
use crate::error::Failure;
use crate::event_loop::TimerHandle;
use crate::kernel::Shared;
use crate::strand::Strand;
use crate::value::Value;

/// The value a `select` resumes with.
#[derive(Debug, Clone)]
pub struct Selected {
    /// position of the winner in the selected strands
    pub index: usize,
    /// how the winner exited
    pub outcome: Result<Value, Failure>,
}

impl Selected {
    // the lowest indexed strand that already exited
    pub(crate) fn first_exited(strands: &[Strand]) -> Option<Selected> {
        strands.iter().enumerate().find_map(|(index, strand)| {
            strand
                .outcome()
                .map(|outcome| Selected { index, outcome })
        })
    }
}

pub(crate) enum Waiter {
    Timeout(Rc<TimeoutRace>),
    Select(Rc<SelectWait>),
}

impl Waiter {
    pub(crate) fn notify(self, kernel: &Shared, exited: &Strand) {
        match self {
            Waiter::Timeout(race) => race.child_exited(kernel, exited),
            Waiter::Select(select) => select.arm(kernel),
        }
    }

    pub(crate) fn is_select(&self, select: &Rc<SelectWait>) -> bool {
        match self {
            Waiter::Select(s) => Rc::ptr_eq(s, select),
            Waiter::Timeout(_) => false,
        }
    }
}

/// A timer racing a child strand on behalf of a suspended parent.
///
/// Whichever side settles the race first resumes the parent, the other
/// side finds `settled` set and does nothing.
pub(crate) struct TimeoutRace {
    parent: Strand,
    generation: u64,
    duration: Duration,
    child: RefCell<Option<Strand>>,
    timer: Cell<Option<TimerHandle>>,
    settled: Cell<bool>,
}

impl TimeoutRace {
    pub(crate) fn new(parent: &Strand, duration: Duration, timer: TimerHandle) -> TimeoutRace {
        TimeoutRace {
            parent: parent.clone(),
            generation: parent.generation(),
            duration,
            child: RefCell::new(None),
            timer: Cell::new(Some(timer)),
            settled: Cell::new(false),
        }
    }

    pub(crate) fn set_child(&self, child: &Strand) {
        *self.child.borrow_mut() = Some(child.clone());
    }

    // return true for the side that wins the race
    fn settle(&self) -> bool {
        !self.settled.replace(true)
    }

    fn child_exited(&self, kernel: &Shared, child: &Strand) {
        if !self.settle() {
            return;
        }
        if let Some(timer) = self.timer.take() {
            kernel.cancel_timer(timer);
        }
        self.child.borrow_mut().take();
        let outcome = child.outcome().unwrap_or(Err(Failure::Cancelled));
        debug!("{} finished within {:?}", child.id(), self.duration);
        kernel.wake(&self.parent, self.generation, outcome.into());
    }

    // the timer fired first
    pub(crate) fn expire(&self, kernel: &Shared) {
        if !self.settle() {
            return;
        }
        self.timer.take();
        let child = self.child.borrow_mut().take();
        if let Some(child) = child {
            debug!("{} timed out after {:?}", child.id(), self.duration);
            child.force_terminate(kernel);
        }
        kernel.wake(
            &self.parent,
            self.generation,
            Resume::Failure(Failure::Timeout(self.duration)),
        );
    }

    // the parent went away
    pub(crate) fn abandon(&self, kernel: &Shared) {
        if !self.settle() {
            return;
        }
        if let Some(timer) = self.timer.take() {
            kernel.cancel_timer(timer);
        }
        let child = self.child.borrow_mut().take();
        if let Some(child) = child {
            child.force_terminate(kernel);
        }
    }
}

/// A parent waiting for the first of a set of strands to exit.
pub(crate) struct SelectWait {
    parent: Strand,
    generation: u64,
    strands: SmallVec<[Strand; 4]>,
    // queued for resolution at the end of the tick
    armed: Cell<bool>,
    settled: Cell<bool>,
}

impl SelectWait {
    pub(crate) fn new(parent: &Strand, strands: Vec<Strand>) -> SelectWait {
        SelectWait {
            parent: parent.clone(),
            generation: parent.generation(),
            strands: SmallVec::from_vec(strands),
            armed: Cell::new(false),
            settled: Cell::new(false),
        }
    }

    pub(crate) fn strands(&self) -> &[Strand] {
        &self.strands
    }

    // resolution waits until the tick settles so that strands exiting in
    // the same tick are decided by their position, not their exit order
    fn arm(self: Rc<Self>, kernel: &Shared) {
        if self.settled.get() || self.armed.replace(true) {
            return;
        }
        kernel.defer(self);
    }

    pub(crate) fn resolve(self: &Rc<Self>, kernel: &Shared) {
        self.armed.set(false);
        if self.settled.get() {
            return;
        }
        let selected = match Selected::first_exited(&self.strands) {
            Some(selected) => selected,
            None => return,
        };
        self.settled.set(true);
        self.detach();
        debug!(
            "{} selected {}",
            self.parent.id(),
            self.strands[selected.index].id()
        );
        kernel.wake(
            &self.parent,
            self.generation,
            Resume::Value(Value::new(selected)),
        );
    }

    pub(crate) fn abandon(self: &Rc<Self>) {
        self.settled.set(true);
        self.detach();
    }

    // the losers keep running, they only stop reporting to us
    fn detach(self: &Rc<Self>) {
        for strand in self.strands.iter() {
            strand.remove_select(self);
        }
    }
}
