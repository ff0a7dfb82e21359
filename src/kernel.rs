//! The kernel: owns the strands and pumps ticks of the event loop.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::config::Config;
use crate::coroutine::{Coroutine, IntoCoroutine, Resume};
use crate::error::{Failure, ProtocolViolation, SchedulingError, UnhandledFailure};
use crate::event_loop::{Event, EventKind, EventLoop, Injector, SystemLoop, TimerHandle};
use crate::join::SelectWait;
use crate::strand::{Pending, State, Strand, StrandId};
use crate::value::Value;

// a resumption waiting to be delivered in the current tick
struct Wakeup {
    strand: Strand,
    generation: u64,
    input: Resume,
}

/// Kernel state shared with the strands and the api layer.
pub(crate) struct Shared {
    config: Config,
    this: Weak<Shared>,
    event_loop: RefCell<Box<dyn EventLoop>>,
    strands: RefCell<BTreeMap<StrandId, Strand>>,
    ready: RefCell<VecDeque<Wakeup>>,
    deferred: RefCell<Vec<Rc<SelectWait>>>,
    unhandled: RefCell<Vec<UnhandledFailure>>,
    next_id: Cell<u64>,
}

impl Shared {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// create a strand and queue its first drive
    pub(crate) fn spawn(&self, coroutine: Box<dyn Coroutine>) -> Strand {
        let id = StrandId::new(self.next_id.get());
        self.next_id.set(id.as_u64() + 1);
        let strand = Strand::new(id, self.this.clone(), coroutine);
        self.strands.borrow_mut().insert(id, strand.clone());
        debug!("[{}] spawn {}", self.config.get_name(), id);
        self.wake(&strand, strand.generation(), Resume::Start);
        strand
    }

    /// queue a resumption for this tick, validated when delivered
    pub(crate) fn wake(&self, strand: &Strand, generation: u64, input: Resume) {
        self.ready.borrow_mut().push_back(Wakeup {
            strand: strand.clone(),
            generation,
            input,
        });
    }

    pub(crate) fn defer(&self, select: Rc<SelectWait>) {
        self.deferred.borrow_mut().push(select);
    }

    pub(crate) fn retire(&self, strand: &Strand) {
        self.strands.borrow_mut().remove(&strand.id());
    }

    pub(crate) fn schedule_timer(
        &self,
        delay: Duration,
        event: Event,
    ) -> Result<TimerHandle, SchedulingError> {
        let result = self.event_loop.borrow_mut().schedule_timer(delay, event);
        match result {
            Ok(timer) => debug!("[{}] timer {:?} in {:?}", self.config.get_name(), timer, delay),
            Err(ref err) => warn!("[{}] {}", self.config.get_name(), err),
        }
        result
    }

    pub(crate) fn cancel_timer(&self, timer: TimerHandle) {
        self.event_loop.borrow_mut().cancel_timer(timer);
    }

    pub(crate) fn register_ready(&self, event: Event) {
        self.event_loop.borrow_mut().register_ready(event);
    }

    pub(crate) fn injector(&self) -> Option<Injector> {
        self.event_loop.borrow().injector()
    }

    pub(crate) fn violation(&self, violation: ProtocolViolation) -> Failure {
        error!("[{}] protocol violation: {}", self.config.get_name(), violation);
        if self.config.is_strict() {
            panic!("protocol violation: {}", violation);
        }
        Failure::Protocol(violation)
    }

    pub(crate) fn report_unhandled(&self, strand: &Strand, failure: Failure) {
        error!(
            "[{}] {} failed with nobody waiting: {}",
            self.config.get_name(),
            strand.id(),
            failure
        );
        self.unhandled.borrow_mut().push(UnhandledFailure {
            strand: strand.id(),
            failure,
        });
    }

    /// release the resumption source of a strand that stops waiting
    pub(crate) fn abandon(&self, pending: Pending) {
        match pending {
            Pending::Sleep(timer) => self.cancel_timer(timer),
            Pending::Timeout(race) => race.abandon(self),
            Pending::Select(select) => select.abandon(),
            Pending::Suspend | Pending::Cooperate => {}
        }
    }

    // translate a loop event into a resumption of the waiting strand
    fn dispatch(&self, event: Event) {
        let strand = self.strands.borrow().get(&event.strand).cloned();
        let strand = match strand {
            Some(strand) => strand,
            None => {
                debug!("drop event {:?} of an exited strand", event);
                return;
            }
        };
        if strand.generation() != event.generation || strand.state() != State::Suspended {
            debug!("drop stale event {:?}", event);
            return;
        }

        let generation = event.generation;
        match (event.kind, strand.pending()) {
            (EventKind::Timer, Some(Pending::Sleep(_))) => {
                self.wake(&strand, generation, Resume::Value(Value::none()))
            }
            (EventKind::Timer, Some(Pending::Timeout(race))) => race.expire(self),
            (EventKind::Ready, Some(Pending::Cooperate)) => {
                self.wake(&strand, generation, Resume::Value(Value::none()))
            }
            (EventKind::Remote(payload), Some(Pending::Suspend)) => {
                let input = match payload {
                    Ok(value) => Resume::Value(Value::from_send(value)),
                    Err(message) => Resume::Failure(Failure::msg(message)),
                };
                self.wake(&strand, generation, input)
            }
            _ => debug!("{} is not waiting for this event", strand.id()),
        }
    }

    fn drain_ready(&self) {
        loop {
            let wakeup = self.ready.borrow_mut().pop_front();
            let Wakeup {
                strand,
                generation,
                input,
            } = match wakeup {
                Some(wakeup) => wakeup,
                None => return,
            };
            let resumable = matches!(strand.state(), State::Pending | State::Suspended);
            if !resumable || strand.generation() != generation {
                trace!("{} ignore stale resumption", strand.id());
                continue;
            }
            strand.accept();
            strand.drive(self, input);
        }
    }

    // run until no strand is ready and no select is left to resolve
    fn settle(&self) {
        loop {
            self.drain_ready();
            let deferred = mem::take(&mut *self.deferred.borrow_mut());
            if deferred.is_empty() {
                return;
            }
            for select in deferred {
                select.resolve(self);
            }
        }
    }

    fn has_ready(&self) -> bool {
        !self.ready.borrow().is_empty() || !self.deferred.borrow().is_empty()
    }
}

/// The coroutine kernel.
///
/// Owns every live strand and the event loop they are scheduled on. The
/// kernel is driven by whoever calls [`Kernel::tick`] or [`Kernel::run`].
pub struct Kernel {
    shared: Rc<Shared>,
    ticks: u64,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// A kernel on the wall clock.
    pub fn new() -> Kernel {
        Kernel::with_event_loop(SystemLoop::new())
    }

    pub fn with_event_loop<L: EventLoop + 'static>(event_loop: L) -> Kernel {
        Kernel::with_config(Config::default(), event_loop)
    }

    pub fn with_config<L: EventLoop + 'static>(config: Config, event_loop: L) -> Kernel {
        let shared = Rc::new_cyclic(|this| Shared {
            config,
            this: this.clone(),
            event_loop: RefCell::new(Box::new(event_loop)),
            strands: RefCell::new(BTreeMap::new()),
            ready: RefCell::new(VecDeque::new()),
            deferred: RefCell::new(Vec::new()),
            unhandled: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        });
        Kernel { shared, ticks: 0 }
    }

    pub fn config(&self) -> &Config {
        self.shared.config()
    }

    /// Run `coroutine` on a new root strand, starting on the next tick.
    pub fn execute<C: IntoCoroutine>(&mut self, coroutine: C) -> Strand {
        self.shared.spawn(coroutine.into_coroutine())
    }

    /// Pump one tick: deliver what the event loop has due, then drive every
    /// strand that became ready until none is left.
    pub fn tick(&mut self) {
        self.ticks += 1;
        let idle = !self.shared.has_ready();
        let mut fired = Vec::new();
        self.shared
            .event_loop
            .borrow_mut()
            .run_one_tick(&mut fired, idle);
        trace!("[{}] tick {}, {} event(s)", self.config().get_name(), self.ticks, fired.len());
        for event in fired {
            self.shared.dispatch(event);
        }
        self.shared.settle();
    }

    /// Pump ticks until nothing can make progress, return the failures of
    /// strands nobody was waiting for.
    pub fn run(&mut self) -> Vec<UnhandledFailure> {
        loop {
            self.tick();
            if self.is_idle() {
                break;
            }
        }
        let stuck = self.shared.strands.borrow().len();
        if stuck > 0 {
            warn!(
                "[{}] idle with {} strand(s) left suspended",
                self.config().get_name(),
                stuck
            );
        }
        self.take_unhandled()
    }

    /// Returns true if no strand is ready and the loop has nothing pending.
    pub fn is_idle(&self) -> bool {
        !self.shared.has_ready() && !self.shared.event_loop.borrow().has_pending_work()
    }

    /// The live strands, in creation order.
    pub fn strands(&self) -> Vec<Strand> {
        self.shared.strands.borrow().values().cloned().collect()
    }

    /// Time on the event loop clock.
    pub fn now(&self) -> Duration {
        self.shared.event_loop.borrow().now()
    }

    /// Number of ticks pumped so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Drain the failures of strands nobody was waiting for.
    pub fn take_unhandled(&mut self) -> Vec<UnhandledFailure> {
        mem::take(&mut *self.shared.unhandled.borrow_mut())
    }
}

impl Drop for Kernel {
    // terminate what is left so every frame gets its cleanup
    fn drop(&mut self) {
        self.shared.ready.borrow_mut().clear();
        self.shared.deferred.borrow_mut().clear();
        for strand in self.strands() {
            strand.tear_down(&self.shared);
        }
        self.shared.ready.borrow_mut().clear();
        self.shared.deferred.borrow_mut().clear();
    }
}
