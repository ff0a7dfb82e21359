//! The event loop capability consumed by the kernel.
//!
//! The kernel never sleeps or polls on its own: timers, next-tick
//! readiness and cross-thread wakeups all go through an [`EventLoop`].
//! Two loops ship with the crate, [`SimLoop`] with a simulated clock and
//! [`SystemLoop`] on the monotonic wall clock.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::error::SchedulingError;
use crate::strand::StrandId;

mod sim;
mod system;

pub use self::sim::SimLoop;
pub use self::system::SystemLoop;

/// Handle of a registered timer, used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> TimerHandle {
        TimerHandle(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

pub(crate) enum EventKind {
    Timer,
    Ready,
    Remote(Result<Box<dyn Any + Send>, String>),
}

/// A wakeup the loop hands back to the kernel.
///
/// Events are opaque to loop implementations: they are stored when
/// registered and returned from [`EventLoop::run_one_tick`] when due.
pub struct Event {
    pub(crate) strand: StrandId,
    pub(crate) generation: u64,
    pub(crate) kind: EventKind,
}

impl Event {
    pub(crate) fn timer(strand: StrandId, generation: u64) -> Event {
        Event {
            strand,
            generation,
            kind: EventKind::Timer,
        }
    }

    pub(crate) fn ready(strand: StrandId, generation: u64) -> Event {
        Event {
            strand,
            generation,
            kind: EventKind::Ready,
        }
    }

    pub(crate) fn remote(
        strand: StrandId,
        generation: u64,
        payload: Result<Box<dyn Any + Send>, String>,
    ) -> Event {
        Event {
            strand,
            generation,
            kind: EventKind::Remote(payload),
        }
    }

    /// The strand this event wakes.
    pub fn strand(&self) -> StrandId {
        self.strand
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            EventKind::Timer => "timer",
            EventKind::Ready => "ready",
            EventKind::Remote(_) => "remote",
        };
        f.debug_struct("Event")
            .field("strand", &self.strand)
            .field("generation", &self.generation)
            .field("kind", &kind)
            .finish()
    }
}

/// Sending half for events produced on other threads.
///
/// A loop counts the injectors it handed out as pending work, so it keeps
/// waiting while one is alive.
#[derive(Clone)]
pub struct Injector {
    tx: Sender<Event>,
    _live: Arc<()>,
}

impl Injector {
    pub fn new(tx: Sender<Event>, live: Arc<()>) -> Injector {
        Injector { tx, _live: live }
    }

    pub(crate) fn inject(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event loop is gone, drop remote event");
        }
    }
}

/// The scheduling capability the kernel runs on.
pub trait EventLoop {
    /// register a timer that hands `event` back after `delay`
    fn schedule_timer(
        &mut self,
        delay: Duration,
        event: Event,
    ) -> Result<TimerHandle, SchedulingError>;

    /// cancel a timer, a no-op if it already fired
    fn cancel_timer(&mut self, timer: TimerHandle);

    /// hand `event` back on the next tick
    fn register_ready(&mut self, event: Event);

    /// collect the events due in this tick
    ///
    /// when `idle` is set the kernel has nothing else to run and the loop
    /// may wait for the next timer to expire
    fn run_one_tick(&mut self, fired: &mut Vec<Event>, idle: bool);

    /// if there is any registered timer, ready event or outstanding injector
    fn has_pending_work(&self) -> bool;

    /// time elapsed on the loop clock
    fn now(&self) -> Duration;

    /// a sender for events produced on other threads
    fn injector(&self) -> Option<Injector> {
        None
    }
}
