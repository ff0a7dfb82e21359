use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use super::{Event, EventLoop, Injector, TimerHandle};
use crate::error::SchedulingError;
use crate::timeout_list::{dur_to_ns, ns_to_dur, TimeoutList};

// how long an idle loop blocks when only injectors can wake it
const REMOTE_POLL: Duration = Duration::from_millis(10);

/// Event loop on the monotonic wall clock.
///
/// An idle tick blocks on the injection channel until the next timer
/// deadline, so events sent from other threads wake it early.
pub struct SystemLoop {
    start: Instant,
    timer_list: TimeoutList<Event>,
    ready: Vec<Event>,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    live: Arc<()>,
}

impl Default for SystemLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemLoop {
    pub fn new() -> SystemLoop {
        let (tx, rx) = channel::unbounded();
        SystemLoop {
            start: Instant::now(),
            timer_list: TimeoutList::new(),
            ready: Vec::new(),
            tx,
            rx,
            live: Arc::new(()),
        }
    }

    fn elapsed_ns(&self) -> u64 {
        dur_to_ns(self.start.elapsed())
    }

    fn remote_outstanding(&self) -> bool {
        Arc::strong_count(&self.live) > 1
    }

    fn wait(&mut self, fired: &mut Vec<Event>) {
        let timeout = match self.timer_list.next_expire() {
            Some(time) => ns_to_dur(time.saturating_sub(self.elapsed_ns())),
            None if self.remote_outstanding() => REMOTE_POLL,
            None => return,
        };
        if let Ok(event) = self.rx.recv_timeout(timeout) {
            fired.push(event);
        }
    }
}

impl EventLoop for SystemLoop {
    fn schedule_timer(
        &mut self,
        delay: Duration,
        event: Event,
    ) -> Result<TimerHandle, SchedulingError> {
        let time = self
            .elapsed_ns()
            .checked_add(dur_to_ns(delay))
            .ok_or_else(|| SchedulingError::TimerRejected {
                reason: format!("deadline {delay:?} overflows the loop clock"),
            })?;
        Ok(TimerHandle::new(self.timer_list.add_timer(time, event)))
    }

    fn cancel_timer(&mut self, timer: TimerHandle) {
        self.timer_list.del_timer(timer.id());
    }

    fn register_ready(&mut self, event: Event) {
        self.ready.push(event);
    }

    fn run_one_tick(&mut self, fired: &mut Vec<Event>, idle: bool) {
        fired.append(&mut self.ready);
        fired.extend(self.rx.try_iter());
        if idle && fired.is_empty() {
            self.wait(fired);
        }
        let now = self.elapsed_ns();
        self.timer_list.schedule_timer(now, |event| fired.push(event));
    }

    fn has_pending_work(&self) -> bool {
        !self.ready.is_empty()
            || !self.timer_list.is_empty()
            || !self.rx.is_empty()
            || self.remote_outstanding()
    }

    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn injector(&self) -> Option<Injector> {
        Some(Injector::new(self.tx.clone(), self.live.clone()))
    }
}
