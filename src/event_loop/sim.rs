use std::time::Duration;

use super::{Event, EventLoop, TimerHandle};
use crate::error::SchedulingError;
use crate::timeout_list::{dur_to_ns, ns_to_dur, TimeoutList};

/// Deterministic event loop on a simulated clock.
///
/// Time only moves when the kernel is idle: the clock then jumps straight
/// to the earliest timer deadline, so sleeping strands never cost real time.
#[derive(Default)]
pub struct SimLoop {
    now: u64,
    timer_list: TimeoutList<Event>,
    ready: Vec<Event>,
    timer_limit: Option<usize>,
}

impl SimLoop {
    pub fn new() -> SimLoop {
        SimLoop::default()
    }

    /// refuse timer registration once `limit` timers are pending
    pub fn with_timer_limit(limit: usize) -> SimLoop {
        SimLoop {
            timer_limit: Some(limit),
            ..SimLoop::default()
        }
    }

    /// move the clock forward, timers due by then fire on the next tick
    pub fn advance(&mut self, dur: Duration) {
        self.now = self.now.saturating_add(dur_to_ns(dur));
    }
}

impl EventLoop for SimLoop {
    fn schedule_timer(
        &mut self,
        delay: Duration,
        event: Event,
    ) -> Result<TimerHandle, SchedulingError> {
        if let Some(limit) = self.timer_limit {
            if self.timer_list.len() >= limit {
                return Err(SchedulingError::TimerLimit { limit });
            }
        }
        let time = self.now.saturating_add(dur_to_ns(delay));
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
        if idle && fired.is_empty() {
            if let Some(time) = self.timer_list.next_expire() {
                self.now = self.now.max(time);
            }
        }
        self.timer_list.schedule_timer(self.now, |event| fired.push(event));
    }

    fn has_pending_work(&self) -> bool {
        !self.ready.is_empty() || !self.timer_list.is_empty()
    }

    fn now(&self) -> Duration {
        ns_to_dur(self.now)
    }
}
