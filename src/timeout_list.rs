use std::cmp;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;
// removed entries tolerated in the heap before it is compacted
const COMPACT_SLACK: usize = 64;

#[inline]
pub fn dur_to_ns(dur: Duration) -> u64 {
    // Note that a duration is a (u64, u32) (seconds, nanoseconds) pair
    dur.as_secs()
        .saturating_mul(NANOS_PER_SEC)
        .saturating_add(u64::from(dur.subsec_nanos()))
}

#[inline]
pub fn ns_to_dur(ns: u64) -> Duration {
    Duration::new(ns / NANOS_PER_SEC, (ns % NANOS_PER_SEC) as u32)
}

// timeout event data
struct TimeoutData<T> {
    time: u64, // the clock in ns that the timer expires
    seq: u64,  // registration order, breaks ties between equal deadlines
    data: T,   // the data associate with the timeout event
}

impl<T> PartialEq for TimeoutData<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<T> Eq for TimeoutData<T> {}

impl<T> PartialOrd for TimeoutData<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// reversed so that the binary heap pops the earliest timer first
impl<T> Ord for TimeoutData<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deadline ordered timer list with lazy removal.
///
/// Removed timers stay in the heap until they reach the head, only the
/// `live` set decides whether an entry still fires.
pub struct TimeoutList<T> {
    timer_bh: BinaryHeap<TimeoutData<T>>,
    live: HashSet<u64>,
    next_seq: u64,
}

impl<T> Default for TimeoutList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeoutList<T> {
    pub fn new() -> Self {
        TimeoutList {
            timer_bh: BinaryHeap::new(),
            live: HashSet::new(),
            next_seq: 0,
        }
    }

    // add a timeout event expiring at `time`, return the removal key
    pub fn add_timer(&mut self, time: u64, data: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timer_bh.push(TimeoutData { time, seq, data });
        self.live.insert(seq);
        seq
    }

    // return true if the timer was still pending
    pub fn del_timer(&mut self, seq: u64) -> bool {
        let removed = self.live.remove(&seq);
        if removed && self.timer_bh.len() > COMPACT_SLACK + 2 * self.live.len() {
            self.compact();
        }
        removed
    }

    // drop the removed entries buried below the head
    fn compact(&mut self) {
        let live = &self.live;
        self.timer_bh.retain(|entry| live.contains(&entry.seq));
    }

    // number of entries in the heap, removed ones included
    #[cfg(test)]
    fn heap_len(&self) -> usize {
        self.timer_bh.len()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    // the expire time of the earliest live timer
    pub fn next_expire(&mut self) -> Option<u64> {
        while let Some(entry) = self.timer_bh.peek() {
            if self.live.contains(&entry.seq) {
                return Some(entry.time);
            }
            self.timer_bh.pop();
        }
        None
    }

    // remove all the expired timeout events and call the supplied
    // function with registered data, in deadline then registration order
    // return the time in ns for the next expiration
    pub fn schedule_timer<F: FnMut(T)>(&mut self, now: u64, mut f: F) -> Option<u64> {
        loop {
            match self.next_expire() {
                Some(time) if time <= now => {}
                next => return next,
            }
            if let Some(entry) = self.timer_bh.pop() {
                self.live.remove(&entry.seq);
                f(entry.data);
            }
        }
    }
}
