use std::error::Error as StdError;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

use crate::strand::StrandId;

/// The failure a frame can finish with.
///
/// Failures travel up a strand's call stack until a frame handles them or
/// the strand itself fails. They are cheap to clone so that every awaiter
/// of a failed strand observes the same cause.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// a failure raised by coroutine code
    #[error("{0}")]
    Coroutine(Rc<dyn StdError>),
    /// the timer of a `timeout` request won the race
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// the awaited strand was terminated
    #[error("strand was terminated")]
    Cancelled,
    /// the event loop refused a request
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    /// the calling code broke the kernel protocol
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl Failure {
    /// Wrap an arbitrary error.
    pub fn new<E: StdError + 'static>(err: E) -> Failure {
        Failure::Coroutine(Rc::new(err))
    }

    /// A failure carrying only a message.
    pub fn msg<S: Into<String>>(message: S) -> Failure {
        Failure::new(Message(message.into()))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Failure::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Failure::Cancelled)
    }

    /// Borrow the wrapped coroutine error as an `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Failure::Coroutine(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Failure to interact with the underlying event loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("event loop rejected timer: {reason}")]
    TimerRejected { reason: String },
    #[error("event loop timer limit of {limit} reached")]
    TimerLimit { limit: usize },
}

/// Defects in the code driving the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// a strand waits on at most one resumption source; every drive starts
    /// with that source consumed, so this only trips if the engine itself
    /// loses track of a wait
    #[error("{0} issued a suspending request while another is outstanding")]
    AlreadySuspended(StrandId),
    #[error("select requires at least one strand")]
    EmptySelect,
    #[error("{0} cannot select on itself")]
    SelfSelect(StrandId),
    #[error("call stack exceeded {limit} frames")]
    StackOverflow { limit: usize },
}

/// A strand failure nobody was waiting for.
#[derive(Debug, Clone)]
pub struct UnhandledFailure {
    pub strand: StrandId,
    pub failure: Failure,
}
